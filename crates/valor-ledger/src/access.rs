// crates/valor-ledger/src/access.rs
//
// Principal -> permission-set mapping consulted at the top of every
// privileged operation.

use std::collections::{BTreeSet, HashMap};

use valor_core::{AccountId, LedgerError, Permission};

use crate::config::Grant;

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    grants: HashMap<AccountId, BTreeSet<Permission>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configured grants.
    pub fn from_grants(grants: &[Grant]) -> Result<Self, LedgerError> {
        let mut access = Self::new();
        for grant in grants {
            for permission in &grant.permissions {
                access.grant(grant.principal, *permission)?;
            }
        }
        Ok(access)
    }

    pub fn has_permission(&self, principal: &AccountId, permission: Permission) -> bool {
        self.grants
            .get(principal)
            .is_some_and(|set| set.contains(&permission))
    }

    /// `Unauthorized` unless `principal` holds `permission`.
    pub fn require(&self, principal: &AccountId, permission: Permission) -> Result<(), LedgerError> {
        if self.has_permission(principal, permission) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                principal: *principal,
                permission,
            })
        }
    }

    /// Returns whether the permission was newly granted.
    pub fn grant(&mut self, principal: AccountId, permission: Permission) -> Result<bool, LedgerError> {
        principal.ensure_nonzero()?;
        Ok(self.grants.entry(principal).or_default().insert(permission))
    }

    /// Returns whether the permission was held.
    pub fn revoke(&mut self, principal: &AccountId, permission: Permission) -> bool {
        let Some(set) = self.grants.get_mut(principal) else {
            return false;
        };
        let removed = set.remove(&permission);
        if set.is_empty() {
            self.grants.remove(principal);
        }
        removed
    }

    pub fn permissions(&self, principal: &AccountId) -> Vec<Permission> {
        self.grants
            .get(principal)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
