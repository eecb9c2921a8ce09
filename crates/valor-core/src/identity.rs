// crates/valor-core/src/identity.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Identity of a principal (user, relayer, or operator) on the ledger.
///
/// Wraps the 32-byte account key used on every connected chain. Serialized as
/// a lowercase hex string, optionally `0x`-prefixed on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The all-zero account. Never a valid participant.
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reject the zero account with a validation error.
    pub fn ensure_nonzero(&self) -> Result<(), LedgerError> {
        if self.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        Ok(())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)
            .map_err(|e| LedgerError::MalformedPayload(format!("Invalid account hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            LedgerError::MalformedPayload("Account id must be exactly 32 bytes".to_string())
        })?;
        Ok(AccountId(array))
    }
}

impl TryFrom<String> for AccountId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

/// Roles a principal may hold. Checked at the top of every privileged
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Grants and revokes permissions.
    Admin,
    /// May engage and release the pause switch.
    Pauser,
    /// Submits daily stable-asset revenue reports.
    RevenueUpdater,
    /// Creates distributions and proposes merkle roots.
    RootUpdater,
    /// Adjusts emission rate, cap, and start.
    EmissionManager,
    /// Delivers cross-chain envelopes into the receive hook.
    PeerRelayer,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Admin => write!(f, "admin"),
            Permission::Pauser => write!(f, "pauser"),
            Permission::RevenueUpdater => write!(f, "revenue_updater"),
            Permission::RootUpdater => write!(f, "root_updater"),
            Permission::EmissionManager => write!(f, "emission_manager"),
            Permission::PeerRelayer => write!(f, "peer_relayer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_hex_roundtrip_with_prefix() {
        let id = AccountId([0xab; 32]);
        let text = id.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<AccountId>().unwrap(), id);
        assert_eq!(text[2..].parse::<AccountId>().unwrap(), id);
    }

    #[test]
    fn test_account_wrong_length_rejected() {
        assert!("0xdeadbeef".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_zero_account_rejected() {
        assert_eq!(AccountId::ZERO.ensure_nonzero(), Err(LedgerError::ZeroAddress));
        assert!(AccountId([1u8; 32]).ensure_nonzero().is_ok());
    }

    #[test]
    fn test_account_serde_as_string() {
        let id = AccountId([7u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_permission_snake_case() {
        let p: Permission = serde_json::from_str("\"revenue_updater\"").unwrap();
        assert_eq!(p, Permission::RevenueUpdater);
        assert_eq!(p.to_string(), "revenue_updater");
    }
}
