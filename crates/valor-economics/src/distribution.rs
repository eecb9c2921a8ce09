// crates/valor-economics/src/distribution.rs
//
// Cumulative merkle distributions with root rotation.
//
// Each distribution publishes a merkle root over `(account, cumulative_amount)`
// leaves. Amounts are cumulative across epochs: a new root re-states every
// user's total entitlement, and a claim pays only the difference from what
// the user has already claimed. Replaying an old proof therefore pays 0 (same
// cumulative) or fails (lower cumulative).
//
// Root lifecycle per distribution:
//
//   NoRoot --propose--> Proposed --start elapsed--> Active
//   Active --propose--> ActiveWithProposal --start elapsed--> Active
//
// When a due proposal is promoted is governed by `ActivationPolicy`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use valor_core::{leaf_hash, verify_proof, AccountId, Amount, Hash32, LedgerError, TokenKind};

/// When a proposed root whose start time has elapsed becomes active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Any claim (or new proposal) promotes a due root before being served.
    #[default]
    OnClaim,
    /// Only `activate_due_root` and new proposals promote a due root; claims
    /// keep verifying against the current active root until then.
    Explicit,
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationPolicy::OnClaim => write!(f, "on_claim"),
            ActivationPolicy::Explicit => write!(f, "explicit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootInfo {
    pub root: Hash32,
    pub start_timestamp: u64,
    pub metadata: String,
}

impl RootInfo {
    pub fn is_due(&self, now: u64) -> bool {
        self.start_timestamp <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    NoRoot,
    Proposed,
    Active,
    ActiveWithProposal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: u64,
    pub token_kind: TokenKind,
    pub active_root: Option<RootInfo>,
    pub proposed_root: Option<RootInfo>,
}

impl Distribution {
    fn new(id: u64, token_kind: TokenKind) -> Self {
        Self {
            id,
            token_kind,
            active_root: None,
            proposed_root: None,
        }
    }

    pub fn state(&self) -> RootState {
        match (&self.active_root, &self.proposed_root) {
            (None, None) => RootState::NoRoot,
            (None, Some(_)) => RootState::Proposed,
            (Some(_), None) => RootState::Active,
            (Some(_), Some(_)) => RootState::ActiveWithProposal,
        }
    }

    /// Promote the proposed root if its start has elapsed.
    fn activate_if_due(&mut self, now: u64) -> bool {
        match self.proposed_root.take() {
            Some(proposed) if proposed.is_due(now) => {
                tracing::debug!(
                    distribution_id = self.id,
                    root = %proposed.root,
                    "Proposed root activated"
                );
                self.active_root = Some(proposed);
                true
            }
            other => {
                self.proposed_root = other;
                false
            }
        }
    }

    /// The root that would serve a claim at `now` under `policy`.
    fn serving_root(&self, policy: ActivationPolicy, now: u64) -> Option<&RootInfo> {
        if policy == ActivationPolicy::OnClaim {
            if let Some(proposed) = self.proposed_root.as_ref().filter(|p| p.is_due(now)) {
                return Some(proposed);
            }
        }
        self.active_root.as_ref()
    }

    fn propose(&mut self, proposal: RootInfo, now: u64) -> Result<(), LedgerError> {
        if proposal.root.is_zero() {
            return Err(LedgerError::ZeroRoot);
        }
        if proposal.start_timestamp < now {
            return Err(LedgerError::StartInPast {
                start_timestamp: proposal.start_timestamp,
                now,
            });
        }
        if self.proposed_root.as_ref() == Some(&proposal) {
            return Err(LedgerError::DuplicateProposal);
        }
        self.activate_if_due(now);
        tracing::debug!(
            distribution_id = self.id,
            root = %proposal.root,
            start = proposal.start_timestamp,
            "Root proposed"
        );
        self.proposed_root = Some(proposal);
        Ok(())
    }
}

/// A validated claim, not yet recorded.
///
/// Produced by `MerkleDistributor::prepare_claim` and applied with
/// `commit_claim`, so callers can run other fallible steps in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedClaim {
    pub distribution_id: u64,
    pub user: AccountId,
    pub token_kind: TokenKind,
    pub cumulative_amount: Amount,
    pub claimable: Amount,
    activates_proposal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleDistributor {
    policy: ActivationPolicy,
    distributions: BTreeMap<u64, Distribution>,
    claimed: HashMap<u64, HashMap<AccountId, Amount>>,
}

impl MerkleDistributor {
    pub fn new(policy: ActivationPolicy) -> Self {
        Self {
            policy,
            distributions: BTreeMap::new(),
            claimed: HashMap::new(),
        }
    }

    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    pub fn distribution(&self, id: u64) -> Option<&Distribution> {
        self.distributions.get(&id)
    }

    pub fn claimed_amount(&self, id: u64, user: &AccountId) -> Amount {
        self.claimed
            .get(&id)
            .and_then(|m| m.get(user))
            .copied()
            .unwrap_or(0)
    }

    pub fn create_distribution(
        &mut self,
        id: u64,
        token_kind: TokenKind,
        proposal: RootInfo,
        now: u64,
    ) -> Result<(), LedgerError> {
        if self.distributions.contains_key(&id) {
            return Err(LedgerError::DistributionExists(id));
        }
        let mut distribution = Distribution::new(id, token_kind);
        distribution.propose(proposal, now)?;
        self.distributions.insert(id, distribution);
        tracing::debug!(distribution_id = id, %token_kind, "Distribution created");
        Ok(())
    }

    pub fn propose_root(&mut self, id: u64, proposal: RootInfo, now: u64) -> Result<(), LedgerError> {
        let distribution = self
            .distributions
            .get_mut(&id)
            .ok_or(LedgerError::DistributionNotFound(id))?;
        distribution.propose(proposal, now)
    }

    /// Promote distribution `id`'s proposed root if due. Returns whether a
    /// root was activated.
    pub fn activate_due_root(&mut self, id: u64, now: u64) -> Result<bool, LedgerError> {
        let distribution = self
            .distributions
            .get_mut(&id)
            .ok_or(LedgerError::DistributionNotFound(id))?;
        Ok(distribution.activate_if_due(now))
    }

    /// Validate a claim of `cumulative_amount` by `user` without recording it.
    pub fn prepare_claim(
        &self,
        id: u64,
        user: &AccountId,
        cumulative_amount: Amount,
        proof: &[Hash32],
        now: u64,
    ) -> Result<PreparedClaim, LedgerError> {
        user.ensure_nonzero()?;
        let distribution = self
            .distributions
            .get(&id)
            .ok_or(LedgerError::DistributionNotFound(id))?;
        let root = distribution
            .serving_root(self.policy, now)
            .ok_or(LedgerError::NoActiveRoot(id))?;
        let activates_proposal = distribution
            .proposed_root
            .as_ref()
            .is_some_and(|p| std::ptr::eq(p, root));

        if !verify_proof(proof, &root.root, &leaf_hash(user, cumulative_amount)) {
            return Err(LedgerError::InvalidProof);
        }

        let claimed = self.claimed_amount(id, user);
        let claimable = cumulative_amount
            .checked_sub(claimed)
            .ok_or(LedgerError::CumulativeDecrease {
                claimed,
                cumulative: cumulative_amount,
            })?;

        Ok(PreparedClaim {
            distribution_id: id,
            user: *user,
            token_kind: distribution.token_kind,
            cumulative_amount,
            claimable,
            activates_proposal,
        })
    }

    /// Record a claim produced by `prepare_claim` on the current state.
    pub fn commit_claim(&mut self, prepared: &PreparedClaim, now: u64) {
        if prepared.activates_proposal {
            if let Some(distribution) = self.distributions.get_mut(&prepared.distribution_id) {
                distribution.activate_if_due(now);
            }
        }
        self.claimed
            .entry(prepared.distribution_id)
            .or_default()
            .insert(prepared.user, prepared.cumulative_amount);
        tracing::debug!(
            distribution_id = prepared.distribution_id,
            user = %prepared.user,
            cumulative = prepared.cumulative_amount,
            claimable = prepared.claimable,
            "Distribution claimed"
        );
    }

    /// Validate and record a claim in one step. Returns the token kind and
    /// the newly claimable amount.
    pub fn claim(
        &mut self,
        id: u64,
        user: &AccountId,
        cumulative_amount: Amount,
        proof: &[Hash32],
        now: u64,
    ) -> Result<(TokenKind, Amount), LedgerError> {
        let prepared = self.prepare_claim(id, user, cumulative_amount, proof, now)?;
        self.commit_claim(&prepared, now);
        Ok((prepared.token_kind, prepared.claimable))
    }
}
