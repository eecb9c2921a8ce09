// crates/valor-core/src/error.rs

use thiserror::Error;

use crate::identity::{AccountId, Permission};
use crate::token::{Amount, TokenKind};

/// Coarse classification of a `LedgerError`.
///
/// Transport relayers use this to decide whether a rejected message is worth
/// re-delivering (state errors may clear with time; validation errors never do).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is malformed.
    Validation,
    /// The request is well-formed but the ledger is not in a state to accept it.
    State,
    /// The caller lacks the required permission.
    Authorization,
    /// Accepting the request would break a conservation or monotonicity rule.
    EconomicInvariant,
    /// Serialization or configuration failures outside the accounting core.
    Infrastructure,
}

/// Protocol-wide error type for the Valor ledger.
///
/// Every operation is all-or-nothing: when one of these is returned, no
/// ledger state has been mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // -- Validation ---------------------------------------------------------
    #[error("Validation error: amount must be greater than zero")]
    ZeroAmount,

    #[error("Validation error: zero address is not a valid principal")]
    ZeroAddress,

    #[error("Validation error: merkle proof does not match the active root")]
    InvalidProof,

    #[error("Validation error: merkle root must not be the zero hash")]
    ZeroRoot,

    #[error("Validation error: start timestamp {start_timestamp} is in the past (now {now})")]
    StartInPast { start_timestamp: u64, now: u64 },

    #[error("Validation error: root proposal is identical to the pending proposal")]
    DuplicateProposal,

    #[error("Validation error: token kind {0} is not supported here")]
    UnsupportedTokenKind(TokenKind),

    #[error("Validation error: insufficient balance (available {available}, requested {requested})")]
    InsufficientBalance { available: Amount, requested: Amount },

    #[error("Validation error: revenue report timestamp {timestamp} does not follow last report {last}")]
    StaleRevenueReport { last: u64, timestamp: u64 },

    #[error("Validation error: timestamp {timestamp} is in the future (now {now})")]
    FutureTimestamp { timestamp: u64, now: u64 },

    #[error("Validation error: malformed payload: {0}")]
    MalformedPayload(String),

    // -- State --------------------------------------------------------------
    #[error("State error: distribution {0} not found")]
    DistributionNotFound(u64),

    #[error("State error: distribution {0} already exists")]
    DistributionExists(u64),

    #[error("State error: distribution {0} has no active root")]
    NoActiveRoot(u64),

    #[error("State error: unstake lock not elapsed (unlocks at {unlock_at}, now {now})")]
    LockNotElapsed { unlock_at: u64, now: u64 },

    #[error("State error: no pending request")]
    NoPendingRequest,

    #[error("State error: vesting request {0} not found")]
    VestingRequestNotFound(u64),

    #[error("State error: batch {0} is not claimable")]
    BatchNotClaimable(u64),

    #[error("State error: redemption batches open at {epoch_start} (now {now})")]
    BatchWindowNotOpen { epoch_start: u64, now: u64 },

    #[error("State error: emission has already started")]
    EmissionAlreadyStarted,

    #[error("State error: ledger is paused")]
    Paused,

    #[error("State error: re-entrant call rejected while an operation is in flight")]
    Reentrant,

    // -- Authorization ------------------------------------------------------
    #[error("Authorization error: {principal} lacks permission {permission}")]
    Unauthorized {
        principal: AccountId,
        permission: Permission,
    },

    #[error("Authorization error: source chain {0} is not trusted")]
    UntrustedSource(u32),

    // -- Economic invariants ------------------------------------------------
    #[error("Invariant violation: cumulative amount {cumulative} is below already claimed {claimed}")]
    CumulativeDecrease { claimed: Amount, cumulative: Amount },

    #[error("Invariant violation: emission cap {cap} is below total emitted {emitted}")]
    EmissionCapExceeded { cap: Amount, emitted: Amount },

    #[error("Invariant violation: zero divisor computing {0}")]
    ZeroDivisor(&'static str),

    #[error("Invariant violation: arithmetic overflow")]
    Overflow,

    // -- Infrastructure -----------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl LedgerError {
    /// Classify this error according to the ledger's error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        use LedgerError::*;
        match self {
            ZeroAmount
            | ZeroAddress
            | InvalidProof
            | ZeroRoot
            | StartInPast { .. }
            | DuplicateProposal
            | UnsupportedTokenKind(_)
            | InsufficientBalance { .. }
            | StaleRevenueReport { .. }
            | FutureTimestamp { .. }
            | MalformedPayload(_) => ErrorCategory::Validation,

            DistributionNotFound(_)
            | DistributionExists(_)
            | NoActiveRoot(_)
            | LockNotElapsed { .. }
            | NoPendingRequest
            | VestingRequestNotFound(_)
            | BatchNotClaimable(_)
            | BatchWindowNotOpen { .. }
            | EmissionAlreadyStarted
            | Paused
            | Reentrant => ErrorCategory::State,

            Unauthorized { .. } | UntrustedSource(_) => ErrorCategory::Authorization,

            CumulativeDecrease { .. } | EmissionCapExceeded { .. } | ZeroDivisor(_) | Overflow => {
                ErrorCategory::EconomicInvariant
            }

            Serialization(_) | Config(_) | Transport(_) => ErrorCategory::Infrastructure,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
