// crates/valor-core/src/traits.rs

use std::sync::atomic::{AtomicU64, Ordering};

use crate::envelope::PayoutIntent;
use crate::error::LedgerError;

/// Source of the current ledger timestamp (unix seconds).
///
/// Time-windowed economics (emission, batches, vesting, unstake locks) are
/// evaluated against this value at call time; nothing is ever awaited.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Outbound half of the cross-chain transport.
///
/// Implemented by the deployment's bridge adapter. Called by the ledger facade
/// only after the mutation owing the payout has been committed. An error
/// leaves the intent queued in the ledger outbox for a later flush.
pub trait PayoutTransport: Send + Sync {
    fn dispatch(&self, intent: &PayoutIntent) -> Result<(), LedgerError>;
}
