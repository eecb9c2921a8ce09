// crates/valor-daemon/src/shared.rs
//
// DaemonSharedState: the ledger facade plus relay counters, constructed once
// in main.rs and cloned into each daemon task.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use valor_ledger::LedgerFacade;

/// Counters reported at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Inbox envelopes the ledger accepted.
    pub envelopes_accepted: u64,
    /// Inbox envelopes the ledger rejected.
    pub envelopes_rejected: u64,
    /// Inbox lines that could not be decoded.
    pub malformed_lines: u64,
    /// Payout intents handed on by the relay task.
    pub payouts_relayed: u64,
}

#[derive(Clone)]
pub struct DaemonSharedState {
    pub ledger: Arc<LedgerFacade>,
    pub stats: Arc<RwLock<RelayStats>>,
    /// Daemon start time for uptime reporting.
    pub start_time: Instant,
}

impl DaemonSharedState {
    pub fn new(ledger: Arc<LedgerFacade>) -> Self {
        Self {
            ledger,
            stats: Arc::new(RwLock::new(RelayStats::default())),
            start_time: Instant::now(),
        }
    }
}
