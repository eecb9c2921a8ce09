// crates/valor-daemon/src/relay.rs
//
// Background tasks around the payout outbox: the relay task that consumes
// intents from the channel transport, and a periodic flush that retries
// intents the ledger kept queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};

use valor_core::PayoutIntent;

use crate::shared::{DaemonSharedState, RelayStats};

/// Consume payout intents until every sender is dropped.
///
/// Bridging the payout to its destination chain belongs to the deployment's
/// bridge adapter; this task is where it plugs in. Returns the number of
/// intents relayed.
///
/// Holds only the counters, not the ledger: the channel closes once the
/// ledger (which owns the sending half) is dropped.
pub async fn run_payout_relay(
    stats: Arc<RwLock<RelayStats>>,
    mut rx: mpsc::UnboundedReceiver<PayoutIntent>,
) -> u64 {
    let mut relayed = 0;
    while let Some(intent) = rx.recv().await {
        match intent.destination_chain_id {
            Some(chain) => tracing::info!(
                "Relaying payout {} of {} {} to {} on chain {}",
                intent.id,
                intent.amount,
                intent.token_kind,
                intent.recipient,
                chain
            ),
            None => tracing::info!(
                "Paying out {} of {} {} to {}",
                intent.id,
                intent.amount,
                intent.token_kind,
                intent.recipient
            ),
        }
        relayed += 1;
        stats.write().await.payouts_relayed += 1;
    }
    tracing::info!("Payout relay stopped after {} payouts", relayed);
    relayed
}

/// Periodically retry queued payouts.
pub async fn run_flush_loop(shared: DaemonSharedState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match shared.ledger.flush_payouts() {
            Ok(0) => {}
            Ok(n) => tracing::info!("Flushed {} queued payouts", n),
            Err(e) => tracing::warn!("Payout flush error: {}", e),
        }
    }
}
