// crates/valor-daemon/src/main.rs
//
// Binary entrypoint for the Valor ledger daemon.
//
// Parses CLI arguments, loads configuration, initializes tracing, builds the
// ledger facade over a channel transport, replays the relayed-envelope
// inbox, and runs the payout relay until shutdown.

mod config;
mod inbox;
mod relay;
mod shared;
mod transport;

use std::sync::Arc;

use clap::Parser;
use config::{expand_tilde, DaemonConfig};
use shared::DaemonSharedState;
use transport::ChannelTransport;

use valor_core::SystemClock;
use valor_ledger::LedgerFacade;

/// Valor ledger daemon: replays relayed envelopes and relays payouts.
#[derive(Parser, Debug)]
#[command(name = "valor-daemon", version = "0.1.0", about = "Valor staking ledger daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.valor/config.toml")]
    config: String,

    /// Inbox file to replay; overrides `inbox_path` from the config file.
    #[arg(long)]
    inbox: Option<String>,

    /// Log level; overrides `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = expand_tilde(&args.config);

    // Load configuration before tracing so the configured log level applies.
    // Only a missing file falls back to defaults; a file that fails to parse
    // or validate stops startup.
    let loaded = DaemonConfig::load_optional(&config_path)
        .map_err(|e| format!("Invalid config {}: {}", config_path, e))?;
    let found = loaded.is_some();
    let mut daemon_config = loaded.unwrap_or_default();

    // CLI flags override the config file values.
    if let Some(level) = args.log_level {
        daemon_config.log_level = level;
    }
    if let Some(inbox) = args.inbox {
        daemon_config.inbox_path = inbox;
    }

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    if found {
        tracing::info!("Loaded configuration from {}", config_path);
    } else {
        tracing::warn!("No config at {}. Using defaults.", config_path);
    }

    let ledger_config = &daemon_config.ledger;
    tracing::info!("Valor Ledger Daemon v0.1.0");
    tracing::info!(
        "Emission: {} per second from {}, cap {}",
        ledger_config.emission.rate_per_second,
        ledger_config.emission.start_timestamp,
        ledger_config.emission.cap
    );
    tracing::info!(
        "Batches: {}s from {}; root activation: {}",
        ledger_config.redemption.batch_duration_secs,
        ledger_config.epoch_start(),
        ledger_config.distribution.activation_policy
    );
    tracing::info!("Trusted peer chains: {:?}", ledger_config.peers.trusted_chains);

    // ---------------------------------------------------------------
    // Construct the ledger and shared state.
    // ---------------------------------------------------------------
    let (transport, payout_rx) = ChannelTransport::new();
    let ledger = LedgerFacade::from_config(ledger_config, Arc::new(transport), Arc::new(SystemClock))?;
    let shared_state = DaemonSharedState::new(Arc::new(ledger));

    let relay_handle = tokio::spawn(relay::run_payout_relay(
        shared_state.stats.clone(),
        payout_rx,
    ));

    // ---------------------------------------------------------------
    // Replay relayed envelopes.
    // ---------------------------------------------------------------
    let inbox_path = expand_tilde(&daemon_config.inbox_path);
    if let Err(e) = inbox::replay_file(&shared_state, &inbox_path).await {
        tracing::error!("Failed to read inbox {}: {}", inbox_path, e);
    }

    // ---------------------------------------------------------------
    // Retry queued payouts until shutdown.
    // ---------------------------------------------------------------
    let flush_state = shared_state.clone();
    let flush_interval = daemon_config.flush_interval_secs;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        _ = relay::run_flush_loop(flush_state, flush_interval) => {}
    }

    let stats = shared_state.stats.read().await.clone();
    let pending = shared_state.ledger.pending_payouts()?.len();
    tracing::info!(
        "Shutting down after {:?}: {} envelopes accepted, {} rejected, {} malformed, {} payouts relayed, {} still queued",
        shared_state.start_time.elapsed(),
        stats.envelopes_accepted,
        stats.envelopes_rejected,
        stats.malformed_lines,
        stats.payouts_relayed,
        pending
    );

    // Dropping the ledger closes the payout channel and lets the relay drain.
    drop(shared_state);
    if let Err(e) = relay_handle.await {
        tracing::error!("Payout relay task failed: {}", e);
    }
    tracing::info!("Valor daemon shut down gracefully");

    Ok(())
}
