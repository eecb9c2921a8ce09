// crates/valor-ledger/src/lib.rs
//
// valor-ledger: the Valor ledger aggregate and its facade.
//
// `LedgerState` owns every accounting engine plus the payout outbox.
// `LedgerFacade` wraps it in a mutex and is the only component that checks
// permissions, honours the pause switch, rejects re-entrant calls, and talks
// to the outbound payout transport.

pub mod access;
pub mod config;
pub mod facade;
pub mod state;

pub use access::AccessControl;
pub use config::{Grant, LedgerConfig};
pub use facade::{LedgerFacade, PeerOutcome};
pub use state::{Destination, LedgerState};
