// crates/valor-daemon/src/transport.rs
//
// Payout transport that hands committed intents to the async relay task
// over an unbounded tokio channel. Sending never blocks, so the ledger can
// call it while holding its lock.

use tokio::sync::mpsc;

use valor_core::{LedgerError, PayoutIntent, PayoutTransport};

pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<PayoutIntent>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PayoutIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PayoutTransport for ChannelTransport {
    fn dispatch(&self, intent: &PayoutIntent) -> Result<(), LedgerError> {
        self.tx
            .send(intent.clone())
            .map_err(|_| LedgerError::Transport("payout relay channel closed".into()))
    }
}
