// crates/valor-daemon/src/inbox.rs
//
// Replay of relayed cross-chain envelopes from a JSON-lines file.
//
// Each non-empty line is `{"caller": "<relayer account>", "envelope": {...}}`.
// Lines starting with `#` are comments. A malformed or rejected line is
// logged and skipped; replay continues with the next one.

use serde::Deserialize;

use valor_core::{AccountId, Envelope, LedgerError};

use crate::shared::DaemonSharedState;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboxEntry {
    /// Principal that relayed the envelope.
    pub caller: AccountId,
    pub envelope: Envelope,
}

/// Decode one inbox line. Blank and comment lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<InboxEntry>, LedgerError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let entry: InboxEntry = serde_json::from_str(trimmed)?;
    Ok(Some(entry))
}

/// Feed every entry of `contents` through the ledger's receive hook.
pub async fn replay(shared: &DaemonSharedState, contents: &str) {
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let entry = match parse_line(line) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Inbox line {}: {}", line_no, e);
                shared.stats.write().await.malformed_lines += 1;
                continue;
            }
        };

        match shared.ledger.receive_from_peer(&entry.caller, &entry.envelope) {
            Ok(outcome) => {
                tracing::info!("Inbox line {}: {:?}", line_no, outcome);
                shared.stats.write().await.envelopes_accepted += 1;
            }
            Err(e) => {
                tracing::debug!("Inbox line {} rejected: {}", line_no, e);
                shared.stats.write().await.envelopes_rejected += 1;
            }
        }
    }
}

/// Read the inbox at `path` and replay it. A missing file is not an error.
pub async fn replay_file(shared: &DaemonSharedState, path: &str) -> Result<(), std::io::Error> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No inbox at {}; nothing to replay", path);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    tracing::info!("Replaying inbox {}", path);
    replay(shared, &contents).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use valor_core::{ManualClock, Permission, TokenKind};
    use valor_ledger::{Grant, LedgerConfig, LedgerFacade};

    use crate::transport::ChannelTransport;

    const T0: u64 = 1_700_000_000;

    fn relayer() -> AccountId {
        AccountId([0xcc; 32])
    }

    fn line(caller: AccountId, sender: AccountId, chain: u32, amount: u64) -> String {
        format!(
            r#"{{"caller":"{caller}","envelope":{{"source_chain_id":{chain},"token_kind":"primary","amount":{amount},"sender":"{sender}","body":{{"payload_type":"stake"}}}}}}"#
        )
    }

    fn shared() -> (DaemonSharedState, tokio::sync::mpsc::UnboundedReceiver<valor_core::PayoutIntent>) {
        let mut config = LedgerConfig::default();
        config.emission.start_timestamp = T0;
        config.peers.trusted_chains = vec![5];
        config.access.grants = vec![Grant {
            principal: relayer(),
            permissions: vec![Permission::PeerRelayer],
        }];
        let (transport, rx) = ChannelTransport::new();
        let ledger = LedgerFacade::from_config(&config, Arc::new(transport), Arc::new(ManualClock::new(T0)))
            .unwrap();
        (DaemonSharedState::new(Arc::new(ledger)), rx)
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# replayed from chain 5").unwrap(), None);
        assert!(matches!(parse_line("{not json"), Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn test_parse_entry() {
        let sender = AccountId([1u8; 32]);
        let entry = parse_line(&line(relayer(), sender, 5, 40)).unwrap().unwrap();
        assert_eq!(entry.caller, relayer());
        assert_eq!(entry.envelope.sender, sender);
        assert_eq!(entry.envelope.amount, 40);
        assert_eq!(entry.envelope.token_kind, TokenKind::Primary);
    }

    #[tokio::test]
    async fn test_replay_counts_outcomes() {
        let (shared, _rx) = shared();
        let sender = AccountId([1u8; 32]);
        let contents = [
            line(relayer(), sender, 5, 40),
            "# comment".to_string(),
            line(relayer(), sender, 99, 40),
            "garbage".to_string(),
            line(sender, sender, 5, 40),
            line(relayer(), sender, 5, 2),
        ]
        .join("\n");

        replay(&shared, &contents).await;

        let stats = shared.stats.read().await.clone();
        assert_eq!(stats.envelopes_accepted, 2);
        assert_eq!(stats.envelopes_rejected, 2);
        assert_eq!(stats.malformed_lines, 1);
        let account = shared.ledger.account(&sender).unwrap().unwrap();
        assert_eq!(account.primary_balance, 42);
    }

    #[tokio::test]
    async fn test_missing_inbox_is_not_an_error() {
        let (shared, _rx) = shared();
        replay_file(&shared, "/nonexistent/valor/inbox.jsonl").await.unwrap();
        assert_eq!(*shared.stats.read().await, Default::default());
    }
}
