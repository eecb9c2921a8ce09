// crates/valor-core/src/envelope.rs
//
// Shapes exchanged with the cross-chain transport collaborator.
//
// The transport owns byte encoding and delivery; the ledger only sees the
// decoded `Envelope` on the way in and emits `PayoutIntent`s on the way out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::Hash32;
use crate::identity::AccountId;
use crate::token::{amount_serde, Amount, TokenKind};

/// A decoded cross-chain message delivered to the receive hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Chain the message originated on.
    pub source_chain_id: u32,
    /// Kind of value bridged alongside the message, if any.
    pub token_kind: TokenKind,
    /// Amount bridged alongside the message. Zero for pure instructions.
    #[serde(with = "amount_serde", default)]
    pub amount: Amount,
    /// Originating account on the source chain.
    pub sender: AccountId,
    /// Typed instruction, tagged by `payload_type`.
    pub body: PeerPayload,
}

/// Instruction carried by an `Envelope`, dispatched by its `payload_type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payload_type", content = "payload", rename_all = "snake_case")]
pub enum PeerPayload {
    /// Stake the bridged `amount` of `token_kind` for the sender.
    Stake,
    RequestUnstake {
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    CancelUnstake,
    Withdraw,
    ConvertToVesting {
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    ClaimVesting {
        request_id: u64,
    },
    CancelVesting {
        request_id: u64,
    },
    CancelAllVesting,
    RedeemValor {
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    ClaimBatch {
        batch_id: u64,
    },
    /// Claim from a cumulative merkle distribution on behalf of `user`.
    ClaimReward {
        distribution_id: u64,
        user: AccountId,
        #[serde(with = "amount_serde")]
        cumulative_amount: Amount,
        proof: Vec<Hash32>,
    },
}

impl PeerPayload {
    /// The wire tag of this payload, for logging.
    pub fn payload_type(&self) -> &'static str {
        match self {
            PeerPayload::Stake => "stake",
            PeerPayload::RequestUnstake { .. } => "request_unstake",
            PeerPayload::CancelUnstake => "cancel_unstake",
            PeerPayload::Withdraw => "withdraw",
            PeerPayload::ConvertToVesting { .. } => "convert_to_vesting",
            PeerPayload::ClaimVesting { .. } => "claim_vesting",
            PeerPayload::CancelVesting { .. } => "cancel_vesting",
            PeerPayload::CancelAllVesting => "cancel_all_vesting",
            PeerPayload::RedeemValor { .. } => "redeem_valor",
            PeerPayload::ClaimBatch { .. } => "claim_batch",
            PeerPayload::ClaimReward { .. } => "claim_reward",
        }
    }
}

/// An outbound payout the transport must execute.
///
/// Only created after the ledger mutation that owes the amount has been
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutIntent {
    /// Unique, time-ordered identifier (UUIDv7) for de-duplication downstream.
    pub id: Uuid,
    pub recipient: AccountId,
    pub token_kind: TokenKind,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    /// Destination chain, or `None` to pay out on the ledger's home chain.
    pub destination_chain_id: Option<u32>,
    /// Ledger timestamp at which the intent was committed.
    pub created_at: u64,
}

impl PayoutIntent {
    pub fn new(
        recipient: AccountId,
        token_kind: TokenKind,
        amount: Amount,
        destination_chain_id: Option<u32>,
        created_at: u64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient,
            token_kind,
            amount,
            destination_chain_id,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_reward_envelope_from_json() {
        let user = AccountId([2u8; 32]);
        let json = format!(
            r#"{{
                "source_chain_id": 10,
                "token_kind": "primary",
                "sender": "{sender}",
                "body": {{
                    "payload_type": "claim_reward",
                    "payload": {{
                        "distribution_id": 7,
                        "user": "{user}",
                        "cumulative_amount": "150",
                        "proof": ["{proof}"]
                    }}
                }}
            }}"#,
            sender = AccountId([1u8; 32]),
            user = user,
            proof = Hash32([3u8; 32]),
        );
        let envelope: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope.amount, 0);
        assert_eq!(envelope.body.payload_type(), "claim_reward");
        match envelope.body {
            PeerPayload::ClaimReward {
                distribution_id,
                user: u,
                cumulative_amount,
                proof,
            } => {
                assert_eq!(distribution_id, 7);
                assert_eq!(u, user);
                assert_eq!(cumulative_amount, 150);
                assert_eq!(proof, vec![Hash32([3u8; 32])]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unit_payload_without_content() {
        let json = format!(
            r#"{{"source_chain_id":1,"token_kind":"primary","amount":"500","sender":"{}","body":{{"payload_type":"stake"}}}}"#,
            AccountId([1u8; 32])
        );
        let envelope: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope.body, PeerPayload::Stake);
        assert_eq!(envelope.amount, 500);
    }

    #[test]
    fn test_unknown_payload_type_rejected() {
        let json = format!(
            r#"{{"source_chain_id":1,"token_kind":"primary","sender":"{}","body":{{"payload_type":"mint_everything"}}}}"#,
            AccountId([1u8; 32])
        );
        assert!(serde_json::from_str::<Envelope>(&json).is_err());
    }

    #[test]
    fn test_payout_intents_get_distinct_ids() {
        let a = PayoutIntent::new(AccountId([1u8; 32]), TokenKind::Stable, 10, None, 0);
        let b = PayoutIntent::new(AccountId([1u8; 32]), TokenKind::Stable, 10, None, 0);
        assert_ne!(a.id, b.id);
    }
}
