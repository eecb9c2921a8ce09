// crates/valor-core/src/lib.rs
//
// valor-core: Core types, errors, merkle primitives, and collaborator traits
// for the Valor staking ledger.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines account identities, token kinds, the protocol-wide error type,
// the cross-chain envelope shapes, and the traits through which the ledger
// talks to its external collaborators (clock, payout transport).

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod token;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use valor_core::AccountId;`

// Identity types
pub use identity::{AccountId, Permission};

// Token types
pub use token::{Amount, TokenKind};

// Merkle primitives
pub use crypto::{hash_bytes, leaf_hash, verify_proof, Hash32, MerkleTree};

// Envelope types
pub use envelope::{Envelope, PayoutIntent, PeerPayload};

// Error type
pub use error::{ErrorCategory, LedgerError};

// Traits
pub use traits::{Clock, ManualClock, PayoutTransport, SystemClock};
