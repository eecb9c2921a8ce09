// crates/valor-core/src/crypto.rs
//
// SHA-256 hashing and the cumulative-distribution merkle scheme.
//
// Leaves commit to (account, cumulative amount) and are double-hashed so a
// leaf can never be confused with an interior node. Interior nodes hash the
// sorted pair of children, which lets proofs omit left/right position bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::identity::AccountId;
use crate::token::Amount;

/// A 32-byte digest. Serialized as a `0x`-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Hash32 {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)
            .map_err(|e| LedgerError::MalformedPayload(format!("Invalid hash hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            LedgerError::MalformedPayload("Hash must be exactly 32 bytes".to_string())
        })?;
        Ok(Hash32(array))
    }
}

impl TryFrom<String> for Hash32 {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Hash32> for String {
    fn from(h: Hash32) -> Self {
        h.to_string()
    }
}

/// Compute SHA-256 hash of the given bytes.
pub fn hash_bytes(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    Hash32(output)
}

/// Leaf commitment for `account` being entitled to `cumulative_amount` in total.
pub fn leaf_hash(account: &AccountId, cumulative_amount: Amount) -> Hash32 {
    let mut preimage = Vec::with_capacity(48);
    preimage.extend_from_slice(account.as_bytes());
    preimage.extend_from_slice(&cumulative_amount.to_be_bytes());
    let inner = hash_bytes(&preimage);
    hash_bytes(&inner.0)
}

/// Hash two sibling nodes in sorted order.
pub fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&lo.0);
    buf[32..].copy_from_slice(&hi.0);
    hash_bytes(&buf)
}

/// Fold `proof` over `leaf` and compare against `root`.
pub fn verify_proof(proof: &[Hash32], root: &Hash32, leaf: &Hash32) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    computed == *root
}

/// Reference merkle tree over leaf hashes.
///
/// Distribution trees are produced off-ledger; this builder exists so
/// operators and tests can derive roots and proofs with exactly the hashing
/// rules `verify_proof` applies. An unpaired node is promoted unchanged to
/// the next level.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes in the given order.
    pub fn new(leaves: Vec<Hash32>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map(|l| l.len() > 1).unwrap_or(false) {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash32> = current
                .chunks(2)
                .map(|chunk| match chunk {
                    [left, right] => hash_pair(left, right),
                    _ => chunk[0],
                })
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// Build a tree whose leaves are `(account, cumulative)` entitlements.
    pub fn from_entitlements(entries: &[(AccountId, Amount)]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|(account, amount)| leaf_hash(account, *amount))
                .collect(),
        )
    }

    /// The root hash, or the zero hash for an empty tree.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|level| level.first().copied())
            .unwrap_or(Hash32::ZERO)
    }

    /// Sibling path for the leaf at `index`, bottom-up.
    pub fn proof(&self, index: usize) -> Option<Vec<Hash32>> {
        if index >= self.levels.first().map(|l| l.len()).unwrap_or(0) {
            return None;
        }
        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = idx ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(proof)
    }
}
