// crates/valor-core/src/token.rs
//
// Token kinds tracked by the ledger and the amount representation.
//
// All balances are integer base units (18 decimals for the utility token and
// Valor, 6 for the stable asset). Amounts are carried as u128 so a full
// supply fits without scaling tricks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type alias for an amount in base units of whichever token it refers to.
pub type Amount = u128;

/// Kinds of value the ledger knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// The transferable utility token users stake.
    Primary,
    /// Non-transferable reward representation, tracked only as ledger balance.
    Record,
    /// The stable asset Valor is redeemed into. Never staked.
    Stable,
}

impl TokenKind {
    /// Whether balances of this kind live inside a `UserAccount`.
    pub fn is_stakable(&self) -> bool {
        matches!(self, TokenKind::Primary | TokenKind::Record)
    }

    /// Whether a positive amount of this kind leaves the ledger through an
    /// external payout rather than a ledger credit.
    pub fn is_transferable(&self) -> bool {
        !matches!(self, TokenKind::Record)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Primary => write!(f, "primary"),
            TokenKind::Record => write!(f, "record"),
            TokenKind::Stable => write!(f, "stable"),
        }
    }
}

/// Serde adapter for `Amount` fields.
///
/// Serializes as a decimal string. Deserializes from a string or any
/// non-negative integer, which keeps TOML (i64 only) and JSON producers
/// that cannot represent 128-bit integers both usable.
pub mod amount_serde {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(v as Amount)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            if v < 0 {
                return Err(E::custom(format!("amount must be non-negative, got {}", v)));
            }
            Ok(v as Amount)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.trim()
                .replace('_', "")
                .parse::<Amount>()
                .map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "amount_serde")]
        amount: Amount,
    }

    #[test]
    fn test_kind_flags() {
        assert!(TokenKind::Primary.is_stakable());
        assert!(TokenKind::Record.is_stakable());
        assert!(!TokenKind::Stable.is_stakable());
        assert!(!TokenKind::Record.is_transferable());
        assert!(TokenKind::Stable.is_transferable());
    }

    #[test]
    fn test_amount_from_string_and_number() {
        let a: Holder = serde_json::from_str(r#"{"amount":"1000000000000000000000000"}"#).unwrap();
        assert_eq!(a.amount, 1_000_000_000_000_000_000_000_000);
        let b: Holder = serde_json::from_str(r#"{"amount":42}"#).unwrap();
        assert_eq!(b.amount, 42);
    }

    #[test]
    fn test_amount_negative_rejected() {
        assert!(serde_json::from_str::<Holder>(r#"{"amount":-1}"#).is_err());
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let json = serde_json::to_string(&Holder { amount: 5 }).unwrap();
        assert_eq!(json, r#"{"amount":"5"}"#);
    }
}
