// crates/valor-economics/src/math.rs
//
// Fixed-point helpers for ledger arithmetic.
//
// Two scales are in play:
//   - SHARE_SCALE (1e18) for the reward-per-share accumulator.
//   - RATE_SCALE (1e30) for the valor -> stable conversion rate. Valor has 18
//     decimals and the stable asset 6, so a plain 1e18 scale would leave only
//     six significant digits in a realistic rate.
//
// Every multiply-then-divide widens to 256 bits so the product cannot
// overflow, and the narrowed quotient is range-checked before use.
//
// The share accumulator itself is a U256: with a dust stake under a high
// rate, `emission * SHARE_SCALE / total_staked` exceeds u128. Products of
// the accumulator and a balance are taken in U512.

#![allow(clippy::assign_op_pattern)]
#![allow(clippy::ptr_offset_with_cast)]
#![allow(clippy::manual_range_contains)]

use uint::construct_uint;

use valor_core::{Amount, LedgerError};

construct_uint! {
    /// 256-bit unsigned integer.
    pub struct U256(4);
}

construct_uint! {
    /// 512-bit unsigned integer, for products of two U256 values.
    pub struct U512(8);
}

/// Scale of `acc_per_share_scaled`.
pub const SHARE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Scale of revenue and batch conversion rates.
pub const RATE_SCALE: u128 = 1_000_000_000_000_000_000_000_000_000_000;

fn widen(v: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(&v.0);
    U512(limbs)
}

fn narrow(v: U512) -> Option<U256> {
    if v.0[4..].iter().any(|&limb| limb != 0) {
        return None;
    }
    let mut limbs = [0u64; 4];
    limbs.copy_from_slice(&v.0[..4]);
    Some(U256(limbs))
}

/// Narrow a U256 back to an amount.
pub fn to_amount(v: U256) -> Result<Amount, LedgerError> {
    u128::try_from(v).map_err(|_| LedgerError::Overflow)
}

/// `a * b / denominator`, rounded down.
///
/// `what` names the quantity being computed so a zero divisor can be traced.
pub fn mul_div(a: Amount, b: Amount, denominator: Amount, what: &'static str) -> Result<Amount, LedgerError> {
    let quotient = mul_div_wide(U256::from(a), U256::from(b), U256::from(denominator), what)?;
    to_amount(quotient)
}

/// `a * b / denominator` over U256 operands, rounded down.
pub fn mul_div_wide(a: U256, b: U256, denominator: U256, what: &'static str) -> Result<U256, LedgerError> {
    if denominator.is_zero() {
        return Err(LedgerError::ZeroDivisor(what));
    }
    let product = widen(a).checked_mul(widen(b)).ok_or(LedgerError::Overflow)?;
    let quotient = product
        .checked_div(widen(denominator))
        .ok_or(LedgerError::ZeroDivisor(what))?;
    narrow(quotient).ok_or(LedgerError::Overflow)
}

/// Serde for U256 fields as decimal strings.
pub mod u256_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::U256;

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(raw.trim())
            .map_err(|e| D::Error::custom(format!("invalid U256 '{}': {}", raw, e)))
    }
}

/// Checked arithmetic that reports failures as ledger errors.
pub trait SafeMath: Sized {
    fn safe_add(self, rhs: Self) -> Result<Self, LedgerError>;
    fn safe_sub(self, rhs: Self) -> Result<Self, LedgerError>;
    fn safe_mul(self, rhs: Self) -> Result<Self, LedgerError>;
}

macro_rules! checked_impl {
    ($t:ty) => {
        impl SafeMath for $t {
            #[inline(always)]
            fn safe_add(self, v: $t) -> Result<$t, LedgerError> {
                self.checked_add(v).ok_or(LedgerError::Overflow)
            }

            #[inline(always)]
            fn safe_sub(self, v: $t) -> Result<$t, LedgerError> {
                self.checked_sub(v).ok_or(LedgerError::Overflow)
            }

            #[inline(always)]
            fn safe_mul(self, v: $t) -> Result<$t, LedgerError> {
                self.checked_mul(v).ok_or(LedgerError::Overflow)
            }
        }
    };
}

checked_impl!(u64);
checked_impl!(u128);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_exact() {
        assert_eq!(mul_div(1_000, 2 * RATE_SCALE, RATE_SCALE, "t").unwrap(), 2_000);
    }

    #[test]
    fn test_mul_div_rounds_down() {
        assert_eq!(mul_div(10, 1, 3, "t").unwrap(), 3);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // u128::MAX * SHARE_SCALE overflows u128 but the quotient fits.
        let r = mul_div(u128::MAX, SHARE_SCALE, SHARE_SCALE, "t").unwrap();
        assert_eq!(r, u128::MAX);
    }

    #[test]
    fn test_mul_div_overflowing_quotient() {
        assert_eq!(mul_div(u128::MAX, 2, 1, "t"), Err(LedgerError::Overflow));
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert_eq!(mul_div(1, 1, 0, "rate"), Err(LedgerError::ZeroDivisor("rate")));
    }

    #[test]
    fn test_mul_div_wide_accumulator_product() {
        // A dust-stake accumulator times a large balance needs more than 256 bits
        // before the division brings it back.
        let acc = U256::from(u128::MAX) * U256::from(SHARE_SCALE);
        let weight = U256::from(u128::MAX);
        let accrued = mul_div_wide(weight, acc, U256::from(SHARE_SCALE), "t").unwrap();
        assert_eq!(accrued, U256::from(u128::MAX) * U256::from(u128::MAX));
        assert_eq!(to_amount(accrued), Err(LedgerError::Overflow));
        assert_eq!(to_amount(U256::from(7u64)).unwrap(), 7);
    }

    #[test]
    fn test_u256_serde_as_decimal_string() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Holder {
            #[serde(with = "u256_serde")]
            value: U256,
        }
        let holder = Holder {
            value: U256::from(u128::MAX) * U256::from(10u64),
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"value":"3402823669209384634633746074317682114550"}"#);
        assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), holder);
    }

    #[test]
    fn test_safe_math() {
        assert_eq!(5u128.safe_add(6).unwrap(), 11);
        assert_eq!(5u128.safe_sub(6), Err(LedgerError::Overflow));
        assert_eq!(u64::MAX.safe_mul(2), Err(LedgerError::Overflow));
    }
}
