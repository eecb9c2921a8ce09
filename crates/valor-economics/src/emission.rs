// crates/valor-economics/src/emission.rs
//
// Continuous Valor emission and the reward-per-share accumulator.
//
// Valor is emitted at a constant `rate_per_second` from
// `emission_start_timestamp` until `total_emitted` reaches `emission_cap`.
// Each settlement spreads the emission since the last update over the
// currently staked weight:
//
//   emission          = min(rate * dt, cap - total_emitted)
//   acc_per_share    += emission * SHARE_SCALE / total_staked
//
// `acc_per_share` is a U256 so a dust `total_staked` cannot overflow it.
//
// Emission that occurs while nothing is staked cannot be attributed to any
// staker; it is counted in `total_emitted` and tracked separately as
// `unallocated_emission` so conservation can be audited.

use serde::{Deserialize, Serialize};

use valor_core::{Amount, LedgerError};

use crate::math::{mul_div_wide, u256_serde, SafeMath, SHARE_SCALE, U256};

/// Global emission and share-accumulator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEmissionState {
    /// Total weight currently earning emission.
    pub total_staked: Amount,
    /// Accumulated Valor per unit of staked weight, scaled by `SHARE_SCALE`.
    #[serde(with = "u256_serde")]
    pub acc_per_share_scaled: U256,
    /// Timestamp of the last settlement.
    pub last_update_timestamp: u64,
    /// Valor base units emitted per second.
    pub rate_per_second: Amount,
    /// Hard ceiling on `total_emitted`.
    pub emission_cap: Amount,
    /// Valor emitted so far, attributed or not.
    pub total_emitted: Amount,
    /// Emission does not accrue before this instant.
    pub emission_start_timestamp: u64,
    /// Emission that occurred while `total_staked` was zero.
    pub unallocated_emission: Amount,
}

impl GlobalEmissionState {
    /// Create an emission schedule that begins at `start_timestamp`.
    pub fn new(rate_per_second: Amount, emission_cap: Amount, start_timestamp: u64) -> Self {
        Self {
            total_staked: 0,
            acc_per_share_scaled: U256::zero(),
            last_update_timestamp: start_timestamp,
            rate_per_second,
            emission_cap,
            total_emitted: 0,
            emission_start_timestamp: start_timestamp,
            unallocated_emission: 0,
        }
    }

    /// Whether emission has begun as of `now`.
    pub fn has_started(&self, now: u64) -> bool {
        now >= self.emission_start_timestamp
    }

    /// Valor still available under the cap.
    pub fn remaining(&self) -> Amount {
        self.emission_cap.saturating_sub(self.total_emitted)
    }

    /// Return a copy of this state settled up to `now`, leaving `self` untouched.
    pub fn settled(&self, now: u64) -> Result<Self, LedgerError> {
        let mut next = self.clone();
        next.settle(now)?;
        Ok(next)
    }

    /// Advance the accumulator to `now`.
    ///
    /// A no-op when `now` is not past the later of the last update and the
    /// emission start, so calling it twice in the same instant changes
    /// nothing. Returns the Valor emitted by this settlement.
    pub fn settle(&mut self, now: u64) -> Result<Amount, LedgerError> {
        let from = self.last_update_timestamp.max(self.emission_start_timestamp);
        if now <= from {
            return Ok(0);
        }
        let dt = (now - from) as Amount;

        let remaining = self
            .emission_cap
            .checked_sub(self.total_emitted)
            .ok_or(LedgerError::EmissionCapExceeded {
                cap: self.emission_cap,
                emitted: self.total_emitted,
            })?;
        let emission = self.rate_per_second.saturating_mul(dt).min(remaining);

        if self.total_staked > 0 {
            let delta = mul_div_wide(
                U256::from(emission),
                U256::from(SHARE_SCALE),
                U256::from(self.total_staked),
                "acc_per_share",
            )?;
            self.acc_per_share_scaled = self
                .acc_per_share_scaled
                .checked_add(delta)
                .ok_or(LedgerError::Overflow)?;
        } else {
            self.unallocated_emission = self.unallocated_emission.safe_add(emission)?;
        }
        self.total_emitted = self.total_emitted.safe_add(emission)?;
        self.last_update_timestamp = now;

        tracing::trace!(
            emission,
            dt = dt as u64,
            total_emitted = self.total_emitted,
            acc_per_share = %self.acc_per_share_scaled,
            "Emission settled"
        );

        Ok(emission)
    }

    /// Valor accrued by `weight` at the current accumulator value.
    ///
    /// Unbounded over the life of the ledger, so kept wide; only the
    /// difference against a user's debt is narrowed to an amount.
    pub fn accrued_for(&self, weight: Amount) -> Result<U256, LedgerError> {
        mul_div_wide(
            U256::from(weight),
            self.acc_per_share_scaled,
            U256::from(SHARE_SCALE),
            "accrued",
        )
    }

    /// Change the per-second rate. The caller must settle first so elapsed
    /// time accrues at the old rate.
    pub fn set_rate(&mut self, rate_per_second: Amount) {
        self.rate_per_second = rate_per_second;
    }

    /// Change the cap. It may never drop below what has already been emitted.
    pub fn set_cap(&mut self, emission_cap: Amount) -> Result<(), LedgerError> {
        if emission_cap < self.total_emitted {
            return Err(LedgerError::EmissionCapExceeded {
                cap: emission_cap,
                emitted: self.total_emitted,
            });
        }
        self.emission_cap = emission_cap;
        Ok(())
    }

    /// Move the emission start. Only allowed while emission has not begun,
    /// and never into the past.
    pub fn set_start(&mut self, start_timestamp: u64, now: u64) -> Result<(), LedgerError> {
        if self.has_started(now) {
            return Err(LedgerError::EmissionAlreadyStarted);
        }
        if start_timestamp < now {
            return Err(LedgerError::StartInPast {
                start_timestamp,
                now,
            });
        }
        self.emission_start_timestamp = start_timestamp;
        self.last_update_timestamp = start_timestamp;
        Ok(())
    }
}
