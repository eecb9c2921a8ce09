// crates/valor-economics/src/vesting.rs
//
// Conversion of record-kind rewards into time-locked primary tokens.
//
// A vesting request unlocks nothing for `lock_period` seconds after it is
// created, then vests linearly over `linear_period` seconds:
//
//   unlock_start = created_at + lock_period
//   vested       = amount * min(1, (now - unlock_start) / linear_period)
//   claimable    = vested - claimed_amount
//
// Cancelling a request returns the unclaimed remainder to the user's primary
// stake rather than paying it out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use valor_core::{AccountId, Amount, LedgerError, TokenKind};

use crate::math::{mul_div, SafeMath};
use crate::staking::RewardAccumulator;

/// Default lock before vesting begins: 15 minutes.
pub const DEFAULT_VESTING_LOCK_SECS: u64 = 15 * 60;
/// Default linear vesting period: 75 minutes.
pub const DEFAULT_VESTING_LINEAR_SECS: u64 = 75 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingRequest {
    pub id: u64,
    pub amount: Amount,
    pub created_at: u64,
    pub claimed_amount: Amount,
}

impl VestingRequest {
    /// Amount vested as of `now` under the given schedule.
    pub fn vested(&self, lock_period: u64, linear_period: u64, now: u64) -> Result<Amount, LedgerError> {
        let unlock_start = self.created_at.safe_add(lock_period)?;
        if now < unlock_start {
            return Ok(0);
        }
        let elapsed = now - unlock_start;
        if linear_period == 0 || elapsed >= linear_period {
            return Ok(self.amount);
        }
        mul_div(self.amount, elapsed as Amount, linear_period as Amount, "vested")
    }

    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.claimed_amount)
    }
}

/// Per-user vesting requests and the schedule they follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingManager {
    lock_period: u64,
    linear_period: u64,
    next_id: u64,
    requests: HashMap<AccountId, Vec<VestingRequest>>,
}

impl VestingManager {
    pub fn new(lock_period: u64, linear_period: u64) -> Self {
        Self {
            lock_period,
            linear_period,
            next_id: 0,
            requests: HashMap::new(),
        }
    }

    pub fn lock_period(&self) -> u64 {
        self.lock_period
    }

    pub fn linear_period(&self) -> u64 {
        self.linear_period
    }

    pub fn requests(&self, user: &AccountId) -> &[VestingRequest] {
        self.requests.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    fn find(&self, user: &AccountId, id: u64) -> Result<&VestingRequest, LedgerError> {
        self.requests(user)
            .iter()
            .find(|r| r.id == id)
            .ok_or(LedgerError::VestingRequestNotFound(id))
    }

    /// Amount `user` could claim from request `id` at `now`.
    pub fn claimable(&self, user: &AccountId, id: u64, now: u64) -> Result<Amount, LedgerError> {
        let request = self.find(user, id)?;
        let vested = request.vested(self.lock_period, self.linear_period, now)?;
        Ok(vested.saturating_sub(request.claimed_amount))
    }

    /// Move `amount` of `user`'s record balance into a new vesting request.
    pub fn convert(
        &mut self,
        accumulator: &mut RewardAccumulator,
        user: &AccountId,
        amount: Amount,
        now: u64,
    ) -> Result<u64, LedgerError> {
        user.ensure_nonzero()?;
        let id = self.next_id;
        let next_id = id.safe_add(1)?;
        accumulator.debit_record(user, amount, now)?;

        self.next_id = next_id;
        self.requests.entry(*user).or_default().push(VestingRequest {
            id,
            amount,
            created_at: now,
            claimed_amount: 0,
        });
        tracing::debug!(%user, id, amount, "Converted record balance to vesting");
        Ok(id)
    }

    /// Claim whatever has vested on request `id`. Returns the amount owed,
    /// which is zero while the request is still locked.
    pub fn claim(&mut self, user: &AccountId, id: u64, now: u64) -> Result<Amount, LedgerError> {
        let claimable = self.claimable(user, id, now)?;
        if claimable == 0 {
            return Ok(0);
        }

        let list = self
            .requests
            .get_mut(user)
            .ok_or(LedgerError::VestingRequestNotFound(id))?;
        let pos = list
            .iter()
            .position(|r| r.id == id)
            .ok_or(LedgerError::VestingRequestNotFound(id))?;
        list[pos].claimed_amount += claimable;
        if list[pos].remaining() == 0 {
            list.remove(pos);
            tracing::debug!(%user, id, "Vesting request fully claimed");
        }
        if list.is_empty() {
            self.requests.remove(user);
        }

        tracing::debug!(%user, id, claimable, "Vesting claimed");
        Ok(claimable)
    }

    /// Cancel request `id`, re-staking its unclaimed remainder as primary.
    pub fn cancel(
        &mut self,
        accumulator: &mut RewardAccumulator,
        user: &AccountId,
        id: u64,
        now: u64,
    ) -> Result<Amount, LedgerError> {
        let remaining = self.find(user, id)?.remaining();
        if remaining > 0 {
            accumulator.stake(user, TokenKind::Primary, remaining, now)?;
        }

        if let Some(list) = self.requests.get_mut(user) {
            list.retain(|r| r.id != id);
            if list.is_empty() {
                self.requests.remove(user);
            }
        }
        tracing::debug!(%user, id, restaked = remaining, "Vesting cancelled");
        Ok(remaining)
    }

    /// Cancel every request of `user`. Returns the total re-staked; zero when
    /// there was nothing to cancel.
    pub fn cancel_all(
        &mut self,
        accumulator: &mut RewardAccumulator,
        user: &AccountId,
        now: u64,
    ) -> Result<Amount, LedgerError> {
        let total = self
            .requests(user)
            .iter()
            .try_fold(0 as Amount, |acc, r| acc.safe_add(r.remaining()))?;
        if total > 0 {
            accumulator.stake(user, TokenKind::Primary, total, now)?;
        }
        let cancelled = self.requests.remove(user).map(|l| l.len()).unwrap_or(0);
        if cancelled > 0 {
            tracing::debug!(%user, cancelled, restaked = total, "All vesting cancelled");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission::GlobalEmissionState;
    use crate::staking::DEFAULT_UNSTAKE_LOCK_SECS;

    const T0: u64 = 1_700_000_000;
    const MIN: u64 = 60;

    fn user() -> AccountId {
        AccountId([7u8; 32])
    }

    fn setup(record: Amount) -> (VestingManager, RewardAccumulator) {
        let mut acc = RewardAccumulator::new(
            GlobalEmissionState::new(0, Amount::MAX, T0),
            DEFAULT_UNSTAKE_LOCK_SECS,
            true,
        );
        acc.credit_record(&user(), record, T0).unwrap();
        (
            VestingManager::new(DEFAULT_VESTING_LOCK_SECS, DEFAULT_VESTING_LINEAR_SECS),
            acc,
        )
    }

    #[test]
    fn test_vesting_schedule_15m_lock_75m_linear() {
        let (mut vesting, mut acc) = setup(100);
        let id = vesting.convert(&mut acc, &user(), 100, T0).unwrap();
        assert_eq!(acc.account(&user()).unwrap().record_balance, 0);

        assert_eq!(vesting.claim(&user(), id, T0 + 10 * MIN).unwrap(), 0);

        // 37.5 minutes into the linear period.
        let half = T0 + 15 * MIN + 2_250;
        assert_eq!(vesting.claim(&user(), id, half).unwrap(), 50);

        assert_eq!(vesting.claim(&user(), id, T0 + 15 * MIN + 75 * MIN).unwrap(), 50);
        assert!(vesting.requests(&user()).is_empty());
        assert_eq!(
            vesting.claim(&user(), id, T0 + 200 * MIN),
            Err(LedgerError::VestingRequestNotFound(id))
        );
    }

    #[test]
    fn test_convert_requires_record_balance() {
        let (mut vesting, mut acc) = setup(10);
        assert!(matches!(
            vesting.convert(&mut acc, &user(), 11, T0),
            Err(LedgerError::InsufficientBalance { available: 10, requested: 11 })
        ));
        assert!(vesting.requests(&user()).is_empty());
    }

    #[test]
    fn test_cancel_restakes_remainder_as_primary() {
        let (mut vesting, mut acc) = setup(100);
        let id = vesting.convert(&mut acc, &user(), 100, T0).unwrap();
        vesting.claim(&user(), id, T0 + 15 * MIN + 2_250).unwrap();

        let restaked = vesting.cancel(&mut acc, &user(), id, T0 + 60 * MIN).unwrap();
        assert_eq!(restaked, 50);
        assert_eq!(acc.account(&user()).unwrap().primary_balance, 50);
        assert!(vesting.requests(&user()).is_empty());
    }

    #[test]
    fn test_cancel_all_sums_requests() {
        let (mut vesting, mut acc) = setup(100);
        vesting.convert(&mut acc, &user(), 30, T0).unwrap();
        vesting.convert(&mut acc, &user(), 70, T0 + 1).unwrap();

        assert_eq!(vesting.cancel_all(&mut acc, &user(), T0 + 2).unwrap(), 100);
        assert_eq!(acc.account(&user()).unwrap().primary_balance, 100);
        assert_eq!(vesting.cancel_all(&mut acc, &user(), T0 + 3).unwrap(), 0);
    }

    #[test]
    fn test_ids_are_unique_across_users() {
        let (mut vesting, mut acc) = setup(10);
        let other = AccountId([8u8; 32]);
        acc.credit_record(&other, 10, T0).unwrap();
        let a = vesting.convert(&mut acc, &user(), 5, T0).unwrap();
        let b = vesting.convert(&mut acc, &other, 5, T0).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            vesting.claimable(&user(), b, T0),
            Err(LedgerError::VestingRequestNotFound(b))
        );
    }
}
