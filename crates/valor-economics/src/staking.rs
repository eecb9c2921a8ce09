// crates/valor-economics/src/staking.rs
//
// Per-user staking balances and reward-per-share debt.
//
// Every balance-changing operation follows the same shape:
//   1. settle the global accumulator up to `now`,
//   2. collect the user's pending Valor into `collected_valor`,
//   3. apply the balance change,
//   4. refresh `valor_debt = weight * acc_per_share / SHARE_SCALE`.
//
// Steps 1-4 run on copies of the global state and the user's account; the
// copies are written back only once every fallible step has succeeded, so a
// failed operation leaves the accumulator untouched.
//
// Only the primary token is staked from outside. Record balances are
// credited solely by distribution claims through `credit_record`.
//
// Unstaking is subject to a lock period. A user has at most one pending
// unstake request: repeated requests add to the locked amount and restart
// the timer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use valor_core::{AccountId, Amount, LedgerError, TokenKind};

use crate::emission::GlobalEmissionState;
use crate::math::{to_amount, u256_serde, SafeMath, U256};

/// Default unstake lock: 7 days.
pub const DEFAULT_UNSTAKE_LOCK_SECS: u64 = 7 * 24 * 60 * 60;

/// A pending unstake. Locked funds no longer earn emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub locked_amount: Amount,
    pub unlock_at: u64,
}

/// A user's position in the ledger.
///
/// Created lazily on first stake and never removed: a zeroed account still
/// carries the debt needed to settle correctly if the user returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Staked utility token.
    pub primary_balance: Amount,
    /// Staked record-kind reward balance.
    pub record_balance: Amount,
    /// Accrued Valor already accounted for at the last settlement.
    #[serde(with = "u256_serde")]
    pub valor_debt: U256,
    /// Valor collected and available for redemption.
    pub collected_valor: Amount,
    /// Pending unstake, if any.
    pub unstake: Option<UnstakeRequest>,
}

impl UserAccount {
    pub fn balance(&self, kind: TokenKind) -> Amount {
        match kind {
            TokenKind::Primary => self.primary_balance,
            TokenKind::Record => self.record_balance,
            TokenKind::Stable => 0,
        }
    }

    /// The amount of this account that earns emission.
    pub fn weight(&self, record_counts: bool) -> Result<Amount, LedgerError> {
        if record_counts {
            self.primary_balance.safe_add(self.record_balance)
        } else {
            Ok(self.primary_balance)
        }
    }
}

/// The reward accumulator: global emission state plus every user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardAccumulator {
    emission: GlobalEmissionState,
    accounts: HashMap<AccountId, UserAccount>,
    unstake_lock_period: u64,
    /// Whether record-kind balances earn emission alongside primary stake.
    record_counts: bool,
}

impl RewardAccumulator {
    pub fn new(emission: GlobalEmissionState, unstake_lock_period: u64, record_counts: bool) -> Self {
        Self {
            emission,
            accounts: HashMap::new(),
            unstake_lock_period,
            record_counts,
        }
    }

    /// Emission state as of the last committed settlement.
    pub fn emission(&self) -> &GlobalEmissionState {
        &self.emission
    }

    pub fn account(&self, user: &AccountId) -> Option<&UserAccount> {
        self.accounts.get(user)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &UserAccount)> {
        self.accounts.iter()
    }

    pub fn unstake_lock_period(&self) -> u64 {
        self.unstake_lock_period
    }

    pub fn record_counts(&self) -> bool {
        self.record_counts
    }

    /// Whether balances of `kind` contribute to `total_staked`.
    fn counts_toward_emission(&self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::Primary => true,
            TokenKind::Record => self.record_counts,
            TokenKind::Stable => false,
        }
    }

    /// Emission state settled up to `now`, without committing.
    pub fn emission_preview(&self, now: u64) -> Result<GlobalEmissionState, LedgerError> {
        self.emission.settled(now)
    }

    /// Install a previously computed settled state.
    ///
    /// `settled` must come from `emission_preview` on the current state, so
    /// that it is a pure time-advancement of what is committed.
    pub fn apply_emission(&mut self, settled: GlobalEmissionState) {
        self.emission = settled;
    }

    /// Settle the global accumulator up to `now`.
    pub fn settle(&mut self, now: u64) -> Result<Amount, LedgerError> {
        let mut next = self.emission.clone();
        let emitted = next.settle(now)?;
        self.emission = next;
        Ok(emitted)
    }

    /// Settled copies of the global state and `user`'s account with pending
    /// Valor collected.
    fn checkout(
        &self,
        user: &AccountId,
        now: u64,
    ) -> Result<(GlobalEmissionState, UserAccount), LedgerError> {
        let global = self.emission.settled(now)?;
        let mut account = self.accounts.get(user).cloned().unwrap_or_default();
        self.collect_into(&global, &mut account)?;
        Ok((global, account))
    }

    fn collect_into(
        &self,
        global: &GlobalEmissionState,
        account: &mut UserAccount,
    ) -> Result<(), LedgerError> {
        let accrued = global.accrued_for(account.weight(self.record_counts)?)?;
        let pending = to_amount(accrued.saturating_sub(account.valor_debt))?;
        if pending > 0 {
            account.collected_valor = account.collected_valor.safe_add(pending)?;
        }
        account.valor_debt = accrued;
        Ok(())
    }

    fn refresh_debt(
        &self,
        global: &GlobalEmissionState,
        account: &mut UserAccount,
    ) -> Result<(), LedgerError> {
        account.valor_debt = global.accrued_for(account.weight(self.record_counts)?)?;
        Ok(())
    }

    fn commit(&mut self, user: AccountId, global: GlobalEmissionState, account: UserAccount) {
        self.emission = global;
        self.accounts.insert(user, account);
    }

    /// Valor `user` could redeem right now: collected plus pending.
    pub fn redeemable_valor(&self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        let (_, account) = self.checkout(user, now)?;
        Ok(account.collected_valor)
    }

    /// Pending (not yet collected) Valor for `user` as of `now`.
    pub fn pending_valor(&self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        let global = self.emission.settled(now)?;
        match self.accounts.get(user) {
            Some(account) => {
                let accrued = global.accrued_for(account.weight(self.record_counts)?)?;
                to_amount(accrued.saturating_sub(account.valor_debt))
            }
            None => Ok(0),
        }
    }

    /// Settle and collect `user`'s pending Valor.
    pub fn collect_pending(&mut self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        let (global, account) = self.checkout(user, now)?;
        let collected = account.collected_valor;
        self.commit(*user, global, account);
        Ok(collected)
    }

    /// Stake `amount` of the primary token for `user`.
    ///
    /// Record balances cannot be deposited; they only arrive through
    /// `credit_record`.
    pub fn stake(
        &mut self,
        user: &AccountId,
        kind: TokenKind,
        amount: Amount,
        now: u64,
    ) -> Result<(), LedgerError> {
        if kind != TokenKind::Primary {
            return Err(LedgerError::UnsupportedTokenKind(kind));
        }
        self.deposit(user, kind, amount, now)
    }

    /// Credit record-kind rewards won in a distribution claim as record stake.
    pub fn credit_record(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<(), LedgerError> {
        self.deposit(user, TokenKind::Record, amount, now)
    }

    fn deposit(
        &mut self,
        user: &AccountId,
        kind: TokenKind,
        amount: Amount,
        now: u64,
    ) -> Result<(), LedgerError> {
        user.ensure_nonzero()?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let (mut global, mut account) = self.checkout(user, now)?;
        match kind {
            TokenKind::Primary => account.primary_balance = account.primary_balance.safe_add(amount)?,
            TokenKind::Record => account.record_balance = account.record_balance.safe_add(amount)?,
            TokenKind::Stable => return Err(LedgerError::UnsupportedTokenKind(kind)),
        }
        if self.counts_toward_emission(kind) {
            global.total_staked = global.total_staked.safe_add(amount)?;
        }
        self.refresh_debt(&global, &mut account)?;

        tracing::debug!(%user, %kind, amount, total_staked = global.total_staked, "Staked");
        self.commit(*user, global, account);
        Ok(())
    }

    /// Remove `amount` of record balance from `user`'s stake.
    ///
    /// Used when record rewards move into vesting.
    pub fn debit_record(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let (mut global, mut account) = self.checkout(user, now)?;
        if account.record_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: account.record_balance,
                requested: amount,
            });
        }
        account.record_balance -= amount;
        if self.counts_toward_emission(TokenKind::Record) {
            global.total_staked = global.total_staked.safe_sub(amount)?;
        }
        self.refresh_debt(&global, &mut account)?;
        self.commit(*user, global, account);
        Ok(())
    }

    /// Deduct `amount` of collected Valor from `user` after collecting pending.
    ///
    /// Used when Valor is redeemed into a batch.
    pub fn take_collected(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let (global, mut account) = self.checkout(user, now)?;
        if account.collected_valor < amount {
            return Err(LedgerError::InsufficientBalance {
                available: account.collected_valor,
                requested: amount,
            });
        }
        account.collected_valor -= amount;
        self.commit(*user, global, account);
        Ok(())
    }

    /// Lock `amount` of primary stake for withdrawal after the lock period.
    ///
    /// Repeated requests accumulate the locked amount and reset the unlock
    /// time to `now + unstake_lock_period`.
    pub fn request_unstake(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let (mut global, mut account) = self.checkout(user, now)?;
        if account.primary_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                available: account.primary_balance,
                requested: amount,
            });
        }
        let unlock_at = now.safe_add(self.unstake_lock_period)?;
        let locked_amount = match &account.unstake {
            Some(existing) => existing.locked_amount.safe_add(amount)?,
            None => amount,
        };

        account.primary_balance -= amount;
        global.total_staked = global.total_staked.safe_sub(amount)?;
        account.unstake = Some(UnstakeRequest {
            locked_amount,
            unlock_at,
        });
        self.refresh_debt(&global, &mut account)?;

        tracing::debug!(%user, amount, locked_amount, unlock_at, "Unstake requested");
        self.commit(*user, global, account);
        Ok(unlock_at)
    }

    /// Return the locked amount to primary stake and clear the request.
    pub fn cancel_unstake(&mut self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        let (mut global, mut account) = self.checkout(user, now)?;
        let request = account.unstake.take().ok_or(LedgerError::NoPendingRequest)?;

        account.primary_balance = account.primary_balance.safe_add(request.locked_amount)?;
        global.total_staked = global.total_staked.safe_add(request.locked_amount)?;
        self.refresh_debt(&global, &mut account)?;

        tracing::debug!(%user, restored = request.locked_amount, "Unstake cancelled");
        self.commit(*user, global, account);
        Ok(request.locked_amount)
    }

    /// Release the locked amount once the lock has elapsed.
    ///
    /// Locked funds do not earn, so no settlement is needed. Returns the
    /// amount owed to the user.
    pub fn withdraw(&mut self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        let account = self.accounts.get_mut(user).ok_or(LedgerError::NoPendingRequest)?;
        let request = account.unstake.as_ref().ok_or(LedgerError::NoPendingRequest)?;
        if request.unlock_at == 0 || now < request.unlock_at {
            return Err(LedgerError::LockNotElapsed {
                unlock_at: request.unlock_at,
                now,
            });
        }
        let amount = request.locked_amount;
        account.unstake = None;

        tracing::debug!(%user, amount, "Unstake withdrawn");
        Ok(amount)
    }

    /// Privileged: change the emission rate after settling at the old rate.
    pub fn set_emission_rate(&mut self, rate_per_second: Amount, now: u64) -> Result<(), LedgerError> {
        let mut next = self.emission.settled(now)?;
        next.set_rate(rate_per_second);
        self.emission = next;
        Ok(())
    }

    /// Privileged: change the emission cap after settling.
    pub fn set_emission_cap(&mut self, cap: Amount, now: u64) -> Result<(), LedgerError> {
        let mut next = self.emission.settled(now)?;
        next.set_cap(cap)?;
        self.emission = next;
        Ok(())
    }

    /// Privileged: move the emission start while emission has not begun.
    pub fn set_emission_start(&mut self, start: u64, now: u64) -> Result<(), LedgerError> {
        let mut next = self.emission.clone();
        next.set_start(start, now)?;
        self.emission = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SHARE_SCALE;

    const T0: u64 = 1_700_000_000;
    const ONE: Amount = 1_000_000_000_000_000_000;
    const DAY: u64 = 24 * 60 * 60;

    fn alice() -> AccountId {
        AccountId([1u8; 32])
    }

    fn bob() -> AccountId {
        AccountId([2u8; 32])
    }

    fn accumulator(rate: Amount) -> RewardAccumulator {
        RewardAccumulator::new(
            GlobalEmissionState::new(rate, Amount::MAX, T0),
            DEFAULT_UNSTAKE_LOCK_SECS,
            true,
        )
    }

    #[test]
    fn test_single_staker_collects_full_emission() {
        let rate = 2 * ONE;
        let stake = 40 * ONE;
        let mut acc = accumulator(rate);
        acc.stake(&alice(), TokenKind::Primary, stake, T0).unwrap();

        acc.settle(T0 + 100).unwrap();
        assert_eq!(
            acc.emission().acc_per_share_scaled,
            U256::from(rate * 100 * SHARE_SCALE / stake)
        );

        let collected = acc.collect_pending(&alice(), T0 + 100).unwrap();
        assert_eq!(collected, rate * 100);
    }

    #[test]
    fn test_stake_rejects_zero_and_stable() {
        let mut acc = accumulator(ONE);
        assert_eq!(
            acc.stake(&alice(), TokenKind::Primary, 0, T0),
            Err(LedgerError::ZeroAmount)
        );
        assert_eq!(
            acc.stake(&alice(), TokenKind::Stable, 5, T0),
            Err(LedgerError::UnsupportedTokenKind(TokenKind::Stable))
        );
        assert_eq!(
            acc.stake(&alice(), TokenKind::Record, 5, T0),
            Err(LedgerError::UnsupportedTokenKind(TokenKind::Record))
        );
        assert_eq!(
            acc.stake(&AccountId::ZERO, TokenKind::Primary, 5, T0),
            Err(LedgerError::ZeroAddress)
        );
        assert!(acc.account(&alice()).is_none());
    }

    #[test]
    fn test_two_stakers_split_proportionally() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, 3 * ONE, T0).unwrap();
        acc.stake(&bob(), TokenKind::Primary, ONE, T0).unwrap();

        assert_eq!(acc.pending_valor(&alice(), T0 + 40).unwrap(), 30 * ONE);
        assert_eq!(acc.pending_valor(&bob(), T0 + 40).unwrap(), 10 * ONE);
    }

    #[test]
    fn test_late_staker_does_not_earn_past_emission() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, ONE, T0).unwrap();
        acc.stake(&bob(), TokenKind::Primary, ONE, T0 + 10).unwrap();

        assert_eq!(acc.pending_valor(&bob(), T0 + 10).unwrap(), 0);
        assert_eq!(acc.pending_valor(&bob(), T0 + 20).unwrap(), 5 * ONE);
        assert_eq!(acc.pending_valor(&alice(), T0 + 20).unwrap(), 15 * ONE);
    }

    #[test]
    fn test_unstake_lock_resets_timer_and_accumulates() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, 100 * ONE, T0).unwrap();

        let first = acc.request_unstake(&alice(), 10 * ONE, T0).unwrap();
        assert_eq!(first, T0 + 7 * DAY);

        let second = acc.request_unstake(&alice(), 5 * ONE, T0 + DAY).unwrap();
        assert_eq!(second, T0 + DAY + 7 * DAY);

        let request = acc.account(&alice()).unwrap().unstake.clone().unwrap();
        assert_eq!(request.locked_amount, 15 * ONE);
        assert_eq!(request.unlock_at, T0 + 8 * DAY);
        assert_eq!(acc.emission().total_staked, 85 * ONE);
    }

    #[test]
    fn test_withdraw_before_unlock_fails() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, 10 * ONE, T0).unwrap();
        acc.request_unstake(&alice(), 10 * ONE, T0).unwrap();

        assert_eq!(
            acc.withdraw(&alice(), T0 + 7 * DAY - 1),
            Err(LedgerError::LockNotElapsed {
                unlock_at: T0 + 7 * DAY,
                now: T0 + 7 * DAY - 1,
            })
        );
        assert_eq!(acc.withdraw(&alice(), T0 + 7 * DAY).unwrap(), 10 * ONE);
        assert_eq!(acc.withdraw(&alice(), T0 + 8 * DAY), Err(LedgerError::NoPendingRequest));
    }

    #[test]
    fn test_cancel_unstake_restores_balance_and_debt() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, 50 * ONE, T0).unwrap();
        acc.request_unstake(&alice(), 25 * ONE, T0 + 10).unwrap();
        let restored = acc.cancel_unstake(&alice(), T0 + 20).unwrap();
        assert_eq!(restored, 25 * ONE);

        let account = acc.account(&alice()).unwrap();
        assert_eq!(account.primary_balance, 50 * ONE);
        assert!(account.unstake.is_none());
        assert_eq!(
            account.valor_debt,
            acc.emission().accrued_for(50 * ONE).unwrap()
        );
        // Sole staker throughout: every emitted unit is collected.
        assert_eq!(account.collected_valor, 20 * ONE);
    }

    #[test]
    fn test_cancel_without_request_fails() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, ONE, T0).unwrap();
        assert_eq!(acc.cancel_unstake(&alice(), T0 + 1), Err(LedgerError::NoPendingRequest));
    }

    #[test]
    fn test_failed_unstake_leaves_state_untouched() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, ONE, T0).unwrap();
        let before_global = acc.emission().clone();
        let before_account = acc.account(&alice()).cloned();

        assert!(acc.request_unstake(&alice(), 2 * ONE, T0 + 30).is_err());
        assert_eq!(acc.emission(), &before_global);
        assert_eq!(acc.account(&alice()).cloned(), before_account);
    }

    #[test]
    fn test_take_collected_includes_pending() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, ONE, T0).unwrap();
        assert_eq!(acc.redeemable_valor(&alice(), T0 + 10).unwrap(), 10 * ONE);
        acc.take_collected(&alice(), 4 * ONE, T0 + 10).unwrap();
        assert_eq!(acc.account(&alice()).unwrap().collected_valor, 6 * ONE);
        assert!(matches!(
            acc.take_collected(&alice(), 7 * ONE, T0 + 10),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_record_weight_excluded_when_configured() {
        let mut acc = RewardAccumulator::new(
            GlobalEmissionState::new(ONE, Amount::MAX, T0),
            DEFAULT_UNSTAKE_LOCK_SECS,
            false,
        );
        acc.credit_record(&alice(), 5 * ONE, T0).unwrap();
        assert_eq!(acc.emission().total_staked, 0);
        assert_eq!(acc.pending_valor(&alice(), T0 + 10).unwrap(), 0);
    }

    #[test]
    fn test_dust_stake_keeps_ledger_usable() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, 1, T0).unwrap();
        acc.settle(T0 + 400).unwrap();
        assert!(acc.emission().acc_per_share_scaled > U256::from(u128::MAX));

        acc.stake(&bob(), TokenKind::Primary, 1_000 * ONE, T0 + 400).unwrap();
        acc.request_unstake(&alice(), 1, T0 + 500).unwrap();
        // Alice's share of the second interval is below one base unit.
        assert_eq!(acc.account(&alice()).unwrap().collected_valor, 400 * ONE);
        let bob_pending = acc.pending_valor(&bob(), T0 + 600).unwrap();
        assert!(bob_pending <= 200 * ONE && bob_pending >= 200 * ONE - 1_000);
    }

    #[test]
    fn test_rate_change_settles_at_old_rate() {
        let mut acc = accumulator(ONE);
        acc.stake(&alice(), TokenKind::Primary, ONE, T0).unwrap();
        acc.set_emission_rate(3 * ONE, T0 + 10).unwrap();
        assert_eq!(acc.pending_valor(&alice(), T0 + 20).unwrap(), 10 * ONE + 30 * ONE);
    }
}
