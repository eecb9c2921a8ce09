// crates/valor-economics/src/redemption.rs
//
// Batched redemption of collected Valor into stable-asset claims.
//
// Time is cut into fixed windows starting at `epoch_start`:
//
//   batch_id = floor((now - epoch_start) / batch_duration)
//
// Valor redeemed during a window is pooled into that window's batch. After
// the window ends, the next revenue report fixes the batch's conversion rate
// (cumulative stable revenue per emitted Valor, scaled by RATE_SCALE). Once
// fixed, the rate never changes and users may claim
//
//   owed = redeemed * fixed_rate / RATE_SCALE
//
// Only the batch that ended most recently is fixed by a report. A batch
// whose successor window passes without any report stays unclaimable.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use valor_core::{AccountId, Amount, LedgerError};

use crate::math::{mul_div, SafeMath, RATE_SCALE};
use crate::staking::RewardAccumulator;

/// Default batch window: 14 days.
pub const DEFAULT_BATCH_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: u64,
    pub total_redeemed_valor: Amount,
    /// Stable units per Valor, scaled by `RATE_SCALE`. Set at most once.
    pub fixed_rate_scaled: Option<Amount>,
    pub claimable: bool,
    pub start_time: u64,
    pub end_time: u64,
    /// Valor whose stable value has already been claimed.
    pub claimed_valor: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueState {
    pub cumulative_stable_revenue: Amount,
    pub last_report_timestamp: u64,
    pub current_rate_scaled: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub batch_id: u64,
    pub amount: Amount,
}

/// Outcome of a revenue report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenueReport {
    pub rate_scaled: Amount,
    /// The batch this report fixed, if any.
    pub fixed_batch: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionBatcher {
    epoch_start: u64,
    batch_duration: u64,
    batches: BTreeMap<u64, Batch>,
    revenue: RevenueState,
    requests: HashMap<AccountId, Vec<RedemptionRequest>>,
}

impl RedemptionBatcher {
    pub fn new(epoch_start: u64, batch_duration: u64) -> Self {
        Self {
            epoch_start,
            batch_duration,
            batches: BTreeMap::new(),
            revenue: RevenueState::default(),
            requests: HashMap::new(),
        }
    }

    pub fn epoch_start(&self) -> u64 {
        self.epoch_start
    }

    pub fn batch_duration(&self) -> u64 {
        self.batch_duration
    }

    pub fn revenue(&self) -> &RevenueState {
        &self.revenue
    }

    pub fn batch(&self, id: u64) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub fn requests(&self, user: &AccountId) -> &[RedemptionRequest] {
        self.requests.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current_batch_id(&self, now: u64) -> Result<u64, LedgerError> {
        if now < self.epoch_start {
            return Err(LedgerError::BatchWindowNotOpen {
                epoch_start: self.epoch_start,
                now,
            });
        }
        if self.batch_duration == 0 {
            return Err(LedgerError::ZeroDivisor("batch_id"));
        }
        Ok((now - self.epoch_start) / self.batch_duration)
    }

    fn window(&self, id: u64) -> Result<(u64, u64), LedgerError> {
        let start = id
            .safe_mul(self.batch_duration)?
            .safe_add(self.epoch_start)?;
        let end = start.safe_add(self.batch_duration)?;
        Ok((start, end))
    }

    fn empty_batch(&self, id: u64) -> Result<Batch, LedgerError> {
        let (start_time, end_time) = self.window(id)?;
        Ok(Batch {
            id,
            total_redeemed_valor: 0,
            fixed_rate_scaled: None,
            claimable: false,
            start_time,
            end_time,
            claimed_valor: 0,
        })
    }

    /// Redeem `amount` of `user`'s collected Valor into the current batch.
    /// Returns the batch id.
    pub fn redeem(
        &mut self,
        accumulator: &mut RewardAccumulator,
        user: &AccountId,
        amount: Amount,
        now: u64,
    ) -> Result<u64, LedgerError> {
        user.ensure_nonzero()?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let batch_id = self.current_batch_id(now)?;

        let mut batch = match self.batches.get(&batch_id) {
            Some(b) => b.clone(),
            None => self.empty_batch(batch_id)?,
        };
        batch.total_redeemed_valor = batch.total_redeemed_valor.safe_add(amount)?;
        let mut list = self.requests.get(user).cloned().unwrap_or_default();
        match list.iter_mut().find(|r| r.batch_id == batch_id) {
            Some(existing) => existing.amount = existing.amount.safe_add(amount)?,
            None => list.push(RedemptionRequest { batch_id, amount }),
        }

        accumulator.take_collected(user, amount, now)?;

        self.batches.insert(batch_id, batch);
        self.requests.insert(*user, list);
        tracing::debug!(%user, batch_id, amount, "Valor redeemed");
        Ok(batch_id)
    }

    /// Record `amount` of stable revenue reported for `timestamp`, update the
    /// conversion rate, and fix the most recently ended batch if it is still
    /// open for pricing.
    ///
    /// The rate is computed against total Valor emitted as of `now`; the
    /// emission settlement is committed together with the report.
    pub fn report_revenue(
        &mut self,
        accumulator: &mut RewardAccumulator,
        amount: Amount,
        timestamp: u64,
        now: u64,
    ) -> Result<RevenueReport, LedgerError> {
        if timestamp <= self.revenue.last_report_timestamp {
            return Err(LedgerError::StaleRevenueReport {
                last: self.revenue.last_report_timestamp,
                timestamp,
            });
        }
        if timestamp > now {
            return Err(LedgerError::FutureTimestamp { timestamp, now });
        }

        let settled = accumulator.emission_preview(now)?;
        let cumulative = self.revenue.cumulative_stable_revenue.safe_add(amount)?;
        let rate_scaled = mul_div(cumulative, RATE_SCALE, settled.total_emitted, "revenue_rate")?;

        let mut fixed = None;
        if let Ok(current) = self.current_batch_id(now) {
            if let Some(target) = current.checked_sub(1) {
                let mut batch = match self.batches.get(&target) {
                    Some(b) => b.clone(),
                    None => self.empty_batch(target)?,
                };
                if batch.fixed_rate_scaled.is_none() && batch.end_time <= now {
                    batch.fixed_rate_scaled = Some(rate_scaled);
                    batch.claimable = true;
                    fixed = Some(batch);
                }
            }
        }

        accumulator.apply_emission(settled);
        self.revenue = RevenueState {
            cumulative_stable_revenue: cumulative,
            last_report_timestamp: timestamp,
            current_rate_scaled: rate_scaled,
        };
        let fixed_batch = fixed.map(|batch| {
            let id = batch.id;
            tracing::info!(batch_id = id, rate_scaled, redeemed = batch.total_redeemed_valor, "Batch rate fixed");
            self.batches.insert(id, batch);
            id
        });

        tracing::debug!(amount, timestamp, cumulative, rate_scaled, "Revenue reported");
        Ok(RevenueReport {
            rate_scaled,
            fixed_batch,
        })
    }

    /// Claim `user`'s stable entitlement from batch `batch_id`.
    ///
    /// The user's request for the batch is consumed, so a repeat claim owes 0.
    pub fn claim_batch(&mut self, user: &AccountId, batch_id: u64) -> Result<Amount, LedgerError> {
        let batch = self
            .batches
            .get(&batch_id)
            .filter(|b| b.claimable)
            .ok_or(LedgerError::BatchNotClaimable(batch_id))?;
        let rate = batch
            .fixed_rate_scaled
            .ok_or(LedgerError::BatchNotClaimable(batch_id))?;

        let Some(pos) = self
            .requests(user)
            .iter()
            .position(|r| r.batch_id == batch_id)
        else {
            return Ok(0);
        };
        let redeemed = self.requests(user)[pos].amount;
        let owed = mul_div(redeemed, rate, RATE_SCALE, "batch_claim")?;
        let claimed_valor = batch.claimed_valor.safe_add(redeemed)?;

        if let Some(list) = self.requests.get_mut(user) {
            list.remove(pos);
            if list.is_empty() {
                self.requests.remove(user);
            }
        }
        if let Some(batch) = self.batches.get_mut(&batch_id) {
            batch.claimed_valor = claimed_valor;
        }

        tracing::debug!(%user, batch_id, redeemed, owed, "Batch claimed");
        Ok(owed)
    }
}
