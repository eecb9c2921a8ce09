// crates/valor-ledger/src/state.rs
//
// LedgerState: the single aggregate owning every engine and the payout
// outbox.
//
// Methods here compose the engines and queue payout intents but never talk
// to external collaborators. Each method leaves the aggregate unchanged when
// it returns an error: the fallible engine step runs first, and only
// infallible bookkeeping (outbox pushes, claim records) follows it.

use std::collections::{BTreeSet, VecDeque};

use valor_core::{AccountId, Amount, Hash32, LedgerError, PayoutIntent, TokenKind};
use valor_economics::{
    GlobalEmissionState, MerkleDistributor, RedemptionBatcher, RevenueReport, RewardAccumulator,
    RootInfo, VestingManager,
};

use crate::access::AccessControl;
use crate::config::LedgerConfig;

/// Where a payout should be delivered. `None` is the ledger's home chain.
pub type Destination = Option<u32>;

#[derive(Debug, Clone)]
pub struct LedgerState {
    pub accumulator: RewardAccumulator,
    pub vesting: VestingManager,
    pub batcher: RedemptionBatcher,
    pub distributor: MerkleDistributor,
    pub access: AccessControl,
    pub trusted_chains: BTreeSet<u32>,
    pub paused: bool,
    outbox: VecDeque<PayoutIntent>,
}

impl LedgerState {
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let emission = GlobalEmissionState::new(
            config.emission.rate_per_second,
            config.emission.cap,
            config.emission.start_timestamp,
        );
        Ok(Self {
            accumulator: RewardAccumulator::new(
                emission,
                config.staking.unstake_lock_secs,
                config.staking.record_counts_toward_emission,
            ),
            vesting: VestingManager::new(config.vesting.lock_secs, config.vesting.linear_secs),
            batcher: RedemptionBatcher::new(
                config.epoch_start(),
                config.redemption.batch_duration_secs,
            ),
            distributor: MerkleDistributor::new(config.distribution.activation_policy),
            access: AccessControl::from_grants(&config.access.grants)?,
            trusted_chains: config.peers.trusted_chains.iter().copied().collect(),
            paused: false,
            outbox: VecDeque::new(),
        })
    }

    fn queue_payout(
        &mut self,
        recipient: AccountId,
        token_kind: TokenKind,
        amount: Amount,
        destination: Destination,
        now: u64,
    ) {
        if amount == 0 {
            return;
        }
        let intent = PayoutIntent::new(recipient, token_kind, amount, destination, now);
        tracing::debug!(id = %intent.id, %recipient, %token_kind, amount, "Payout queued");
        self.outbox.push_back(intent);
    }

    /// Queued payout intents, oldest first.
    pub fn pending_payouts(&self) -> impl Iterator<Item = &PayoutIntent> {
        self.outbox.iter()
    }

    pub fn take_payouts(&mut self) -> Vec<PayoutIntent> {
        self.outbox.drain(..).collect()
    }

    /// Return undelivered intents to the front of the outbox, keeping order.
    pub fn requeue_payouts(&mut self, intents: Vec<PayoutIntent>) {
        for intent in intents.into_iter().rev() {
            self.outbox.push_front(intent);
        }
    }

    // -- Staking ------------------------------------------------------------

    pub fn stake(&mut self, user: &AccountId, kind: TokenKind, amount: Amount, now: u64) -> Result<(), LedgerError> {
        self.accumulator.stake(user, kind, amount, now)
    }

    pub fn request_unstake(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<u64, LedgerError> {
        self.accumulator.request_unstake(user, amount, now)
    }

    pub fn cancel_unstake(&mut self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        self.accumulator.cancel_unstake(user, now)
    }

    pub fn withdraw(&mut self, user: &AccountId, destination: Destination, now: u64) -> Result<Amount, LedgerError> {
        let amount = self.accumulator.withdraw(user, now)?;
        self.queue_payout(*user, TokenKind::Primary, amount, destination, now);
        Ok(amount)
    }

    // -- Vesting ------------------------------------------------------------

    pub fn convert_to_vesting(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<u64, LedgerError> {
        self.vesting.convert(&mut self.accumulator, user, amount, now)
    }

    pub fn claim_vesting(
        &mut self,
        user: &AccountId,
        request_id: u64,
        destination: Destination,
        now: u64,
    ) -> Result<Amount, LedgerError> {
        let amount = self.vesting.claim(user, request_id, now)?;
        self.queue_payout(*user, TokenKind::Primary, amount, destination, now);
        Ok(amount)
    }

    pub fn cancel_vesting(&mut self, user: &AccountId, request_id: u64, now: u64) -> Result<Amount, LedgerError> {
        self.vesting.cancel(&mut self.accumulator, user, request_id, now)
    }

    pub fn cancel_all_vesting(&mut self, user: &AccountId, now: u64) -> Result<Amount, LedgerError> {
        self.vesting.cancel_all(&mut self.accumulator, user, now)
    }

    // -- Redemption ---------------------------------------------------------

    pub fn redeem_valor(&mut self, user: &AccountId, amount: Amount, now: u64) -> Result<u64, LedgerError> {
        self.batcher.redeem(&mut self.accumulator, user, amount, now)
    }

    pub fn report_revenue(&mut self, amount: Amount, timestamp: u64, now: u64) -> Result<RevenueReport, LedgerError> {
        self.batcher
            .report_revenue(&mut self.accumulator, amount, timestamp, now)
    }

    pub fn claim_batch(
        &mut self,
        user: &AccountId,
        batch_id: u64,
        destination: Destination,
        now: u64,
    ) -> Result<Amount, LedgerError> {
        let owed = self.batcher.claim_batch(user, batch_id)?;
        self.queue_payout(*user, TokenKind::Stable, owed, destination, now);
        Ok(owed)
    }

    // -- Distributions ------------------------------------------------------

    pub fn create_distribution(
        &mut self,
        id: u64,
        token_kind: TokenKind,
        proposal: RootInfo,
        now: u64,
    ) -> Result<(), LedgerError> {
        self.distributor
            .create_distribution(id, token_kind, proposal, now)
    }

    pub fn propose_root(&mut self, id: u64, proposal: RootInfo, now: u64) -> Result<(), LedgerError> {
        self.distributor.propose_root(id, proposal, now)
    }

    pub fn activate_due_root(&mut self, id: u64, now: u64) -> Result<bool, LedgerError> {
        self.distributor.activate_due_root(id, now)
    }

    /// Claim from a distribution on behalf of `user`.
    ///
    /// Record-kind rewards are credited as record stake; transferable kinds
    /// are queued for payout.
    pub fn claim_distribution(
        &mut self,
        id: u64,
        user: &AccountId,
        cumulative_amount: Amount,
        proof: &[Hash32],
        destination: Destination,
        now: u64,
    ) -> Result<(TokenKind, Amount), LedgerError> {
        let prepared = self
            .distributor
            .prepare_claim(id, user, cumulative_amount, proof, now)?;
        let kind = prepared.token_kind;
        let claimable = prepared.claimable;

        if kind.is_transferable() {
            self.distributor.commit_claim(&prepared, now);
            self.queue_payout(*user, kind, claimable, destination, now);
        } else {
            if claimable > 0 {
                self.accumulator.credit_record(user, claimable, now)?;
            }
            self.distributor.commit_claim(&prepared, now);
        }
        Ok((kind, claimable))
    }

    // -- Emission management ------------------------------------------------

    pub fn set_emission_rate(&mut self, rate_per_second: Amount, now: u64) -> Result<(), LedgerError> {
        self.accumulator.set_emission_rate(rate_per_second, now)
    }

    pub fn set_emission_cap(&mut self, cap: Amount, now: u64) -> Result<(), LedgerError> {
        self.accumulator.set_emission_cap(cap, now)
    }

    pub fn set_emission_start(&mut self, start: u64, now: u64) -> Result<(), LedgerError> {
        self.accumulator.set_emission_start(start, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valor_core::MerkleTree;

    const T0: u64 = 1_700_000_000;

    fn user() -> AccountId {
        AccountId([1u8; 32])
    }

    fn state() -> LedgerState {
        let mut config = LedgerConfig::default();
        config.emission.start_timestamp = T0;
        LedgerState::from_config(&config).unwrap()
    }

    #[test]
    fn test_record_distribution_credits_stake() {
        let mut state = state();
        let tree = MerkleTree::from_entitlements(&[(user(), 80)]);
        let proposal = RootInfo {
            root: tree.root(),
            start_timestamp: T0,
            metadata: "records".into(),
        };
        state.create_distribution(3, TokenKind::Record, proposal, T0).unwrap();

        let (kind, amount) = state
            .claim_distribution(3, &user(), 80, &tree.proof(0).unwrap(), None, T0)
            .unwrap();
        assert_eq!((kind, amount), (TokenKind::Record, 80));
        assert_eq!(state.accumulator.account(&user()).unwrap().record_balance, 80);
        assert_eq!(state.pending_payouts().count(), 0);
    }

    #[test]
    fn test_transferable_distribution_queues_payout() {
        let mut state = state();
        let tree = MerkleTree::from_entitlements(&[(user(), 25)]);
        let proposal = RootInfo {
            root: tree.root(),
            start_timestamp: T0,
            metadata: String::new(),
        };
        state.create_distribution(4, TokenKind::Stable, proposal, T0).unwrap();
        state
            .claim_distribution(4, &user(), 25, &tree.proof(0).unwrap(), Some(10), T0)
            .unwrap();

        let payouts = state.take_payouts();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, 25);
        assert_eq!(payouts[0].token_kind, TokenKind::Stable);
        assert_eq!(payouts[0].destination_chain_id, Some(10));
    }

    #[test]
    fn test_requeue_preserves_order() {
        let mut state = state();
        state.queue_payout(user(), TokenKind::Primary, 1, None, T0);
        state.queue_payout(user(), TokenKind::Primary, 2, None, T0);
        state.queue_payout(user(), TokenKind::Primary, 3, None, T0);
        let mut taken = state.take_payouts();
        let tail = taken.split_off(1);
        state.requeue_payouts(tail);
        let amounts: Vec<Amount> = state.pending_payouts().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![2, 3]);
    }

    #[test]
    fn test_zero_payouts_are_not_queued() {
        let mut state = state();
        state.queue_payout(user(), TokenKind::Stable, 0, None, T0);
        assert_eq!(state.pending_payouts().count(), 0);
    }
}
