// crates/valor-ledger/src/facade.rs
//
// LedgerFacade: the only entry point into the ledger.
//
// Every operation runs as one atomic unit under an exclusive lock on the
// aggregate, in three phases:
//   1. check pause / permissions, validate and commit the mutation,
//   2. collect the payout intents the mutation queued,
//   3. hand them to the transport.
// Phase 3 runs after the mutation is committed but while the call is still
// in flight; a transport that calls back into the facade from the same
// thread is rejected with `Reentrant` instead of deadlocking. Intents the
// transport refuses stay queued for `flush_payouts`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use valor_core::{
    AccountId, Amount, Clock, Envelope, Hash32, LedgerError, PayoutIntent, PayoutTransport,
    PeerPayload, Permission, TokenKind,
};
use valor_economics::{
    Batch, Distribution, GlobalEmissionState, RedemptionRequest, RevenueReport, RevenueState,
    RootInfo, UserAccount, VestingRequest,
};

use crate::config::LedgerConfig;
use crate::state::LedgerState;

/// Result of an envelope delivered through `receive_from_peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    Staked(Amount),
    UnstakeRequested { unlock_at: u64 },
    UnstakeCancelled(Amount),
    Withdrawn(Amount),
    VestingCreated { request_id: u64 },
    VestingClaimed(Amount),
    VestingCancelled(Amount),
    Redeemed { batch_id: u64 },
    BatchClaimed(Amount),
    RewardClaimed { token_kind: TokenKind, amount: Amount },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the current thread as holding the ledger for the guard's lifetime.
struct InFlight<'a> {
    holder: &'a Mutex<Option<ThreadId>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *lock(self.holder) = None;
    }
}

pub struct LedgerFacade {
    state: Mutex<LedgerState>,
    holder: Mutex<Option<ThreadId>>,
    transport: Arc<dyn PayoutTransport>,
    clock: Arc<dyn Clock>,
}

impl LedgerFacade {
    pub fn new(state: LedgerState, transport: Arc<dyn PayoutTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(state),
            holder: Mutex::new(None),
            transport,
            clock,
        }
    }

    pub fn from_config(
        config: &LedgerConfig,
        transport: Arc<dyn PayoutTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        Ok(Self::new(LedgerState::from_config(config)?, transport, clock))
    }

    fn ensure_not_reentrant(&self) -> Result<(), LedgerError> {
        if *lock(&self.holder) == Some(thread::current().id()) {
            return Err(LedgerError::Reentrant);
        }
        Ok(())
    }

    /// Run a read-only closure against the aggregate.
    fn read<T>(&self, f: impl FnOnce(&LedgerState, u64) -> T) -> Result<T, LedgerError> {
        self.ensure_not_reentrant()?;
        let state = lock(&self.state);
        Ok(f(&*state, self.clock.now()))
    }

    /// Run a mutation, then hand any queued payouts to the transport.
    ///
    /// `pausable` operations fail with `Paused` while the pause switch is on.
    fn execute<T>(
        &self,
        op: &'static str,
        pausable: bool,
        f: impl FnOnce(&mut LedgerState, u64) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        self.ensure_not_reentrant()?;
        let mut state = lock(&self.state);
        *lock(&self.holder) = Some(thread::current().id());
        let _in_flight = InFlight { holder: &self.holder };

        let now = self.clock.now();
        if pausable && state.paused {
            tracing::debug!(op, "Rejected while paused");
            return Err(LedgerError::Paused);
        }

        match f(&mut *state, now) {
            Ok(value) => {
                tracing::info!(op, now, "Ledger operation committed");
                self.dispatch(&mut *state);
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(op, error = %e, category = ?e.category(), "Ledger operation rejected");
                Err(e)
            }
        }
    }

    /// Deliver queued intents in order, stopping at the first refusal.
    fn dispatch(&self, state: &mut LedgerState) -> usize {
        let mut intents = state.take_payouts().into_iter();
        let mut delivered = 0;
        while let Some(intent) = intents.next() {
            match self.transport.dispatch(&intent) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(id = %intent.id, error = %e, "Payout hand-off failed; kept queued");
                    let mut remaining = vec![intent];
                    remaining.extend(intents.by_ref());
                    state.requeue_payouts(remaining);
                    break;
                }
            }
        }
        delivered
    }

    // -- Staking ------------------------------------------------------------

    /// Only `TokenKind::Primary` can be staked; record balances come from
    /// distribution claims.
    pub fn stake(&self, user: &AccountId, kind: TokenKind, amount: Amount) -> Result<(), LedgerError> {
        self.execute("stake", true, |s, now| s.stake(user, kind, amount, now))
    }

    /// Returns the new unlock time.
    pub fn request_unstake(&self, user: &AccountId, amount: Amount) -> Result<u64, LedgerError> {
        self.execute("request_unstake", true, |s, now| s.request_unstake(user, amount, now))
    }

    pub fn cancel_unstake(&self, user: &AccountId) -> Result<Amount, LedgerError> {
        self.execute("cancel_unstake", true, |s, now| s.cancel_unstake(user, now))
    }

    pub fn withdraw(&self, user: &AccountId) -> Result<Amount, LedgerError> {
        self.execute("withdraw", true, |s, now| s.withdraw(user, None, now))
    }

    // -- Vesting ------------------------------------------------------------

    /// Returns the new vesting request id.
    pub fn convert_to_vesting(&self, user: &AccountId, amount: Amount) -> Result<u64, LedgerError> {
        self.execute("convert_to_vesting", true, |s, now| s.convert_to_vesting(user, amount, now))
    }

    pub fn claim_vesting(&self, user: &AccountId, request_id: u64) -> Result<Amount, LedgerError> {
        self.execute("claim_vesting", true, |s, now| s.claim_vesting(user, request_id, None, now))
    }

    pub fn cancel_vesting(&self, user: &AccountId, request_id: u64) -> Result<Amount, LedgerError> {
        self.execute("cancel_vesting", true, |s, now| s.cancel_vesting(user, request_id, now))
    }

    pub fn cancel_all_vesting(&self, user: &AccountId) -> Result<Amount, LedgerError> {
        self.execute("cancel_all_vesting", true, |s, now| s.cancel_all_vesting(user, now))
    }

    // -- Redemption ---------------------------------------------------------

    /// Returns the batch the Valor was pooled into.
    pub fn redeem_valor(&self, user: &AccountId, amount: Amount) -> Result<u64, LedgerError> {
        self.execute("redeem_valor", true, |s, now| s.redeem_valor(user, amount, now))
    }

    pub fn report_daily_revenue(
        &self,
        caller: &AccountId,
        amount: Amount,
        timestamp: u64,
    ) -> Result<RevenueReport, LedgerError> {
        self.execute("report_daily_revenue", true, |s, now| {
            s.access.require(caller, Permission::RevenueUpdater)?;
            s.report_revenue(amount, timestamp, now)
        })
    }

    /// Returns the stable amount owed.
    pub fn claim_batch(&self, user: &AccountId, batch_id: u64) -> Result<Amount, LedgerError> {
        self.execute("claim_batch", true, |s, now| s.claim_batch(user, batch_id, None, now))
    }

    // -- Distributions ------------------------------------------------------

    pub fn create_distribution(
        &self,
        caller: &AccountId,
        id: u64,
        token_kind: TokenKind,
        root: Hash32,
        start_timestamp: u64,
        metadata: &str,
    ) -> Result<(), LedgerError> {
        self.execute("create_distribution", true, |s, now| {
            s.access.require(caller, Permission::RootUpdater)?;
            let proposal = RootInfo {
                root,
                start_timestamp,
                metadata: metadata.to_string(),
            };
            s.create_distribution(id, token_kind, proposal, now)
        })
    }

    pub fn propose_root(
        &self,
        caller: &AccountId,
        id: u64,
        root: Hash32,
        start_timestamp: u64,
        metadata: &str,
    ) -> Result<(), LedgerError> {
        self.execute("propose_root", true, |s, now| {
            s.access.require(caller, Permission::RootUpdater)?;
            let proposal = RootInfo {
                root,
                start_timestamp,
                metadata: metadata.to_string(),
            };
            s.propose_root(id, proposal, now)
        })
    }

    /// Promote a due proposed root. Open to any caller.
    pub fn activate_due_root(&self, id: u64) -> Result<bool, LedgerError> {
        self.execute("activate_due_root", true, |s, now| s.activate_due_root(id, now))
    }

    pub fn claim_distribution(
        &self,
        id: u64,
        user: &AccountId,
        cumulative_amount: Amount,
        proof: &[Hash32],
    ) -> Result<(TokenKind, Amount), LedgerError> {
        self.execute("claim_distribution", true, |s, now| {
            s.claim_distribution(id, user, cumulative_amount, proof, None, now)
        })
    }

    // -- Cross-chain receive hook ---------------------------------------------

    /// Apply an envelope relayed from a peer chain.
    ///
    /// The relayer must hold `PeerRelayer` and the source chain must be
    /// trusted. Operations act on the envelope's sender (or, for reward
    /// claims, the user named in the payload); payouts go back to the
    /// source chain.
    pub fn receive_from_peer(&self, relayer: &AccountId, envelope: &Envelope) -> Result<PeerOutcome, LedgerError> {
        let result = self.execute("receive_from_peer", true, |s, now| {
            s.access.require(relayer, Permission::PeerRelayer)?;
            if !s.trusted_chains.contains(&envelope.source_chain_id) {
                return Err(LedgerError::UntrustedSource(envelope.source_chain_id));
            }
            apply_envelope(s, envelope, now)
        });
        if let Err(e) = &result {
            tracing::warn!(
                source_chain = envelope.source_chain_id,
                sender = %envelope.sender,
                payload_type = envelope.body.payload_type(),
                error = %e,
                "Peer message rejected"
            );
        }
        result
    }

    // -- Administration -----------------------------------------------------

    pub fn pause(&self, caller: &AccountId) -> Result<(), LedgerError> {
        self.execute("pause", false, |s, _| {
            s.access.require(caller, Permission::Pauser)?;
            s.paused = true;
            Ok(())
        })
    }

    pub fn unpause(&self, caller: &AccountId) -> Result<(), LedgerError> {
        self.execute("unpause", false, |s, _| {
            s.access.require(caller, Permission::Pauser)?;
            s.paused = false;
            Ok(())
        })
    }

    pub fn grant_permission(
        &self,
        caller: &AccountId,
        principal: AccountId,
        permission: Permission,
    ) -> Result<bool, LedgerError> {
        self.execute("grant_permission", false, |s, _| {
            s.access.require(caller, Permission::Admin)?;
            s.access.grant(principal, permission)
        })
    }

    pub fn revoke_permission(
        &self,
        caller: &AccountId,
        principal: &AccountId,
        permission: Permission,
    ) -> Result<bool, LedgerError> {
        self.execute("revoke_permission", false, |s, _| {
            s.access.require(caller, Permission::Admin)?;
            Ok(s.access.revoke(principal, permission))
        })
    }

    pub fn set_emission_rate(&self, caller: &AccountId, rate_per_second: Amount) -> Result<(), LedgerError> {
        self.execute("set_emission_rate", true, |s, now| {
            s.access.require(caller, Permission::EmissionManager)?;
            s.set_emission_rate(rate_per_second, now)
        })
    }

    pub fn set_emission_cap(&self, caller: &AccountId, cap: Amount) -> Result<(), LedgerError> {
        self.execute("set_emission_cap", true, |s, now| {
            s.access.require(caller, Permission::EmissionManager)?;
            s.set_emission_cap(cap, now)
        })
    }

    pub fn set_emission_start(&self, caller: &AccountId, start: u64) -> Result<(), LedgerError> {
        self.execute("set_emission_start", true, |s, now| {
            s.access.require(caller, Permission::EmissionManager)?;
            s.set_emission_start(start, now)
        })
    }

    /// Settle the emission accumulator up to now. Returns Valor emitted.
    pub fn settle(&self) -> Result<Amount, LedgerError> {
        self.execute("settle", true, |s, now| s.accumulator.settle(now))
    }

    /// Retry queued payouts. Returns how many were delivered.
    pub fn flush_payouts(&self) -> Result<usize, LedgerError> {
        self.ensure_not_reentrant()?;
        let mut state = lock(&self.state);
        *lock(&self.holder) = Some(thread::current().id());
        let _in_flight = InFlight { holder: &self.holder };
        let delivered = self.dispatch(&mut *state);
        tracing::debug!(delivered, remaining = state.pending_payouts().count(), "Payouts flushed");
        Ok(delivered)
    }

    // -- Views --------------------------------------------------------------

    /// Valor accrued but not yet collected.
    pub fn pending_valor(&self, user: &AccountId) -> Result<Amount, LedgerError> {
        self.read(|s, now| s.accumulator.pending_valor(user, now))?
    }

    /// Collected plus pending Valor, i.e. what `redeem_valor` could take now.
    pub fn redeemable_valor(&self, user: &AccountId) -> Result<Amount, LedgerError> {
        self.read(|s, now| s.accumulator.redeemable_valor(user, now))?
    }

    pub fn account(&self, user: &AccountId) -> Result<Option<UserAccount>, LedgerError> {
        self.read(|s, _| s.accumulator.account(user).cloned())
    }

    /// Emission state as it would be if settled now.
    pub fn emission_state(&self) -> Result<GlobalEmissionState, LedgerError> {
        self.read(|s, now| s.accumulator.emission_preview(now))?
    }

    pub fn batch(&self, id: u64) -> Result<Option<Batch>, LedgerError> {
        self.read(|s, _| s.batcher.batch(id).cloned())
    }

    pub fn current_batch_id(&self) -> Result<u64, LedgerError> {
        self.read(|s, now| s.batcher.current_batch_id(now))?
    }

    pub fn revenue_state(&self) -> Result<RevenueState, LedgerError> {
        self.read(|s, _| s.batcher.revenue().clone())
    }

    pub fn redemptions(&self, user: &AccountId) -> Result<Vec<RedemptionRequest>, LedgerError> {
        self.read(|s, _| s.batcher.requests(user).to_vec())
    }

    pub fn vesting_requests(&self, user: &AccountId) -> Result<Vec<VestingRequest>, LedgerError> {
        self.read(|s, _| s.vesting.requests(user).to_vec())
    }

    pub fn claimable_vesting(&self, user: &AccountId, request_id: u64) -> Result<Amount, LedgerError> {
        self.read(|s, now| s.vesting.claimable(user, request_id, now))?
    }

    pub fn distribution(&self, id: u64) -> Result<Option<Distribution>, LedgerError> {
        self.read(|s, _| s.distributor.distribution(id).cloned())
    }

    pub fn claimed_amount(&self, id: u64, user: &AccountId) -> Result<Amount, LedgerError> {
        self.read(|s, _| s.distributor.claimed_amount(id, user))
    }

    pub fn has_permission(&self, principal: &AccountId, permission: Permission) -> Result<bool, LedgerError> {
        self.read(|s, _| s.access.has_permission(principal, permission))
    }

    pub fn is_paused(&self) -> Result<bool, LedgerError> {
        self.read(|s, _| s.paused)
    }

    pub fn pending_payouts(&self) -> Result<Vec<PayoutIntent>, LedgerError> {
        self.read(|s, _| s.pending_payouts().cloned().collect())
    }
}

fn apply_envelope(state: &mut LedgerState, envelope: &Envelope, now: u64) -> Result<PeerOutcome, LedgerError> {
    let sender = &envelope.sender;
    let destination = Some(envelope.source_chain_id);
    match &envelope.body {
        PeerPayload::Stake => {
            state.stake(sender, envelope.token_kind, envelope.amount, now)?;
            Ok(PeerOutcome::Staked(envelope.amount))
        }
        PeerPayload::RequestUnstake { amount } => {
            let unlock_at = state.request_unstake(sender, *amount, now)?;
            Ok(PeerOutcome::UnstakeRequested { unlock_at })
        }
        PeerPayload::CancelUnstake => state.cancel_unstake(sender, now).map(PeerOutcome::UnstakeCancelled),
        PeerPayload::Withdraw => state.withdraw(sender, destination, now).map(PeerOutcome::Withdrawn),
        PeerPayload::ConvertToVesting { amount } => {
            let request_id = state.convert_to_vesting(sender, *amount, now)?;
            Ok(PeerOutcome::VestingCreated { request_id })
        }
        PeerPayload::ClaimVesting { request_id } => state
            .claim_vesting(sender, *request_id, destination, now)
            .map(PeerOutcome::VestingClaimed),
        PeerPayload::CancelVesting { request_id } => state
            .cancel_vesting(sender, *request_id, now)
            .map(PeerOutcome::VestingCancelled),
        PeerPayload::CancelAllVesting => state
            .cancel_all_vesting(sender, now)
            .map(PeerOutcome::VestingCancelled),
        PeerPayload::RedeemValor { amount } => {
            let batch_id = state.redeem_valor(sender, *amount, now)?;
            Ok(PeerOutcome::Redeemed { batch_id })
        }
        PeerPayload::ClaimBatch { batch_id } => state
            .claim_batch(sender, *batch_id, destination, now)
            .map(PeerOutcome::BatchClaimed),
        PeerPayload::ClaimReward {
            distribution_id,
            user,
            cumulative_amount,
            proof,
        } => {
            let (token_kind, amount) =
                state.claim_distribution(*distribution_id, user, *cumulative_amount, proof, destination, now)?;
            Ok(PeerOutcome::RewardClaimed { token_kind, amount })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valor_core::ManualClock;

    const T0: u64 = 1_700_000_000;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<PayoutIntent>>,
    }

    impl PayoutTransport for Recorder {
        fn dispatch(&self, intent: &PayoutIntent) -> Result<(), LedgerError> {
            lock(&self.sent).push(intent.clone());
            Ok(())
        }
    }

    fn facade() -> (LedgerFacade, Arc<Recorder>, Arc<ManualClock>) {
        let mut config = LedgerConfig::default();
        config.emission.start_timestamp = T0;
        let transport = Arc::new(Recorder::default());
        let clock = Arc::new(ManualClock::new(T0));
        let facade = LedgerFacade::from_config(&config, transport.clone(), clock.clone()).unwrap();
        (facade, transport, clock)
    }

    #[test]
    fn test_withdraw_hands_payout_to_transport() {
        let (facade, transport, clock) = facade();
        let user = AccountId([1u8; 32]);
        facade.stake(&user, TokenKind::Primary, 500).unwrap();
        facade.request_unstake(&user, 200).unwrap();
        clock.advance(7 * 24 * 60 * 60);
        assert_eq!(facade.withdraw(&user).unwrap(), 200);

        let sent = lock(&transport.sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, user);
        assert_eq!(sent[0].amount, 200);
        assert_eq!(sent[0].token_kind, TokenKind::Primary);
        assert_eq!(sent[0].destination_chain_id, None);
    }

    #[test]
    fn test_failed_operation_dispatches_nothing() {
        let (facade, transport, _) = facade();
        let user = AccountId([1u8; 32]);
        assert_eq!(facade.withdraw(&user), Err(LedgerError::NoPendingRequest));
        assert!(lock(&transport.sent).is_empty());
    }

    #[test]
    fn test_views_available_outside_calls() {
        let (facade, _, clock) = facade();
        let user = AccountId([1u8; 32]);
        facade.stake(&user, TokenKind::Primary, 1_000).unwrap();
        clock.advance(10);
        assert_eq!(facade.pending_valor(&user).unwrap(), 10 * 1_000_000_000_000_000_000);
        assert_eq!(facade.current_batch_id().unwrap(), 0);
        assert!(!facade.is_paused().unwrap());
    }
}
