// Application state management
//
// The composition root: every engine component lives here, and every
// operation that reads-then-writes balances or wager status runs to
// completion under the single state lock, making it one serializable
// unit. Optimistic version checks cover flows that span lock
// acquisitions (result fetches, sweeps).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::EngineError;
use crate::escrow::EscrowLedger;
use crate::ledger::Ledger;
use crate::matchmaking::{MatchmakingQueue, QueueEntry};
use crate::result_source::{ReportedResult, ResultClient};
use crate::wager::{
    DisputeResolver, DisputeTicket, SettlementEngine, SettlementReport, Wager, WagerBook,
    WagerOutcome, WagerStatus, CANCEL_REASON_DISPUTE_TIMEOUT, CANCEL_REASON_EXPIRED,
    CANCEL_REASON_VOID,
};

pub type SharedState = Arc<Mutex<AppState>>;

/// Shared context handed to every HTTP handler. The result client sits
/// outside the state lock so fetches never block the engine.
#[derive(Clone)]
pub struct ApiContext {
    pub state: SharedState,
    pub results: Arc<ResultClient>,
}

/// Registered participant identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub account_id: Uuid,
    pub username: String,

    /// External game handle used by the result source
    pub player_tag: String,

    pub created_at: DateTime<Utc>,
}

/// Outcome of a queue join: the position taken, plus the wager if the
/// join immediately completed a pair.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub position: usize,
    pub estimated_wait_secs: i64,
    pub wager: Option<Wager>,
}

/// Aggregated per-account record, derived from wagers and the ledger
#[derive(Debug, Clone, Serialize)]
pub struct AccountStats {
    pub total_matches: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub lifetime_wagered: u64,
    pub lifetime_won: u64,
}

/// What one background sweep accomplished
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepSummary {
    pub expired_wagers: usize,
    pub voided_disputes: usize,
    pub evicted_entries: usize,
    pub pairs_created: usize,
}

impl SweepSummary {
    pub fn is_empty(&self) -> bool {
        self.expired_wagers == 0
            && self.voided_disputes == 0
            && self.evicted_entries == 0
            && self.pairs_created == 0
    }
}

pub struct AppState {
    pub config: Config,
    pub profiles: HashMap<Uuid, AccountProfile>,
    pub ledger: Ledger,
    pub escrow: EscrowLedger,
    pub queue: MatchmakingQueue,
    pub wagers: WagerBook,
    pub settlement: SettlementEngine,
    pub disputes: DisputeResolver,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let settlement = SettlementEngine::new(config.platform_fee_bps);
        tracing::info!(
            fee_bps = config.platform_fee_bps,
            min_bet = config.min_bet,
            max_bet = config.max_bet,
            "wagering engine initialized"
        );

        Self {
            config,
            profiles: HashMap::new(),
            ledger: Ledger::new(),
            escrow: EscrowLedger::new(),
            queue: MatchmakingQueue::new(),
            wagers: WagerBook::new(),
            settlement,
            disputes: DisputeResolver::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Register a participant with an external game handle. The identity
    /// itself comes verified from the identity provider; we only record it.
    pub fn register_account(
        &mut self,
        username: &str,
        player_tag: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountProfile, EngineError> {
        if self
            .profiles
            .values()
            .any(|p| p.player_tag == player_tag)
        {
            return Err(EngineError::TagAlreadyLinked { player_tag: player_tag.to_string() });
        }

        let profile = AccountProfile {
            account_id: Uuid::new_v4(),
            username: username.to_string(),
            player_tag: player_tag.to_string(),
            created_at: now,
        };

        self.ledger.open_account(profile.account_id, now);
        self.profiles.insert(profile.account_id, profile.clone());
        tracing::info!(account_id = %profile.account_id, player_tag, "account registered");
        Ok(profile)
    }

    pub fn profile(&self, account_id: Uuid) -> Result<&AccountProfile, EngineError> {
        self.profiles
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound { account_id })
    }

    /// Record a deposit the payment provider settled.
    pub fn record_deposit(
        &mut self,
        account_id: Uuid,
        amount: u64,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<crate::ledger::Transaction, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount { detail: "deposit must be positive".into() });
        }
        if amount > self.config.max_deposit {
            return Err(EngineError::InvalidAmount {
                detail: format!(
                    "deposit {} exceeds the per-deposit limit {}",
                    amount, self.config.max_deposit
                ),
            });
        }
        self.ledger.deposit(account_id, amount, provider_ref, now)
    }

    /// Record a withdrawal the payment provider will pay out.
    pub fn record_withdrawal(
        &mut self,
        account_id: Uuid,
        amount: u64,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<crate::ledger::Transaction, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount {
                detail: "withdrawal must be positive".into(),
            });
        }
        self.ledger.withdraw(account_id, amount, provider_ref, now)
    }

    /// Win/loss record plus lifetime figures.
    pub fn stats(&self, account_id: Uuid) -> Result<AccountStats, EngineError> {
        let balance = self.ledger.balance(account_id)?;

        let completed: Vec<&Wager> = self
            .wagers
            .for_account(account_id)
            .into_iter()
            .filter(|w| w.status == WagerStatus::Completed)
            .collect();
        let total = completed.len();
        let wins = completed
            .iter()
            .filter(|w| w.winner_id == Some(account_id))
            .count();
        let losses = total - wins;
        let win_rate = if total > 0 {
            (wins as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(AccountStats {
            total_matches: total,
            wins,
            losses,
            win_rate,
            lifetime_wagered: balance.lifetime_wagered,
            lifetime_won: balance.lifetime_won,
        })
    }

    // ------------------------------------------------------------------------
    // Matchmaking
    // ------------------------------------------------------------------------

    /// Join the queue for a stake. Funds are checked, not reserved;
    /// reservation happens at pairing. Runs a pairing pass immediately so
    /// the joiner learns about an instant match.
    pub fn join_queue(
        &mut self,
        account_id: Uuid,
        stake: u64,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, EngineError> {
        self.profile(account_id)?;

        if stake < self.config.min_bet || stake > self.config.max_bet {
            return Err(EngineError::InvalidStakeBounds {
                stake,
                min: self.config.min_bet,
                max: self.config.max_bet,
            });
        }

        let balance = self.ledger.balance(account_id)?;
        if balance.available < stake {
            return Err(EngineError::InsufficientFunds {
                available: balance.available,
                required: stake,
            });
        }

        let position = self.queue.push(account_id, stake, now)?;
        let paired = self.pair_waiting(now);
        let wager = paired.into_iter().find(|w| w.is_participant(account_id));

        Ok(JoinOutcome {
            position,
            estimated_wait_secs: position as i64 * 30,
            wager,
        })
    }

    /// Remove a waiting entry; no-op once paired or never queued.
    pub fn leave_queue(&mut self, account_id: Uuid) -> Option<QueueEntry> {
        self.queue.leave(account_id)
    }

    pub fn queue_status(
        &self,
        account_id: Uuid,
    ) -> Result<(u64, usize, DateTime<Utc>), EngineError> {
        self.queue.status(account_id)
    }

    /// Drain pairable entries: reserve both stakes and open a wager per
    /// pair. A participant whose funds no longer cover the stake is
    /// dropped and the survivor returns to the head of its bucket.
    pub fn pair_waiting(&mut self, now: DateTime<Utc>) -> Vec<Wager> {
        let mut created = Vec::new();

        while let Some((first, second)) = self.queue.try_pair() {
            let stake = first.stake;
            let first_ok = self.covers_stake(first.account_id, stake);
            let second_ok = self.covers_stake(second.account_id, stake);

            match (first_ok, second_ok) {
                (true, true) => match self.open_wager(&first, &second, now) {
                    Ok(wager) => created.push(wager),
                    Err(e) => {
                        tracing::warn!(error = %e, "pairing failed during reservation");
                    }
                },
                (false, true) => {
                    tracing::info!(account_id = %first.account_id, "dropped from queue: funds no longer cover stake");
                    self.queue.requeue_front(second);
                }
                (true, false) => {
                    tracing::info!(account_id = %second.account_id, "dropped from queue: funds no longer cover stake");
                    self.queue.requeue_front(first);
                }
                (false, false) => {
                    tracing::info!("dropped both queue entries: funds no longer cover stake");
                }
            }
        }

        created
    }

    fn covers_stake(&self, account_id: Uuid, stake: u64) -> bool {
        !self.ledger.is_halted(account_id)
            && self
                .ledger
                .balance(account_id)
                .map(|b| b.available >= stake)
                .unwrap_or(false)
    }

    fn open_wager(
        &mut self,
        first: &QueueEntry,
        second: &QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<Wager, EngineError> {
        let wager_id = Uuid::new_v4();
        let stake = first.stake;

        self.escrow.reserve(
            &mut self.ledger,
            wager_id,
            first.account_id,
            second.account_id,
            stake,
            now,
        )?;
        if let Err(e) = self.escrow.reserve(
            &mut self.ledger,
            wager_id,
            second.account_id,
            first.account_id,
            stake,
            now,
        ) {
            // Undo the first reservation so no escrow is stranded; the
            // survivor keeps its queue priority.
            self.escrow.release_refund(
                &mut self.ledger,
                wager_id,
                first.account_id,
                stake,
                "pair_rollback",
                now,
            )?;
            self.queue.requeue_front(first.clone());
            return Err(e);
        }

        let tag_of = |id: Uuid| {
            self.profiles
                .get(&id)
                .map(|p| p.player_tag.clone())
                .unwrap_or_default()
        };

        let wager = Wager::new(
            wager_id,
            first.account_id,
            tag_of(first.account_id),
            second.account_id,
            tag_of(second.account_id),
            stake,
            now,
            now + self.config.match_timeout(),
        );

        tracing::info!(
            wager_id = %wager.id,
            player1 = %wager.player1_id,
            player2 = %wager.player2_id,
            stake,
            "wager opened with both stakes reserved"
        );

        self.wagers.insert(wager.clone());
        Ok(wager)
    }

    // ------------------------------------------------------------------------
    // Results and lifecycle
    // ------------------------------------------------------------------------

    /// Apply a verified external result to an active wager. A result that
    /// arrives after expiry is rejected and the expiry path runs instead.
    pub fn apply_result(
        &mut self,
        wager_id: Uuid,
        result: &ReportedResult,
        now: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<SettlementReport, EngineError> {
        let wager = self.wagers.get(wager_id)?;
        if wager.status == WagerStatus::Disputed {
            return Err(EngineError::VerificationFailed {
                reason: "result reporting is suspended while the wager is disputed".to_string(),
            });
        }

        let (outcome, event_time) = match result {
            ReportedResult::NoResult => {
                return Err(EngineError::VerificationFailed {
                    reason: "no verified result available for this wager".to_string(),
                })
            }
            ReportedResult::Winner { tag, event_time } => {
                let winner = wager.account_for_tag(tag).ok_or_else(|| {
                    EngineError::VerificationFailed {
                        reason: format!("winner tag {} does not belong to this wager", tag),
                    }
                })?;
                (WagerOutcome::Winner { account_id: winner }, Some(*event_time))
            }
            ReportedResult::Draw { event_time } => (WagerOutcome::Draw, Some(*event_time)),
        };

        let settled = {
            let wager = self.wagers.get_mut(wager_id)?;
            self.settlement.settle(
                &mut self.ledger,
                &mut self.escrow,
                wager,
                outcome,
                None,
                event_time,
                now,
                expected_version,
            )
        };

        if matches!(settled, Err(EngineError::MatchExpired { .. })) {
            // Late result: the expiry path applies instead
            if let Err(e) = self.expire_wager(wager_id, now) {
                tracing::debug!(%wager_id, error = %e, "expiry fallback after late result");
            }
        }

        settled
    }

    /// Cancel an active wager past its deadline and refund both stakes.
    pub fn expire_wager(
        &mut self,
        wager_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, EngineError> {
        let wager = self.wagers.get(wager_id)?;
        if wager.status != WagerStatus::Active {
            return Err(EngineError::SettlementConflict { wager_id });
        }
        if now < wager.expires_at {
            return Err(EngineError::VerificationFailed {
                reason: format!("wager {} has not reached its deadline", wager_id),
            });
        }

        let wager = self.wagers.get_mut(wager_id)?;
        self.settlement.settle(
            &mut self.ledger,
            &mut self.escrow,
            wager,
            WagerOutcome::Void,
            Some(CANCEL_REASON_EXPIRED),
            None,
            now,
            None,
        )
    }

    // ------------------------------------------------------------------------
    // Disputes
    // ------------------------------------------------------------------------

    /// Raise a dispute on an active wager. Raising again returns the
    /// existing ticket.
    pub fn raise_dispute(
        &mut self,
        wager_id: Uuid,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<DisputeTicket, EngineError> {
        let wager = self.wagers.get(wager_id)?;
        if !wager.is_participant(account_id) {
            return Err(EngineError::VerificationFailed {
                reason: format!("account {} is not a participant of this wager", account_id),
            });
        }
        if wager.status == WagerStatus::Disputed {
            return Ok(self.disputes.get(wager_id)?.clone());
        }

        let deadline = now + self.config.dispute_timeout();
        let wager = self.wagers.get_mut(wager_id)?;
        wager.mark_disputed(reason, deadline, now, None)?;

        tracing::info!(%wager_id, raised_by = %account_id, "dispute opened; result reporting suspended");
        Ok(self.disputes.raise(wager_id, account_id, reason, now, deadline))
    }

    /// Apply an authoritative dispute decision.
    pub fn resolve_dispute(
        &mut self,
        wager_id: Uuid,
        outcome: WagerOutcome,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, EngineError> {
        self.disputes.get(wager_id)?;

        let report = {
            let wager = self.wagers.get_mut(wager_id)?;
            self.settlement.settle(
                &mut self.ledger,
                &mut self.escrow,
                wager,
                outcome,
                Some(CANCEL_REASON_VOID),
                None,
                now,
                None,
            )?
        };

        self.disputes.close(wager_id)?;
        Ok(report)
    }

    fn void_overdue_dispute(
        &mut self,
        wager_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, EngineError> {
        let report = {
            let wager = self.wagers.get_mut(wager_id)?;
            self.settlement.settle(
                &mut self.ledger,
                &mut self.escrow,
                wager,
                WagerOutcome::Void,
                Some(CANCEL_REASON_DISPUTE_TIMEOUT),
                None,
                now,
                None,
            )?
        };

        self.disputes.close(wager_id)?;
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Background sweep
    // ------------------------------------------------------------------------

    /// One pass of deadline housekeeping. Safe to run from concurrent
    /// instances: every transition is status-guarded, so duplicates are
    /// harmless no-ops after the first success.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for wager_id in self.wagers.active_past_expiry(now) {
            match self.expire_wager(wager_id, now) {
                Ok(_) => summary.expired_wagers += 1,
                Err(e) => tracing::debug!(%wager_id, error = %e, "expiry sweep skipped wager"),
            }
        }

        for wager_id in self.disputes.expired(now) {
            match self.void_overdue_dispute(wager_id, now) {
                Ok(_) => {
                    tracing::info!(%wager_id, "dispute deadline elapsed; default void applied");
                    summary.voided_disputes += 1;
                }
                Err(e) => tracing::debug!(%wager_id, error = %e, "dispute sweep skipped wager"),
            }
        }

        let evicted = self.queue.evict_stale(now, self.config.queue_timeout());
        for entry in &evicted {
            // No funds were reserved while waiting, so eviction is purely
            // a notification concern.
            tracing::info!(account_id = %entry.account_id, stake = entry.stake, "queue entry evicted after wait timeout");
        }
        summary.evicted_entries = evicted.len();

        summary.pairs_created = self.pair_waiting(now).len();
        summary
    }

    /// Conservation base: participant funds plus platform revenue.
    pub fn system_total(&self) -> u64 {
        self.ledger.total_held() + self.settlement.fee_pool
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn save_to_disk(&self) -> Result<(), String> {
        use std::fs;

        let state = PersistedState {
            profiles: &self.profiles,
            ledger: &self.ledger,
            escrow: &self.escrow,
            queue: &self.queue,
            wagers: &self.wagers,
            settlement: &self.settlement,
            disputes: &self.disputes,
        };

        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;

        if let Some(parent) = std::path::Path::new(&self.config.data_file).parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create data directory: {}", e))?;
        }
        fs::write(&self.config.data_file, json)
            .map_err(|e| format!("Failed to write state file: {}", e))?;

        Ok(())
    }

    pub fn load_from_disk(&mut self) -> Result<(), String> {
        use std::fs;

        let json = fs::read_to_string(&self.config.data_file)
            .map_err(|_| "No state file found".to_string())?;

        let state: PersistedStateOwned = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to deserialize state: {}", e))?;

        self.profiles = state.profiles;
        self.ledger = state.ledger;
        self.escrow = state.escrow;
        self.queue = state.queue;
        self.wagers = state.wagers;
        self.settlement = state.settlement;
        self.disputes = state.disputes;

        Ok(())
    }
}

#[derive(Serialize)]
struct PersistedState<'a> {
    profiles: &'a HashMap<Uuid, AccountProfile>,
    ledger: &'a Ledger,
    escrow: &'a EscrowLedger,
    queue: &'a MatchmakingQueue,
    wagers: &'a WagerBook,
    settlement: &'a SettlementEngine,
    disputes: &'a DisputeResolver,
}

#[derive(Deserialize)]
struct PersistedStateOwned {
    profiles: HashMap<Uuid, AccountProfile>,
    ledger: Ledger,
    escrow: EscrowLedger,
    queue: MatchmakingQueue,
    wagers: WagerBook,
    settlement: SettlementEngine,
    disputes: DisputeResolver,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_state() -> AppState {
        AppState::new(Config::default())
    }

    fn funded_account(state: &mut AppState, tag: &str, funds: u64) -> Uuid {
        let now = Utc::now();
        let profile = state.register_account(tag, tag, now).unwrap();
        state
            .record_deposit(profile.account_id, funds, None, now)
            .unwrap();
        profile.account_id
    }

    #[test]
    fn test_join_pairs_two_compatible_players() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        let first = state.join_queue(a, 2000, now).unwrap();
        assert_eq!(first.position, 1);
        assert!(first.wager.is_none());

        let second = state.join_queue(b, 2000, now).unwrap();
        let wager = second.wager.expect("second join should pair");
        assert_eq!(wager.status, WagerStatus::Active);
        assert_eq!(wager.bet_amount, 2000);

        for id in [a, b] {
            let bal = state.ledger.balance(id).unwrap();
            assert_eq!(bal.available, 3000);
            assert_eq!(bal.escrowed, 2000);
        }
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_join_rejects_out_of_bounds_stake() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);

        assert!(matches!(
            state.join_queue(a, 50, now),
            Err(EngineError::InvalidStakeBounds { .. })
        ));
        assert!(matches!(
            state.join_queue(a, 20_000, now),
            Err(EngineError::InvalidStakeBounds { .. })
        ));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_stale_entry_dropped_at_pairing() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);
        let c = funded_account(&mut state, "#C", 5000);

        state.join_queue(a, 2000, now).unwrap();
        // a's funds evaporate after joining (withdrawal races the queue)
        state.record_withdrawal(a, 4000, None, now).unwrap();

        let outcome = state.join_queue(b, 2000, now).unwrap();
        // Pairing dropped a and returned b to the head; no wager yet
        assert!(outcome.wager.is_none());
        assert!(state.queue.status(a).is_err());
        assert!(state.queue.status(b).is_ok());

        // c arrives and pairs with the waiting b
        let outcome = state.join_queue(c, 2000, now).unwrap();
        let wager = outcome.wager.expect("b and c should pair");
        assert!(wager.is_participant(b));
        assert!(wager.is_participant(c));
    }

    #[test]
    fn test_expiry_sweep_refunds_both() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();

        let later = now + Duration::minutes(11);
        let summary = state.sweep(later);
        assert_eq!(summary.expired_wagers, 1);

        let wager = state.wagers.get(wager.id).unwrap();
        assert_eq!(wager.status, WagerStatus::Cancelled);
        assert_eq!(wager.cancellation_reason.as_deref(), Some(CANCEL_REASON_EXPIRED));
        for id in [a, b] {
            let bal = state.ledger.balance(id).unwrap();
            assert_eq!(bal.available, 5000);
            assert_eq!(bal.escrowed, 0);
        }

        // A second sweep finds nothing to do
        assert!(state.sweep(later + Duration::minutes(1)).is_empty());
    }

    #[test]
    fn test_dispute_default_void_after_deadline() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();

        state
            .raise_dispute(wager.id, a, "opponent never showed", now)
            .unwrap();

        // Deadline passes with no decision
        let later = now + Duration::hours(25);
        let summary = state.sweep(later);
        assert_eq!(summary.voided_disputes, 1);

        let wager = state.wagers.get(wager.id).unwrap();
        assert_eq!(wager.status, WagerStatus::Cancelled);
        assert_eq!(
            wager.cancellation_reason.as_deref(),
            Some(CANCEL_REASON_DISPUTE_TIMEOUT)
        );
        for id in [a, b] {
            assert_eq!(state.ledger.balance(id).unwrap().available, 5000);
        }
        assert_eq!(state.disputes.open_count(), 0);
    }

    #[test]
    fn test_result_suspended_while_disputed() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();
        state.raise_dispute(wager.id, b, "score mismatch", now).unwrap();

        let result = ReportedResult::Winner { tag: "#A".to_string(), event_time: now };
        let err = state.apply_result(wager.id, &result, now, None).unwrap_err();
        assert!(matches!(err, EngineError::VerificationFailed { .. }));

        // Resolver decision settles it
        let report = state
            .resolve_dispute(wager.id, WagerOutcome::Winner { account_id: a }, now)
            .unwrap();
        assert_eq!(report.payout, Some(3600));
        assert_eq!(state.ledger.balance(a).unwrap().available, 3000 + 3600);
    }

    #[test]
    fn test_late_result_triggers_expiry_path() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();

        let late = now + Duration::minutes(15);
        let result = ReportedResult::Winner { tag: "#A".to_string(), event_time: late };
        let err = state.apply_result(wager.id, &result, late, None).unwrap_err();
        assert_eq!(err, EngineError::MatchExpired { wager_id: wager.id });

        // The expiry path ran instead: cancelled and refunded
        let wager = state.wagers.get(wager.id).unwrap();
        assert_eq!(wager.status, WagerStatus::Cancelled);
        for id in [a, b] {
            assert_eq!(state.ledger.balance(id).unwrap().available, 5000);
        }
    }

    #[test]
    fn test_conservation_across_full_lifecycle() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);
        let total = state.system_total();

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();
        assert_eq!(state.system_total(), total);

        let result = ReportedResult::Winner { tag: "#B".to_string(), event_time: now };
        state.apply_result(wager.id, &result, now, None).unwrap();
        assert_eq!(state.system_total(), total);
    }

    #[test]
    fn test_duplicate_register_tag_rejected() {
        let mut state = test_state();
        let now = Utc::now();
        state.register_account("alice", "#SAME", now).unwrap();
        let err = state.register_account("bob", "#SAME", now).unwrap_err();
        assert_eq!(err, EngineError::TagAlreadyLinked { player_tag: "#SAME".to_string() });
    }

    #[test]
    fn test_deposit_limit_enforced() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 100);
        let err = state.record_deposit(a, 200_000, None, now).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[test]
    fn test_stats_after_settlement() {
        let mut state = test_state();
        let now = Utc::now();
        let a = funded_account(&mut state, "#A", 5000);
        let b = funded_account(&mut state, "#B", 5000);

        state.join_queue(a, 2000, now).unwrap();
        let wager = state.join_queue(b, 2000, now).unwrap().wager.unwrap();
        let result = ReportedResult::Winner { tag: "#A".to_string(), event_time: now };
        state.apply_result(wager.id, &result, now, None).unwrap();

        let stats = state.stats(a).unwrap();
        assert_eq!(stats.total_matches, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.win_rate, 100.0);
        assert_eq!(stats.lifetime_wagered, 2000);
        assert_eq!(stats.lifetime_won, 3600);

        let stats = state.stats(b).unwrap();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.win_rate, 0.0);
    }
}
