// End-to-end engine scenarios driven through the composed AppState.
//
// Covers the full queue -> escrow -> lifecycle -> settlement path, the
// money-safety properties (conservation, no stuck escrow, settlement
// idempotence), and pairing exclusivity under concurrent callers.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use uuid::Uuid;

use wagermatch::{
    AppState, Config, EngineError, ReportedResult, TxKind, WagerOutcome, WagerStatus,
};

fn test_state() -> AppState {
    AppState::new(Config::default())
}

fn funded_account(state: &mut AppState, tag: &str, funds_minor: u64) -> Uuid {
    let now = Utc::now();
    let profile = state.register_account(tag, tag, now).unwrap();
    state
        .record_deposit(profile.account_id, funds_minor, None, now)
        .unwrap();
    profile.account_id
}

// ===== SCENARIO A: winner settlement with 10% fee =====

#[test]
fn scenario_a_winner_settlement_with_fee() {
    let mut state = test_state();
    let now = Utc::now();

    // Two accounts with 50.00 each join the queue with stake 20.00
    let acc1 = funded_account(&mut state, "#ONE", 5000);
    let acc2 = funded_account(&mut state, "#TWO", 5000);

    state.join_queue(acc1, 2000, now).unwrap();
    let wager = state.join_queue(acc2, 2000, now).unwrap().wager.unwrap();

    // After pairing each has available=30.00, escrowed=20.00
    for id in [acc1, acc2] {
        let bal = state.ledger.balance(id).unwrap();
        assert_eq!(bal.available, 3000);
        assert_eq!(bal.escrowed, 2000);
    }

    // A winner is reported for account 1 with platform_fee_fraction=0.10
    let result = ReportedResult::Winner { tag: "#ONE".to_string(), event_time: now };
    let report = state.apply_result(wager.id, &result, now, None).unwrap();

    // payout = 2 x 20.00 x 0.9 = 36.00; account 1 ends at 30.00 + 36.00
    assert_eq!(report.payout, Some(3600));
    assert_eq!(report.fee, 400);

    let winner = state.ledger.balance(acc1).unwrap();
    let loser = state.ledger.balance(acc2).unwrap();
    assert_eq!(winner.available, 6600);
    assert_eq!(winner.escrowed, 0);
    assert_eq!(loser.available, 3000);
    assert_eq!(loser.escrowed, 0);

    let wager = state.wagers.get(wager.id).unwrap();
    assert_eq!(wager.status, WagerStatus::Completed);
    assert_eq!(wager.winner_id, Some(acc1));

    // Exactly one settlement entry per participant
    let win_entries = state
        .ledger
        .history(acc1)
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Win)
        .count();
    let loss_entries = state
        .ledger
        .history(acc2)
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Loss)
        .count();
    assert_eq!(win_entries, 1);
    assert_eq!(loss_entries, 1);
}

// ===== SCENARIO B: join with insufficient funds =====

#[test]
fn scenario_b_insufficient_funds_leaves_queue_untouched() {
    let mut state = test_state();
    let now = Utc::now();

    let acc = funded_account(&mut state, "#POOR", 500);

    let err = state.join_queue(acc, 1000, now).unwrap_err();
    assert_eq!(err, EngineError::InsufficientFunds { available: 500, required: 1000 });
    assert!(state.queue.is_empty());
    assert!(state.queue_status(acc).is_err());
}

// ===== SCENARIO C: expiry refunds both stakes =====

#[test]
fn scenario_c_expiry_cancels_and_refunds() {
    let mut state = test_state();
    let now = Utc::now();

    let acc1 = funded_account(&mut state, "#C1", 5000);
    let acc2 = funded_account(&mut state, "#C2", 5000);

    state.join_queue(acc1, 2000, now).unwrap();
    let wager = state.join_queue(acc2, 2000, now).unwrap().wager.unwrap();

    // Deadline passes with no result; the sweeper drives cancellation
    let summary = state.sweep(now + Duration::minutes(11));
    assert_eq!(summary.expired_wagers, 1);

    let wager = state.wagers.get(wager.id).unwrap();
    assert_eq!(wager.status, WagerStatus::Cancelled);
    assert_eq!(wager.cancellation_reason.as_deref(), Some("expired"));

    for id in [acc1, acc2] {
        let bal = state.ledger.balance(id).unwrap();
        assert_eq!(bal.available, 5000);
        assert_eq!(bal.escrowed, 0);
    }
}

// ===== SCENARIO D: dispute deadline defaults to void =====

#[test]
fn scenario_d_dispute_deadline_defaults_to_void() {
    let mut state = test_state();
    let now = Utc::now();

    let acc1 = funded_account(&mut state, "#D1", 5000);
    let acc2 = funded_account(&mut state, "#D2", 5000);

    state.join_queue(acc1, 2000, now).unwrap();
    let wager = state.join_queue(acc2, 2000, now).unwrap().wager.unwrap();

    state
        .raise_dispute(wager.id, acc2, "result looks wrong", now)
        .unwrap();

    // Dispute deadline elapses with no decision
    let summary = state.sweep(now + Duration::hours(25));
    assert_eq!(summary.voided_disputes, 1);

    let wager = state.wagers.get(wager.id).unwrap();
    assert_eq!(wager.status, WagerStatus::Cancelled);
    for id in [acc1, acc2] {
        let bal = state.ledger.balance(id).unwrap();
        assert_eq!(bal.available, 5000);
        assert_eq!(bal.escrowed, 0);
    }
}

// ===== PROPERTY: conservation =====

#[test]
fn conservation_holds_across_mixed_outcomes() {
    let mut state = test_state();
    let now = Utc::now();

    let accounts: Vec<Uuid> = (0..6)
        .map(|i| funded_account(&mut state, &format!("#P{}", i), 5000))
        .collect();
    let baseline = state.system_total();
    assert_eq!(baseline, 6 * 5000);

    // Pair 1 settles with a winner
    state.join_queue(accounts[0], 2000, now).unwrap();
    let w1 = state.join_queue(accounts[1], 2000, now).unwrap().wager.unwrap();
    let result = ReportedResult::Winner { tag: "#P0".to_string(), event_time: now };
    state.apply_result(w1.id, &result, now, None).unwrap();

    // Pair 2 expires
    state.join_queue(accounts[2], 1500, now).unwrap();
    let w2 = state.join_queue(accounts[3], 1500, now).unwrap().wager.unwrap();
    state.expire_wager(w2.id, now + Duration::minutes(11)).unwrap();

    // Pair 3 disputes and resolves as a draw
    state.join_queue(accounts[4], 3000, now).unwrap();
    let w3 = state.join_queue(accounts[5], 3000, now).unwrap().wager.unwrap();
    state
        .raise_dispute(w3.id, accounts[4], "connection dropped", now)
        .unwrap();
    state.resolve_dispute(w3.id, WagerOutcome::Draw, now).unwrap();

    // No operation but deposit/withdraw may change the system total
    assert_eq!(state.system_total(), baseline);

    // No stuck escrow: every wager left active, every stake came home
    for id in &accounts {
        assert_eq!(state.ledger.balance(*id).unwrap().escrowed, 0);
    }

    // Withdrawals are the only way the total moves
    state
        .record_withdrawal(accounts[1], 1000, None, now)
        .unwrap();
    assert_eq!(state.system_total(), baseline - 1000);
}

// ===== PROPERTY: settlement idempotence =====

#[test]
fn settlement_is_idempotent_at_the_engine_boundary() {
    let mut state = test_state();
    let now = Utc::now();

    let acc1 = funded_account(&mut state, "#I1", 5000);
    let acc2 = funded_account(&mut state, "#I2", 5000);

    state.join_queue(acc1, 2000, now).unwrap();
    let wager = state.join_queue(acc2, 2000, now).unwrap().wager.unwrap();

    let result = ReportedResult::Winner { tag: "#I1".to_string(), event_time: now };
    let first = state.apply_result(wager.id, &result, now, None).unwrap();
    let replay = state
        .apply_result(wager.id, &result, now + Duration::seconds(5), None)
        .unwrap();

    assert_eq!(first.transaction_ids, replay.transaction_ids);
    assert_eq!(state.ledger.balance(acc1).unwrap().available, 6600);

    // A contradictory outcome is rejected and changes nothing
    let flipped = ReportedResult::Winner { tag: "#I2".to_string(), event_time: now };
    let err = state.apply_result(wager.id, &flipped, now, None).unwrap_err();
    assert_eq!(err, EngineError::SettlementConflict { wager_id: wager.id });
    assert_eq!(state.ledger.balance(acc2).unwrap().available, 3000);

    // Exactly one settlement transaction pair exists
    let settlement_entries = state
        .ledger
        .history(acc1)
        .into_iter()
        .chain(state.ledger.history(acc2))
        .filter(|tx| matches!(tx.kind, TxKind::Win | TxKind::Loss))
        .count();
    assert_eq!(settlement_entries, 2);
}

// ===== PROPERTY: pairing exclusivity under concurrency =====

#[test]
fn concurrent_pairing_never_double_claims_an_entry() {
    let mut state = test_state();
    let now = Utc::now();

    let accounts: Vec<Uuid> = (0..8)
        .map(|i| funded_account(&mut state, &format!("#X{}", i), 5000))
        .collect();

    // Seed the queue directly so pairing happens only in the racing callers
    for id in &accounts {
        state.queue.push(*id, 2000, now).unwrap();
    }

    let shared = Arc::new(Mutex::new(state));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let shared = shared.clone();
        handles.push(std::thread::spawn(move || {
            shared.lock().unwrap().pair_waiting(Utc::now())
        }));
    }

    let mut all_wagers = Vec::new();
    for handle in handles {
        all_wagers.extend(handle.join().unwrap());
    }

    // Eight entries produce exactly four wagers
    assert_eq!(all_wagers.len(), 4);

    // Every account appears in exactly one wager
    let mut seen = std::collections::HashSet::new();
    for wager in &all_wagers {
        assert!(seen.insert(wager.player1_id), "player claimed twice");
        assert!(seen.insert(wager.player2_id), "player claimed twice");
    }
    assert_eq!(seen.len(), 8);

    let state = shared.lock().unwrap();
    assert!(state.queue.is_empty());
    for id in &accounts {
        assert_eq!(state.ledger.balance(*id).unwrap().escrowed, 2000);
    }
}

// ===== Queue leave vs. pairing race =====

#[test]
fn leave_after_pairing_is_a_noop() {
    let mut state = test_state();
    let now = Utc::now();

    let acc1 = funded_account(&mut state, "#L1", 5000);
    let acc2 = funded_account(&mut state, "#L2", 5000);

    state.join_queue(acc1, 2000, now).unwrap();
    let wager = state.join_queue(acc2, 2000, now).unwrap().wager.unwrap();

    // Once paired, leaving changes nothing; the lifecycle owns the wager
    assert!(state.leave_queue(acc1).is_none());
    let stored = state.wagers.get(wager.id).unwrap();
    assert_eq!(stored.status, WagerStatus::Active);
    assert_eq!(state.ledger.balance(acc1).unwrap().escrowed, 2000);
}

// ===== Snapshot round-trip keeps queue places =====

#[test]
fn snapshot_preserves_queue_entries_and_balances() {
    let path = std::env::temp_dir().join(format!("wagermatch-test-{}.json", Uuid::new_v4()));
    let config = Config { data_file: path.to_string_lossy().into_owned(), ..Config::default() };

    let mut state = AppState::new(config.clone());
    let now = Utc::now();
    let acc = funded_account(&mut state, "#SNAP", 5000);
    state.join_queue(acc, 2000, now).unwrap();
    state.save_to_disk().unwrap();

    let mut restored = AppState::new(config);
    restored.load_from_disk().unwrap();

    assert_eq!(restored.ledger.balance(acc).unwrap().available, 5000);
    let (stake, position, _) = restored.queue_status(acc).unwrap();
    assert_eq!(stake, 2000);
    assert_eq!(position, 1);

    std::fs::remove_file(path).ok();
}
