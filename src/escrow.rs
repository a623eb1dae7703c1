// ============================================================================
// Escrow Ledger - wagermatch
// ============================================================================
//
// Composite fund-reservation and release operations built on the ledger.
// Every operation is idempotent per (wager, account, operation): a replay
// returns the originally produced transactions instead of moving funds
// again. The applied-key map is part of the persisted state, so replays
// survive restarts.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::ledger::{Ledger, Transaction};

/// Escrow operation kinds used in idempotency keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowOp {
    Reserve,
    Release,
}

impl EscrowOp {
    fn as_str(&self) -> &'static str {
        match self {
            EscrowOp::Reserve => "reserve",
            EscrowOp::Release => "release",
        }
    }
}

fn idempotency_key(wager_id: Uuid, account_id: Uuid, op: EscrowOp) -> String {
    format!("{}:{}:{}", wager_id.simple(), account_id.simple(), op.as_str())
}

/// Tracks applied escrow operations and replays their results
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EscrowLedger {
    /// Idempotency key -> transactions the original application produced
    applied: HashMap<String, Vec<Transaction>>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `amount` from available to escrow for one participant of a
    /// wager. Replays return the original bet_placed transaction.
    pub fn reserve(
        &mut self,
        ledger: &mut Ledger,
        wager_id: Uuid,
        account_id: Uuid,
        opponent_id: Uuid,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        let key = idempotency_key(wager_id, account_id, EscrowOp::Reserve);
        if let Some(prior) = self.applied.get(&key) {
            return Ok(prior[0].clone());
        }

        let tx = ledger.post_bet_placed(account_id, amount, wager_id, opponent_id, now)?;
        self.applied.insert(key, vec![tx.clone()]);
        Ok(tx)
    }

    /// Return one participant's escrowed stake to their own available
    /// funds as a refund.
    pub fn release_refund(
        &mut self,
        ledger: &mut Ledger,
        wager_id: Uuid,
        account_id: Uuid,
        amount: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        let key = idempotency_key(wager_id, account_id, EscrowOp::Release);
        if let Some(prior) = self.applied.get(&key) {
            return Ok(prior[0].clone());
        }

        let tx = ledger.post_refund(account_id, amount, wager_id, reason, now)?;
        self.applied.insert(key, vec![tx.clone()]);
        Ok(tx)
    }

    /// Settle a decided wager in one atomic unit: the loser's escrow is
    /// consumed with a loss entry and the winner's escrow is released with
    /// a single win entry crediting `payout`. No intermediate state exists
    /// where the pot belongs to neither account.
    ///
    /// Returns (win_tx, loss_tx). Replays return the originals.
    #[allow(clippy::too_many_arguments)]
    pub fn release_to_winner(
        &mut self,
        ledger: &mut Ledger,
        wager_id: Uuid,
        winner_id: Uuid,
        loser_id: Uuid,
        stake: u64,
        payout: u64,
        fee: u64,
        now: DateTime<Utc>,
    ) -> Result<(Transaction, Transaction), EngineError> {
        let winner_key = idempotency_key(wager_id, winner_id, EscrowOp::Release);
        let loser_key = idempotency_key(wager_id, loser_id, EscrowOp::Release);

        if let (Some(win), Some(loss)) =
            (self.applied.get(&winner_key), self.applied.get(&loser_key))
        {
            return Ok((win[0].clone(), loss[0].clone()));
        }

        // Both legs must apply together; refuse up front if the credit
        // side cannot accept funds.
        if ledger.is_halted(winner_id) {
            return Err(EngineError::AccountHalted { account_id: winner_id });
        }

        let loss_tx = ledger.post_loss(loser_id, stake, wager_id, now)?;
        let win_tx = ledger.post_win(winner_id, payout, stake, fee, wager_id, now)?;

        self.applied.insert(winner_key, vec![win_tx.clone()]);
        self.applied.insert(loser_key, vec![loss_tx.clone()]);
        Ok((win_tx, loss_tx))
    }

    /// Whether a given escrow operation has already been applied.
    pub fn was_applied(&self, wager_id: Uuid, account_id: Uuid, op: EscrowOp) -> bool {
        self.applied
            .contains_key(&idempotency_key(wager_id, account_id, op))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(funds: u64) -> (Ledger, EscrowLedger, Uuid, Uuid) {
        let mut ledger = Ledger::new();
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        ledger.open_account(a, now);
        ledger.open_account(b, now);
        ledger.deposit(a, funds, None, now).unwrap();
        ledger.deposit(b, funds, None, now).unwrap();
        (ledger, EscrowLedger::new(), a, b)
    }

    #[test]
    fn test_reserve_is_idempotent() {
        let (mut ledger, mut escrow, a, b) = setup(5000);
        let wager = Uuid::new_v4();
        let now = Utc::now();

        let first = escrow.reserve(&mut ledger, wager, a, b, 2000, now).unwrap();
        let replay = escrow.reserve(&mut ledger, wager, a, b, 2000, now).unwrap();

        assert_eq!(first.id, replay.id);
        // Funds moved once, not twice
        let bal = ledger.balance(a).unwrap();
        assert_eq!(bal.available, 3000);
        assert_eq!(bal.escrowed, 2000);
        assert_eq!(ledger.history(a).len(), 2); // deposit + bet_placed
    }

    #[test]
    fn test_reserve_insufficient_funds() {
        let (mut ledger, mut escrow, a, b) = setup(1000);
        let wager = Uuid::new_v4();
        let err = escrow
            .reserve(&mut ledger, wager, a, b, 2000, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        // A failed reservation records no idempotency key
        assert!(!escrow.was_applied(wager, a, EscrowOp::Reserve));
    }

    #[test]
    fn test_release_refund_idempotent() {
        let (mut ledger, mut escrow, a, b) = setup(5000);
        let wager = Uuid::new_v4();
        let now = Utc::now();

        escrow.reserve(&mut ledger, wager, a, b, 2000, now).unwrap();
        let first = escrow
            .release_refund(&mut ledger, wager, a, 2000, "draw", now)
            .unwrap();
        let replay = escrow
            .release_refund(&mut ledger, wager, a, 2000, "draw", now)
            .unwrap();

        assert_eq!(first.id, replay.id);
        let bal = ledger.balance(a).unwrap();
        assert_eq!(bal.available, 5000);
        assert_eq!(bal.escrowed, 0);
    }

    #[test]
    fn test_release_to_winner_moves_pot_once() {
        let (mut ledger, mut escrow, a, b) = setup(5000);
        let wager = Uuid::new_v4();
        let now = Utc::now();

        escrow.reserve(&mut ledger, wager, a, b, 2000, now).unwrap();
        escrow.reserve(&mut ledger, wager, b, a, 2000, now).unwrap();

        // 10% fee on the 4000 pot
        let (win, loss) = escrow
            .release_to_winner(&mut ledger, wager, a, b, 2000, 3600, 400, now)
            .unwrap();
        assert_eq!(win.amount, 3600);
        assert_eq!(loss.amount, -2000);

        let (win2, loss2) = escrow
            .release_to_winner(&mut ledger, wager, a, b, 2000, 3600, 400, now)
            .unwrap();
        assert_eq!(win.id, win2.id);
        assert_eq!(loss.id, loss2.id);

        let winner = ledger.balance(a).unwrap();
        let loser = ledger.balance(b).unwrap();
        assert_eq!(winner.available, 6600);
        assert_eq!(winner.escrowed, 0);
        assert_eq!(loser.available, 3000);
        assert_eq!(loser.escrowed, 0);
    }
}
