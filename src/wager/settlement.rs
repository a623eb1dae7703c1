// ============================================================================
// Settlement Engine - wagermatch
// ============================================================================
//
// Turns a decided outcome into fund movements:
//
//   winner  -> payout = 2 x stake x (1 - fee), one win entry for the
//              winner, one loss entry for the loser; the fee differential
//              accrues to the platform fee pool
//   draw    -> both stakes refunded, wager completed with no winner
//   void    -> both stakes refunded, wager cancelled
//
// Settlement is idempotent: re-settling a terminal wager with the same
// outcome returns the recorded report; a different outcome is a
// SettlementConflict, logged and never applied.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::escrow::EscrowLedger;
use crate::ledger::Ledger;
use crate::wager::lifecycle::{Wager, CANCEL_REASON_VOID};

/// A decided outcome for a wager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WagerOutcome {
    Winner { account_id: Uuid },
    Draw,
    Void,
}

/// What a settlement did, kept for idempotent replays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub wager_id: Uuid,
    pub outcome: WagerOutcome,

    /// Winner's credit, minor units; None for draw/void
    pub payout: Option<u64>,

    /// Platform fee withheld from the pot
    pub fee: u64,

    pub transaction_ids: Vec<Uuid>,
    pub settled_at: DateTime<Utc>,
}

/// Computes payouts and applies them through the escrow ledger
#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementEngine {
    platform_fee_bps: u64,

    /// Platform revenue accumulated from winner fees; outside the
    /// participant account model
    pub fee_pool: u64,

    /// Terminal outcomes by wager, for idempotent replays
    settled: HashMap<Uuid, SettlementReport>,
}

impl SettlementEngine {
    pub fn new(platform_fee_bps: u64) -> Self {
        Self {
            platform_fee_bps,
            fee_pool: 0,
            settled: HashMap::new(),
        }
    }

    /// Winner's credit and the platform fee for a given stake.
    pub fn payout_for(&self, stake: u64) -> (u64, u64) {
        let pot = 2 * stake;
        let fee = pot * self.platform_fee_bps / 10_000;
        (pot - fee, fee)
    }

    pub fn report_for(&self, wager_id: Uuid) -> Option<&SettlementReport> {
        self.settled.get(&wager_id)
    }

    /// Apply `outcome` to a wager. `cancel_reason` is recorded when the
    /// outcome voids the wager (expiry, dispute default, explicit void).
    #[allow(clippy::too_many_arguments)]
    pub fn settle(
        &mut self,
        ledger: &mut Ledger,
        escrow: &mut EscrowLedger,
        wager: &mut Wager,
        outcome: WagerOutcome,
        cancel_reason: Option<&str>,
        event_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<SettlementReport, EngineError> {
        if wager.status.is_terminal() {
            return match self.settled.get(&wager.id) {
                Some(prev) if prev.outcome == outcome => Ok(prev.clone()),
                _ => {
                    tracing::warn!(
                        wager_id = %wager.id,
                        ?outcome,
                        "conflicting settlement attempt on terminal wager ignored"
                    );
                    Err(EngineError::SettlementConflict { wager_id: wager.id })
                }
            };
        }

        let stake = wager.bet_amount;
        let report = match outcome {
            WagerOutcome::Winner { account_id } => {
                let loser_id =
                    wager
                        .opponent_of(account_id)
                        .ok_or_else(|| EngineError::VerificationFailed {
                            reason: format!(
                                "winner {} is not a participant of wager {}",
                                account_id, wager.id
                            ),
                        })?;

                wager.mark_completed(Some(account_id), event_time, now, expected_version)?;

                let (payout, fee) = self.payout_for(stake);
                let (win_tx, loss_tx) = escrow.release_to_winner(
                    ledger, wager.id, account_id, loser_id, stake, payout, fee, now,
                )?;
                self.fee_pool += fee;

                SettlementReport {
                    wager_id: wager.id,
                    outcome,
                    payout: Some(payout),
                    fee,
                    transaction_ids: vec![win_tx.id, loss_tx.id],
                    settled_at: now,
                }
            }
            WagerOutcome::Draw => {
                wager.mark_completed(None, event_time, now, expected_version)?;
                let txs = self.refund_both(ledger, escrow, wager, "draw", now)?;

                SettlementReport {
                    wager_id: wager.id,
                    outcome,
                    payout: None,
                    fee: 0,
                    transaction_ids: txs,
                    settled_at: now,
                }
            }
            WagerOutcome::Void => {
                let reason = cancel_reason.unwrap_or(CANCEL_REASON_VOID);
                wager.mark_cancelled(reason, now, expected_version)?;
                let txs = self.refund_both(ledger, escrow, wager, reason, now)?;

                SettlementReport {
                    wager_id: wager.id,
                    outcome,
                    payout: None,
                    fee: 0,
                    transaction_ids: txs,
                    settled_at: now,
                }
            }
        };

        tracing::info!(
            wager_id = %wager.id,
            outcome = ?report.outcome,
            payout = ?report.payout,
            fee = report.fee,
            "wager settled"
        );

        self.settled.insert(wager.id, report.clone());
        Ok(report)
    }

    fn refund_both(
        &mut self,
        ledger: &mut Ledger,
        escrow: &mut EscrowLedger,
        wager: &Wager,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EngineError> {
        let tx1 = escrow.release_refund(
            ledger,
            wager.id,
            wager.player1_id,
            wager.bet_amount,
            reason,
            now,
        )?;
        let tx2 = escrow.release_refund(
            ledger,
            wager.id,
            wager.player2_id,
            wager.bet_amount,
            reason,
            now,
        )?;
        Ok(vec![tx1.id, tx2.id])
    }
}

// ============================================================================
// TESTS
// ============================================================================
