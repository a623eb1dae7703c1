// Data models for the wagermatch API
//
// Money crosses the boundary as major-unit floats; everything internal is
// minor units. Conversions live in ledger::minor_from_major and friends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::{AccountProfile, AccountStats};
use crate::errors::EngineError;
use crate::ledger::{major_from_minor, signed_major_from_minor, AccountBalance, Transaction};
use crate::wager::{SettlementReport, Wager, WagerOutcome};

// ===== ERROR ENVELOPE =====

/// `{"error": {"code", "message", "details"}}` on every failure
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn from_engine(err: &EngineError) -> Self {
        let details = match err {
            EngineError::InsufficientFunds { available, required } => Some(json!({
                "available": major_from_minor(*available),
                "required": major_from_minor(*required),
            })),
            EngineError::InvalidStakeBounds { stake, min, max } => Some(json!({
                "stake": major_from_minor(*stake),
                "min": major_from_minor(*min),
                "max": major_from_minor(*max),
            })),
            EngineError::MatchExpired { wager_id }
            | EngineError::SettlementConflict { wager_id }
            | EngineError::WagerNotFound { wager_id }
            | EngineError::DisputeNotFound { wager_id } => {
                Some(json!({ "wager_id": wager_id }))
            }
            EngineError::AccountNotFound { account_id }
            | EngineError::AccountHalted { account_id }
            | EngineError::AlreadyPaired { account_id }
            | EngineError::NotInQueue { account_id } => {
                Some(json!({ "account_id": account_id }))
            }
            EngineError::TagAlreadyLinked { player_tag } => {
                Some(json!({ "player_tag": player_tag }))
            }
            _ => None,
        };

        Self {
            error: ErrorDetail {
                code: err.code(),
                message: err.to_string(),
                retryable: err.is_retryable(),
                details,
            },
        }
    }
}

// ===== ACCOUNTS =====

#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub username: String,
    pub player_tag: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: Uuid,
    pub username: String,
    pub player_tag: String,
    pub created_at: DateTime<Utc>,
}

impl From<&AccountProfile> for AccountResponse {
    fn from(p: &AccountProfile) -> Self {
        Self {
            account_id: p.account_id,
            username: p.username.clone(),
            player_tag: p.player_tag.clone(),
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub available: f64,
    pub escrowed: f64,
    pub balance: f64,
    pub lifetime_deposited: f64,
    pub lifetime_withdrawn: f64,
    pub lifetime_wagered: f64,
    pub lifetime_won: f64,
}

impl From<&AccountBalance> for BalanceResponse {
    fn from(b: &AccountBalance) -> Self {
        Self {
            account_id: b.account_id,
            available: major_from_minor(b.available),
            escrowed: major_from_minor(b.escrowed),
            balance: major_from_minor(b.total()),
            lifetime_deposited: major_from_minor(b.lifetime_deposited),
            lifetime_withdrawn: major_from_minor(b.lifetime_withdrawn),
            lifetime_wagered: major_from_minor(b.lifetime_wagered),
            lifetime_won: major_from_minor(b.lifetime_won),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: f64,
    /// Payment-provider reference for the settled charge
    pub provider_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: f64,
    pub provider_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub kind: String,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub wager_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            kind: tx.kind.as_str().to_string(),
            amount: signed_major_from_minor(tx.amount),
            balance_before: major_from_minor(tx.balance_before),
            balance_after: major_from_minor(tx.balance_after),
            wager_id: tx.wager_id,
            status: tx.status.as_str().to_string(),
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_matches: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub lifetime_wagered: f64,
    pub lifetime_won: f64,
}

impl From<&AccountStats> for StatsResponse {
    fn from(s: &AccountStats) -> Self {
        Self {
            total_matches: s.total_matches,
            wins: s.wins,
            losses: s.losses,
            win_rate: s.win_rate,
            lifetime_wagered: major_from_minor(s.lifetime_wagered),
            lifetime_won: major_from_minor(s.lifetime_won),
        }
    }
}

// ===== MATCHMAKING =====

#[derive(Debug, Deserialize)]
pub struct JoinQueueRequest {
    pub account_id: Uuid,
    pub stake: f64,
}

#[derive(Debug, Serialize)]
pub struct JoinQueueResponse {
    pub position: usize,
    pub estimated_wait_secs: i64,
    /// Present when the join immediately completed a pair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wager: Option<WagerResponse>,
}

#[derive(Debug, Deserialize)]
pub struct LeaveQueueRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub in_queue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waited_secs: Option<i64>,
}

// ===== WAGERS =====

#[derive(Debug, Serialize)]
pub struct WagerResponse {
    pub wager_id: Uuid,
    pub player1_id: Uuid,
    pub player2_id: Uuid,
    pub player1_tag: String,
    pub player2_tag: String,
    pub bet_amount: f64,
    pub status: String,
    pub winner_id: Option<Uuid>,
    pub event_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub dispute_reason: Option<String>,
}

impl From<&Wager> for WagerResponse {
    fn from(w: &Wager) -> Self {
        Self {
            wager_id: w.id,
            player1_id: w.player1_id,
            player2_id: w.player2_id,
            player1_tag: w.player1_tag.clone(),
            player2_tag: w.player2_tag.clone(),
            bet_amount: major_from_minor(w.bet_amount),
            status: w.status.as_str().to_string(),
            winner_id: w.winner_id,
            event_time: w.event_time,
            created_at: w.created_at,
            expires_at: w.expires_at,
            completed_at: w.completed_at,
            cancellation_reason: w.cancellation_reason.clone(),
            dispute_reason: w.dispute_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub wager_id: Uuid,
    pub outcome: String,
    pub winner_id: Option<Uuid>,
    pub payout: Option<f64>,
    pub fee: f64,
    pub settled_at: DateTime<Utc>,
}

impl From<&SettlementReport> for SettlementResponse {
    fn from(r: &SettlementReport) -> Self {
        let (outcome, winner_id) = match r.outcome {
            WagerOutcome::Winner { account_id } => ("winner", Some(account_id)),
            WagerOutcome::Draw => ("draw", None),
            WagerOutcome::Void => ("void", None),
        };
        Self {
            wager_id: r.wager_id,
            outcome: outcome.to_string(),
            winner_id,
            payout: r.payout.map(major_from_minor),
            fee: major_from_minor(r.fee),
            settled_at: r.settled_at,
        }
    }
}

// ===== DISPUTES =====

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub account_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct DisputeResponse {
    pub wager_id: Uuid,
    pub raised_by: Uuid,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Operator decision for a disputed wager
#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    /// "winner" | "draw" | "void"
    pub decision: String,
    pub winner_id: Option<Uuid>,
}

impl ResolveDisputeRequest {
    pub fn outcome(&self) -> Result<WagerOutcome, EngineError> {
        match self.decision.as_str() {
            "winner" => {
                let account_id =
                    self.winner_id.ok_or_else(|| EngineError::VerificationFailed {
                        reason: "decision 'winner' requires winner_id".to_string(),
                    })?;
                Ok(WagerOutcome::Winner { account_id })
            }
            "draw" => Ok(WagerOutcome::Draw),
            "void" => Ok(WagerOutcome::Void),
            other => Err(EngineError::VerificationFailed {
                reason: format!("unknown decision '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_request_outcome_parsing() {
        let winner = Uuid::new_v4();
        let req = ResolveDisputeRequest { decision: "winner".into(), winner_id: Some(winner) };
        assert_eq!(req.outcome().unwrap(), WagerOutcome::Winner { account_id: winner });

        let req = ResolveDisputeRequest { decision: "void".into(), winner_id: None };
        assert_eq!(req.outcome().unwrap(), WagerOutcome::Void);

        let req = ResolveDisputeRequest { decision: "winner".into(), winner_id: None };
        assert!(req.outcome().is_err());

        let req = ResolveDisputeRequest { decision: "coinflip".into(), winner_id: None };
        assert!(req.outcome().is_err());
    }

    #[test]
    fn test_error_body_carries_code_and_details() {
        let err = EngineError::InsufficientFunds { available: 500, required: 1000 };
        let body = ErrorBody::from_engine(&err);
        assert_eq!(body.error.code, "INSUFFICIENT_FUNDS");
        let details = body.error.details.unwrap();
        assert_eq!(details["available"], 5.0);
        assert_eq!(details["required"], 10.0);
    }
}
