// HTTP request handlers for the wagermatch API
//
// Handlers lock the shared state for exactly one engine operation. The
// result-source fetch happens outside the lock; the wager version captured
// before the fetch turns a racing sweep into a clean retryable conflict.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::ApiContext;
use crate::errors::EngineError;
use crate::ledger::minor_from_major;
use crate::models::*;
use crate::result_source::ReportedResult;
use crate::wager::WagerStatus;

/// Map an engine error onto an HTTP status plus the error envelope.
pub fn engine_error(err: EngineError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        EngineError::InsufficientFunds { .. }
        | EngineError::InvalidStakeBounds { .. }
        | EngineError::InvalidAmount { .. }
        | EngineError::VerificationFailed { .. } => StatusCode::BAD_REQUEST,

        EngineError::MatchExpired { .. } => StatusCode::GONE,

        EngineError::AlreadyPaired { .. }
        | EngineError::TagAlreadyLinked { .. }
        | EngineError::ConcurrentModification { .. }
        | EngineError::SettlementConflict { .. } => StatusCode::CONFLICT,

        EngineError::NotInQueue { .. }
        | EngineError::AccountNotFound { .. }
        | EngineError::WagerNotFound { .. }
        | EngineError::DisputeNotFound { .. } => StatusCode::NOT_FOUND,

        EngineError::AccountHalted { .. } | EngineError::LedgerCorruption { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }

        EngineError::ResultSourceUnavailable { .. } => StatusCode::BAD_GATEWAY,
    };

    (status, Json(ErrorBody::from_engine(&err)))
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

// ===== MATCHMAKING ENDPOINTS =====

pub async fn join_queue(
    State(ctx): State<ApiContext>,
    Json(payload): Json<JoinQueueRequest>,
) -> ApiResult<JoinQueueResponse> {
    let stake = minor_from_major(payload.stake).map_err(engine_error)?;

    let mut state = ctx.state.lock().unwrap();
    let outcome = state
        .join_queue(payload.account_id, stake, Utc::now())
        .map_err(engine_error)?;

    Ok(Json(JoinQueueResponse {
        position: outcome.position,
        estimated_wait_secs: outcome.estimated_wait_secs,
        wager: outcome.wager.as_ref().map(WagerResponse::from),
    }))
}

pub async fn leave_queue(
    State(ctx): State<ApiContext>,
    Json(payload): Json<LeaveQueueRequest>,
) -> Json<Value> {
    let mut state = ctx.state.lock().unwrap();
    let removed = state.leave_queue(payload.account_id).is_some();
    Json(json!({ "success": true, "removed": removed }))
}

pub async fn queue_status(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
) -> Json<QueueStatusResponse> {
    let state = ctx.state.lock().unwrap();
    match state.queue_status(account_id) {
        Ok((stake, position, joined_at)) => Json(QueueStatusResponse {
            in_queue: true,
            stake: Some(crate::ledger::major_from_minor(stake)),
            position: Some(position),
            waited_secs: Some((Utc::now() - joined_at).num_seconds()),
        }),
        Err(_) => Json(QueueStatusResponse {
            in_queue: false,
            stake: None,
            position: None,
            waited_secs: None,
        }),
    }
}

// ===== WAGER ENDPOINTS =====

pub async fn get_wager(
    State(ctx): State<ApiContext>,
    Path(wager_id): Path<Uuid>,
) -> ApiResult<WagerResponse> {
    let state = ctx.state.lock().unwrap();
    let wager = state.wagers.get(wager_id).map_err(engine_error)?;
    Ok(Json(WagerResponse::from(wager)))
}

pub async fn list_account_wagers(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Value> {
    let state = ctx.state.lock().unwrap();
    state.profile(account_id).map_err(engine_error)?;

    let wagers: Vec<WagerResponse> = state
        .wagers
        .for_account(account_id)
        .into_iter()
        .map(WagerResponse::from)
        .collect();

    Ok(Json(json!({ "total": wagers.len(), "wagers": wagers })))
}

/// Ask the result source for a verified outcome and settle on it. One
/// authoritative call per attempt; "no result yet" leaves the wager
/// untouched.
pub async fn report_result(
    State(ctx): State<ApiContext>,
    Path(wager_id): Path<Uuid>,
) -> ApiResult<Value> {
    let (tag1, tag2, window_start, window_end, version) = {
        let state = ctx.state.lock().unwrap();
        let wager = state.wagers.get(wager_id).map_err(engine_error)?;
        if wager.status != WagerStatus::Active {
            return Err(engine_error(match wager.status {
                WagerStatus::Disputed => EngineError::VerificationFailed {
                    reason: "result reporting is suspended while the wager is disputed"
                        .to_string(),
                },
                _ => EngineError::SettlementConflict { wager_id },
            }));
        }
        (
            wager.player1_tag.clone(),
            wager.player2_tag.clone(),
            wager.created_at,
            wager.expires_at,
            wager.version,
        )
    };

    let result = ctx
        .results
        .fetch_result(&tag1, &tag2, window_start, window_end)
        .await
        .map_err(engine_error)?;

    if result == ReportedResult::NoResult {
        return Ok(Json(json!({ "status": "pending", "wager_id": wager_id })));
    }

    let report = {
        let mut state = ctx.state.lock().unwrap();
        state
            .apply_result(wager_id, &result, Utc::now(), Some(version))
            .map_err(engine_error)?
    };

    Ok(Json(json!({
        "status": "settled",
        "settlement": SettlementResponse::from(&report),
    })))
}

// ===== DISPUTE ENDPOINTS =====

pub async fn raise_dispute(
    State(ctx): State<ApiContext>,
    Path(wager_id): Path<Uuid>,
    Json(payload): Json<DisputeRequest>,
) -> ApiResult<DisputeResponse> {
    let mut state = ctx.state.lock().unwrap();
    let ticket = state
        .raise_dispute(wager_id, payload.account_id, &payload.reason, Utc::now())
        .map_err(engine_error)?;

    Ok(Json(DisputeResponse {
        wager_id: ticket.wager_id,
        raised_by: ticket.raised_by,
        reason: ticket.reason,
        raised_at: ticket.raised_at,
        deadline: ticket.deadline,
    }))
}

pub async fn resolve_dispute(
    State(ctx): State<ApiContext>,
    Path(wager_id): Path<Uuid>,
    Json(payload): Json<ResolveDisputeRequest>,
) -> ApiResult<SettlementResponse> {
    let outcome = payload.outcome().map_err(engine_error)?;

    let mut state = ctx.state.lock().unwrap();
    let report = state
        .resolve_dispute(wager_id, outcome, Utc::now())
        .map_err(engine_error)?;

    Ok(Json(SettlementResponse::from(&report)))
}

// ===== HEALTH =====

pub async fn health_check(State(ctx): State<ApiContext>) -> Json<Value> {
    let state = ctx.state.lock().unwrap();
    Json(json!({
        "status": "ok",
        "accounts": state.profiles.len(),
        "open_wagers": state.wagers.iter().filter(|w| !w.status.is_terminal()).count(),
        "queue_depth": state.queue.len(),
    }))
}
