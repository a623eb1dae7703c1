// Account routes for wagermatch
//
// Identity arrives verified from the session provider; these endpoints
// only record profiles and expose ledger reads plus the deposit/withdraw
// events the payment provider reports.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::ApiContext;
use crate::handlers::engine_error;
use crate::ledger::minor_from_major;
use crate::models::*;

/// POST /accounts
/// Register a participant with an external game handle.
pub async fn register_account(
    State(ctx): State<ApiContext>,
    Json(payload): Json<RegisterAccountRequest>,
) -> Result<Json<AccountResponse>, (StatusCode, Json<ErrorBody>)> {
    let mut state = ctx.state.lock().unwrap();
    let profile = state
        .register_account(&payload.username, &payload.player_tag, Utc::now())
        .map_err(engine_error)?;
    Ok(Json(AccountResponse::from(&profile)))
}

/// GET /accounts/:id/balance
pub async fn get_balance(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorBody>)> {
    let state = ctx.state.lock().unwrap();
    let balance = state.ledger.balance(account_id).map_err(engine_error)?;
    Ok(Json(BalanceResponse::from(balance)))
}

/// GET /accounts/:id/transactions
pub async fn get_transactions(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<ErrorBody>)> {
    let state = ctx.state.lock().unwrap();
    state.ledger.balance(account_id).map_err(engine_error)?;

    let transactions: Vec<TransactionResponse> = state
        .ledger
        .history(account_id)
        .into_iter()
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(json!({
        "total": transactions.len(),
        "transactions": transactions,
    })))
}

/// GET /accounts/:id/stats
pub async fn get_stats(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorBody>)> {
    let state = ctx.state.lock().unwrap();
    let stats = state.stats(account_id).map_err(engine_error)?;
    Ok(Json(StatsResponse::from(&stats)))
}

/// POST /accounts/:id/deposits
/// Record a deposit the payment provider settled.
pub async fn record_deposit(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<TransactionResponse>, (StatusCode, Json<ErrorBody>)> {
    let amount = minor_from_major(payload.amount).map_err(engine_error)?;

    let mut state = ctx.state.lock().unwrap();
    let tx = state
        .record_deposit(account_id, amount, payload.provider_ref, Utc::now())
        .map_err(engine_error)?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// POST /accounts/:id/withdrawals
/// Record a withdrawal for the payment provider to pay out.
pub async fn record_withdrawal(
    State(ctx): State<ApiContext>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<WithdrawRequest>,
) -> Result<Json<TransactionResponse>, (StatusCode, Json<ErrorBody>)> {
    let amount = minor_from_major(payload.amount).map_err(engine_error)?;

    let mut state = ctx.state.lock().unwrap();
    let tx = state
        .record_withdrawal(account_id, amount, payload.provider_ref, Utc::now())
        .map_err(engine_error)?;
    Ok(Json(TransactionResponse::from(&tx)))
}
