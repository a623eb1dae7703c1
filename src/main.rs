// wagermatch - Main Entry Point
// Head-to-head wagering engine: matchmaking, escrow, settlement, disputes

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod errors;
mod escrow;
mod handlers;
mod ledger;
mod matchmaking;
mod models;
mod result_source;
mod routes;
mod sweeper;
mod wager;

use app_state::{ApiContext, AppState, SharedState};
use config::Config;
use handlers::*;
use result_source::ResultClient;
use routes::accounts::{
    get_balance, get_stats, get_transactions, record_deposit, record_withdrawal,
    register_account,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let addr = SocketAddr::new(config.host.parse().expect("invalid HOST"), config.port);
    let sweep_interval = std::time::Duration::from_secs(config.sweep_interval_secs);

    // Initialize application state, restoring any snapshot
    let results = Arc::new(ResultClient::from_config(&config));
    let mut app_state = AppState::new(config);
    match app_state.load_from_disk() {
        Ok(()) => tracing::info!("restored persisted state from disk"),
        Err(_) => tracing::info!("no persisted state found, starting fresh"),
    }

    let state: SharedState = Arc::new(Mutex::new(app_state));
    let ctx = ApiContext { state: state.clone(), results };

    // Background deadline sweeper
    let _sweeper = sweeper::spawn(state.clone(), sweep_interval);

    // Build router with all endpoints
    let app = Router::new()
        // ===== ACCOUNT ENDPOINTS =====
        .route("/accounts", post(register_account))
        .route("/accounts/:id/balance", get(get_balance))
        .route("/accounts/:id/transactions", get(get_transactions))
        .route("/accounts/:id/stats", get(get_stats))
        .route("/accounts/:id/deposits", post(record_deposit))
        .route("/accounts/:id/withdrawals", post(record_withdrawal))
        .route("/accounts/:id/wagers", get(list_account_wagers))
        // ===== MATCHMAKING ENDPOINTS =====
        .route("/queue/join", post(join_queue))
        .route("/queue/leave", post(leave_queue))
        .route("/queue/status/:id", get(queue_status))
        // ===== WAGER ENDPOINTS =====
        .route("/wagers/:id", get(get_wager))
        .route("/wagers/:id/result", post(report_result))
        .route("/wagers/:id/dispute", post(raise_dispute))
        .route("/wagers/:id/dispute/resolve", post(resolve_dispute))
        // ===== HEALTH CHECK =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // Apply CORS and state
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(ctx);

    println!("wagermatch engine listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    // Snapshot state on shutdown so queue places survive the restart
    let shutdown_state = state.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");

        tracing::info!("shutdown signal received, saving state");
        if let Ok(app_state) = shutdown_state.lock() {
            if let Err(e) = app_state.save_to_disk() {
                tracing::error!(error = %e, "failed to save state");
            } else {
                tracing::info!("state saved");
            }
        }
        std::process::exit(0);
    });

    axum::serve(listener, app).await.unwrap();
}
