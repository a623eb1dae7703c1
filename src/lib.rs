/// wagermatch - head-to-head wagering engine
/// Exports all modules for use as a library crate

pub mod app_state;
pub mod config;
pub mod errors;
pub mod escrow;
pub mod handlers;
pub mod ledger;
pub mod matchmaking;
pub mod models;
pub mod result_source;
pub mod routes;
pub mod sweeper;
pub mod wager;

pub use app_state::{
    AccountProfile, AccountStats, ApiContext, AppState, JoinOutcome, SharedState, SweepSummary,
};
pub use config::Config;
pub use errors::EngineError;
pub use escrow::{EscrowLedger, EscrowOp};
pub use ledger::{
    major_from_minor, minor_from_major, signed_major_from_minor, AccountBalance, Ledger,
    Transaction, TxKind, TxMeta, TxStatus,
};
pub use matchmaking::{MatchmakingQueue, QueueEntry};
pub use result_source::{ReportedResult, ResultClient};
pub use wager::{
    DisputeResolver, DisputeTicket, SettlementEngine, SettlementReport, Wager, WagerBook,
    WagerOutcome, WagerStatus,
};
