// ============================================================================
// Engine Errors - wagermatch
// ============================================================================
//
// Every recoverable failure the engine can surface at the request boundary,
// plus the fatal ledger-corruption condition. Each variant carries a stable
// uppercase code for API clients and knows whether a retry with fresh state
// can succeed.
//
// ============================================================================

use uuid::Uuid;

/// Engine-wide error type
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Requested debit exceeds the account's available funds
    InsufficientFunds { available: u64, required: u64 },

    /// Stake outside the configured min/max bet bounds
    InvalidStakeBounds { stake: u64, min: u64, max: u64 },

    /// Amount at the API boundary was negative, non-finite, or overflowed
    InvalidAmount { detail: String },

    /// Result or action arrived after the wager's deadline
    MatchExpired { wager_id: Uuid },

    /// Account already holds a queue place (or its entry was just claimed)
    AlreadyPaired { account_id: Uuid },

    /// Account has no waiting queue entry
    NotInQueue { account_id: Uuid },

    /// Optimistic-lock conflict; the caller should re-read and retry
    ConcurrentModification { entity: String },

    /// External result inconclusive, contradictory, or not applicable
    VerificationFailed { reason: String },

    /// Attempt to settle an already-terminal wager with a different outcome
    SettlementConflict { wager_id: Uuid },

    /// Player tag is already registered to another account
    TagAlreadyLinked { player_tag: String },

    AccountNotFound { account_id: Uuid },
    WagerNotFound { wager_id: Uuid },
    DisputeNotFound { wager_id: Uuid },

    /// Account frozen after detected corruption; operator intervention only
    AccountHalted { account_id: Uuid },

    /// Broken balance chain detected; the account has been halted
    LedgerCorruption { account_id: Uuid, detail: String },

    /// Transport failure toward the external result source
    ResultSourceUnavailable { detail: String },
}

impl EngineError {
    /// Stable uppercase code exposed in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::InvalidStakeBounds { .. } => "INVALID_STAKE_BOUNDS",
            EngineError::InvalidAmount { .. } => "INVALID_AMOUNT",
            EngineError::MatchExpired { .. } => "MATCH_EXPIRED",
            EngineError::AlreadyPaired { .. } => "ALREADY_PAIRED",
            EngineError::NotInQueue { .. } => "NOT_IN_QUEUE",
            EngineError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            EngineError::VerificationFailed { .. } => "VERIFICATION_FAILED",
            EngineError::SettlementConflict { .. } => "SETTLEMENT_CONFLICT",
            EngineError::TagAlreadyLinked { .. } => "TAG_ALREADY_LINKED",
            EngineError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            EngineError::WagerNotFound { .. } => "WAGER_NOT_FOUND",
            EngineError::DisputeNotFound { .. } => "DISPUTE_NOT_FOUND",
            EngineError::AccountHalted { .. } => "ACCOUNT_HALTED",
            EngineError::LedgerCorruption { .. } => "LEDGER_CORRUPTION",
            EngineError::ResultSourceUnavailable { .. } => "RESULT_SOURCE_UNAVAILABLE",
        }
    }

    /// Whether retrying the same operation with fresh state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification { .. }
                | EngineError::ResultSourceUnavailable { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InsufficientFunds { available, required } => {
                write!(f, "Insufficient funds: {} available, {} required", available, required)
            }
            EngineError::InvalidStakeBounds { stake, min, max } => {
                write!(f, "Stake {} outside bounds [{}, {}]", stake, min, max)
            }
            EngineError::InvalidAmount { detail } => write!(f, "Invalid amount: {}", detail),
            EngineError::MatchExpired { wager_id } => write!(f, "Wager {} has expired", wager_id),
            EngineError::AlreadyPaired { account_id } => {
                write!(f, "Account {} is already queued or paired", account_id)
            }
            EngineError::NotInQueue { account_id } => {
                write!(f, "Account {} is not in the queue", account_id)
            }
            EngineError::ConcurrentModification { entity } => {
                write!(f, "Concurrent modification of {}; retry with fresh state", entity)
            }
            EngineError::VerificationFailed { reason } => {
                write!(f, "Verification failed: {}", reason)
            }
            EngineError::SettlementConflict { wager_id } => {
                write!(f, "Wager {} already settled with a different outcome", wager_id)
            }
            EngineError::TagAlreadyLinked { player_tag } => {
                write!(f, "Player tag {} is linked to another account", player_tag)
            }
            EngineError::AccountNotFound { account_id } => {
                write!(f, "Account {} not found", account_id)
            }
            EngineError::WagerNotFound { wager_id } => write!(f, "Wager {} not found", wager_id),
            EngineError::DisputeNotFound { wager_id } => {
                write!(f, "No open dispute for wager {}", wager_id)
            }
            EngineError::AccountHalted { account_id } => {
                write!(f, "Account {} is halted pending operator review", account_id)
            }
            EngineError::LedgerCorruption { account_id, detail } => {
                write!(f, "Ledger corruption on account {}: {}", account_id, detail)
            }
            EngineError::ResultSourceUnavailable { detail } => {
                write!(f, "Result source unavailable: {}", detail)
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = EngineError::InsufficientFunds { available: 500, required: 1000 };
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::ConcurrentModification { entity: "wager".into() }.is_retryable());
        assert!(EngineError::ResultSourceUnavailable { detail: "timeout".into() }.is_retryable());
        assert!(!EngineError::MatchExpired { wager_id: Uuid::new_v4() }.is_retryable());
        assert!(!EngineError::InsufficientFunds { available: 0, required: 1 }.is_retryable());
    }
}
