// ============================================================================
// Wager Lifecycle - wagermatch
// ============================================================================
//
// The wager record and its state machine:
//
//   active -> completed   (verified result before expiry)
//   active -> cancelled   (expiry with no result; reason "expired")
//   active -> disputed    (participant dispute before expiry)
//   disputed -> completed (resolver decision: winner or draw)
//   disputed -> cancelled (resolver void, or dispute deadline default)
//
// Transitions are compare-and-set on (status, version): a caller holding a
// stale version loses with the retryable ConcurrentModification error.
// Wagers are never deleted, only transitioned to a terminal status.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::EngineError;

/// Cancellation reason recorded when a wager expires with no result
pub const CANCEL_REASON_EXPIRED: &str = "expired";

/// Cancellation reason for the dispute-deadline default
pub const CANCEL_REASON_DISPUTE_TIMEOUT: &str = "dispute_timeout";

/// Cancellation reason for an explicit void decision
pub const CANCEL_REASON_VOID: &str = "void";

/// Wager status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Active,
    Disputed,
    Completed,
    Cancelled,
}

impl WagerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WagerStatus::Completed | WagerStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Active => "active",
            WagerStatus::Disputed => "disputed",
            WagerStatus::Completed => "completed",
            WagerStatus::Cancelled => "cancelled",
        }
    }
}

/// A paired wager with both stakes reserved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: Uuid,

    // Participant identities; opaque keys resolved through the ledger
    pub player1_id: Uuid,
    pub player2_id: Uuid,

    // External game handles used by the result source
    pub player1_tag: String,
    pub player2_tag: String,

    /// Equal stake per participant, minor units
    pub bet_amount: u64,

    pub status: WagerStatus,
    pub winner_id: Option<Uuid>,

    /// Observed time of the external match, once known
    pub event_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    pub cancellation_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub dispute_deadline: Option<DateTime<Utc>>,

    /// Optimistic-lock counter, bumped on every transition
    pub version: u64,
}

impl Wager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        player1_id: Uuid,
        player1_tag: String,
        player2_id: Uuid,
        player2_tag: String,
        bet_amount: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player1_id,
            player2_id,
            player1_tag,
            player2_tag,
            bet_amount,
            status: WagerStatus::Active,
            winner_id: None,
            event_time: None,
            created_at,
            expires_at,
            completed_at: None,
            cancellation_reason: None,
            dispute_reason: None,
            dispute_deadline: None,
            version: 0,
        }
    }

    pub fn is_participant(&self, account_id: Uuid) -> bool {
        self.player1_id == account_id || self.player2_id == account_id
    }

    pub fn opponent_of(&self, account_id: Uuid) -> Option<Uuid> {
        if account_id == self.player1_id {
            Some(self.player2_id)
        } else if account_id == self.player2_id {
            Some(self.player1_id)
        } else {
            None
        }
    }

    /// Resolve an external handle to the participant it belongs to.
    pub fn account_for_tag(&self, tag: &str) -> Option<Uuid> {
        if tag == self.player1_tag {
            Some(self.player1_id)
        } else if tag == self.player2_tag {
            Some(self.player2_id)
        } else {
            None
        }
    }

    fn guard_version(&self, expected: Option<u64>) -> Result<(), EngineError> {
        match expected {
            Some(v) if v != self.version => Err(EngineError::ConcurrentModification {
                entity: format!("wager {}", self.id),
            }),
            _ => Ok(()),
        }
    }

    /// active -> disputed. Only before expiry; result reporting is
    /// suspended once this succeeds.
    pub fn mark_disputed(
        &mut self,
        reason: &str,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<(), EngineError> {
        self.guard_version(expected_version)?;
        match self.status {
            WagerStatus::Active => {
                if now >= self.expires_at {
                    return Err(EngineError::MatchExpired { wager_id: self.id });
                }
                self.status = WagerStatus::Disputed;
                self.dispute_reason = Some(reason.to_string());
                self.dispute_deadline = Some(deadline);
                self.version += 1;
                Ok(())
            }
            WagerStatus::Disputed => Err(EngineError::ConcurrentModification {
                entity: format!("wager {}", self.id),
            }),
            _ => Err(EngineError::MatchExpired { wager_id: self.id }),
        }
    }

    /// active/disputed -> completed. A result-driven completion (from
    /// `active`) must beat the expiry deadline; a dispute decision may
    /// complete the wager at any time.
    pub fn mark_completed(
        &mut self,
        winner_id: Option<Uuid>,
        event_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<(), EngineError> {
        self.guard_version(expected_version)?;
        match self.status {
            WagerStatus::Active => {
                if now >= self.expires_at {
                    return Err(EngineError::MatchExpired { wager_id: self.id });
                }
            }
            WagerStatus::Disputed => {}
            _ => return Err(EngineError::SettlementConflict { wager_id: self.id }),
        }

        self.status = WagerStatus::Completed;
        self.winner_id = winner_id;
        self.event_time = event_time;
        self.completed_at = Some(now);
        self.version += 1;
        Ok(())
    }

    /// active/disputed -> cancelled with a recorded reason.
    pub fn mark_cancelled(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<(), EngineError> {
        self.guard_version(expected_version)?;
        if self.status.is_terminal() {
            return Err(EngineError::SettlementConflict { wager_id: self.id });
        }

        self.status = WagerStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_string());
        self.completed_at = Some(now);
        self.version += 1;
        Ok(())
    }
}

// ============================================================================
// WAGER BOOK
// ============================================================================

/// All wagers, with a per-account index
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WagerBook {
    wagers: HashMap<Uuid, Wager>,
    by_account: HashMap<Uuid, Vec<Uuid>>,
}

impl WagerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, wager: Wager) {
        self.by_account
            .entry(wager.player1_id)
            .or_default()
            .push(wager.id);
        self.by_account
            .entry(wager.player2_id)
            .or_default()
            .push(wager.id);
        self.wagers.insert(wager.id, wager);
    }

    pub fn get(&self, wager_id: Uuid) -> Result<&Wager, EngineError> {
        self.wagers
            .get(&wager_id)
            .ok_or(EngineError::WagerNotFound { wager_id })
    }

    pub fn get_mut(&mut self, wager_id: Uuid) -> Result<&mut Wager, EngineError> {
        self.wagers
            .get_mut(&wager_id)
            .ok_or(EngineError::WagerNotFound { wager_id })
    }

    /// Wagers involving an account, newest first.
    pub fn for_account(&self, account_id: Uuid) -> Vec<&Wager> {
        let mut list: Vec<&Wager> = self
            .by_account
            .get(&account_id)
            .map(|ids| ids.iter().filter_map(|id| self.wagers.get(id)).collect())
            .unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Active wagers whose expiry deadline has passed.
    pub fn active_past_expiry(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.wagers
            .values()
            .filter(|w| w.status == WagerStatus::Active && now >= w.expires_at)
            .map(|w| w.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wager> {
        self.wagers.values()
    }

    pub fn len(&self) -> usize {
        self.wagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wagers.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_wager(now: DateTime<Utc>) -> Wager {
        Wager::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "#PLAYER1".to_string(),
            Uuid::new_v4(),
            "#PLAYER2".to_string(),
            2000,
            now,
            now + Duration::minutes(10),
        )
    }

    #[test]
    fn test_complete_before_expiry() {
        let now = Utc::now();
        let mut wager = test_wager(now);
        let winner = wager.player1_id;

        wager
            .mark_completed(Some(winner), Some(now), now + Duration::minutes(5), None)
            .unwrap();
        assert_eq!(wager.status, WagerStatus::Completed);
        assert_eq!(wager.winner_id, Some(winner));
        assert!(wager.completed_at.is_some());
        assert_eq!(wager.version, 1);
    }

    #[test]
    fn test_result_after_expiry_rejected() {
        let now = Utc::now();
        let mut wager = test_wager(now);
        let winner = wager.player1_id;

        let err = wager
            .mark_completed(Some(winner), None, now + Duration::minutes(11), None)
            .unwrap_err();
        assert_eq!(err, EngineError::MatchExpired { wager_id: wager.id });
        assert_eq!(wager.status, WagerStatus::Active);
    }

    #[test]
    fn test_dispute_suspends_then_resolves() {
        let now = Utc::now();
        let mut wager = test_wager(now);

        wager
            .mark_disputed("opponent never played", now + Duration::hours(24), now, None)
            .unwrap();
        assert_eq!(wager.status, WagerStatus::Disputed);

        // Dispute decisions may land past the match expiry
        wager
            .mark_completed(Some(wager.player2_id), None, now + Duration::minutes(30), None)
            .unwrap();
        assert_eq!(wager.status, WagerStatus::Completed);
    }

    #[test]
    fn test_dispute_after_expiry_rejected() {
        let now = Utc::now();
        let mut wager = test_wager(now);
        let err = wager
            .mark_disputed("too late", now + Duration::hours(24), now + Duration::minutes(10), None)
            .unwrap_err();
        assert_eq!(err, EngineError::MatchExpired { wager_id: wager.id });
    }

    #[test]
    fn test_terminal_states_are_final() {
        let now = Utc::now();
        let mut wager = test_wager(now);
        wager.mark_cancelled(CANCEL_REASON_EXPIRED, now, None).unwrap();

        assert!(wager.status.is_terminal());
        assert!(matches!(
            wager.mark_cancelled("again", now, None),
            Err(EngineError::SettlementConflict { .. })
        ));
        assert!(matches!(
            wager.mark_completed(None, None, now, None),
            Err(EngineError::SettlementConflict { .. })
        ));
    }

    #[test]
    fn test_stale_version_loses() {
        let now = Utc::now();
        let mut wager = test_wager(now);
        let stale = wager.version;

        wager
            .mark_disputed("first caller", now + Duration::hours(24), now, Some(stale))
            .unwrap();

        // A second caller that read version 0 must fail retryably
        let err = wager
            .mark_cancelled(CANCEL_REASON_EXPIRED, now, Some(stale))
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_tag_resolution() {
        let now = Utc::now();
        let wager = test_wager(now);
        assert_eq!(wager.account_for_tag("#PLAYER1"), Some(wager.player1_id));
        assert_eq!(wager.account_for_tag("#PLAYER2"), Some(wager.player2_id));
        assert_eq!(wager.account_for_tag("#UNKNOWN"), None);
        assert_eq!(wager.opponent_of(wager.player1_id), Some(wager.player2_id));
    }

    #[test]
    fn test_book_indexes_both_players() {
        let now = Utc::now();
        let wager = test_wager(now);
        let (p1, p2, id) = (wager.player1_id, wager.player2_id, wager.id);

        let mut book = WagerBook::new();
        book.insert(wager);

        assert_eq!(book.for_account(p1).len(), 1);
        assert_eq!(book.for_account(p2).len(), 1);
        assert!(book.get(id).is_ok());
        assert_eq!(book.active_past_expiry(now + Duration::minutes(11)), vec![id]);
        assert!(book.active_past_expiry(now).is_empty());
    }
}
