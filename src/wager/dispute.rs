// ============================================================================
// Dispute Resolver - wagermatch
// ============================================================================
//
// Holds disputed wagers until an authoritative decision arrives or the
// dispute deadline elapses. The default policy on an elapsed deadline is
// void: both participants refunded, wager cancelled.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::EngineError;

/// An open dispute awaiting a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeTicket {
    pub wager_id: Uuid,
    pub raised_by: Uuid,
    pub reason: String,
    pub raised_at: DateTime<Utc>,

    /// When the default void policy kicks in
    pub deadline: DateTime<Utc>,
}

/// Open disputes keyed by wager
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DisputeResolver {
    open: HashMap<Uuid, DisputeTicket>,
}

impl DisputeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a dispute for a wager. Raising a second dispute on the same
    /// wager returns the existing ticket unchanged.
    pub fn raise(
        &mut self,
        wager_id: Uuid,
        raised_by: Uuid,
        reason: &str,
        raised_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> DisputeTicket {
        self.open
            .entry(wager_id)
            .or_insert_with(|| DisputeTicket {
                wager_id,
                raised_by,
                reason: reason.to_string(),
                raised_at,
                deadline,
            })
            .clone()
    }

    pub fn get(&self, wager_id: Uuid) -> Result<&DisputeTicket, EngineError> {
        self.open
            .get(&wager_id)
            .ok_or(EngineError::DisputeNotFound { wager_id })
    }

    /// Close a dispute once a decision has been applied.
    pub fn close(&mut self, wager_id: Uuid) -> Result<DisputeTicket, EngineError> {
        self.open
            .remove(&wager_id)
            .ok_or(EngineError::DisputeNotFound { wager_id })
    }

    /// Disputes whose deadline has elapsed; candidates for the default
    /// void policy.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.open
            .values()
            .filter(|t| now >= t.deadline)
            .map(|t| t.wager_id)
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
