// ============================================================================
// Matchmaking Queue - wagermatch
// ============================================================================
//
// Waiting players partitioned into stake buckets, FIFO within a bucket.
// Pairing pops the two oldest entries of the first bucket holding at least
// two. No funds are reserved while waiting; reservation happens at pairing
// time, so eviction never needs a refund.
//
// Exclusivity: the queue is only ever touched under the engine's state
// lock, so a popped entry belongs to exactly one caller.
//
// ============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

use crate::errors::EngineError;

/// A waiting player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub account_id: Uuid,

    /// Requested stake in minor units; also the bucket key
    pub stake: u64,

    pub joined_at: DateTime<Utc>,
}

/// Stake-bucketed FIFO queue
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MatchmakingQueue {
    /// stake -> waiting entries, oldest first
    buckets: BTreeMap<u64, VecDeque<QueueEntry>>,

    /// account -> stake bucket currently waited in
    waiting: HashMap<Uuid, u64>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an account into the bucket for `stake`. Returns the 1-based
    /// position within the bucket. A second join while waiting is rejected.
    pub fn push(
        &mut self,
        account_id: Uuid,
        stake: u64,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        if self.waiting.contains_key(&account_id) {
            return Err(EngineError::AlreadyPaired { account_id });
        }

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            account_id,
            stake,
            joined_at: now,
        };

        let bucket = self.buckets.entry(stake).or_default();
        bucket.push_back(entry);
        self.waiting.insert(account_id, stake);
        Ok(bucket.len())
    }

    /// Remove a waiting entry. Returns None when the account is not
    /// waiting (already paired, evicted, or never joined) - a no-op.
    pub fn leave(&mut self, account_id: Uuid) -> Option<QueueEntry> {
        let stake = self.waiting.remove(&account_id)?;
        let bucket = self.buckets.get_mut(&stake)?;
        let idx = bucket.iter().position(|e| e.account_id == account_id)?;
        let entry = bucket.remove(idx);
        if bucket.is_empty() {
            self.buckets.remove(&stake);
        }
        entry
    }

    /// Current bucket position and wait time for a waiting account.
    pub fn status(&self, account_id: Uuid) -> Result<(u64, usize, DateTime<Utc>), EngineError> {
        let stake = *self
            .waiting
            .get(&account_id)
            .ok_or(EngineError::NotInQueue { account_id })?;
        let bucket = self
            .buckets
            .get(&stake)
            .ok_or(EngineError::NotInQueue { account_id })?;
        let pos = bucket
            .iter()
            .position(|e| e.account_id == account_id)
            .ok_or(EngineError::NotInQueue { account_id })?;
        Ok((stake, pos + 1, bucket[pos].joined_at))
    }

    /// Pop the two oldest entries of the first bucket with at least two
    /// waiters. The caller owns the popped entries: it must either create a
    /// wager for them or put survivors back via `requeue_front`.
    pub fn try_pair(&mut self) -> Option<(QueueEntry, QueueEntry)> {
        let stake = *self
            .buckets
            .iter()
            .find(|(_, bucket)| bucket.len() >= 2)
            .map(|(stake, _)| stake)?;

        let bucket = self.buckets.get_mut(&stake)?;
        let first = bucket.pop_front()?;
        let second = bucket.pop_front()?;
        if bucket.is_empty() {
            self.buckets.remove(&stake);
        }

        self.waiting.remove(&first.account_id);
        self.waiting.remove(&second.account_id);
        Some((first, second))
    }

    /// Return a survivor of a failed pairing to the head of its bucket,
    /// preserving its original enqueue time.
    pub fn requeue_front(&mut self, entry: QueueEntry) {
        self.waiting.insert(entry.account_id, entry.stake);
        self.buckets.entry(entry.stake).or_default().push_front(entry);
    }

    /// Evict entries that have waited longer than `max_wait`.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_wait: Duration) -> Vec<QueueEntry> {
        let cutoff = now - max_wait;
        let mut evicted = Vec::new();

        let stakes: Vec<u64> = self.buckets.keys().copied().collect();
        for stake in stakes {
            if let Some(bucket) = self.buckets.get_mut(&stake) {
                while bucket
                    .front()
                    .map(|e| e.joined_at <= cutoff)
                    .unwrap_or(false)
                {
                    // FIFO: once the head is fresh enough, the rest are too
                    let entry = bucket.pop_front().unwrap();
                    self.waiting.remove(&entry.account_id);
                    evicted.push(entry);
                }
                if bucket.is_empty() {
                    self.buckets.remove(&stake);
                }
            }
        }

        evicted
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================
