// ============================================================================
// Account Ledger - wagermatch
// ============================================================================
//
// The authoritative record of every balance-affecting event. Each account
// carries an available/escrowed split plus monotonic lifetime counters; each
// posting validates funds, mutates the two fields exactly once, and appends
// an immutable journal entry stamped with the total balance before/after.
//
// The balance_before/after chain is the corruption tripwire: if the journal
// tail disagrees with the live balance, the account is halted and every
// further mutation fails until an operator intervenes.
//
// All amounts are minor units (cents). Floating-point only exists at the
// API boundary, converted through the helpers at the bottom of this file.
//
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::errors::EngineError;

// ============================================================================
// TRANSACTION TYPES
// ============================================================================

/// Transaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
    BetPlaced,
    Win,
    Loss,
    Refund,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
            TxKind::BetPlaced => "bet_placed",
            TxKind::Win => "win",
            TxKind::Loss => "loss",
            TxKind::Refund => "refund",
        }
    }
}

/// Transaction status; the only legal mutation is pending -> completed/failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }
}

/// Structured per-kind transaction context (v1 schema). A closed enum
/// rather than a free-form blob; extend by adding variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxMeta {
    /// Payment-provider context for deposit/withdraw
    Payment { provider_ref: Option<String> },
    /// Stake context for bet_placed
    Stake { opponent_id: Uuid },
    /// Win settlement: stake released from the winner's own escrow and
    /// the platform fee withheld from the pot
    WinSettlement { stake_released: u64, fee: u64 },
    /// Loss settlement: stake consumed from the loser's escrow
    LossSettlement { stake_forfeited: u64 },
    /// Refund context
    Refund { reason: String },
}

/// An immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TxKind,

    /// Signed amount in minor units; the audited value of the event
    pub amount: i64,

    /// Total balance (available + escrowed) before/after posting
    pub balance_before: u64,
    pub balance_after: u64,

    /// Wager this entry belongs to, if any
    pub wager_id: Option<Uuid>,

    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub meta: Option<TxMeta>,
}

// ============================================================================
// ACCOUNT BALANCE
// ============================================================================

/// Per-account balance with lifetime audit counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: Uuid,

    /// Spendable funds
    pub available: u64,

    /// Funds locked in active wagers
    pub escrowed: u64,

    // Lifetime counters, monotonically non-decreasing
    pub lifetime_deposited: u64,
    pub lifetime_withdrawn: u64,
    pub lifetime_wagered: u64,
    pub lifetime_won: u64,

    /// Bumped on every posting
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl AccountBalance {
    pub fn new(account_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            available: 0,
            escrowed: 0,
            lifetime_deposited: 0,
            lifetime_withdrawn: 0,
            lifetime_wagered: 0,
            lifetime_won: 0,
            version: 0,
            updated_at: now,
        }
    }

    /// Total funds held for this account
    pub fn total(&self) -> u64 {
        self.available + self.escrowed
    }
}

/// How a posting maps onto the available/escrowed fields
#[derive(Debug, Clone, Copy)]
struct Movement {
    available: i64,
    escrowed: i64,
}

// ============================================================================
// LEDGER
// ============================================================================

/// Accounts plus the append-only transaction journal
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    accounts: HashMap<Uuid, AccountBalance>,
    transactions: Vec<Transaction>,

    /// Accounts frozen after detected corruption
    halted: HashSet<Uuid>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with a zero balance. Idempotent.
    pub fn open_account(&mut self, account_id: Uuid, now: DateTime<Utc>) -> &AccountBalance {
        self.accounts
            .entry(account_id)
            .or_insert_with(|| AccountBalance::new(account_id, now))
    }

    pub fn balance(&self, account_id: Uuid) -> Result<&AccountBalance, EngineError> {
        self.accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound { account_id })
    }

    pub fn has_account(&self, account_id: Uuid) -> bool {
        self.accounts.contains_key(&account_id)
    }

    pub fn is_halted(&self, account_id: Uuid) -> bool {
        self.halted.contains(&account_id)
    }

    /// All journal entries for an account, oldest first
    pub fn history(&self, account_id: Uuid) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .collect()
    }

    pub fn transaction(&self, tx_id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == tx_id)
    }

    /// Sum of all accounts' held funds; the conservation base
    pub fn total_held(&self) -> u64 {
        self.accounts.values().map(|b| b.total()).sum()
    }

    // ------------------------------------------------------------------------
    // Public posting operations
    // ------------------------------------------------------------------------

    /// Record a deposit the payment provider reports as settled.
    pub fn deposit(
        &mut self,
        account_id: Uuid,
        amount: u64,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::Deposit,
            amount as i64,
            Movement { available: amount as i64, escrowed: 0 },
            None,
            Some(TxMeta::Payment { provider_ref }),
            now,
        )
    }

    /// Record a withdrawal; fails if available funds do not cover it.
    pub fn withdraw(
        &mut self,
        account_id: Uuid,
        amount: u64,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::Withdraw,
            -(amount as i64),
            Movement { available: -(amount as i64), escrowed: 0 },
            None,
            Some(TxMeta::Payment { provider_ref }),
            now,
        )
    }

    /// Move a stake from available into escrow for a wager.
    pub(crate) fn post_bet_placed(
        &mut self,
        account_id: Uuid,
        stake: u64,
        wager_id: Uuid,
        opponent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::BetPlaced,
            -(stake as i64),
            Movement { available: -(stake as i64), escrowed: stake as i64 },
            Some(wager_id),
            Some(TxMeta::Stake { opponent_id }),
            now,
        )
    }

    /// Return escrowed stake to available.
    pub(crate) fn post_refund(
        &mut self,
        account_id: Uuid,
        stake: u64,
        wager_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::Refund,
            stake as i64,
            Movement { available: stake as i64, escrowed: -(stake as i64) },
            Some(wager_id),
            Some(TxMeta::Refund { reason: reason.to_string() }),
            now,
        )
    }

    /// Credit the winner's payout and release their own escrowed stake in
    /// one entry. `payout` already has the platform fee withheld.
    pub(crate) fn post_win(
        &mut self,
        account_id: Uuid,
        payout: u64,
        stake_released: u64,
        fee: u64,
        wager_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::Win,
            payout as i64,
            Movement {
                available: payout as i64,
                escrowed: -(stake_released as i64),
            },
            Some(wager_id),
            Some(TxMeta::WinSettlement { stake_released, fee }),
            now,
        )
    }

    /// Consume the loser's escrowed stake; audit entry only, no credit.
    pub(crate) fn post_loss(
        &mut self,
        account_id: Uuid,
        stake: u64,
        wager_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        self.post(
            account_id,
            TxKind::Loss,
            -(stake as i64),
            Movement { available: 0, escrowed: -(stake as i64) },
            Some(wager_id),
            Some(TxMeta::LossSettlement { stake_forfeited: stake }),
            now,
        )
    }

    /// Resolve a pending transaction. The only legal status mutation is
    /// pending -> completed/failed; anything else is rejected.
    pub fn resolve_pending(&mut self, tx_id: Uuid, success: bool) -> Result<(), EngineError> {
        let tx = self
            .transactions
            .iter_mut()
            .find(|tx| tx.id == tx_id)
            .ok_or(EngineError::VerificationFailed {
                reason: format!("transaction {} not found", tx_id),
            })?;

        if tx.status != TxStatus::Pending {
            return Err(EngineError::ConcurrentModification {
                entity: format!("transaction {}", tx_id),
            });
        }

        tx.status = if success { TxStatus::Completed } else { TxStatus::Failed };
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Posting primitive
    // ------------------------------------------------------------------------

    /// Atomic posting: validates, applies the field movement exactly once,
    /// and appends the journal entry. Never partially applies.
    fn post(
        &mut self,
        account_id: Uuid,
        kind: TxKind,
        amount: i64,
        movement: Movement,
        wager_id: Option<Uuid>,
        meta: Option<TxMeta>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, EngineError> {
        if self.halted.contains(&account_id) {
            return Err(EngineError::AccountHalted { account_id });
        }

        let balance = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound { account_id })?;

        // Chain tripwire: the journal tail must agree with the live balance.
        if let Some(last) = self
            .transactions
            .iter()
            .rev()
            .find(|tx| tx.account_id == account_id)
        {
            if last.balance_after != balance.total() {
                let detail = format!(
                    "journal tail {} != live balance {}",
                    last.balance_after,
                    balance.total()
                );
                self.halted.insert(account_id);
                tracing::error!(%account_id, %detail, "ledger corruption detected; account halted");
                return Err(EngineError::LedgerCorruption { account_id, detail });
            }
        }

        if movement.available < 0 {
            let debit = movement.available.unsigned_abs();
            if balance.available < debit {
                return Err(EngineError::InsufficientFunds {
                    available: balance.available,
                    required: debit,
                });
            }
        }

        if movement.escrowed < 0 {
            let release = movement.escrowed.unsigned_abs();
            if balance.escrowed < release {
                // Escrow can only underflow through an engine bug; treat it
                // as corruption, not a user error.
                let detail = format!(
                    "escrow release {} exceeds escrowed {}",
                    release, balance.escrowed
                );
                self.halted.insert(account_id);
                tracing::error!(%account_id, %detail, "ledger corruption detected; account halted");
                return Err(EngineError::LedgerCorruption { account_id, detail });
            }
        }

        let balance = self.accounts.get_mut(&account_id).unwrap();
        let balance_before = balance.total();

        balance.available = (balance.available as i64 + movement.available) as u64;
        balance.escrowed = (balance.escrowed as i64 + movement.escrowed) as u64;

        match kind {
            TxKind::Deposit => balance.lifetime_deposited += amount.unsigned_abs(),
            TxKind::Withdraw => balance.lifetime_withdrawn += amount.unsigned_abs(),
            TxKind::BetPlaced => balance.lifetime_wagered += amount.unsigned_abs(),
            TxKind::Win => balance.lifetime_won += amount.unsigned_abs(),
            TxKind::Loss | TxKind::Refund => {}
        }

        balance.version += 1;
        balance.updated_at = now;
        let balance_after = balance.total();

        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            balance_before,
            balance_after,
            wager_id,
            status: TxStatus::Completed,
            created_at: now,
            meta,
        };

        self.transactions.push(tx.clone());
        Ok(tx)
    }
}

// ============================================================================
// BOUNDARY CONVERSION
// ============================================================================

/// Convert a major-unit amount from the API boundary into minor units,
/// rejecting negatives, non-finite values, and sub-cent remainders.
pub fn minor_from_major(amount: f64) -> Result<u64, EngineError> {
    let dec = Decimal::from_f64(amount).ok_or_else(|| EngineError::InvalidAmount {
        detail: format!("{} is not a finite amount", amount),
    })?;

    if dec.is_sign_negative() {
        return Err(EngineError::InvalidAmount {
            detail: format!("{} is negative", amount),
        });
    }

    (dec.round_dp(2) * dec!(100))
        .to_u64()
        .ok_or_else(|| EngineError::InvalidAmount {
            detail: format!("{} overflows minor units", amount),
        })
}

/// Minor units back to a major-unit float for responses.
pub fn major_from_minor(minor: u64) -> f64 {
    (Decimal::from(minor) / dec!(100)).to_f64().unwrap_or(0.0)
}

/// Signed variant for transaction amounts.
pub fn signed_major_from_minor(minor: i64) -> f64 {
    (Decimal::from(minor) / dec!(100)).to_f64().unwrap_or(0.0)
}

// ============================================================================
// TESTS
// ============================================================================
