//! Ledger store: the durable, append-mostly record of money-movement transactions.
//!
//! The store is the single source of truth for transaction status. It never deletes a
//! row and only ever moves a row's status forward along the lifecycle in [`TransactionStatus`].

mod memory;
mod stats;

use std::fmt;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryLedgerStore;
pub use stats::AccountStats;
pub use stats::AmountBreakdown;
pub use stats::UserStats;

/// Sentinel counter-leg account id for deposits and withdrawals.
pub const EXTERNAL_ACCOUNT: &str = "EXTERNAL";

pub type TransactionId = Uuid;
pub type AccountId = String;
pub type UserId = String;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),
    #[error("transaction {0} already exists with different attributes")]
    Conflict(TransactionId),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    #[error("internal ledger error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Reversal,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Reversal => "REVERSAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    /// True if no further status transition is ever allowed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Failed | TransactionStatus::Reversed
        )
    }

    /// Validates the monotone status machine: PROCESSING -> COMPLETED | FAILED,
    /// COMPLETED -> REVERSED (once). Any other transition, including self-loops
    /// on a terminal state, is rejected.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Processing, Completed) | (Processing, Failed) | (Completed, Reversed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Reversed => "REVERSED",
        };
        write!(f, "{s}")
    }
}

/// A single ledger row: the atomic unit of the transaction engine's persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub processed_by: Option<UserId>,
    pub reversed_by: Option<UserId>,
    pub from_account_balance_before: Option<Decimal>,
    pub from_account_balance_after: Option<Decimal>,
    pub to_account_balance_before: Option<Decimal>,
    pub to_account_balance_after: Option<Decimal>,
    pub original_transaction_id: Option<TransactionId>,
    pub reversal_transaction_id: Option<TransactionId>,
    pub reversal_reason: Option<String>,
    pub failure_reason: Option<String>,
}

impl Transaction {
    /// True if `account_id` participates on either leg (the `EXTERNAL` sentinel never
    /// matches a real account id, so deposits/withdrawals surface once, not twice).
    pub fn involves_account(&self, account_id: &str) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }

    /// A row's "replay key": two inserts sharing this tuple are the same logical
    /// request arriving twice, not a genuine id collision.
    pub fn replay_key(&self) -> (&str, &str, Decimal, TransactionType, &str) {
        (
            &self.from_account_id,
            &self.to_account_id,
            self.amount,
            self.transaction_type,
            &self.created_by,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            sort: SortDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

/// Composite filter for `search`. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub account_id: Option<AccountId>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub description_contains: Option<String>,
    pub reference_contains: Option<String>,
    pub created_by: Option<UserId>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomic single-row insert. A duplicate id whose tuple matches
    /// `Transaction::replay_key` returns the existing row rather than erroring
    /// (idempotent replay); any other collision is a [`LedgerError::Conflict`].
    async fn insert(&self, row: Transaction) -> LedgerResult<Transaction>;

    /// Update by id. The store rejects any transition not permitted by
    /// [`TransactionStatus::can_transition_to`].
    async fn update(&self, row: Transaction) -> LedgerResult<Transaction>;

    async fn find_by_id(&self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    async fn page_by_account(
        &self,
        account_id: &str,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>>;

    async fn page_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>>;

    async fn page_by_status(
        &self,
        status: TransactionStatus,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>>;

    async fn find_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>>;

    async fn find_reversal_pairs(
        &self,
        original_id: TransactionId,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Consults both the original row's status and the reversal linkage, so that a
    /// partial write (row marked REVERSED but the reversal row itself missing, or
    /// vice versa) is still treated as reversed rather than allowing a double spend.
    async fn is_reversed(&self, id: TransactionId) -> LedgerResult<bool>;

    async fn search(
        &self,
        filter: SearchFilter,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>>;

    async fn account_stats(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<AccountStats>;

    async fn user_stats(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<UserStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_allows_only_the_documented_edges() {
        use TransactionStatus::*;
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Reversed));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Reversed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Reversed));
    }

    #[test]
    fn terminal_states_are_failed_and_reversed_only() {
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(!TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Reversed.is_terminal());
    }

    #[test]
    fn external_sentinel_does_not_match_a_real_account() {
        let tx = sample_transaction();
        assert!(!tx.involves_account(EXTERNAL_ACCOUNT));
        assert!(tx.involves_account("acct-a"));
    }

    fn sample_transaction() -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            from_account_id: "acct-a".into(),
            to_account_id: EXTERNAL_ACCOUNT.into(),
            amount: Decimal::new(5000, 2),
            currency: "USD".into(),
            transaction_type: TransactionType::Withdrawal,
            status: TransactionStatus::Processing,
            description: None,
            reference: None,
            created_at: Utc::now(),
            processed_at: None,
            reversed_at: None,
            created_by: "user-1".into(),
            processed_by: None,
            reversed_by: None,
            from_account_balance_before: None,
            from_account_balance_after: None,
            to_account_balance_before: None,
            to_account_balance_after: None,
            original_transaction_id: None,
            reversal_transaction_id: None,
            reversal_reason: None,
            failure_reason: None,
        }
    }
}
