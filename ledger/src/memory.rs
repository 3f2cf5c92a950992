use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::stats::success_rate_percent;
use crate::AccountStats;
use crate::AmountBreakdown;
use crate::LedgerError;
use crate::LedgerResult;
use crate::LedgerStore;
use crate::Page;
use crate::PageRequest;
use crate::SearchFilter;
use crate::SortDirection;
use crate::Transaction;
use crate::TransactionId;
use crate::TransactionStatus;
use crate::UserStats;

#[derive(Default)]
struct State {
    rows: HashMap<TransactionId, Transaction>,
}

/// In-process ledger store. Stands in for a durable table in tests and for small
/// deployments; the trait boundary is what makes a Postgres-backed store a drop-in
/// replacement later.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate(mut rows: Vec<Transaction>, page: PageRequest) -> Page<Transaction> {
    rows.sort_by(|a, b| match page.sort {
        SortDirection::Descending => b.created_at.cmp(&a.created_at),
        SortDirection::Ascending => a.created_at.cmp(&b.created_at),
    });
    let total_elements = rows.len() as u64;
    let start = (page.page as usize).saturating_mul(page.size.max(1) as usize);
    let end = start.saturating_add(page.size.max(1) as usize).min(rows.len());
    let items = if start >= rows.len() {
        Vec::new()
    } else {
        rows[start..end].to_vec()
    };
    Page {
        items,
        page: page.page,
        size: page.size,
        total_elements,
    }
}

fn matches_filter(row: &Transaction, filter: &SearchFilter) -> bool {
    if let Some(account_id) = &filter.account_id
        && !row.involves_account(account_id)
    {
        return false;
    }
    if let Some(tx_type) = filter.transaction_type
        && row.transaction_type != tx_type
    {
        return false;
    }
    if let Some(status) = filter.status
        && row.status != status
    {
        return false;
    }
    if let Some(after) = filter.created_after
        && row.created_at < after
    {
        return false;
    }
    if let Some(before) = filter.created_before
        && row.created_at > before
    {
        return false;
    }
    if let Some(min) = filter.min_amount
        && row.amount < min
    {
        return false;
    }
    if let Some(max) = filter.max_amount
        && row.amount > max
    {
        return false;
    }
    if let Some(needle) = &filter.description_contains {
        let haystack = row.description.as_deref().unwrap_or_default();
        if !haystack.to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    }
    if let Some(needle) = &filter.reference_contains {
        let haystack = row.reference.as_deref().unwrap_or_default();
        if !haystack.to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    }
    if let Some(creator) = &filter.created_by
        && &row.created_by != creator
    {
        return false;
    }
    true
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, row: Transaction) -> LedgerResult<Transaction> {
        if row.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation("amount must be > 0".into()));
        }
        let mut state = self.state.lock().await;
        if let Some(existing) = state.rows.get(&row.transaction_id) {
            return if existing.replay_key() == row.replay_key() {
                Ok(existing.clone())
            } else {
                Err(LedgerError::Conflict(row.transaction_id))
            };
        }
        state.rows.insert(row.transaction_id, row.clone());
        Ok(row)
    }

    async fn update(&self, row: Transaction) -> LedgerResult<Transaction> {
        let mut state = self.state.lock().await;
        let current = state
            .rows
            .get(&row.transaction_id)
            .ok_or(LedgerError::NotFound(row.transaction_id))?;
        if current.status != row.status && !current.status.can_transition_to(row.status) {
            return Err(LedgerError::Validation(format!(
                "illegal status transition {} -> {}",
                current.status, row.status
            )));
        }
        state.rows.insert(row.transaction_id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn page_by_account(
        &self,
        account_id: &str,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let rows = state
            .rows
            .values()
            .filter(|row| row.involves_account(account_id))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn page_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let rows = state
            .rows
            .values()
            .filter(|row| row.created_by == user_id)
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn page_by_status(
        &self,
        status: TransactionStatus,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let rows = state
            .rows
            .values()
            .filter(|row| row.status == status)
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn find_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|row| row.status == TransactionStatus::Processing && row.created_at < older_than)
            .cloned()
            .collect())
    }

    async fn find_reversal_pairs(
        &self,
        original_id: TransactionId,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|row| row.original_transaction_id == Some(original_id))
            .cloned()
            .collect())
    }

    async fn is_reversed(&self, id: TransactionId) -> LedgerResult<bool> {
        let state = self.state.lock().await;
        let Some(original) = state.rows.get(&id) else {
            return Ok(false);
        };
        if original.status == TransactionStatus::Reversed {
            return Ok(true);
        }
        let has_live_reversal = state.rows.values().any(|row| {
            row.original_transaction_id == Some(id) && row.status != TransactionStatus::Failed
        });
        Ok(has_live_reversal)
    }

    async fn search(
        &self,
        filter: SearchFilter,
        page: PageRequest,
    ) -> LedgerResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let rows = state
            .rows
            .values()
            .filter(|row| matches_filter(row, &filter))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }

    async fn account_stats(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<AccountStats> {
        let state = self.state.lock().await;
        let rows: Vec<&Transaction> = state
            .rows
            .values()
            .filter(|row| {
                row.involves_account(account_id) && row.created_at >= start && row.created_at <= end
            })
            .collect();

        let mut counts_by_type = HashMap::new();
        let mut amounts_in = Vec::new();
        let mut amounts_out = Vec::new();
        let (mut completed, mut pending, mut failed, mut reversed) = (0u64, 0u64, 0u64, 0u64);

        for row in &rows {
            *counts_by_type.entry(row.transaction_type).or_insert(0u64) += 1;
            match row.status {
                TransactionStatus::Completed => {
                    completed += 1;
                    if row.to_account_id == account_id {
                        amounts_in.push(row.amount);
                    }
                    if row.from_account_id == account_id {
                        amounts_out.push(row.amount);
                    }
                }
                TransactionStatus::Processing => pending += 1,
                TransactionStatus::Failed => failed += 1,
                TransactionStatus::Reversed => reversed += 1,
            }
        }

        let now = Utc::now();
        let day_start = now - chrono::Duration::days(1);
        let month_start = now - chrono::Duration::days(30);
        let rolling_daily_total: Decimal = rows
            .iter()
            .filter(|row| row.status == TransactionStatus::Completed && row.created_at >= day_start)
            .map(|row| row.amount)
            .sum();
        let rolling_monthly_total: Decimal = rows
            .iter()
            .filter(|row| row.status == TransactionStatus::Completed && row.created_at >= month_start)
            .map(|row| row.amount)
            .sum();

        Ok(AccountStats {
            account_id: account_id.to_string(),
            start,
            end,
            total_transactions: rows.len() as u64,
            completed_transactions: completed,
            pending_transactions: pending,
            failed_transactions: failed,
            reversed_transactions: reversed,
            amount_in: AmountBreakdown::from_amounts(&amounts_in),
            amount_out: AmountBreakdown::from_amounts(&amounts_out),
            counts_by_type,
            success_rate_percent: success_rate_percent(rows.len() as u64, completed),
            rolling_daily_total,
            rolling_monthly_total,
        })
    }

    async fn user_stats(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<UserStats> {
        let state = self.state.lock().await;
        let rows: Vec<&Transaction> = state
            .rows
            .values()
            .filter(|row| row.created_by == user_id && row.created_at >= start && row.created_at <= end)
            .collect();

        let mut counts_by_type = HashMap::new();
        let mut amounts = Vec::new();
        let (mut completed, mut pending, mut failed, mut reversed) = (0u64, 0u64, 0u64, 0u64);

        for row in &rows {
            *counts_by_type.entry(row.transaction_type).or_insert(0u64) += 1;
            match row.status {
                TransactionStatus::Completed => {
                    completed += 1;
                    amounts.push(row.amount);
                }
                TransactionStatus::Processing => pending += 1,
                TransactionStatus::Failed => failed += 1,
                TransactionStatus::Reversed => reversed += 1,
            }
        }

        let now = Utc::now();
        let day_start = now - chrono::Duration::days(1);
        let month_start = now - chrono::Duration::days(30);
        let rolling_daily_total: Decimal = rows
            .iter()
            .filter(|row| row.status == TransactionStatus::Completed && row.created_at >= day_start)
            .map(|row| row.amount)
            .sum();
        let rolling_monthly_total: Decimal = rows
            .iter()
            .filter(|row| row.status == TransactionStatus::Completed && row.created_at >= month_start)
            .map(|row| row.amount)
            .sum();

        Ok(UserStats {
            user_id: user_id.to_string(),
            start,
            end,
            total_transactions: rows.len() as u64,
            completed_transactions: completed,
            pending_transactions: pending,
            failed_transactions: failed,
            reversed_transactions: reversed,
            amount: AmountBreakdown::from_amounts(&amounts),
            counts_by_type,
            success_rate_percent: success_rate_percent(rows.len() as u64, completed),
            rolling_daily_total,
            rolling_monthly_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EXTERNAL_ACCOUNT;
    use crate::TransactionType;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn deposit(account: &str, amount: Decimal, status: TransactionStatus) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            from_account_id: EXTERNAL_ACCOUNT.into(),
            to_account_id: account.into(),
            amount,
            currency: "USD".into(),
            transaction_type: TransactionType::Deposit,
            status,
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

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let store = InMemoryLedgerStore::new();
        let row = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        let id = row.transaction_id;
        store.insert(row).await.expect("insert");

        let found = store.find_by_id(id).await.expect("find").expect("present");
        assert_eq!(found.transaction_id, id);
    }

    #[tokio::test]
    async fn duplicate_insert_with_matching_tuple_is_idempotent_replay() {
        let store = InMemoryLedgerStore::new();
        let row = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        let first = store.insert(row.clone()).await.expect("first insert");
        let second = store.insert(row).await.expect("replay insert");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn duplicate_insert_with_different_tuple_conflicts() {
        let store = InMemoryLedgerStore::new();
        let mut row = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        store.insert(row.clone()).await.expect("first insert");
        row.amount = Decimal::new(20000, 2);
        let err = store.insert(row).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_rejects_illegal_transition() {
        let store = InMemoryLedgerStore::new();
        let mut row = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        store.insert(row.clone()).await.expect("insert");
        row.status = TransactionStatus::Completed;
        store.update(row.clone()).await.expect("first completion");

        row.status = TransactionStatus::Failed;
        let err = store.update(row).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn is_reversed_consults_both_status_and_linkage() {
        let store = InMemoryLedgerStore::new();
        let mut original = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        original.status = TransactionStatus::Completed;
        store.insert(original.clone()).await.expect("insert");

        assert!(!store.is_reversed(original.transaction_id).await.unwrap());

        let mut reversal = deposit("acct-a", Decimal::new(10000, 2), TransactionStatus::Processing);
        reversal.transaction_type = TransactionType::Reversal;
        reversal.original_transaction_id = Some(original.transaction_id);
        store.insert(reversal.clone()).await.expect("insert reversal");

        assert!(store.is_reversed(original.transaction_id).await.unwrap());
    }

    #[tokio::test]
    async fn search_filters_by_account_and_status() {
        let store = InMemoryLedgerStore::new();
        let completed = deposit("acct-a", Decimal::new(5000, 2), TransactionStatus::Completed);
        let pending = deposit("acct-a", Decimal::new(7000, 2), TransactionStatus::Processing);
        let other_account = deposit("acct-b", Decimal::new(5000, 2), TransactionStatus::Completed);
        store.insert(completed).await.unwrap();
        store.insert(pending).await.unwrap();
        store.insert(other_account).await.unwrap();

        let filter = SearchFilter {
            account_id: Some("acct-a".into()),
            status: Some(TransactionStatus::Completed),
            ..Default::default()
        };
        let page = store.search(filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total_elements, 1);
    }

    #[tokio::test]
    async fn account_stats_are_zero_not_null_when_empty() {
        let store = InMemoryLedgerStore::new();
        let stats = store
            .account_stats("acct-unused", Utc::now() - chrono::Duration::days(30), Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.amount_in.total, Decimal::ZERO);
        assert_eq!(stats.success_rate_percent, Decimal::ZERO);
    }
}
