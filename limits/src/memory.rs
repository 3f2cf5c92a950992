use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use txn_ledger::TransactionType;

use crate::AccountType;
use crate::LimitsResult;
use crate::LimitsStore;
use crate::TransactionLimit;

#[derive(Default)]
pub struct InMemoryLimitsStore {
    rows: RwLock<HashMap<(AccountType, TransactionType), TransactionLimit>>,
}

impl InMemoryLimitsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LimitsStore for InMemoryLimitsStore {
    async fn get(
        &self,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<TransactionLimit>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(account_type, transaction_type)).cloned())
    }

    async fn put(&self, limit: TransactionLimit) -> LimitsResult<()> {
        let mut rows = self.rows.write().await;
        rows.insert((limit.account_type, limit.transaction_type), limit);
        Ok(())
    }

    async fn list(&self) -> LimitsResult<Vec<TransactionLimit>> {
        let rows = self.rows.read().await;
        Ok(rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryLimitsStore::new();
        let row = TransactionLimit {
            account_type: AccountType::Debit,
            transaction_type: TransactionType::Withdrawal,
            per_transaction_limit: Some(Decimal::from(500)),
            daily_limit: None,
            monthly_limit: None,
            daily_count: None,
            monthly_count: None,
            active: true,
        };
        store.put(row.clone()).await.unwrap();
        let found = store
            .get(AccountType::Debit, TransactionType::Withdrawal)
            .await
            .unwrap();
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn missing_row_is_none() {
        let store = InMemoryLimitsStore::new();
        let found = store
            .get(AccountType::Credit, TransactionType::Deposit)
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
