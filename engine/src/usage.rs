//! Bridges the ledger store into the limits evaluator's [`UsageLookup`] contract:
//! rolling daily/monthly completed-amount sums computed from ledger rows. A
//! SQL-backed ledger would push this down to a `SUM(...)` query instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Datelike;
use chrono::NaiveDate;
use chrono::Utc;
use txn_ledger::LedgerStore;
use txn_ledger::PageRequest;
use txn_ledger::SearchFilter;
use txn_ledger::SortDirection;
use txn_ledger::TransactionStatus;
use txn_ledger::TransactionType;
use txn_limits::LimitsError;
use txn_limits::LimitsResult;
use txn_limits::Usage;
use txn_limits::UsageLookup;

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .expect("first of the month is a valid date")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

pub struct LedgerUsageLookup {
    ledger: Arc<dyn LedgerStore>,
}

impl LedgerUsageLookup {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    async fn usage_since(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> LimitsResult<Usage> {
        let filter = SearchFilter {
            account_id: Some(account_id.to_string()),
            transaction_type: Some(transaction_type),
            status: Some(TransactionStatus::Completed),
            created_after: Some(since),
            ..Default::default()
        };
        let page = PageRequest {
            page: 0,
            size: u32::MAX,
            sort: SortDirection::Ascending,
        };
        let result = self
            .ledger
            .search(filter, page)
            .await
            .map_err(|err| LimitsError::Unavailable(err.to_string()))?;

        // Limits are evaluated on the debit side only; `search` matches either leg,
        // so the counter-party (e.g. a transfer's recipient) must be filtered out.
        let mut amount = rust_decimal::Decimal::ZERO;
        let mut count = 0u64;
        for row in result.items.iter().filter(|row| row.from_account_id == account_id) {
            amount += row.amount;
            count += 1;
        }
        Ok(Usage { amount, count })
    }
}

#[async_trait]
impl UsageLookup for LedgerUsageLookup {
    async fn daily_usage(&self, account_id: &str, transaction_type: TransactionType) -> LimitsResult<Usage> {
        self.usage_since(account_id, transaction_type, start_of_day(Utc::now())).await
    }

    async fn monthly_usage(&self, account_id: &str, transaction_type: TransactionType) -> LimitsResult<Usage> {
        self.usage_since(account_id, transaction_type, start_of_month(Utc::now())).await
    }
}
