//! Limits evaluator: per (account-type, transaction-type) caps on a single
//! transaction and on daily/monthly rolling amount and count.

mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
pub use txn_account_client::AccountType;
use txn_ledger::TransactionType;

pub use memory::InMemoryLimitsStore;

pub type LimitsResult<T> = Result<T, LimitsError>;

#[derive(Debug, Error)]
pub enum LimitsError {
    /// The evaluator could not reach its backing store. Callers must treat this as
    /// fail-safe: reject the transaction rather than allow it, and surface a
    /// service-degradation error distinct from a business-rule rejection.
    #[error("limits store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration row bounding a single (account_type, transaction_type) pair. A
/// missing row means no limits; a `None` field means that dimension is uncapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLimit {
    pub account_type: AccountType,
    pub transaction_type: TransactionType,
    pub per_transaction_limit: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub daily_count: Option<u32>,
    pub monthly_count: Option<u32>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitReason {
    PerTransaction,
    DailyAmount,
    DailyCount,
    MonthlyAmount,
    MonthlyCount,
}

impl LimitReason {
    /// Lower is more specific; used to pick the reported reason when several
    /// dimensions would independently reject (`PER_TXN` > `DAILY_*` > `MONTHLY_*`).
    fn specificity(self) -> u8 {
        match self {
            LimitReason::PerTransaction => 0,
            LimitReason::DailyAmount | LimitReason::DailyCount => 1,
            LimitReason::MonthlyAmount | LimitReason::MonthlyCount => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allow,
    Reject(LimitReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub amount: Decimal,
    pub count: u64,
}

#[async_trait]
pub trait LimitsStore: Send + Sync {
    async fn get(
        &self,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<TransactionLimit>>;

    async fn put(&self, limit: TransactionLimit) -> LimitsResult<()>;

    async fn list(&self) -> LimitsResult<Vec<TransactionLimit>>;
}

/// Supplies the rolling sums the evaluator needs; backed, in the running service,
/// by the ledger's statistics aggregations.
#[async_trait]
pub trait UsageLookup: Send + Sync {
    async fn daily_usage(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
    ) -> LimitsResult<Usage>;

    async fn monthly_usage(
        &self,
        account_id: &str,
        transaction_type: TransactionType,
    ) -> LimitsResult<Usage>;
}

/// Object-safe facade over [`LimitsEvaluator`], so the engine can hold one behind
/// `Arc<dyn LimitsValidator>` without committing to concrete store/usage types.
#[async_trait]
pub trait LimitsValidator: Send + Sync {
    async fn validate(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> LimitsResult<LimitDecision>;

    async fn remaining_daily(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>>;

    async fn remaining_monthly(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>>;
}

pub struct LimitsEvaluator<S, U> {
    store: S,
    usage: U,
}

impl<S, U> LimitsEvaluator<S, U>
where
    S: LimitsStore,
    U: UsageLookup,
{
    pub fn new(store: S, usage: U) -> Self {
        Self { store, usage }
    }

    pub async fn validate(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> LimitsResult<LimitDecision> {
        let Some(limit) = self.store.get(account_type, transaction_type).await? else {
            return Ok(LimitDecision::Allow);
        };
        if !limit.active {
            return Ok(LimitDecision::Allow);
        }

        let mut triggered: Vec<LimitReason> = Vec::new();

        if let Some(per_txn) = limit.per_transaction_limit
            && amount > per_txn
        {
            triggered.push(LimitReason::PerTransaction);
        }

        let daily = self.usage.daily_usage(account_id, transaction_type).await?;
        if let Some(daily_limit) = limit.daily_limit
            && daily.amount + amount > daily_limit
        {
            triggered.push(LimitReason::DailyAmount);
        }
        if let Some(daily_count) = limit.daily_count
            && daily.count >= u64::from(daily_count)
        {
            triggered.push(LimitReason::DailyCount);
        }

        let monthly = self.usage.monthly_usage(account_id, transaction_type).await?;
        if let Some(monthly_limit) = limit.monthly_limit
            && monthly.amount + amount > monthly_limit
        {
            triggered.push(LimitReason::MonthlyAmount);
        }
        if let Some(monthly_count) = limit.monthly_count
            && monthly.count >= u64::from(monthly_count)
        {
            triggered.push(LimitReason::MonthlyCount);
        }

        match triggered.into_iter().min_by_key(|reason| reason.specificity()) {
            Some(reason) => Ok(LimitDecision::Reject(reason)),
            None => Ok(LimitDecision::Allow),
        }
    }

    pub async fn remaining_daily(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>> {
        let Some(limit) = self.store.get(account_type, transaction_type).await? else {
            return Ok(None);
        };
        let Some(daily_limit) = limit.daily_limit else {
            return Ok(None);
        };
        let usage = self.usage.daily_usage(account_id, transaction_type).await?;
        Ok(Some((daily_limit - usage.amount).max(Decimal::ZERO)))
    }

    pub async fn remaining_monthly(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>> {
        let Some(limit) = self.store.get(account_type, transaction_type).await? else {
            return Ok(None);
        };
        let Some(monthly_limit) = limit.monthly_limit else {
            return Ok(None);
        };
        let usage = self.usage.monthly_usage(account_id, transaction_type).await?;
        Ok(Some((monthly_limit - usage.amount).max(Decimal::ZERO)))
    }
}

#[async_trait]
impl<S, U> LimitsValidator for LimitsEvaluator<S, U>
where
    S: LimitsStore,
    U: UsageLookup,
{
    async fn validate(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> LimitsResult<LimitDecision> {
        LimitsEvaluator::validate(self, account_id, account_type, transaction_type, amount).await
    }

    async fn remaining_daily(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>> {
        LimitsEvaluator::remaining_daily(self, account_id, account_type, transaction_type).await
    }

    async fn remaining_monthly(
        &self,
        account_id: &str,
        account_type: AccountType,
        transaction_type: TransactionType,
    ) -> LimitsResult<Option<Decimal>> {
        LimitsEvaluator::remaining_monthly(self, account_id, account_type, transaction_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct FixedUsage {
        daily: Usage,
        monthly: Usage,
    }

    #[async_trait]
    impl UsageLookup for FixedUsage {
        async fn daily_usage(&self, _: &str, _: TransactionType) -> LimitsResult<Usage> {
            Ok(self.daily)
        }
        async fn monthly_usage(&self, _: &str, _: TransactionType) -> LimitsResult<Usage> {
            Ok(self.monthly)
        }
    }

    struct SingleLimit(Mutex<Option<TransactionLimit>>);

    #[async_trait]
    impl LimitsStore for SingleLimit {
        async fn get(
            &self,
            _: AccountType,
            _: TransactionType,
        ) -> LimitsResult<Option<TransactionLimit>> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn put(&self, limit: TransactionLimit) -> LimitsResult<()> {
            *self.0.lock().unwrap() = Some(limit);
            Ok(())
        }
        async fn list(&self) -> LimitsResult<Vec<TransactionLimit>> {
            Ok(self.0.lock().unwrap().clone().into_iter().collect())
        }
    }

    fn limit(
        per_txn: Option<i64>,
        daily: Option<i64>,
        daily_count: Option<u32>,
        monthly: Option<i64>,
        monthly_count: Option<u32>,
    ) -> TransactionLimit {
        TransactionLimit {
            account_type: AccountType::Debit,
            transaction_type: TransactionType::Withdrawal,
            per_transaction_limit: per_txn.map(Decimal::from),
            daily_limit: daily.map(Decimal::from),
            monthly_limit: monthly.map(Decimal::from),
            daily_count,
            monthly_count,
            active: true,
        }
    }

    #[tokio::test]
    async fn missing_row_allows_unconditionally() {
        let evaluator = LimitsEvaluator::new(
            SingleLimit(Mutex::new(None)),
            FixedUsage {
                daily: Usage::default(),
                monthly: Usage::default(),
            },
        );
        let decision = evaluator
            .validate("acct-a", AccountType::Debit, TransactionType::Withdrawal, Decimal::from(1_000_000))
            .await
            .unwrap();
        assert_eq!(decision, LimitDecision::Allow);
    }

    #[tokio::test]
    async fn per_transaction_limit_takes_priority_over_daily() {
        let store = SingleLimit(Mutex::new(Some(limit(Some(100), Some(50), None, None, None))));
        let evaluator = LimitsEvaluator::new(
            store,
            FixedUsage {
                daily: Usage { amount: Decimal::from(40), count: 0 },
                monthly: Usage::default(),
            },
        );
        // Both PER_TXN and DAILY_AMOUNT would reject; PER_TXN must win.
        let decision = evaluator
            .validate("acct-a", AccountType::Debit, TransactionType::Withdrawal, Decimal::from(200))
            .await
            .unwrap();
        assert_eq!(decision, LimitDecision::Reject(LimitReason::PerTransaction));
    }

    #[tokio::test]
    async fn daily_count_rejects_at_the_configured_count() {
        let store = SingleLimit(Mutex::new(Some(limit(None, None, Some(3), None, None))));
        let evaluator = LimitsEvaluator::new(
            store,
            FixedUsage {
                daily: Usage { amount: Decimal::ZERO, count: 3 },
                monthly: Usage::default(),
            },
        );
        let decision = evaluator
            .validate("acct-a", AccountType::Debit, TransactionType::Withdrawal, Decimal::from(10))
            .await
            .unwrap();
        assert_eq!(decision, LimitDecision::Reject(LimitReason::DailyCount));
    }

    #[tokio::test]
    async fn monthly_wins_only_when_nothing_more_specific_triggers() {
        let store = SingleLimit(Mutex::new(Some(limit(None, None, None, Some(500), None))));
        let evaluator = LimitsEvaluator::new(
            store,
            FixedUsage {
                daily: Usage::default(),
                monthly: Usage { amount: Decimal::from(480), count: 0 },
            },
        );
        let decision = evaluator
            .validate("acct-a", AccountType::Debit, TransactionType::Withdrawal, Decimal::from(30))
            .await
            .unwrap();
        assert_eq!(decision, LimitDecision::Reject(LimitReason::MonthlyAmount));
    }

    #[tokio::test]
    async fn inactive_row_allows_unconditionally() {
        let mut row = limit(Some(1), None, None, None, None);
        row.active = false;
        let store = SingleLimit(Mutex::new(Some(row)));
        let evaluator = LimitsEvaluator::new(
            store,
            FixedUsage {
                daily: Usage::default(),
                monthly: Usage::default(),
            },
        );
        let decision = evaluator
            .validate("acct-a", AccountType::Debit, TransactionType::Withdrawal, Decimal::from(1_000))
            .await
            .unwrap();
        assert_eq!(decision, LimitDecision::Allow);
    }
}
