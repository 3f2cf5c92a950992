//! Resilient client for the Accounts service: the transaction engine's only path to
//! reading or mutating a customer's balance.
//!
//! The public [`AccountClient`] trait is implemented by [`ResilientAccountClient`],
//! which wraps a raw [`AccountBackend`] with the resilience envelope described in
//! the component design, layered outermost-in: time-limiter -> circuit-breaker ->
//! retry -> cache.

mod auth;
pub mod backend;
mod cache;
pub mod circuit_breaker;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub use auth::ServiceTokenIssuer;
pub use backend::AccountBackend;
pub use backend::HttpAccountBackend;
pub use cache::AccountSnapshotCache;
pub use circuit_breaker::CircuitBreaker;
pub use circuit_breaker::CircuitBreakerConfig;
pub use circuit_breaker::CircuitState;
pub use retry::RetryConfig;

pub type AccountId = String;

pub type AccountClientResult<T> = Result<T, AccountClientError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountClientError {
    #[error("account not found: {0}")]
    NotFound(AccountId),
    /// Circuit open, hard timeout, or exhausted retries against a transient fault.
    #[error("account service unavailable: {0}")]
    Unavailable(String),
    #[error("account service rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub account_type: AccountType,
    pub active: bool,
    pub balance: Decimal,
    pub available_credit: Decimal,
    /// Optimistic-concurrency token returned by the Accounts service; carried back
    /// on the next balance op so staleness can be detected upstream.
    pub version: u64,
}

impl AccountSnapshot {
    /// DEBIT accounts are funded by their own balance; CREDIT accounts draw against
    /// a credit line.
    pub fn has_sufficient(&self, amount: Decimal) -> bool {
        match self.account_type {
            AccountType::Debit => self.balance >= amount,
            AccountType::Credit => self.available_credit >= amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceOpRequest {
    pub account_id: AccountId,
    pub operation_id: String,
    pub delta: Decimal,
    pub transaction_id: Uuid,
    pub reason: String,
    pub allow_negative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BalanceOpStatus {
    Applied,
    Replayed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceOpResult {
    pub account_id: AccountId,
    pub operation_id: String,
    pub applied: bool,
    pub new_balance: Decimal,
    pub version: u64,
    pub status: BalanceOpStatus,
}

#[async_trait]
pub trait AccountClient: Send + Sync {
    async fn get_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<AccountSnapshot>;

    async fn validate_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<bool>;

    async fn has_sufficient(
        &self,
        id: &str,
        amount: Decimal,
        user_token: Option<&str>,
    ) -> AccountClientResult<bool>;

    async fn apply_balance_op(&self, request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult>;

    /// Bypasses the circuit breaker and cache: used by health probes, which need
    /// ground truth about the dependency, not the breaker's opinion of it.
    async fn probe(&self) -> AccountClientResult<()>;
}

pub struct ResilientAccountClient<B> {
    backend: B,
    circuit_breaker: CircuitBreaker,
    retry: RetryConfig,
    cache: AccountSnapshotCache,
    call_timeout: Duration,
}

impl<B> ResilientAccountClient<B>
where
    B: AccountBackend,
{
    pub fn new(
        backend: B,
        circuit_breaker: CircuitBreakerConfig,
        retry: RetryConfig,
        cache_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            circuit_breaker: CircuitBreaker::new(circuit_breaker),
            retry,
            cache: AccountSnapshotCache::new(cache_ttl),
            call_timeout,
        }
    }

    /// Runs `op` under the full envelope: time-limiter, then circuit-breaker
    /// gating, then retry. `op` itself is the innermost layer (the cache sits
    /// above this call, in `get_account`).
    async fn call_guarded<F, Fut, T>(&self, op_name: &str, op: F) -> AccountClientResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = AccountClientResult<T>> + Send,
        T: Send,
    {
        if !self.circuit_breaker.allow_call() {
            return Err(AccountClientError::Unavailable(format!(
                "circuit breaker open for {op_name}"
            )));
        }

        let attempt = || async {
            match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AccountClientError::Unavailable(format!(
                    "{op_name} timed out after {:?}",
                    self.call_timeout
                ))),
            }
        };

        let result = retry::retry_with_backoff(attempt, &self.retry, op_name).await;

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(AccountClientError::NotFound(_)) => self.circuit_breaker.record_success(),
            Err(_) => self.circuit_breaker.record_failure(),
        }

        result
    }
}

#[async_trait]
impl<B> AccountClient for ResilientAccountClient<B>
where
    B: AccountBackend,
{
    #[instrument(skip(self, user_token), fields(account_id = %id))]
    async fn get_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<AccountSnapshot> {
        if let Some(snapshot) = self.cache.get(id) {
            return Ok(snapshot);
        }
        let snapshot = self
            .call_guarded("get_account", || self.backend.get_account(id, user_token))
            .await?;
        self.cache.put(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn validate_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<bool> {
        match self.get_account(id, user_token).await {
            Ok(snapshot) => Ok(snapshot.active),
            Err(AccountClientError::NotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    async fn has_sufficient(
        &self,
        id: &str,
        amount: Decimal,
        user_token: Option<&str>,
    ) -> AccountClientResult<bool> {
        let snapshot = self.get_account(id, user_token).await?;
        Ok(snapshot.has_sufficient(amount))
    }

    #[instrument(skip(self), fields(account_id = %request.account_id, operation_id = %request.operation_id))]
    async fn apply_balance_op(&self, request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult> {
        let account_id = request.account_id.clone();
        let result = self
            .call_guarded("apply_balance_op", || self.backend.apply_balance_op(request.clone()))
            .await?;
        // Any successful mutation invalidates the cached snapshot: the balance the
        // cache is holding is now known stale.
        self.cache.invalidate(&account_id);
        Ok(result)
    }

    async fn probe(&self) -> AccountClientResult<()> {
        self.backend.probe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    struct FlakyBackend {
        failures_then_success: AtomicU32,
    }

    #[async_trait]
    impl AccountBackend for FlakyBackend {
        async fn get_account(
            &self,
            id: &str,
            _user_token: Option<&str>,
        ) -> AccountClientResult<AccountSnapshot> {
            let remaining = self.failures_then_success.fetch_update(
                Ordering::SeqCst,
                Ordering::SeqCst,
                |n| if n == 0 { None } else { Some(n - 1) },
            );
            if remaining.is_ok() {
                return Err(AccountClientError::Unavailable("simulated 503".into()));
            }
            Ok(AccountSnapshot {
                account_id: id.to_string(),
                account_type: AccountType::Debit,
                active: true,
                balance: Decimal::from(1_000),
                available_credit: Decimal::ZERO,
                version: 1,
            })
        }

        async fn apply_balance_op(&self, _request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult> {
            unimplemented!()
        }

        async fn probe(&self) -> AccountClientResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let client = ResilientAccountClient::new(
            FlakyBackend {
                failures_then_success: AtomicU32::new(2),
            },
            CircuitBreakerConfig::default(),
            RetryConfig {
                max_attempts: 3,
                ..RetryConfig::default()
            },
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        let snapshot = client.get_account("acct-a", None).await.expect("eventual success");
        assert_eq!(snapshot.account_id, "acct-a");
    }

    #[tokio::test]
    async fn get_account_is_cached_across_calls() {
        let client = ResilientAccountClient::new(
            FlakyBackend {
                failures_then_success: AtomicU32::new(0),
            },
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        let first = client.get_account("acct-a", None).await.unwrap();
        let second = client.get_account("acct-a", None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn apply_balance_op_invalidates_cache() {
        struct Backend;
        #[async_trait]
        impl AccountBackend for Backend {
            async fn get_account(
                &self,
                id: &str,
                _user_token: Option<&str>,
            ) -> AccountClientResult<AccountSnapshot> {
                Ok(AccountSnapshot {
                    account_id: id.to_string(),
                    account_type: AccountType::Debit,
                    active: true,
                    balance: Decimal::from(500),
                    available_credit: Decimal::ZERO,
                    version: 1,
                })
            }
            async fn apply_balance_op(
                &self,
                request: BalanceOpRequest,
            ) -> AccountClientResult<BalanceOpResult> {
                Ok(BalanceOpResult {
                    account_id: request.account_id,
                    operation_id: request.operation_id,
                    applied: true,
                    new_balance: Decimal::from(600),
                    version: 2,
                    status: BalanceOpStatus::Applied,
                })
            }
            async fn probe(&self) -> AccountClientResult<()> {
                Ok(())
            }
        }

        let client = ResilientAccountClient::new(
            Backend,
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        let _ = client.get_account("acct-a", None).await.unwrap();
        client
            .apply_balance_op(BalanceOpRequest {
                account_id: "acct-a".into(),
                operation_id: "op-1".into(),
                delta: Decimal::from(100),
                transaction_id: Uuid::new_v4(),
                reason: "deposit".into(),
                allow_negative: false,
            })
            .await
            .unwrap();
        assert!(client.cache.get("acct-a").is_none());
    }
}
