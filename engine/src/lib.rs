//! Transaction engine: orchestrates validate -> persist(PROCESSING) -> mutate
//! balances -> persist(COMPLETED/FAILED) for deposits, withdrawals, transfers, and
//! reversals. Owns the lifecycle state machine and the stale-PROCESSING sweep;
//! everything else (ledger, limits, account client, audit/metrics/alerts) is
//! injected so this crate depends only on the trait boundaries.

mod usage;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;
use uuid::Uuid;

pub use usage::LedgerUsageLookup;

use txn_account_client::AccountClient;
use txn_account_client::AccountClientError;
use txn_account_client::AccountClientResult;
use txn_account_client::AccountSnapshot;
use txn_account_client::AccountType;
use txn_account_client::BalanceOpRequest;
use txn_account_client::BalanceOpResult;
use txn_audit::AlertManager;
use txn_audit::AuditLog;
use txn_audit::EventType;
use txn_audit::Metrics;
use txn_audit::NewAuditEvent;
use txn_audit::Outcome;
use txn_ledger::LedgerError;
use txn_ledger::LedgerStore;
use txn_ledger::Transaction;
use txn_ledger::TransactionId;
use txn_ledger::TransactionStatus;
use txn_ledger::TransactionType;
use txn_ledger::EXTERNAL_ACCOUNT;
use txn_limits::LimitDecision;
use txn_limits::LimitReason;
use txn_limits::LimitsError;
use txn_limits::LimitsValidator;

pub type AccountId = String;
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("limit exceeded: {0:?}")]
    LimitExceeded(LimitReason),
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("transaction already reversed")]
    AlreadyReversed,
    #[error("reversal would drive a debit account negative")]
    WouldGoNegative,
    #[error("account service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => EngineError::TransactionNotFound(id),
            LedgerError::Validation(msg) => EngineError::Validation(msg),
            LedgerError::Conflict(id) => EngineError::Internal(format!("ledger conflict on {id}")),
            LedgerError::Unavailable(msg) => EngineError::ServiceUnavailable(msg),
            LedgerError::Internal(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<LimitsError> for EngineError {
    fn from(err: LimitsError) -> Self {
        match err {
            LimitsError::Unavailable(msg) => EngineError::ServiceUnavailable(msg),
        }
    }
}

impl From<AccountClientError> for EngineError {
    fn from(err: AccountClientError) -> Self {
        match err {
            AccountClientError::NotFound(id) => EngineError::AccountNotFound(id),
            AccountClientError::Unavailable(msg) => EngineError::ServiceUnavailable(msg),
            AccountClientError::Rejected(msg) => EngineError::Validation(msg),
        }
    }
}

fn error_reason_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::InsufficientFunds => "insufficient_funds",
        EngineError::AccountNotFound(_) => "account_not_found",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::ServiceUnavailable(_) => "account_service_error",
        _ => "other",
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_amount: Decimal,
    pub allowed_currencies: Vec<String>,
    pub max_description_len: usize,
    pub max_reference_len: usize,
    pub reversal_window: chrono::Duration,
    pub stale_processing_after: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_amount: Decimal::from(1_000_000),
            allowed_currencies: vec!["USD".to_string()],
            max_description_len: 500,
            max_reference_len: 100,
            reversal_window: chrono::Duration::days(30),
            stale_processing_after: chrono::Duration::minutes(5),
        }
    }
}

/// Shape shared by deposit and withdrawal: a single-account, single-direction move.
#[derive(Debug, Clone)]
pub struct SingleLegRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_by: String,
    pub user_token: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_by: String,
    pub user_token: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct ReverseRequest {
    pub original_id: TransactionId,
    pub reason: String,
    pub reversed_by: String,
    pub user_token: Option<String>,
    pub correlation_id: String,
}

pub struct TransactionEngine {
    ledger: Arc<dyn LedgerStore>,
    limits: Arc<dyn LimitsValidator>,
    accounts: Arc<dyn AccountClient>,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<Metrics>,
    alerts: Arc<AlertManager>,
    config: EngineConfig,
    /// Single-writer lease keyed by `original_id`: two concurrent reversal
    /// requests for the same original serialize here rather than racing on
    /// `is_reversed`.
    reversal_leases: DashMap<TransactionId, Arc<AsyncMutex<()>>>,
}

impl TransactionEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        limits: Arc<dyn LimitsValidator>,
        accounts: Arc<dyn AccountClient>,
        audit: Arc<dyn AuditLog>,
        metrics: Arc<Metrics>,
        alerts: Arc<AlertManager>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            limits,
            accounts,
            audit,
            metrics,
            alerts,
            config,
            reversal_leases: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn accounts(&self) -> &Arc<dyn AccountClient> {
        &self.accounts
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn validate_amount(&self, amount: Decimal) -> EngineResult<()> {
        if amount < Decimal::new(1, 2) {
            return Err(EngineError::Validation("amount must be at least 0.01".into()));
        }
        if amount > self.config.max_amount {
            return Err(EngineError::Validation(format!(
                "amount exceeds the configured cap of {}",
                self.config.max_amount
            )));
        }
        Ok(())
    }

    fn validate_currency(&self, currency: &str) -> EngineResult<()> {
        if !self.config.allowed_currencies.iter().any(|c| c == currency) {
            return Err(EngineError::Validation(format!("currency {currency} is not allowed")));
        }
        Ok(())
    }

    fn validate_text(&self, description: Option<&str>, reference: Option<&str>) -> EngineResult<()> {
        if let Some(description) = description
            && description.len() > self.config.max_description_len
        {
            return Err(EngineError::Validation("description exceeds the maximum length".into()));
        }
        if let Some(reference) = reference
            && reference.len() > self.config.max_reference_len
        {
            return Err(EngineError::Validation("reference exceeds the maximum length".into()));
        }
        Ok(())
    }

    fn validate_account_id(&self, account_id: &str) -> EngineResult<()> {
        if account_id.trim().is_empty() {
            return Err(EngineError::Validation("account id must not be empty".into()));
        }
        Ok(())
    }

    async fn resolve_account(&self, account_id: &str, user_token: Option<&str>) -> EngineResult<AccountSnapshot> {
        Ok(self.accounts.get_account(account_id, user_token).await?)
    }

    async fn audit(
        &self,
        correlation_id: &str,
        event_type: EventType,
        action: &str,
        outcome: Outcome,
        user_id: Option<String>,
        transaction_id: Option<Uuid>,
        fields: serde_json::Value,
    ) {
        let record = self.audit.record(NewAuditEvent {
            correlation_id: correlation_id.to_string(),
            event_type,
            action: action.to_string(),
            outcome,
            user_id,
            transaction_id,
            fields,
        });
        if let Err(err) = record.await {
            tracing::warn!(%err, action, "failed to record audit event");
        }
    }

    fn record_outcome_metrics(&self, transaction_type: TransactionType, status: TransactionStatus, elapsed: Duration) {
        let type_label = transaction_type.to_string();
        let status_label = status.to_string();
        self.metrics
            .transactions_total
            .with_label_values(&[&type_label, &status_label])
            .inc();
        self.metrics
            .processing_duration_seconds
            .with_label_values(&[&type_label])
            .observe(elapsed.as_secs_f64());
    }

    fn record_error_metric(&self, reason: &str) {
        self.metrics.transaction_errors_total.with_label_values(&[reason]).inc();
    }

    async fn apply_leg(
        &self,
        account_id: &str,
        delta: Decimal,
        tx_id: Uuid,
        suffix: &str,
        reason: &str,
    ) -> AccountClientResult<BalanceOpResult> {
        self.accounts
            .apply_balance_op(BalanceOpRequest {
                account_id: account_id.to_string(),
                operation_id: format!("{tx_id}:{suffix}"),
                delta,
                transaction_id: tx_id,
                reason: reason.to_string(),
                allow_negative: false,
            })
            .await
    }

    /// Moves `amount` from `from_account_id` to `to_account_id`, either of which
    /// may be [`EXTERNAL_ACCOUNT`] (deposit/withdrawal have only one real leg).
    /// The debit leg happens-before the credit leg; a credit failure after a
    /// successful debit triggers a best-effort compensating credit.
    async fn move_funds(
        &self,
        from_account_id: &str,
        to_account_id: &str,
        amount: Decimal,
        tx_id: Uuid,
        reason: &str,
    ) -> (Option<Decimal>, Option<Decimal>, Option<String>) {
        let from_is_external = from_account_id == EXTERNAL_ACCOUNT;
        let to_is_external = to_account_id == EXTERNAL_ACCOUNT;

        let mut from_after = None;
        if !from_is_external {
            match self.apply_leg(from_account_id, -amount, tx_id, "debit", reason).await {
                Ok(result) => from_after = Some(result.new_balance),
                Err(err) => return (None, None, Some(err.to_string())),
            }
        }

        if !to_is_external {
            match self.apply_leg(to_account_id, amount, tx_id, "credit", reason).await {
                Ok(result) => return (from_after, Some(result.new_balance), None),
                Err(err) => {
                    if !from_is_external {
                        if let Err(compensate_err) =
                            self.apply_leg(from_account_id, amount, tx_id, "compensate", reason).await
                        {
                            tracing::error!(
                                %compensate_err,
                                account_id = from_account_id,
                                "compensating credit failed after debit succeeded and credit leg failed"
                            );
                        }
                    }
                    return (from_after, None, Some(err.to_string()));
                }
            }
        }

        (from_after, None, None)
    }

    async fn finalize(
        &self,
        mut row: Transaction,
        from_after: Option<Decimal>,
        to_after: Option<Decimal>,
        failure: Option<String>,
        actor: &str,
        correlation_id: &str,
    ) -> EngineResult<Transaction> {
        let action_prefix = row.transaction_type.to_string().to_lowercase();
        row.from_account_balance_after = from_after;
        row.to_account_balance_after = to_after;
        row.processed_at = Some(Utc::now());

        match failure {
            None => {
                row.status = TransactionStatus::Completed;
                row.processed_by = Some(actor.to_string());
                let row = self.ledger.update(row).await?;
                self.audit(
                    correlation_id,
                    EventType::Transaction,
                    &format!("{action_prefix}.completed"),
                    Outcome::Success,
                    Some(actor.to_string()),
                    Some(row.transaction_id),
                    serde_json::json!({"amount": row.amount}),
                )
                .await;
                Ok(row)
            }
            Some(reason) => {
                row.status = TransactionStatus::Failed;
                row.failure_reason = Some(reason.clone());
                let row = self.ledger.update(row).await?;
                self.audit(
                    correlation_id,
                    EventType::Transaction,
                    &format!("{action_prefix}.failed"),
                    Outcome::Failure,
                    Some(actor.to_string()),
                    Some(row.transaction_id),
                    serde_json::json!({"reason": reason}),
                )
                .await;
                self.record_error_metric("account_service_error");
                Ok(row)
            }
        }
    }

    #[instrument(skip(self, request), fields(account_id = %request.account_id))]
    pub async fn process_deposit(&self, request: SingleLegRequest) -> EngineResult<Transaction> {
        self.validate_account_id(&request.account_id)?;
        self.validate_amount(request.amount)?;
        self.validate_currency(&request.currency)?;
        self.validate_text(request.description.as_deref(), request.reference.as_deref())?;

        let tx_id = Uuid::new_v4();
        self.metrics.active_transactions.inc();
        self.audit(
            &request.correlation_id,
            EventType::Transaction,
            "deposit.initiated",
            Outcome::Success,
            Some(request.created_by.clone()),
            Some(tx_id),
            serde_json::json!({"accountId": request.account_id, "amount": request.amount}),
        )
        .await;

        let started = Metrics::timer();
        let result = self.run_deposit(tx_id, &request).await;
        self.metrics.active_transactions.dec();
        match &result {
            Ok(tx) => self.record_outcome_metrics(TransactionType::Deposit, tx.status, started.elapsed()),
            Err(err) => self.record_error_metric(error_reason_label(err)),
        }
        result
    }

    async fn run_deposit(&self, tx_id: Uuid, request: &SingleLegRequest) -> EngineResult<Transaction> {
        let snapshot = self.resolve_account(&request.account_id, request.user_token.as_deref()).await?;

        let row = Transaction {
            transaction_id: tx_id,
            from_account_id: EXTERNAL_ACCOUNT.to_string(),
            to_account_id: request.account_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            transaction_type: TransactionType::Deposit,
            status: TransactionStatus::Processing,
            description: request.description.clone(),
            reference: request.reference.clone(),
            created_at: Utc::now(),
            processed_at: None,
            reversed_at: None,
            created_by: request.created_by.clone(),
            processed_by: None,
            reversed_by: None,
            from_account_balance_before: None,
            from_account_balance_after: None,
            to_account_balance_before: Some(snapshot.balance),
            to_account_balance_after: None,
            original_transaction_id: None,
            reversal_transaction_id: None,
            reversal_reason: None,
            failure_reason: None,
        };
        let row = self.ledger.insert(row).await?;

        let (_, to_after, failure) = self
            .move_funds(EXTERNAL_ACCOUNT, &request.account_id, request.amount, tx_id, "deposit")
            .await;
        self.finalize(row, None, to_after, failure, &request.created_by, &request.correlation_id)
            .await
    }

    #[instrument(skip(self, request), fields(account_id = %request.account_id))]
    pub async fn process_withdrawal(&self, request: SingleLegRequest) -> EngineResult<Transaction> {
        self.validate_account_id(&request.account_id)?;
        self.validate_amount(request.amount)?;
        self.validate_currency(&request.currency)?;
        self.validate_text(request.description.as_deref(), request.reference.as_deref())?;

        let tx_id = Uuid::new_v4();
        self.metrics.active_transactions.inc();
        self.audit(
            &request.correlation_id,
            EventType::Transaction,
            "withdrawal.initiated",
            Outcome::Success,
            Some(request.created_by.clone()),
            Some(tx_id),
            serde_json::json!({"accountId": request.account_id, "amount": request.amount}),
        )
        .await;

        let started = Metrics::timer();
        let result = self.run_withdrawal(tx_id, &request).await;
        self.metrics.active_transactions.dec();
        match &result {
            Ok(tx) => self.record_outcome_metrics(TransactionType::Withdrawal, tx.status, started.elapsed()),
            Err(err) => self.record_error_metric(error_reason_label(err)),
        }
        result
    }

    async fn run_withdrawal(&self, tx_id: Uuid, request: &SingleLegRequest) -> EngineResult<Transaction> {
        let snapshot = self.resolve_account(&request.account_id, request.user_token.as_deref()).await?;

        if let LimitDecision::Reject(reason) = self
            .limits
            .validate(
                &request.account_id,
                snapshot.account_type,
                TransactionType::Withdrawal,
                request.amount,
            )
            .await?
        {
            return Err(EngineError::LimitExceeded(reason));
        }

        if !snapshot.has_sufficient(request.amount) {
            return Err(EngineError::InsufficientFunds);
        }

        let row = Transaction {
            transaction_id: tx_id,
            from_account_id: request.account_id.clone(),
            to_account_id: EXTERNAL_ACCOUNT.to_string(),
            amount: request.amount,
            currency: request.currency.clone(),
            transaction_type: TransactionType::Withdrawal,
            status: TransactionStatus::Processing,
            description: request.description.clone(),
            reference: request.reference.clone(),
            created_at: Utc::now(),
            processed_at: None,
            reversed_at: None,
            created_by: request.created_by.clone(),
            processed_by: None,
            reversed_by: None,
            from_account_balance_before: Some(snapshot.balance),
            from_account_balance_after: None,
            to_account_balance_before: None,
            to_account_balance_after: None,
            original_transaction_id: None,
            reversal_transaction_id: None,
            reversal_reason: None,
            failure_reason: None,
        };
        let row = self.ledger.insert(row).await?;

        let (from_after, _, failure) = self
            .move_funds(&request.account_id, EXTERNAL_ACCOUNT, request.amount, tx_id, "withdrawal")
            .await;
        self.finalize(row, from_after, None, failure, &request.created_by, &request.correlation_id)
            .await
    }

    #[instrument(skip(self, request), fields(from = %request.from_account_id, to = %request.to_account_id))]
    pub async fn process_transfer(&self, request: TransferRequest) -> EngineResult<Transaction> {
        self.validate_account_id(&request.from_account_id)?;
        self.validate_account_id(&request.to_account_id)?;
        if request.from_account_id == request.to_account_id {
            return Err(EngineError::Validation("from and to accounts must differ".into()));
        }
        self.validate_amount(request.amount)?;
        self.validate_currency(&request.currency)?;
        self.validate_text(request.description.as_deref(), request.reference.as_deref())?;

        let tx_id = Uuid::new_v4();
        self.metrics.active_transactions.inc();
        self.audit(
            &request.correlation_id,
            EventType::Transaction,
            "transfer.initiated",
            Outcome::Success,
            Some(request.created_by.clone()),
            Some(tx_id),
            serde_json::json!({
                "fromAccountId": request.from_account_id,
                "toAccountId": request.to_account_id,
                "amount": request.amount,
            }),
        )
        .await;

        let started = Metrics::timer();
        let result = self.run_transfer(tx_id, &request).await;
        self.metrics.active_transactions.dec();
        match &result {
            Ok(tx) => self.record_outcome_metrics(TransactionType::Transfer, tx.status, started.elapsed()),
            Err(err) => self.record_error_metric(error_reason_label(err)),
        }
        result
    }

    async fn run_transfer(&self, tx_id: Uuid, request: &TransferRequest) -> EngineResult<Transaction> {
        let from_snapshot = self.resolve_account(&request.from_account_id, request.user_token.as_deref()).await?;
        let to_snapshot = self.resolve_account(&request.to_account_id, request.user_token.as_deref()).await?;

        if let LimitDecision::Reject(reason) = self
            .limits
            .validate(
                &request.from_account_id,
                from_snapshot.account_type,
                TransactionType::Transfer,
                request.amount,
            )
            .await?
        {
            return Err(EngineError::LimitExceeded(reason));
        }

        if !from_snapshot.has_sufficient(request.amount) {
            return Err(EngineError::InsufficientFunds);
        }

        let row = Transaction {
            transaction_id: tx_id,
            from_account_id: request.from_account_id.clone(),
            to_account_id: request.to_account_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            transaction_type: TransactionType::Transfer,
            status: TransactionStatus::Processing,
            description: request.description.clone(),
            reference: request.reference.clone(),
            created_at: Utc::now(),
            processed_at: None,
            reversed_at: None,
            created_by: request.created_by.clone(),
            processed_by: None,
            reversed_by: None,
            from_account_balance_before: Some(from_snapshot.balance),
            from_account_balance_after: None,
            to_account_balance_before: Some(to_snapshot.balance),
            to_account_balance_after: None,
            original_transaction_id: None,
            reversal_transaction_id: None,
            reversal_reason: None,
            failure_reason: None,
        };
        let row = self.ledger.insert(row).await?;

        let (from_after, to_after, failure) = self
            .move_funds(&request.from_account_id, &request.to_account_id, request.amount, tx_id, "transfer")
            .await;
        self.finalize(row, from_after, to_after, failure, &request.created_by, &request.correlation_id)
            .await
    }

    #[instrument(skip(self, request), fields(original_id = %request.original_id))]
    pub async fn reverse_transaction(&self, request: ReverseRequest) -> EngineResult<Transaction> {
        let original = self
            .ledger
            .find_by_id(request.original_id)
            .await?
            .ok_or(EngineError::TransactionNotFound(request.original_id))?;

        if original.status != TransactionStatus::Completed {
            return Err(EngineError::Validation("only a COMPLETED transaction can be reversed".into()));
        }
        if original.transaction_type == TransactionType::Reversal {
            return Err(EngineError::Validation("a reversal cannot itself be reversed".into()));
        }
        if Utc::now() - original.created_at > self.config.reversal_window {
            return Err(EngineError::Validation(format!(
                "transaction is older than the {}-day reversal window",
                self.config.reversal_window.num_days()
            )));
        }

        let lease = self
            .reversal_leases
            .entry(request.original_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lease.lock().await;

        if self.ledger.is_reversed(request.original_id).await? {
            return Err(EngineError::AlreadyReversed);
        }

        let tx_id = Uuid::new_v4();
        self.metrics.active_transactions.inc();
        self.audit(
            &request.correlation_id,
            EventType::Transaction,
            "reversal.initiated",
            Outcome::Success,
            Some(request.reversed_by.clone()),
            Some(tx_id),
            serde_json::json!({"originalId": request.original_id, "reason": request.reason}),
        )
        .await;

        let started = Metrics::timer();
        let result = self.run_reversal(tx_id, &request, original).await;
        self.metrics.active_transactions.dec();
        self.reversal_leases.remove(&request.original_id);

        match &result {
            Ok(tx) => self.record_outcome_metrics(TransactionType::Reversal, tx.status, started.elapsed()),
            Err(err) => self.record_error_metric(error_reason_label(err)),
        }
        result
    }

    async fn run_reversal(
        &self,
        tx_id: Uuid,
        request: &ReverseRequest,
        original: Transaction,
    ) -> EngineResult<Transaction> {
        // The reversal direction is the original swapped: whichever side paid out
        // money now receives it back, and vice versa.
        let reversal_from = original.to_account_id.clone();
        let reversal_to = original.from_account_id.clone();

        let from_before = if reversal_from == EXTERNAL_ACCOUNT {
            None
        } else {
            let snapshot = self.resolve_account(&reversal_from, request.user_token.as_deref()).await?;
            if snapshot.account_type == AccountType::Debit && snapshot.balance < original.amount {
                return Err(EngineError::WouldGoNegative);
            }
            Some(snapshot.balance)
        };
        let to_before = if reversal_to == EXTERNAL_ACCOUNT {
            None
        } else {
            Some(self.resolve_account(&reversal_to, request.user_token.as_deref()).await?.balance)
        };

        let row = Transaction {
            transaction_id: tx_id,
            from_account_id: reversal_from.clone(),
            to_account_id: reversal_to.clone(),
            amount: original.amount,
            currency: original.currency.clone(),
            transaction_type: TransactionType::Reversal,
            status: TransactionStatus::Processing,
            description: Some(format!("reversal of {}", original.transaction_id)),
            reference: original.reference.clone(),
            created_at: Utc::now(),
            processed_at: None,
            reversed_at: None,
            created_by: request.reversed_by.clone(),
            processed_by: None,
            reversed_by: None,
            from_account_balance_before: from_before,
            from_account_balance_after: None,
            to_account_balance_before: to_before,
            to_account_balance_after: None,
            original_transaction_id: Some(original.transaction_id),
            reversal_transaction_id: None,
            reversal_reason: Some(request.reason.clone()),
            failure_reason: None,
        };
        let row = self.ledger.insert(row).await?;

        let (from_after, to_after, failure) = self
            .move_funds(&reversal_from, &reversal_to, original.amount, tx_id, "reversal")
            .await;
        let finished = self
            .finalize(row, from_after, to_after, failure, &request.reversed_by, &request.correlation_id)
            .await?;

        if finished.status == TransactionStatus::Completed {
            let mut original = original;
            original.status = TransactionStatus::Reversed;
            original.reversed_at = Some(Utc::now());
            original.reversed_by = Some(request.reversed_by.clone());
            original.reversal_transaction_id = Some(finished.transaction_id);
            self.ledger.update(original).await?;
        }

        Ok(finished)
    }

    /// Marks each PROCESSING row older than `stale_processing_after` FAILED with
    /// reason `STUCK`: reconciles rows whose worker crashed between inserting
    /// the PROCESSING row and reaching a terminal status.
    pub async fn sweep_stale_processing(&self) -> EngineResult<u64> {
        let cutoff = Utc::now() - self.config.stale_processing_after;
        let stale = self.ledger.find_stale_processing(cutoff).await?;
        let mut swept = 0u64;
        for mut row in stale {
            let transaction_id = row.transaction_id;
            row.status = TransactionStatus::Failed;
            row.failure_reason = Some("STUCK".to_string());
            row.processed_at = Some(Utc::now());
            match self.ledger.update(row).await {
                Ok(_) => {
                    swept += 1;
                    self.audit(
                        "scheduler",
                        EventType::SystemEvent,
                        "transaction.swept_stale",
                        Outcome::Success,
                        None,
                        Some(transaction_id),
                        serde_json::json!({"reason": "STUCK"}),
                    )
                    .await;
                }
                Err(err) => {
                    tracing::warn!(%err, %transaction_id, "failed to sweep stale processing row");
                }
            }
        }
        Ok(swept)
    }
}
