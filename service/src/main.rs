mod config;
mod health;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use txn_account_client::AccountClient;
use txn_account_client::CircuitBreakerConfig;
use txn_account_client::HttpAccountBackend;
use txn_account_client::ResilientAccountClient;
use txn_account_client::RetryConfig;
use txn_audit::AlertManager;
use txn_audit::AuditLog;
use txn_audit::InMemoryAuditLog;
use txn_audit::Metrics;
use txn_engine::EngineConfig;
use txn_engine::LedgerUsageLookup;
use txn_engine::TransactionEngine;
use txn_ledger::InMemoryLedgerStore;
use txn_ledger::LedgerStore;
use txn_limits::InMemoryLimitsStore;
use txn_limits::LimitsEvaluator;
use txn_limits::LimitsValidator;

use crate::config::Config;
use crate::health::ServiceHealthReporter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env().map_err(|e| format!("invalid configuration: {e}"))?);

    let ledger: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let limits_store = Arc::new(InMemoryLimitsStore::new());
    let limits: Arc<dyn LimitsValidator> = Arc::new(LimitsEvaluator::new(
        InMemoryLimitsStore::new(),
        LedgerUsageLookup::new(ledger.clone()),
    ));

    let backend = HttpAccountBackend::new(
        config.account_service_base_url.clone(),
        &config.jwt_internal_secret,
        config.account_service_timeout,
    );
    let accounts: Arc<dyn AccountClient> = Arc::new(ResilientAccountClient::new(
        backend,
        CircuitBreakerConfig {
            window_size: config.cb_sliding_window_size,
            minimum_calls: config.cb_minimum_number_of_calls,
            failure_rate_threshold: config.cb_failure_rate_threshold,
            open_wait: config.cb_wait_duration_in_open_state,
            max_half_open_probes: 1,
        },
        RetryConfig {
            max_attempts: config.retry_max_attempts,
            initial_wait: config.retry_wait,
            exponential_backoff: false,
        },
        config.cache_account_ttl,
        config.account_service_timeout,
    ));

    let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
    let metrics = Arc::new(Metrics::new());
    let alerts = Arc::new(AlertManager::new(config.alerting_suppression));

    let engine_config = EngineConfig {
        reversal_window: chrono::Duration::days(config.reversal_window_days),
        allowed_currencies: config.currency_allowed.clone(),
        ..EngineConfig::default()
    };

    let engine = Arc::new(TransactionEngine::new(
        ledger.clone(),
        limits,
        accounts.clone(),
        audit.clone(),
        metrics,
        alerts,
        engine_config,
    ));

    let health_reporter = Arc::new(ServiceHealthReporter::new(ledger, accounts));

    let app_state = txn_api::AppState {
        engine: engine.clone(),
        limits_store,
        jwt: Arc::new(txn_api::JwtVerifier::new(&config.jwt_secret)),
        health: health_reporter,
    };
    let app = txn_api::router(app_state);

    let scheduler_handles = scheduler::spawn_all(engine.clone(), audit, config.clone());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(host = %config.host, port = config.port, "transaction service listening");
    axum::serve(listener, app).await?;

    for handle in scheduler_handles {
        handle.abort();
    }
    Ok(())
}
