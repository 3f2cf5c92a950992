//! Axum HTTP surface for the transaction engine: routes, request/response
//! DTOs, bearer-token authentication, and the role-based authorization table.

pub mod auth;
pub mod dto;
pub mod error;
mod handlers;
pub mod health;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use tower_http::trace::TraceLayer;
use txn_engine::TransactionEngine;
use txn_limits::LimitsStore;

pub use auth::JwtVerifier;
pub use health::HealthReport;
pub use health::HealthReporter;
pub use health::HealthStatus;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransactionEngine>,
    pub limits_store: Arc<dyn LimitsStore>,
    pub jwt: Arc<JwtVerifier>,
    pub health: Arc<dyn HealthReporter>,
}

/// Builds the full router: public health/actuator endpoints, admin-gated metrics,
/// and the authenticated `/api/transactions/**` surface.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/transactions/health", get(handlers::health))
        .route("/actuator/health", get(handlers::health))
        .route("/actuator/info", get(service_info));

    let admin = Router::new()
        .route("/actuator/metrics", get(handlers::metrics))
        .route("/actuator/prometheus", get(handlers::metrics))
        .layer(middleware::from_fn(auth::require_admin_or_internal));

    let transactions = Router::new()
        .route("/api/transactions/deposit", post(handlers::deposit))
        .route("/api/transactions/withdraw", post(handlers::withdraw))
        .route("/api/transactions/transfer", post(handlers::transfer))
        .route("/api/transactions/{id}/reverse", post(handlers::reverse))
        .route("/api/transactions/{id}", get(handlers::get_transaction))
        .route("/api/transactions/account/{accountId}", get(handlers::transactions_by_account))
        .route("/api/transactions", get(handlers::transactions_for_current_user))
        .route("/api/transactions/search", get(handlers::search_transactions))
        .route("/api/transactions/account/{id}/stats", get(handlers::account_stats))
        .route("/api/transactions/{id}/reversals", get(handlers::reversals))
        .route("/api/transactions/{id}/reversed", get(handlers::is_reversed))
        .route("/api/transactions/limits", get(handlers::limits))
        .layer(middleware::from_fn(auth::require_authenticated));

    public
        .merge(admin)
        .merge(transactions)
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn service_info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "transaction-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::ServiceExt;
    use txn_account_client::AccountClient;
    use txn_account_client::AccountClientResult;
    use txn_account_client::AccountSnapshot;
    use txn_account_client::AccountType;
    use txn_account_client::BalanceOpRequest;
    use txn_account_client::BalanceOpResult;
    use txn_account_client::BalanceOpStatus;
    use txn_audit::AlertManager;
    use txn_audit::InMemoryAuditLog;
    use txn_audit::Metrics;
    use txn_engine::EngineConfig;
    use txn_limits::InMemoryLimitsStore;
    use txn_limits::LimitsEvaluator;
    use txn_ledger::InMemoryLedgerStore;

    struct AlwaysUp;

    #[async_trait::async_trait]
    impl HealthReporter for AlwaysUp {
        async fn check(&self) -> HealthReport {
            HealthReport::aggregate(std::collections::BTreeMap::new())
        }
    }

    struct AlwaysFound;

    #[async_trait::async_trait]
    impl AccountClient for AlwaysFound {
        async fn get_account(&self, id: &str, _t: Option<&str>) -> AccountClientResult<AccountSnapshot> {
            Ok(AccountSnapshot {
                account_id: id.to_string(),
                account_type: AccountType::Debit,
                active: true,
                balance: rust_decimal::Decimal::from(1000),
                available_credit: rust_decimal::Decimal::ZERO,
                version: 1,
            })
        }
        async fn validate_account(&self, _id: &str, _t: Option<&str>) -> AccountClientResult<bool> {
            Ok(true)
        }
        async fn has_sufficient(
            &self,
            _id: &str,
            _amount: rust_decimal::Decimal,
            _t: Option<&str>,
        ) -> AccountClientResult<bool> {
            Ok(true)
        }
        async fn apply_balance_op(&self, request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult> {
            Ok(BalanceOpResult {
                account_id: request.account_id,
                operation_id: request.operation_id,
                applied: true,
                new_balance: rust_decimal::Decimal::from(1500),
                version: 2,
                status: BalanceOpStatus::Applied,
            })
        }
        async fn probe(&self) -> AccountClientResult<()> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let ledger: Arc<dyn txn_ledger::LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let limits_store = Arc::new(InMemoryLimitsStore::new());
        let limits = Arc::new(LimitsEvaluator::new(
            InMemoryLimitsStore::new(),
            txn_engine::LedgerUsageLookup::new(ledger.clone()),
        ));
        let engine = Arc::new(TransactionEngine::new(
            ledger,
            limits,
            Arc::new(AlwaysFound),
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(Metrics::new()),
            Arc::new(AlertManager::new(std::time::Duration::from_secs(900))),
            EngineConfig::default(),
        ));
        AppState {
            engine,
            limits_store,
            jwt: Arc::new(JwtVerifier::new("test-secret")),
            health: Arc::new(AlwaysUp),
        }
    }

    #[tokio::test]
    async fn health_is_reachable_without_a_token() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/api/transactions/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deposit_without_a_token_is_unauthorized() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/api/transactions/deposit")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"accountId":"a","amount":"10","currency":"USD"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_without_admin_role_is_forbidden() {
        use chrono::Utc;
        use jsonwebtoken::EncodingKey;
        use jsonwebtoken::Header;
        use serde::Serialize;

        #[derive(Serialize)]
        struct Claims {
            sub: String,
            roles: Vec<String>,
            exp: i64,
        }
        let token = jsonwebtoken::encode(
            &Header::default(),
            &Claims {
                sub: "user-1".into(),
                roles: vec!["USER".into()],
                exp: (Utc::now() + chrono::Duration::minutes(5)).timestamp(),
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let app = router(test_state());
        let response = app
            .oneshot(
                Request::get("/actuator/metrics")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
