//! Maps every error this crate can produce onto its HTTP status code and body.

use axum::Json;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use thiserror::Error;
use txn_engine::EngineError;
use txn_ledger::LedgerError;
use txn_limits::LimitReason;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient role for this resource")]
    Forbidden,
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn limit_reason_label(reason: LimitReason) -> &'static str {
    match reason {
        LimitReason::PerTransaction => "PER_TXN",
        LimitReason::DailyAmount => "DAILY_AMOUNT",
        LimitReason::DailyCount => "DAILY_COUNT",
        LimitReason::MonthlyAmount => "MONTHLY_AMOUNT",
        LimitReason::MonthlyCount => "MONTHLY_COUNT",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after_seconds = match &self {
            ApiError::Engine(EngineError::ServiceUnavailable(_)) => Some(30u64),
            ApiError::Ledger(LedgerError::Unavailable(_)) => Some(30u64),
            _ => None,
        };
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(err) => match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::InsufficientFunds => StatusCode::BAD_REQUEST,
                EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
                EngineError::WouldGoNegative => StatusCode::BAD_REQUEST,
                EngineError::AccountNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::AlreadyReversed => StatusCode::CONFLICT,
                EngineError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Ledger(err) => match err {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                LedgerError::Conflict(_) => StatusCode::CONFLICT,
                LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let correlation_id = Uuid::new_v4().to_string();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%correlation_id, error = %self, "unhandled api error");
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "correlationId": correlation_id,
        });
        if let ApiError::Engine(EngineError::LimitExceeded(reason)) = &self
            && let Some(map) = body.as_object_mut()
        {
            map.insert("limitReason".into(), serde_json::json!(limit_reason_label(*reason)));
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after_seconds
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
