//! Audit events, metrics, and alerts: the engine's decision points observed
//! synchronously, never as a side channel that can silently fall behind.
//!
//! Audit events here are a plain structured catalog, **not** a cryptographic hash
//! chain.

pub mod alerts;
pub mod metrics;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use alerts::AlertLevel;
pub use alerts::AlertManager;
pub use alerts::AlertType;
pub use metrics::Metrics;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Transaction,
    Security,
    LimitCheck,
    AccountValidation,
    BalanceCheck,
    ApiAccess,
    SystemEvent,
    AlertTriggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub event_type: EventType,
    pub action: String,
    pub outcome: Outcome,
    pub user_id: Option<String>,
    pub transaction_id: Option<Uuid>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub correlation_id: String,
    pub event_type: EventType,
    pub action: String,
    pub outcome: Outcome,
    pub user_id: Option<String>,
    pub transaction_id: Option<Uuid>,
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub transaction_id: Option<Uuid>,
    pub event_type: Option<EventType>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: NewAuditEvent) -> AuditResult<AuditEvent>;

    async fn events(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEvent>>;
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: NewAuditEvent) -> AuditResult<AuditEvent> {
        if event.correlation_id.trim().is_empty() {
            return Err(AuditError::Validation("correlation_id must be provided".into()));
        }
        if event.action.trim().is_empty() {
            return Err(AuditError::Validation("action must be provided".into()));
        }
        let record = AuditEvent {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: event.correlation_id,
            event_type: event.event_type,
            action: event.action,
            outcome: event.outcome,
            user_id: event.user_id,
            transaction_id: event.transaction_id,
            fields: event.fields,
        };
        self.events.write().await.push(record.clone());
        Ok(record)
    }

    async fn events(&self, filter: AuditFilter) -> AuditResult<Vec<AuditEvent>> {
        let events = self.events.read().await;
        let mut filtered: Vec<AuditEvent> = events
            .iter()
            .filter(|event| {
                filter
                    .transaction_id
                    .map(|id| event.transaction_id == Some(id))
                    .unwrap_or(true)
                    && filter
                        .event_type
                        .map(|t| event.event_type == t)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit
            && filtered.len() > limit
        {
            filtered.truncate(limit);
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn records_and_filters_by_transaction_id() {
        let log = InMemoryAuditLog::new();
        let tx_id = Uuid::new_v4();
        log.record(NewAuditEvent {
            correlation_id: "corr-1".into(),
            event_type: EventType::Transaction,
            action: "deposit.initiated".into(),
            outcome: Outcome::Success,
            user_id: Some("user-1".into()),
            transaction_id: Some(tx_id),
            fields: serde_json::json!({}),
        })
        .await
        .expect("record");
        log.record(NewAuditEvent {
            correlation_id: "corr-2".into(),
            event_type: EventType::Security,
            action: "auth.rejected".into(),
            outcome: Outcome::Failure,
            user_id: None,
            transaction_id: None,
            fields: serde_json::json!({}),
        })
        .await
        .expect("record");

        let found = log
            .events(AuditFilter {
                transaction_id: Some(tx_id),
                ..Default::default()
            })
            .await
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "deposit.initiated");
    }

    #[tokio::test]
    async fn rejects_empty_action() {
        let log = InMemoryAuditLog::new();
        let err = log
            .record(NewAuditEvent {
                correlation_id: "corr-1".into(),
                event_type: EventType::Transaction,
                action: "".into(),
                outcome: Outcome::Success,
                user_id: None,
                transaction_id: None,
                fields: serde_json::json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
    }
}
