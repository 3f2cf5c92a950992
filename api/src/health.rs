//! Aggregated health contract. Probing the ledger/cache/account service is
//! environment-specific, so it's injected: the `service` crate supplies the real
//! [`HealthReporter`], this crate only shapes the response.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: std::collections::BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    /// UP iff every required component reports UP.
    pub fn aggregate(components: std::collections::BTreeMap<String, ComponentHealth>) -> Self {
        let status = if components.values().all(|c| c.status == HealthStatus::Up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        Self { status, components }
    }
}

#[async_trait]
pub trait HealthReporter: Send + Sync {
    async fn check(&self) -> HealthReport;
}
