//! Real dependency probes behind [`txn_api::HealthReporter`]: ledger
//! connectivity, cache round-trip, account-service reachability, and a
//! process self-check.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use txn_account_client::AccountClient;
use txn_account_client::AccountSnapshot;
use txn_account_client::AccountSnapshotCache;
use txn_account_client::AccountType;
use txn_api::ComponentHealth;
use txn_api::HealthReport;
use txn_api::HealthReporter;
use txn_api::HealthStatus;
use txn_ledger::LedgerStore;

pub struct ServiceHealthReporter {
    ledger: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountClient>,
    cache_probe: AccountSnapshotCache,
    started_at: Instant,
}

impl ServiceHealthReporter {
    pub fn new(ledger: Arc<dyn LedgerStore>, accounts: Arc<dyn AccountClient>) -> Self {
        Self {
            ledger,
            accounts,
            cache_probe: AccountSnapshotCache::new(std::time::Duration::from_secs(60)),
            started_at: Instant::now(),
        }
    }

    async fn ledger_health(&self) -> ComponentHealth {
        match self.ledger.find_stale_processing(Utc::now()).await {
            Ok(_) => ComponentHealth {
                status: HealthStatus::Up,
                detail: serde_json::json!({"check": "find_stale_processing"}),
            },
            Err(err) => ComponentHealth {
                status: HealthStatus::Down,
                detail: serde_json::json!({"error": err.to_string()}),
            },
        }
    }

    fn cache_health(&self) -> ComponentHealth {
        let probe_id = "__health_probe__";
        let snapshot = AccountSnapshot {
            account_id: probe_id.to_string(),
            account_type: AccountType::Debit,
            active: true,
            balance: Decimal::ZERO,
            available_credit: Decimal::ZERO,
            version: 0,
        };
        self.cache_probe.put(probe_id, snapshot);
        let round_tripped = self.cache_probe.get(probe_id).is_some();
        self.cache_probe.invalidate(probe_id);
        let removed = self.cache_probe.get(probe_id).is_none();
        let status = if round_tripped && removed { HealthStatus::Up } else { HealthStatus::Down };
        ComponentHealth {
            status,
            detail: serde_json::json!({"check": "set/get/del"}),
        }
    }

    async fn account_service_health(&self) -> ComponentHealth {
        match self.accounts.probe().await {
            Ok(()) => ComponentHealth {
                status: HealthStatus::Up,
                detail: serde_json::json!({}),
            },
            Err(err) => ComponentHealth {
                status: HealthStatus::Down,
                detail: serde_json::json!({"error": err.to_string()}),
            },
        }
    }

    fn self_health(&self) -> ComponentHealth {
        ComponentHealth {
            status: HealthStatus::Up,
            detail: serde_json::json!({"uptimeSeconds": self.started_at.elapsed().as_secs()}),
        }
    }
}

#[async_trait]
impl HealthReporter for ServiceHealthReporter {
    async fn check(&self) -> HealthReport {
        let mut components = BTreeMap::new();
        components.insert("ledger".to_string(), self.ledger_health().await);
        components.insert("cache".to_string(), self.cache_health());
        components.insert("accountService".to_string(), self.account_service_health().await);
        components.insert("self".to_string(), self.self_health());
        HealthReport::aggregate(components)
    }
}
