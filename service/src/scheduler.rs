//! Background maintenance tasks. Each runs on its own `tokio::spawn`ed loop
//! for the lifetime of the process; none block a request thread, and each
//! sleeps between iterations rather than busy-polling.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use txn_account_client::AccountClient;
use txn_audit::AlertLevel;
use txn_audit::AlertType;
use txn_audit::AuditLog;
use txn_audit::EventType;
use txn_audit::NewAuditEvent;
use txn_audit::Outcome;
use txn_engine::TransactionEngine;
use txn_ledger::LedgerStore;
use txn_ledger::PageRequest;
use txn_ledger::TransactionStatus;

use crate::config::Config;

/// Spawns every scheduled task and returns their join handles so the caller can
/// await them on shutdown. None of these loops ever return on their own.
pub fn spawn_all(engine: Arc<TransactionEngine>, audit: Arc<dyn AuditLog>, config: Arc<Config>) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(pending_gauge_refresh(engine.clone())),
        tokio::spawn(daily_counter_reset(engine.clone(), audit.clone())),
        tokio::spawn(health_metric_snapshot(engine.clone(), audit.clone())),
        tokio::spawn(daily_summary_audit(engine.clone(), audit.clone())),
        tokio::spawn(stale_processing_sweep(engine.clone())),
        tokio::spawn(alert_checks(engine.clone(), config.clone())),
        tokio::spawn(account_service_health_ping(engine, config)),
    ]
}

async fn pending_gauge_refresh(engine: Arc<TransactionEngine>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        let page = PageRequest { page: 0, size: 1, ..PageRequest::default() };
        match engine.ledger().page_by_status(TransactionStatus::Processing, page).await {
            Ok(result) => engine.metrics().pending_transactions.set(result.total_elements as i64),
            Err(err) => tracing::warn!(%err, "pending gauge refresh failed"),
        }
    }
}

/// Sleeps until the next UTC midnight, resets the rolling daily-volume gauge,
/// then repeats. Computed on each iteration rather than with a fixed interval
/// so it self-corrects after a missed tick.
async fn daily_counter_reset(engine: Arc<TransactionEngine>, audit: Arc<dyn AuditLog>) {
    loop {
        tokio::time::sleep(duration_until_next_utc(0, 0, 0)).await;
        engine.metrics().daily_volume.reset();
        record_system_event(&audit, "scheduler.daily_counter_reset", serde_json::json!({})).await;
    }
}

async fn health_metric_snapshot(engine: Arc<TransactionEngine>, audit: Arc<dyn AuditLog>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5 * 60));
    loop {
        ticker.tick().await;
        let families = engine.metrics().render();
        match families {
            Ok(_) => record_system_event(&audit, "scheduler.health_metric_snapshot", serde_json::json!({})).await,
            Err(err) => tracing::warn!(%err, "health metric snapshot failed to render"),
        }
    }
}

/// Sleeps until 23:30 UTC, emits a summary audit event, then repeats.
async fn daily_summary_audit(engine: Arc<TransactionEngine>, audit: Arc<dyn AuditLog>) {
    loop {
        tokio::time::sleep(duration_until_next_utc(23, 30, 0)).await;
        let rendered = engine.metrics().render().unwrap_or_default();
        let completed = sum_counter_label(&rendered, "transactions_total", "status", "COMPLETED");
        let failed = sum_counter_label(&rendered, "transactions_total", "status", "FAILED");
        record_system_event(
            &audit,
            "scheduler.daily_summary",
            serde_json::json!({"completed": completed, "failed": failed}),
        )
        .await;
    }
}

async fn stale_processing_sweep(engine: Arc<TransactionEngine>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        match engine.sweep_stale_processing().await {
            Ok(swept) if swept > 0 => tracing::info!(swept, "swept stale PROCESSING rows"),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "stale processing sweep failed"),
        }
    }
}

/// Evaluates the threshold-based alert conditions against the current
/// metrics snapshot.
async fn alert_checks(engine: Arc<TransactionEngine>, config: Arc<Config>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        let rendered = match engine.metrics().render() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, "alert check could not render metrics");
                continue;
            }
        };

        let completed = sum_counter_label(&rendered, "transactions_total", "status", "COMPLETED");
        let failed = sum_counter_label(&rendered, "transactions_total", "status", "FAILED");
        let total = completed + failed;
        if total > 0 {
            let error_rate = failed as f64 / total as f64;
            if error_rate > config.alerting_error_rate_threshold {
                engine.alerts().trigger(AlertLevel::Critical, AlertType::HighErrorRate, &format!("rate {error_rate:.3}"));
            }
        }

        let active = engine.metrics().active_transactions.get();
        if active > 100 {
            engine.alerts().trigger(
                AlertLevel::Warning,
                AlertType::HighActiveTransactions,
                &format!("active {active}"),
            );
        }

        for currency in &config.currency_allowed {
            let volume = engine.metrics().daily_volume.with_label_values(&[currency.as_str()]).get();
            if Decimal::from(volume) > config.alerting_daily_volume_threshold {
                engine.alerts().trigger(
                    AlertLevel::Warning,
                    AlertType::HighDailyVolume,
                    &format!("{currency} volume {volume}"),
                );
            }
        }
    }
}

/// Pings the account service every 30s bypassing retry/circuit-breaker, and
/// is also the sole source for the consecutive-failure gauge and the paired
/// UNAVAILABLE/RECOVERED alerts: `AccountClient` does not expose the
/// resilient client's internal breaker state through its object-safe trait.
async fn account_service_health_ping(engine: Arc<TransactionEngine>, config: Arc<Config>) {
    let consecutive_failures = AtomicU32::new(0);
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        match engine.accounts().probe().await {
            Ok(()) => {
                let previous = consecutive_failures.swap(0, Ordering::SeqCst);
                engine.metrics().circuit_breaker_consecutive_errors.set(0);
                if previous >= config.alerting_account_service_error_threshold {
                    engine.alerts().trigger(AlertLevel::Info, AlertType::AccountServiceRecovered, "probe succeeded");
                }
            }
            Err(err) => {
                let failures = consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                engine.metrics().circuit_breaker_consecutive_errors.set(failures as i64);
                if failures >= config.alerting_account_service_error_threshold {
                    engine.alerts().trigger(
                        AlertLevel::Critical,
                        AlertType::AccountServiceUnavailable,
                        &format!("{failures} consecutive failures: {err}"),
                    );
                }
            }
        }
    }
}

async fn record_system_event(audit: &Arc<dyn AuditLog>, action: &str, fields: serde_json::Value) {
    if let Err(err) = audit
        .record(NewAuditEvent {
            correlation_id: "scheduler".to_string(),
            event_type: EventType::SystemEvent,
            action: action.to_string(),
            outcome: Outcome::Success,
            user_id: None,
            transaction_id: None,
            fields,
        })
        .await
    {
        tracing::warn!(%err, action, "failed to record scheduler audit event");
    }
}

fn duration_until_next_utc(hour: u32, minute: u32, second: u32) -> Duration {
    let now = Utc::now();
    let today = now.date_naive().and_hms_opt(hour, minute, second).expect("valid wall-clock time");
    let next = if now.time() < today.time() {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    let next_utc = next.and_utc();
    (next_utc - now).to_std().unwrap_or(Duration::from_secs(1))
}

/// Sums an `IntCounterVec` across every series whose `label_name` equals
/// `label_value`, reading the already-rendered text exposition rather than
/// re-deriving it from the live registry.
fn sum_counter_label(rendered: &str, metric: &str, label_name: &str, label_value: &str) -> u64 {
    rendered
        .lines()
        .filter(|line| line.starts_with(metric) && line.contains(&format!("{label_name}=\"{label_value}\"")))
        .filter_map(|line| line.rsplit(' ').next())
        .filter_map(|value| value.parse::<f64>().ok())
        .map(|value| value as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_matching_label_series() {
        let rendered = "transactions_total{type=\"DEPOSIT\",status=\"COMPLETED\"} 3\ntransactions_total{type=\"WITHDRAWAL\",status=\"COMPLETED\"} 2\ntransactions_total{type=\"DEPOSIT\",status=\"FAILED\"} 1\n";
        assert_eq!(sum_counter_label(rendered, "transactions_total", "status", "COMPLETED"), 5);
        assert_eq!(sum_counter_label(rendered, "transactions_total", "status", "FAILED"), 1);
    }

    #[test]
    fn next_midnight_is_within_24_hours() {
        let duration = duration_until_next_utc(0, 0, 0);
        assert!(duration <= Duration::from_secs(24 * 60 * 60));
    }
}
