use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertLevel {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    HighErrorRate,
    AccountServiceUnavailable,
    AccountServiceRecovered,
    HighDailyVolume,
    HighActiveTransactions,
    SlowTransactionProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Dispatched,
    Suppressed,
}

/// Level-triaged, suppression-aware alert dispatcher. Identical
/// `(level, type)` alerts within the suppression window (default 15 min) are
/// logged but not re-dispatched.
pub struct AlertManager {
    suppression_window: Duration,
    last_dispatched: Mutex<HashMap<(AlertLevel, AlertType), Instant>>,
}

impl AlertManager {
    pub fn new(suppression_window: Duration) -> Self {
        Self {
            suppression_window,
            last_dispatched: Mutex::new(HashMap::new()),
        }
    }

    /// Always observed (callers should still increment a metric); returns whether
    /// this call actually crossed the suppression window and should be dispatched
    /// to a notification sink.
    pub fn trigger(&self, level: AlertLevel, alert_type: AlertType, detail: &str) -> AlertOutcome {
        let key = (level, alert_type);
        let mut last_dispatched = self.last_dispatched.lock().expect("alert mutex poisoned");
        let now = Instant::now();
        if let Some(last) = last_dispatched.get(&key)
            && now.duration_since(*last) < self.suppression_window
        {
            tracing::info!(?level, ?alert_type, detail, "alert suppressed");
            return AlertOutcome::Suppressed;
        }
        last_dispatched.insert(key, now);
        tracing::warn!(?level, ?alert_type, detail, "alert dispatched");
        AlertOutcome::Dispatched
    }
}

impl std::fmt::Debug for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Info => "INFO",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Debug for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::HighErrorRate => "HIGH_ERROR_RATE",
            AlertType::AccountServiceUnavailable => "ACCOUNT_SERVICE_UNAVAILABLE",
            AlertType::AccountServiceRecovered => "ACCOUNT_SERVICE_RECOVERED",
            AlertType::HighDailyVolume => "HIGH_DAILY_VOLUME",
            AlertType::HighActiveTransactions => "HIGH_ACTIVE_TRANSACTIONS",
            AlertType::SlowTransactionProcessing => "SLOW_TRANSACTION_PROCESSING",
        };
        write!(f, "{s}")
    }
}
