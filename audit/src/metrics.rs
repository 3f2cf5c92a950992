use std::time::Instant;

use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

/// Counters, gauges, and timers emitted at the engine's decision points and
/// rendered in Prometheus text-exposition format for scraping.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub transactions_total: IntCounterVec,
    pub transaction_errors_total: IntCounterVec,

    pub active_transactions: IntGauge,
    pub pending_transactions: IntGauge,
    pub daily_volume: IntGaugeVec,
    pub circuit_breaker_consecutive_errors: IntGauge,

    pub processing_duration_seconds: HistogramVec,
    pub account_validation_duration_seconds: HistogramVec,
    pub balance_check_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "transactions_total",
                "Transactions by type and terminal status",
            ),
            &["type", "status"],
        )
        .expect("metric");

        let transaction_errors_total = IntCounterVec::new(
            Opts::new("transaction_errors_total", "Transaction failures by error subtype"),
            &["reason"], // insufficient_funds|account_not_found|limit_exceeded|account_service_error
        )
        .expect("metric");

        let active_transactions = IntGauge::new(
            "active_transactions",
            "Transactions currently in PROCESSING",
        )
        .expect("metric");

        let pending_transactions = IntGauge::new(
            "pending_transactions",
            "PROCESSING rows as last refreshed from storage",
        )
        .expect("metric");

        let daily_volume = IntGaugeVec::new(
            Opts::new("daily_volume_minor_units", "Rolling daily completed volume"),
            &["currency"],
        )
        .expect("metric");

        let circuit_breaker_consecutive_errors = IntGauge::new(
            "circuit_breaker_consecutive_errors",
            "Consecutive account-client failures observed by the circuit breaker",
        )
        .expect("metric");

        let processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transaction_processing_duration_seconds",
                "End-to-end engine processing duration",
            ),
            &["type"],
        )
        .expect("metric");

        let account_validation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "account_validation_duration_seconds",
                "Time spent resolving accounts through the account client",
            ),
            &["result"],
        )
        .expect("metric");

        let balance_check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "balance_check_duration_seconds",
                "Time spent evaluating funds sufficiency",
            ),
            &["result"],
        )
        .expect("metric");

        registry
            .register(Box::new(transactions_total.clone()))
            .expect("register");
        registry
            .register(Box::new(transaction_errors_total.clone()))
            .expect("register");
        registry
            .register(Box::new(active_transactions.clone()))
            .expect("register");
        registry
            .register(Box::new(pending_transactions.clone()))
            .expect("register");
        registry.register(Box::new(daily_volume.clone())).expect("register");
        registry
            .register(Box::new(circuit_breaker_consecutive_errors.clone()))
            .expect("register");
        registry
            .register(Box::new(processing_duration_seconds.clone()))
            .expect("register");
        registry
            .register(Box::new(account_validation_duration_seconds.clone()))
            .expect("register");
        registry
            .register(Box::new(balance_check_duration_seconds.clone()))
            .expect("register");

        Self {
            registry,
            transactions_total,
            transaction_errors_total,
            active_transactions,
            pending_transactions,
            daily_volume,
            circuit_breaker_consecutive_errors,
            processing_duration_seconds,
            account_validation_duration_seconds,
            balance_check_duration_seconds,
        }
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }

    pub fn timer() -> Instant {
        Instant::now()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
