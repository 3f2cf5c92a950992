//! Environment-driven configuration. Every key has a default so the service
//! boots with nothing set beyond the two JWT secrets.

use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| format!("{key} is not valid: {raw}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub account_service_base_url: String,
    pub account_service_timeout: Duration,

    pub retry_max_attempts: u32,
    pub retry_wait: Duration,

    pub cb_failure_rate_threshold: f64,
    pub cb_sliding_window_size: usize,
    pub cb_minimum_number_of_calls: usize,
    pub cb_wait_duration_in_open_state: Duration,

    pub jwt_secret: String,
    pub jwt_internal_secret: String,

    pub alerting_error_rate_threshold: f64,
    pub alerting_response_time_threshold: Duration,
    pub alerting_account_service_error_threshold: u32,
    pub alerting_daily_volume_threshold: rust_decimal::Decimal,
    pub alerting_suppression: Duration,

    pub reversal_window_days: i64,
    pub cache_account_ttl: Duration,
    pub currency_allowed: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080u16)?,

            account_service_base_url: env_or("ACCOUNT_SERVICE_BASE_URL", "http://localhost:8081"),
            account_service_timeout: Duration::from_millis(parse_env("ACCOUNT_SERVICE_TIMEOUT_MS", 5_000u64)?),

            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 3u32)?,
            retry_wait: Duration::from_millis(parse_env("RETRY_WAIT_DURATION_MS", 1_000u64)?),

            cb_failure_rate_threshold: parse_env("CB_FAILURE_RATE_THRESHOLD", 0.5f64)?,
            cb_sliding_window_size: parse_env("CB_SLIDING_WINDOW_SIZE", 10usize)?,
            cb_minimum_number_of_calls: parse_env("CB_MINIMUM_NUMBER_OF_CALLS", 5usize)?,
            cb_wait_duration_in_open_state: Duration::from_millis(parse_env(
                "CB_WAIT_DURATION_IN_OPEN_STATE_MS",
                30_000u64,
            )?),

            jwt_secret: env_or("SECURITY_JWT_SECRET", "dev-user-secret-change-me"),
            jwt_internal_secret: env_or("SECURITY_JWT_INTERNAL_SECRET", "dev-internal-secret-change-me"),

            alerting_error_rate_threshold: parse_env("ALERTING_ERROR_RATE_THRESHOLD", 0.1f64)?,
            alerting_response_time_threshold: Duration::from_millis(parse_env(
                "ALERTING_RESPONSE_TIME_THRESHOLD_MS",
                2_000u64,
            )?),
            alerting_account_service_error_threshold: parse_env("ALERTING_ACCOUNT_SERVICE_ERROR_THRESHOLD", 5u32)?,
            alerting_daily_volume_threshold: parse_env(
                "ALERTING_DAILY_VOLUME_THRESHOLD",
                rust_decimal::Decimal::from(1_000_000),
            )?,
            alerting_suppression: Duration::from_secs(parse_env("ALERTING_SUPPRESSION_MINUTES", 15u64)? * 60),

            reversal_window_days: parse_env("REVERSAL_WINDOW_DAYS", 30i64)?,
            cache_account_ttl: Duration::from_secs(parse_env("CACHE_ACCOUNT_TTL_SECONDS", 60u64)?),
            currency_allowed: env_or("CURRENCY_ALLOWED", "USD")
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_any_env_vars_set() {
        // SAFETY: this test does not rely on env vars set by other tests in this
        // process; it only reads keys this module owns.
        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.currency_allowed, vec!["USD".to_string()]);
        assert_eq!(config.reversal_window_days, 30);
    }
}
