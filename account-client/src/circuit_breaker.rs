use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Size of the sliding window of recent call outcomes (default 10).
    pub window_size: usize,
    /// Calls must accumulate at least this many samples before the failure rate
    /// is evaluated (default 5, never higher than `window_size`).
    pub minimum_calls: usize,
    /// Fraction of failures in the window that trips the breaker (default 0.5).
    pub failure_rate_threshold: f64,
    /// Time spent OPEN before a HALF_OPEN probe is allowed (default 30s).
    pub open_wait: Duration,
    /// Concurrent probe calls allowed while HALF_OPEN (default 1).
    pub max_half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 0.5,
            open_wait: Duration::from_secs(30),
            max_half_open_probes: 1,
        }
    }
}

struct Inner {
    state: CircuitState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_probes_in_flight: u32,
    consecutive_failures: u32,
}

/// A CLOSED/OPEN/HALF_OPEN state machine guarding the account client's outbound
/// calls. While OPEN, calls fail fast with `Unavailable` rather than reaching
/// the network; after `open_wait`, a bounded cohort of probe calls in HALF_OPEN
/// decide whether service has recovered.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.window_size),
                opened_at: None,
                half_open_probes_in_flight: 0,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner
            .lock()
            .expect("circuit breaker mutex poisoned")
            .consecutive_failures
    }

    /// Gates a call before it is attempted. Returns `false` when the caller must
    /// fail fast instead of invoking the backend.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_wait {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probes_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes_in_flight < self.config.max_half_open_probes {
                    inner.half_open_probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        push_window(&mut inner.window, self.config.window_size, true);
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.half_open_probes_in_flight = 0;
            inner.opened_at = None;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures += 1;
        push_window(&mut inner.window, self.config.window_size, false);

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.half_open_probes_in_flight = 0;
            return;
        }

        if inner.window.len() >= self.config.minimum_calls {
            let failures = inner.window.iter().filter(|ok| !**ok).count();
            let failure_rate = failures as f64 / inner.window.len() as f64;
            if failure_rate >= self.config.failure_rate_threshold {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
        }
    }
}

fn push_window(window: &mut VecDeque<bool>, capacity: usize, outcome: bool) {
    if window.len() >= capacity {
        window.pop_front();
    }
    window.push_back(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 0.5,
            open_wait: Duration::from_millis(20),
            max_half_open_probes: 1,
        }
    }

    #[test]
    fn starts_closed_and_allows_calls() {
        let breaker = CircuitBreaker::new(config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_call());
    }

    #[test]
    fn trips_open_once_failure_rate_crosses_threshold() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..2 {
            breaker.record_success();
        }
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_call());
    }

    #[test]
    fn stays_closed_below_minimum_calls() {
        let breaker = CircuitBreaker::new(config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_opens_after_wait_and_recovers_on_probe_success() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_call());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..5 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_call());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
