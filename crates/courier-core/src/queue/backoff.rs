//! Exponential backoff between retries of a failed queue item.
//!
//! Delay for attempt `n` (1-based) is `initial * 2^(n-1)`, capped at `max`.
//! With a non-zero jitter factor the delay is stretched by a random fraction
//! of itself, still capped at `max`.

use std::time::Duration;

use courier_types::config::BackoffConfig;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the `attempt`-th failure.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let multiplier = 2u32.saturating_pow(exponent);
        let base = self.initial.saturating_mul(multiplier).min(self.max);

        if self.jitter == 0.0 {
            return base;
        }

        let stretch = rand::thread_rng().gen_range(0.0..=self.jitter);
        base.mul_f64(1.0 + stretch).min(self.max)
    }

    /// Whether `attempts` failures have used up the retry budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Backoff::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter)
        .with_max_attempts(config.max_attempts)
    }
}
