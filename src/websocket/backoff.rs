//! Reconnect backoff

use rand::Rng;
use std::time::Duration;

/// Exponential backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect
    pub base: Duration,
    /// Upper bound of any delay
    pub max: Duration,
    /// Extra random delay as a fraction of the current step, in `[0, 1)`
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            max: Duration::from_millis(60_000),
            jitter: 0.2,
        }
    }
}

/// Doubling delay with cap and jitter, reset once a connection is ready.
///
/// Jitter below 1 keeps consecutive delays strictly increasing until the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let step = self
            .config
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt.min(20)))
            .min(self.config.max);

        let jitter = self.config.jitter.clamp(0.0, 0.999);
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..jitter)
        } else {
            1.0
        };

        self.attempt = self.attempt.saturating_add(1);
        step.mul_f64(factor).min(self.config.max)
    }

    /// Consecutive failed attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
