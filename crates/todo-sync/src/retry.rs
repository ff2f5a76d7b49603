//! # Retry Policy
//!
//! Decides whether a failed remote call is tried again and how long to wait.
//!
//! ```text
//! attempt fails ──► retry_count += 1 ──► retry_count > max_retries ?
//!                                          │ yes            │ no
//!                                          ▼                ▼
//!                                       abandon        sleep(delay_for(retry_count))
//!                                                            │
//!                                                            ▼
//!                                                      next attempt
//! ```
//!
//! Exponential delays come from `backoff::ExponentialBackoff` with jitter
//! disabled, so a given attempt always waits the same amount of time.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use todo_core::DEFAULT_MAX_RETRIES;

/// Delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// No delay.
    Immediate,
    /// The same delay before every retry.
    Fixed(Duration),
    /// `initial`, doubling on each retry, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Retry limit plus delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts tolerated before the operation is abandoned.
    pub max_retries: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            strategy: RetryStrategy::Fixed(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, strategy: RetryStrategy) -> Self {
        RetryPolicy {
            max_retries,
            strategy,
        }
    }

    /// No delays. Used by tests and by callers that drive retries themselves.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, RetryStrategy::Immediate)
    }

    /// True once `retry_count` failures exceed the limit.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }

    /// Delay before the attempt that follows failure number `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match self.strategy {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Fixed(delay) => delay,
            RetryStrategy::Exponential { initial, max } => {
                let mut backoff = ExponentialBackoff {
                    initial_interval: initial,
                    current_interval: initial,
                    max_interval: max,
                    multiplier: 2.0,
                    randomization_factor: 0.0,
                    max_elapsed_time: None,
                    ..Default::default()
                };

                let mut delay = initial;
                for _ in 0..retry_count.max(1) {
                    delay = backoff.next_backoff().unwrap_or(max);
                }
                delay.min(max)
            }
        }
    }
}
