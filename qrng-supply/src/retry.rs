// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Retry logic with optional exponential backoff and jitter

use crate::Result;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial backoff duration; zero retries immediately
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add jitter to prevent synchronized retries
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Immediate retries, up to `max_attempts` in total
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Exponential backoff starting at `initial_backoff`, with jitter
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            jitter: true,
            ..Default::default()
        }
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` upstream calls have been made.
    pub async fn execute<F, Fut, T>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut made = 0;

        loop {
            made += 1;
            let err = match attempt().await {
                Ok(value) => {
                    if made > 1 {
                        debug!("Upstream call succeeded on attempt {}", made);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() || made >= self.max_attempts {
                warn!(
                    "Upstream call failed on attempt {}/{}, giving up: {}",
                    made, self.max_attempts, err
                );
                return Err(err);
            }

            let delay = self.delay_after(made);
            warn!(
                "Upstream call failed on attempt {}/{}: {}. Next attempt in {:?}",
                made, self.max_attempts, err, delay
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    /// Pause after the `made`-th failed attempt: `initial_backoff * multiplier^(made-1)`,
    /// capped at `max_backoff`, plus up to a quarter of jitter.
    pub fn delay_after(&self, made: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let growth = self.multiplier.powi(made.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * growth)
            .min(self.max_backoff.as_millis() as f64);
        let delay = Duration::from_millis(millis.round() as u64);
        if !self.jitter {
            return delay;
        }

        let spread_ms = (delay.as_millis() / 4) as u64;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread_ms))
    }
}
