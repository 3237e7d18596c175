// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Single-flight background refill of the entropy buffer
//!
//! # State machine
//!
//! ```text
//!            trigger (idle, quota left)
//!   ┌──────┐ ─────────────────────────> ┌─────────┐
//!   │ Idle │                            │ Loading │
//!   └──────┘ <───────────────────────── └─────────┘
//!       │     filled / retries exhausted      ▲
//!       │                                     │
//!       └──── still below low-watermark ──────┘
//! ```
//!
//! The self-loop is re-evaluated after every refill, failed ones included. A
//! refill that ran out of attempts holds `Loading` for the configured pause
//! before going back to `Idle`, so an outage is retried in bursts rather than
//! in a tight loop.
//!
//! At most one refill is `Loading` at any instant. The `Idle → Loading` edge is a
//! single compare-and-set on an atomic flag; nothing is locked across the network
//! call. A quota slot is reserved only once a fetch succeeds, so a refill that
//! needed three attempts still counts as one request.

use crate::{
    buffer::EntropyBuffer, metrics::Metrics, quota::Quota, retry::RetryPolicy,
    upstream::UpstreamSource, Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Refill tuning
#[derive(Debug, Clone)]
pub struct RefillPolicy {
    /// Bytes requested per upstream call
    pub fetch_size: usize,
    /// Buffer size below which another refill is scheduled
    pub low_watermark: usize,
    /// Attempts and backoff per refill
    pub retry: RetryPolicy,
    /// Delay before the self-loop re-enters after a refill ran out of attempts
    pub failure_pause: Duration,
}

/// How a finished refill ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Bytes were appended to the buffer
    Filled { bytes_accepted: usize, attempts: u32 },
    /// Every attempt failed; the buffer is unchanged
    Exhausted { attempts: u32, last_error: String },
}

/// Last completed refill, for status reporting
#[derive(Debug, Clone)]
pub struct RefillReport {
    pub finished_at: DateTime<Utc>,
    pub outcome: RefillOutcome,
}

/// Schedules refills on a background runtime
#[derive(Clone)]
pub struct RefillCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    upstream: Arc<dyn UpstreamSource>,
    buffer: EntropyBuffer,
    quota: Arc<Quota>,
    policy: RefillPolicy,
    metrics: Metrics,
    handle: Handle,
    loading: AtomicBool,
    cancel: CancellationToken,
    last_report: RwLock<Option<RefillReport>>,
}

impl RefillCoordinator {
    pub fn new(
        upstream: Arc<dyn UpstreamSource>,
        buffer: EntropyBuffer,
        quota: Arc<Quota>,
        policy: RefillPolicy,
        metrics: Metrics,
        handle: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                upstream,
                buffer,
                quota,
                policy,
                metrics,
                handle,
                loading: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                last_report: RwLock::new(None),
            }),
        }
    }

    /// Schedule a refill unless one is already loading, the quota is spent, or
    /// the coordinator was cancelled. Returns whether a refill was scheduled.
    pub fn trigger(&self) -> bool {
        let inner = &self.inner;

        if inner.cancel.is_cancelled() {
            return false;
        }
        if inner.quota.is_exhausted() {
            debug!(
                "Request quota of {} reached, refill skipped",
                inner.quota.limit()
            );
            return false;
        }
        if inner
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let this = self.clone();
        inner.handle.spawn(async move { this.run().await });
        true
    }

    /// Whether a refill is in flight
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    /// Last completed refill, if any
    pub fn last_report(&self) -> Option<RefillReport> {
        self.inner.last_report.read().clone()
    }

    /// Stop scheduling refills and abandon the one in flight
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    async fn run(&self) {
        let inner = &self.inner;

        let outcome = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                debug!("Refill abandoned on shutdown");
                return;
            }
            outcome = self.refill() => outcome,
        };

        let exhausted = matches!(outcome, RefillOutcome::Exhausted { .. });
        *inner.last_report.write() = Some(RefillReport {
            finished_at: Utc::now(),
            outcome,
        });

        let pause = inner.policy.failure_pause;
        if exhausted && !pause.is_zero() && self.below_watermark() {
            debug!("Refilling again in {:?}", pause);
            tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => return,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        inner.loading.store(false, Ordering::Release);

        if self.below_watermark() {
            self.trigger();
        }
    }

    fn below_watermark(&self) -> bool {
        self.inner.buffer.len() < self.inner.policy.low_watermark
    }

    async fn refill(&self) -> RefillOutcome {
        let inner = &self.inner;
        let mut attempts = 0;

        let fetched = inner
            .policy
            .retry
            .execute(|| {
                attempts += 1;
                self.fetch_attempt()
            })
            .await;

        match fetched.and_then(|bytes| self.store(bytes)) {
            Ok(bytes_accepted) => RefillOutcome::Filled {
                bytes_accepted,
                attempts,
            },
            Err(e) => {
                error!(
                    "Refill from {} gave up after {} attempt(s): {}",
                    inner.upstream.describe(),
                    attempts,
                    e
                );
                RefillOutcome::Exhausted {
                    attempts,
                    last_error: e.to_string(),
                }
            }
        }
    }

    async fn fetch_attempt(&self) -> Result<Vec<u8>> {
        let inner = &self.inner;
        inner.metrics.record_fetch_attempt();

        let result = inner.upstream.fetch(inner.policy.fetch_size).await;
        if result.is_err() {
            inner.metrics.record_fetch_failure();
        }
        result
    }

    fn store(&self, bytes: Vec<u8>) -> Result<usize> {
        let inner = &self.inner;

        if !inner.quota.try_reserve() {
            warn!("Fetched {} bytes after the request quota ran out; discarded", bytes.len());
            return Err(Error::QuotaExceeded);
        }
        info!(
            "Upstream requests: {}/{}",
            inner.quota.issued(),
            inner.quota.limit()
        );
        if inner.quota.is_exhausted() {
            warn!(
                "Maximum number of upstream requests reached: {}",
                inner.quota.limit()
            );
        }

        let accepted = inner.buffer.put_all(&bytes);
        inner.metrics.record_refill(bytes.len(), bytes.len() - accepted);
        info!(
            "Refilled {} of {} bytes, buffer: {}/{}",
            accepted,
            bytes.len(),
            inner.buffer.len(),
            inner.buffer.capacity()
        );
        Ok(accepted)
    }
}
