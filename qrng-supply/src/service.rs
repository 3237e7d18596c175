// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Consumer-facing randomness service
//!
//! [`RandomNumberService`] is the only surface consumers talk to. Its accessors
//! block the calling thread for at most two take timeouts and fail with either
//! [`Error::EntropyExhausted`] (stop asking for this session) or
//! [`Error::InterruptedWait`] (the service is shutting down).
//!
//! The service owns a small tokio runtime that runs refills, so it must be
//! created and dropped outside of an async context.

use crate::{
    buffer::EntropyBuffer,
    config::SupplyConfig,
    metrics::Metrics,
    quota::Quota,
    refill::{RefillCoordinator, RefillPolicy, RefillReport},
    upstream::{HttpUpstream, UpstreamConfig, UpstreamSource},
    Error, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Number of distinct `i32` values, as the divisor mapping them onto `[0, 1)`
const I32_SPAN: f64 = 4_294_967_296.0;

/// Point-in-time view of the supply
#[derive(Debug, Clone)]
pub struct SupplyStatus {
    pub buffered_bytes: usize,
    pub buffer_capacity: usize,
    pub requests_issued: u32,
    pub requests_remaining: u32,
    pub refill_loading: bool,
    pub last_refill: Option<RefillReport>,
    pub shut_down: bool,
}

/// Buffered supply of quantum random values
pub struct RandomNumberService {
    config: SupplyConfig,
    buffer: EntropyBuffer,
    quota: Arc<Quota>,
    refill: RefillCoordinator,
    metrics: Metrics,
    runtime: Mutex<Option<Runtime>>,
}

impl RandomNumberService {
    /// Create a service fetching from the configured HTTP endpoint
    pub fn new(config: SupplyConfig) -> Result<Self> {
        config.validate()?;
        let upstream = HttpUpstream::new(UpstreamConfig::from_supply_config(&config)?)?;
        Self::with_source(config, Arc::new(upstream))
    }

    /// Create a service over any upstream source. Starts the first refill immediately.
    pub fn with_source(config: SupplyConfig, upstream: Arc<dyn UpstreamSource>) -> Result<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("qrng-refill")
            .enable_all()
            .build()?;

        let buffer = EntropyBuffer::new(config.buffer_capacity);
        let quota = Arc::new(Quota::new(config.max_requests));
        let metrics = Metrics::new();
        let policy = RefillPolicy {
            fetch_size: config.fetch_size,
            low_watermark: config.low_watermark,
            retry: config.retry_policy(),
            failure_pause: config.refill_pause(),
        };

        info!("Randomness supply from {}", upstream.describe());
        info!(
            "Buffer capacity: {} bytes, low watermark: {} bytes",
            config.buffer_capacity, config.low_watermark
        );
        info!(
            "Request quota: {}, attempts per refill: {}",
            config.max_requests, config.max_retry_attempts
        );

        let refill = RefillCoordinator::new(
            upstream,
            buffer.clone(),
            quota.clone(),
            policy,
            metrics.clone(),
            runtime.handle().clone(),
        );

        let service = Self {
            config,
            buffer,
            quota,
            refill,
            metrics,
            runtime: Mutex::new(Some(runtime)),
        };
        service.refill.trigger();
        Ok(service)
    }

    /// Next random byte
    pub fn next_byte(&self) -> Result<u8> {
        let [byte] = self.draw::<1>()?;
        Ok(byte)
    }

    /// Next random `i32`, built from four bytes most-significant first.
    ///
    /// The four bytes are taken in one step: on failure none are consumed.
    pub fn next_i32(&self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.draw::<4>()?))
    }

    /// Next random value in `[min, max)`, scaled linearly from one `i32`
    pub fn next_in_range(&self, min: i64, max: i64) -> Result<i64> {
        if max <= min {
            return Err(Error::Validation(format!(
                "range requires max > min, got [{}, {})",
                min, max
            )));
        }
        Ok(scale_to_range(self.next_i32()?, min, max))
    }

    /// Current buffer, quota and refill state
    pub fn status(&self) -> SupplyStatus {
        SupplyStatus {
            buffered_bytes: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            requests_issued: self.quota.issued(),
            requests_remaining: self.quota.remaining(),
            refill_loading: self.refill.is_loading(),
            last_refill: self.refill.last_report(),
            shut_down: self.runtime.lock().is_none(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &SupplyConfig {
        &self.config
    }

    /// Stop refilling, wake every waiting consumer with [`Error::InterruptedWait`]
    /// and give in-flight work up to the configured grace period to finish.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        info!("Shutting down randomness supply");
        self.refill.cancel();
        self.buffer.close();

        let grace = self.config.shutdown_grace();
        let start = Instant::now();
        runtime.shutdown_timeout(grace);
        if start.elapsed() >= grace {
            warn!("Refill worker did not stop within {:?}; abandoned", grace);
        }
        info!("Randomness supply shut down");
    }

    fn draw<const N: usize>(&self) -> Result<[u8; N]> {
        let start = Instant::now();

        match self.take_with_refill::<N>() {
            Ok(bytes) => {
                self.metrics
                    .record_draw(N, start.elapsed().as_micros() as u64);
                if self.buffer.len() < self.config.low_watermark {
                    self.refill.trigger();
                }
                Ok(bytes)
            }
            Err(e) => {
                self.metrics.record_draw_failure();
                Err(e)
            }
        }
    }

    fn take_with_refill<const N: usize>(&self) -> Result<[u8; N]> {
        let timeout = self.config.take_timeout();

        match self.buffer.take_exact::<N>(timeout) {
            Err(Error::Timeout) => {}
            other => return other,
        }

        if self.quota.is_exhausted() {
            warn!("Request quota reached and no random bytes are left");
            return Err(Error::EntropyExhausted);
        }

        self.refill.trigger();
        self.buffer.take_exact::<N>(timeout).map_err(|e| match e {
            Error::Timeout => {
                warn!("No random bytes arrived within {:?}", timeout);
                Error::EntropyExhausted
            }
            other => other,
        })
    }
}

impl Drop for RandomNumberService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map `value` onto `[min, max)` through `(value - i32::MIN) / 2^32`
fn scale_to_range(value: i32, min: i64, max: i64) -> i64 {
    let normalized = (value as f64 - i32::MIN as f64) / I32_SPAN;
    let span = max as i128 - min as i128;
    let offset = ((normalized * span as f64).floor() as i128).min(span - 1);
    (min as i128 + offset) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refill::RefillOutcome;
    use crate::stats::{self, UniformRange};
    use crate::testing::{network_failure, wait_for, ScriptedSource};
    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn test_config() -> SupplyConfig {
        SupplyConfig {
            take_timeout_ms: 2000,
            shutdown_grace_ms: 500,
            ..Default::default()
        }
    }

    /// Config sized so refills never overflow and 4-byte groups stay aligned
    fn streaming_config() -> SupplyConfig {
        SupplyConfig {
            fetch_size: 1000,
            buffer_capacity: 4000,
            low_watermark: 1000,
            max_requests: 1000,
            ..test_config()
        }
    }

    #[test]
    fn test_int32_is_msb_first() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
            0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00,
        ])]));
        let config = SupplyConfig {
            low_watermark: 0,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source).unwrap();

        assert_eq!(service.next_i32().unwrap(), 1);
        assert_eq!(service.next_i32().unwrap(), -1);
        assert_eq!(service.next_i32().unwrap(), i32::MIN);
        assert_eq!(service.metrics().bytes_served(), 12);
    }

    #[test]
    fn test_bytes_arrive_in_fetch_order() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![5, 6, 7])]));
        let config = SupplyConfig {
            low_watermark: 0,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source).unwrap();

        assert_eq!(service.next_byte().unwrap(), 5);
        assert_eq!(service.next_byte().unwrap(), 6);
        assert_eq!(service.next_byte().unwrap(), 7);
    }

    #[test]
    fn test_recovers_from_two_failures_with_one_request() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(network_failure()),
            Err(Error::Parse("unexpected response".into())),
            Ok((1..=16).collect()),
        ]));
        let config = SupplyConfig {
            low_watermark: 0,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source.clone()).unwrap();

        assert_eq!(service.next_byte().unwrap(), 1);

        let status = service.status();
        assert_eq!(status.requests_issued, 1);
        assert_eq!(status.buffered_bytes, 15);
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_quota_cap_with_empty_buffer_times_out_to_exhausted() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![7])]));
        let config = SupplyConfig {
            max_requests: 1,
            low_watermark: 0,
            take_timeout_ms: 300,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source.clone()).unwrap();
        assert_eq!(service.next_byte().unwrap(), 7);
        assert_eq!(service.status().requests_remaining, 0);

        let start = Instant::now();
        let result = service.next_byte();
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(Error::EntropyExhausted)));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_sustained_outage_surfaces_as_exhausted() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let config = SupplyConfig {
            take_timeout_ms: 200,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source.clone()).unwrap();

        let start = Instant::now();
        assert!(matches!(service.next_byte(), Err(Error::EntropyExhausted)));
        assert!(start.elapsed() >= Duration::from_millis(400));

        // Bursts of three attempts keep coming while the buffer is below the watermark
        assert!(wait_for(Duration::from_secs(2), || source.calls() >= 6));
        let status = service.status();
        assert_eq!(status.requests_issued, 0);
        assert_eq!(status.buffered_bytes, 0);
        assert!(matches!(
            status.last_refill.map(|r| r.outcome),
            Some(RefillOutcome::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(service.metrics().draw_failures(), 1);
    }

    #[test]
    fn test_outage_longer_than_one_burst_recovers_within_first_wait() {
        let mut steps: Vec<_> = (0..6).map(|_| Err(network_failure())).collect();
        steps.push(Ok(vec![42; 16]));
        let source = Arc::new(ScriptedSource::new(steps));
        let config = SupplyConfig {
            take_timeout_ms: 300,
            refill_pause_ms: 20,
            ..test_config()
        };
        let service = RandomNumberService::with_source(config, source.clone()).unwrap();

        assert_eq!(service.next_byte().unwrap(), 42);
        assert!(source.calls() >= 7);
        assert_eq!(service.status().requests_issued, 1);
        assert_eq!(service.metrics().draw_failures(), 0);
    }

    #[test]
    fn test_range_draws_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let source = Arc::new(ScriptedSource::generating(move |n| {
            let mut bytes = vec![0u8; n];
            rng.fill_bytes(&mut bytes);
            Ok(bytes)
        }));
        let service = RandomNumberService::with_source(streaming_config(), source).unwrap();

        let mut seen = [0usize; 10];
        for _ in 0..10_000 {
            let value = service.next_in_range(0, 10).unwrap();
            assert!((0..10).contains(&value), "out of range: {}", value);
            seen[value as usize] += 1;
        }
        assert!(seen.iter().all(|&count| count > 0));
    }

    #[test]
    fn test_uniform_stream_passes_kolmogorov_smirnov() {
        const DRAWS: u64 = 10_000;

        // Evenly spread i32 values: (i + 0.5) / DRAWS of the way through the i32 range
        let mut words = (0..DRAWS).flat_map(|i| {
            let offset = (2 * i + 1) * u32::MAX as u64 / (2 * DRAWS);
            ((i32::MIN as i64 + offset as i64) as i32).to_be_bytes()
        });
        let source = Arc::new(ScriptedSource::generating(move |n| {
            let chunk: Vec<u8> = words.by_ref().take(n).collect();
            if chunk.is_empty() {
                Err(network_failure())
            } else {
                Ok(chunk)
            }
        }));
        let service = RandomNumberService::with_source(streaming_config(), source).unwrap();

        let mut sample: Vec<i64> = (0..DRAWS)
            .map(|_| service.next_in_range(0, 10).unwrap())
            .collect();
        assert!(sample.iter().all(|v| (0..10).contains(v)));

        let outcome = stats::kolmogorov_smirnov(
            &mut sample,
            &UniformRange::new(0, 10).unwrap(),
            stats::DEFAULT_ALPHA,
        )
        .unwrap();
        assert!(outcome.passes(), "{:?}", outcome);
    }

    #[test]
    fn test_concurrent_consumers() {
        let source = Arc::new(ScriptedSource::generating(|n| Ok(vec![0x11; n])));
        let service = RandomNumberService::with_source(streaming_config(), source).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        assert_eq!(service.next_i32().unwrap(), 0x1111_1111);
                    }
                });
            }
        });
        assert_eq!(service.metrics().values_served(), 2000);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![0; 4])]));
        let service = RandomNumberService::with_source(test_config(), source).unwrap();

        assert!(matches!(
            service.next_in_range(10, 10),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.next_in_range(10, -10),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_shutdown_interrupts_waiting_consumer() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![1])]).gated(gate));
        let config = SupplyConfig {
            take_timeout_ms: 10_000,
            ..test_config()
        };
        let service = Arc::new(RandomNumberService::with_source(config, source).unwrap());

        let consumer = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.next_byte())
        };
        std::thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        service.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));

        assert!(matches!(
            consumer.join().unwrap(),
            Err(Error::InterruptedWait)
        ));
        assert!(matches!(service.next_byte(), Err(Error::InterruptedWait)));
        assert!(service.status().shut_down);
        assert_eq!(service.status().requests_issued, 0);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SupplyConfig {
            endpoint_url: "::not-a-url::".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RandomNumberService::new(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_scale_to_range() {
        assert_eq!(scale_to_range(i32::MIN, 0, 10), 0);
        assert_eq!(scale_to_range(0, 0, 10), 5);
        assert_eq!(scale_to_range(i32::MAX, 0, 10), 9);
        assert_eq!(scale_to_range(i32::MIN, -5, 5), -5);
        assert!(scale_to_range(i32::MAX, i64::MIN, i64::MAX) < i64::MAX);
        assert_eq!(scale_to_range(i32::MIN, i64::MIN, i64::MAX), i64::MIN);
        assert_eq!(scale_to_range(12345, 7, 8), 7);
    }
}
