// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Metrics collection and reporting

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const LATENCY_WINDOW: usize = 10_000;

/// Supply-wide metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Upstream metrics
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
    bytes_fetched: AtomicU64,
    bytes_dropped: AtomicU64,

    // Consumer metrics
    values_served: AtomicU64,
    bytes_served: AtomicU64,
    draw_failures: AtomicU64,

    // Consumer wait latency (microseconds)
    wait_latencies: RwLock<Vec<u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                fetch_attempts: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
                bytes_fetched: AtomicU64::new(0),
                bytes_dropped: AtomicU64::new(0),
                values_served: AtomicU64::new(0),
                bytes_served: AtomicU64::new(0),
                draw_failures: AtomicU64::new(0),
                wait_latencies: RwLock::new(Vec::with_capacity(LATENCY_WINDOW)),
            }),
        }
    }

    // Upstream metrics
    pub fn record_fetch_attempt(&self) {
        self.inner.fetch_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful refill: bytes received and bytes the buffer had no room for
    pub fn record_refill(&self, fetched: usize, dropped: usize) {
        self.inner.bytes_fetched.fetch_add(fetched as u64, Ordering::Relaxed);
        self.inner.bytes_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn fetch_attempts(&self) -> u64 {
        self.inner.fetch_attempts.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.inner.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn bytes_fetched(&self) -> u64 {
        self.inner.bytes_fetched.load(Ordering::Relaxed)
    }

    pub fn bytes_dropped(&self) -> u64 {
        self.inner.bytes_dropped.load(Ordering::Relaxed)
    }

    // Consumer metrics
    pub fn record_draw(&self, bytes: usize, latency_micros: u64) {
        self.inner.values_served.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_served.fetch_add(bytes as u64, Ordering::Relaxed);

        let mut latencies = self.inner.wait_latencies.write();
        latencies.push(latency_micros);
        if latencies.len() > LATENCY_WINDOW {
            latencies.drain(0..LATENCY_WINDOW / 2);
        }
    }

    pub fn record_draw_failure(&self) {
        self.inner.draw_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn values_served(&self) -> u64 {
        self.inner.values_served.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.inner.bytes_served.load(Ordering::Relaxed)
    }

    pub fn draw_failures(&self) -> u64 {
        self.inner.draw_failures.load(Ordering::Relaxed)
    }

    // Derived metrics
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn latency_percentile(&self, percentile: f64) -> Option<u64> {
        let latencies = self.inner.wait_latencies.read();
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() as f64 * percentile).ceil() as usize).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn latency_p50(&self) -> Option<u64> {
        self.latency_percentile(0.50)
    }

    pub fn latency_p99(&self) -> Option<u64> {
        self.latency_percentile(0.99)
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("qrng_fetch_attempts_total", "Upstream fetch attempts", self.fetch_attempts()),
            ("qrng_fetch_failures_total", "Failed upstream fetch attempts", self.fetch_failures()),
            ("qrng_bytes_fetched_total", "Random bytes received from upstream", self.bytes_fetched()),
            ("qrng_bytes_dropped_total", "Random bytes dropped on buffer overflow", self.bytes_dropped()),
            ("qrng_values_served_total", "Values handed to consumers", self.values_served()),
            ("qrng_bytes_served_total", "Random bytes handed to consumers", self.bytes_served()),
            ("qrng_draw_failures_total", "Consumer draws that failed", self.draw_failures()),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output.push_str("# HELP qrng_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE qrng_uptime_seconds gauge\n");
        output.push_str(&format!("qrng_uptime_seconds {}\n", self.uptime_seconds()));

        if let Some(p50) = self.latency_p50() {
            output.push_str("# HELP qrng_wait_p50_microseconds Consumer wait 50th percentile\n");
            output.push_str("# TYPE qrng_wait_p50_microseconds gauge\n");
            output.push_str(&format!("qrng_wait_p50_microseconds {}\n", p50));
        }

        if let Some(p99) = self.latency_p99() {
            output.push_str("# HELP qrng_wait_p99_microseconds Consumer wait 99th percentile\n");
            output.push_str("# TYPE qrng_wait_p99_microseconds gauge\n");
            output.push_str(&format!("qrng_wait_p99_microseconds {}\n", p99));
        }

        output
    }
}
