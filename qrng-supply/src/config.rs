// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Configuration management for the randomness supply

use crate::{retry::RetryPolicy, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Randomness supply configuration
///
/// Every field has a default, so an empty environment or an empty file yields a
/// working configuration against the public QRNG endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupplyConfig {
    /// URL of the QRNG API
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// Bytes to request per upstream call
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Entropy buffer capacity in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Buffer size below which a refill is triggered
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,

    /// Lifetime cap on successful upstream requests
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Upstream attempts per refill
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Initial backoff between attempts in milliseconds (0 = retry immediately)
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Pause before refilling again after a refill ran out of attempts, in milliseconds
    #[serde(default = "default_refill_pause_ms")]
    pub refill_pause_ms: u64,

    /// Upstream connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upstream read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Consumer wait per take in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub take_timeout_ms: u64,

    /// Grace period for in-flight refills on shutdown, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub shutdown_grace_ms: u64,

    /// Refill worker threads
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            fetch_size: default_fetch_size(),
            buffer_capacity: default_buffer_capacity(),
            low_watermark: default_low_watermark(),
            max_requests: default_max_requests(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_backoff_ms: 0,
            refill_pause_ms: default_refill_pause_ms(),
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            take_timeout_ms: default_timeout_ms(),
            shutdown_grace_ms: default_timeout_ms(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl SupplyConfig {
    /// Load configuration from `QRNG_`-prefixed environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed("QRNG_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, overlaid by `QRNG_`-prefixed environment variables
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix("QRNG"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.endpoint_url)
            .map_err(|e| Error::Config(format!("Invalid endpoint_url '{}': {}", self.endpoint_url, e)))?;

        if self.fetch_size == 0 || self.fetch_size > crate::MAX_FETCH_SIZE {
            return Err(Error::Config(format!(
                "fetch_size must be between 1 and {}",
                crate::MAX_FETCH_SIZE
            )));
        }

        if self.buffer_capacity == 0 {
            return Err(Error::Config("buffer_capacity must be > 0".to_string()));
        }

        if self.low_watermark > self.buffer_capacity {
            return Err(Error::Config(
                "low_watermark must be <= buffer_capacity".to_string(),
            ));
        }

        if self.max_requests == 0 {
            return Err(Error::Config("max_requests must be > 0".to_string()));
        }

        if self.max_retry_attempts == 0 {
            return Err(Error::Config("max_retry_attempts must be > 0".to_string()));
        }

        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be > 0".to_string()));
        }

        let timeouts = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("take_timeout_ms", self.take_timeout_ms),
            ("shutdown_grace_ms", self.shutdown_grace_ms),
        ];
        for (name, ms) in timeouts {
            if ms == 0 || ms > crate::MAX_TIMEOUT_MS {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {}",
                    name,
                    crate::MAX_TIMEOUT_MS
                )));
            }
        }

        if self.refill_pause_ms > crate::MAX_TIMEOUT_MS {
            return Err(Error::Config(format!(
                "refill_pause_ms must be <= {}",
                crate::MAX_TIMEOUT_MS
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn refill_pause(&self) -> Duration {
        Duration::from_millis(self.refill_pause_ms)
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry_backoff_ms == 0 {
            RetryPolicy::immediate(self.max_retry_attempts)
        } else {
            RetryPolicy::exponential(
                self.max_retry_attempts,
                Duration::from_millis(self.retry_backoff_ms),
            )
        }
    }
}

// Default value functions
fn default_endpoint_url() -> String {
    crate::DEFAULT_ENDPOINT.to_string()
}

fn default_fetch_size() -> usize {
    crate::DEFAULT_FETCH_SIZE
}

fn default_buffer_capacity() -> usize {
    crate::DEFAULT_BUFFER_CAPACITY
}

fn default_low_watermark() -> usize {
    crate::DEFAULT_LOW_WATERMARK
}

fn default_max_requests() -> u32 {
    crate::DEFAULT_MAX_REQUESTS
}

fn default_max_retry_attempts() -> u32 {
    crate::DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_refill_pause_ms() -> u64 {
    100
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_worker_threads() -> usize {
    1
}
