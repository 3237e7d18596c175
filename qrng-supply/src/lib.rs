// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! QRNG Supply Library
//!
//! This crate keeps a stream of quantum random integers flowing to consumers that
//! ask for them at unpredictable, possibly high, frequency, while the only source of
//! true randomness is a slow, rate-limited remote HTTP API.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `payload`: Hex decoding and upstream response parsing
//! - `upstream`: HTTP client for the remote QRNG API
//! - `quota`: Lifetime cap on upstream calls
//! - `buffer`: Bounded FIFO of random bytes with blocking, timed takes
//! - `retry`: Retry policy for transient upstream failures
//! - `refill`: Single-flight background refill of the buffer
//! - `service`: Consumer-facing facade composing bytes into integers
//! - `stats`: Kolmogorov–Smirnov goodness-of-fit check
//! - `config`: Configuration management with validation
//! - `error`: Unified error types
//!
//! # Data flow
//!
//! ```text
//! consumer ──> RandomNumberService ──> EntropyBuffer::take (may block)
//!                     │
//!                     └── low / empty ──> RefillCoordinator::trigger
//!                                              │
//!                                              └──> UpstreamSource::fetch ──> EntropyBuffer::put_all
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod quota;
pub mod refill;
pub mod retry;
pub mod service;
pub mod stats;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use config::SupplyConfig;
pub use error::{Error, Result, UpstreamErrorKind};
pub use service::{RandomNumberService, SupplyStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Remote QRNG endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://lfdr.de/qrng_api/qrng";

/// Largest single upstream request, in bytes
pub const MAX_FETCH_SIZE: usize = 65_536; // 64 KiB

/// Default bytes requested per upstream call (1 KiB)
pub const DEFAULT_FETCH_SIZE: usize = 1024;

/// Default entropy buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 2000;

/// Buffer size below which a refill is triggered
pub const DEFAULT_LOW_WATERMARK: usize = 1000;

/// Default lifetime cap on upstream calls
pub const DEFAULT_MAX_REQUESTS: u32 = 25;

/// Default attempts per refill
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Upper bound for every configured timeout and pause (one hour)
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;
