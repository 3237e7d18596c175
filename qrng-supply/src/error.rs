// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Error types for the randomness supply
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.
//! Only [`Error::EntropyExhausted`] and [`Error::InterruptedWait`] ever reach a
//! consumer of [`crate::RandomNumberService`]; everything upstream-related is
//! absorbed by the refill path.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Connection could not be established or was reset
    Network,
    /// Connect or read timeout elapsed
    Timeout,
    /// Non-2xx HTTP status without a usable error payload
    Http(u16),
    /// The API answered with an `error` field
    ServerReported,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamErrorKind::Network => f.write_str("network"),
            UpstreamErrorKind::Timeout => f.write_str("timeout"),
            UpstreamErrorKind::Http(status) => write!(f, "http {}", status),
            UpstreamErrorKind::ServerReported => f.write_str("server reported"),
        }
    }
}

/// Core error type for randomness supply operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream API call failed
    #[error("Upstream error ({kind}): {message}")]
    Upstream {
        kind: UpstreamErrorKind,
        message: String,
    },

    /// Upstream response had an unexpected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Hex payload of odd length or with non-hex characters
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Lifetime request cap reached
    #[error("Upstream request quota exceeded")]
    QuotaExceeded,

    /// Buffer empty, refill attempted, still empty
    #[error("Entropy exhausted: no random bytes available")]
    EntropyExhausted,

    /// Wait for a byte was cancelled by shutdown
    #[error("Wait for random bytes was interrupted")]
    InterruptedWait,

    /// Buffer wait elapsed without data
    #[error("Operation timed out")]
    Timeout,

    /// Caller supplied invalid arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn upstream(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Error::Upstream {
            kind,
            message: message.into(),
        }
    }

    /// Check if error is transient and worth another upstream attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. } | Error::Parse(_) | Error::MalformedPayload(_)
        )
    }

    /// Check if error is one of the kinds consumers are expected to handle
    pub fn is_consumer_facing(&self) -> bool {
        matches!(self, Error::EntropyExhausted | Error::InterruptedWait)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if let Some(status) = e.status() {
            UpstreamErrorKind::Http(status.as_u16())
        } else {
            UpstreamErrorKind::Network
        };
        Error::upstream(kind, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::MalformedPayload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::upstream(UpstreamErrorKind::Timeout, "slow").is_retryable());
        assert!(Error::Parse("no qrn".into()).is_retryable());
        assert!(Error::MalformedPayload("odd".into()).is_retryable());
        assert!(!Error::QuotaExceeded.is_retryable());
        assert!(!Error::EntropyExhausted.is_retryable());
        assert!(!Error::InterruptedWait.is_retryable());
    }

    #[test]
    fn test_consumer_facing() {
        assert!(Error::EntropyExhausted.is_consumer_facing());
        assert!(Error::InterruptedWait.is_consumer_facing());
        assert!(!Error::Timeout.is_consumer_facing());
        assert!(!Error::QuotaExceeded.is_consumer_facing());
    }

    #[test]
    fn test_hex_error_maps_to_malformed_payload() {
        let err: Error = hex::FromHexError::OddLength.into();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn test_display_includes_kind() {
        let err = Error::upstream(UpstreamErrorKind::Http(503), "unavailable");
        assert_eq!(err.to_string(), "Upstream error (http 503): unavailable");
    }
}
