// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! HTTP client for the remote QRNG API
//!
//! One call to [`UpstreamSource::fetch`] is one network request. Every failure is
//! returned as a classified [`Error`] value; nothing is retried here, the refill
//! coordinator owns that decision.

use crate::{config::SupplyConfig, payload, Error, Result, UpstreamErrorKind};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Outcome of a single upstream call: decoded bytes or a classified failure
pub type FetchResult = Result<Vec<u8>>;

/// A source of random bytes fetched in bulk
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Request `byte_count` random bytes in a single call
    async fn fetch(&self, byte_count: usize) -> FetchResult;

    /// Human-readable identity for logs
    fn describe(&self) -> String;
}

/// Configuration for the HTTP upstream
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Endpoint of the QRNG API
    pub endpoint: Url,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_supply_config(config: &SupplyConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint_url)
            .map_err(|e| Error::Config(format!("Invalid endpoint_url: {}", e)))?;
        Ok(Self {
            endpoint,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        })
    }
}

/// HTTP client for the QRNG API
pub struct HttpUpstream {
    client: Client,
    config: UpstreamConfig,
}

impl HttpUpstream {
    /// Create a new client with configuration
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build request URL with `length` and `format` query parameters
    fn build_request_url(&self, byte_count: usize) -> Url {
        let mut url = self.config.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("length", &byte_count.to_string())
            .append_pair("format", "HEX");
        url
    }
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    #[instrument(skip(self))]
    async fn fetch(&self, byte_count: usize) -> FetchResult {
        let url = self.build_request_url(byte_count);
        debug!("Sending request: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Request failed: {}", e);
            Error::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Received {} ({} bytes of body)", status, body.len());

        if !status.is_success() {
            warn!("HTTP error {}: {}", status, body);
            // The API reports some failures as a JSON `error` with a non-2xx status
            return match payload::parse_response(&body) {
                Err(err @ Error::Upstream { .. }) => Err(err),
                _ => Err(Error::upstream(
                    UpstreamErrorKind::Http(status.as_u16()),
                    format!("HTTP {}", status),
                )),
            };
        }

        let data = payload::parse_response(&body)?;

        if data.is_empty() {
            return Err(Error::Parse("Received empty payload".to_string()));
        }
        if data.len() != byte_count {
            warn!("Received {} bytes, expected {}", data.len(), byte_count);
        }

        debug!("Successfully fetched {} bytes", data.len());
        Ok(data)
    }

    fn describe(&self) -> String {
        self.config.endpoint.to_string()
    }
}
