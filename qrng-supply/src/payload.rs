// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Upstream payload decoding
//!
//! The QRNG API answers `GET ?length=n&format=HEX` with a JSON object carrying
//! either `qrn` (2n hex characters) or `error` (a human-readable message).

use crate::{Error, Result, UpstreamErrorKind};
use serde::Deserialize;

/// Body of an upstream API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    qrn: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode an even-length hex string into bytes, high nibble first.
///
/// Both cases are accepted. Odd length or any non-hex character yields
/// [`Error::MalformedPayload`].
pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(hex)?)
}

/// Parse an upstream response body into random bytes
pub fn parse_response(body: &str) -> Result<Vec<u8>> {
    let response: ApiResponse = serde_json::from_str(body)?;

    match (response.qrn, response.error) {
        (Some(hex), _) => decode_hex(&hex),
        (None, Some(message)) => Err(Error::upstream(UpstreamErrorKind::ServerReported, message)),
        (None, None) => Err(Error::Parse(
            "response carries neither `qrn` nor `error`".to_string(),
        )),
    }
}
