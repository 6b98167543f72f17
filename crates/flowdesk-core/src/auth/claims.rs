//! Access-token expiry checks.
//!
//! The payload segment of the access token is decoded without verifying the
//! signature. It is only read for the `exp` hint so the client can refresh
//! before the server starts rejecting requests; the backend stays the
//! authority on whether a token is valid.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Tokens within this many milliseconds of expiry are treated as expired,
/// so a request started right after the check does not expire in transit.
pub const EXPIRY_MARGIN_MS: i64 = 30_000;

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Expiry instant in seconds since the epoch
    pub exp: f64,
    pub other: Map<String, Value>,
}

impl Claims {
    pub fn expires_at_ms(&self) -> i64 {
        (self.exp * 1000.0) as i64
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at_ms())
    }
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

/// Decode the middle segment of a JWT. Returns `None` when the segment is
/// missing, not base64, not a JSON object, or lacks a numeric `exp`.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = decode_segment(payload)?;
    let mut other = match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };
    let exp = other.remove("exp")?.as_f64()?;
    Some(Claims { exp, other })
}

/// Whether `token` should be treated as expired at `now`.
pub fn is_expired_at(token: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(token) = token else {
        return true;
    };
    match decode_claims(token) {
        Some(claims) => claims.expires_at_ms() < now.timestamp_millis() + EXPIRY_MARGIN_MS,
        None => true,
    }
}

pub fn is_expired(token: Option<&str>) -> bool {
    is_expired_at(token, Utc::now())
}
