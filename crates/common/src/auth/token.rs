//! Structural checks on bearer tokens
//!
//! Access tokens are JWTs. Nothing here verifies a signature; the server
//! does that. These helpers only decide whether a string is shaped like a
//! JWT and read its `exp` claim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Whether `token` has three base64url segments whose header and payload
/// decode to JSON objects
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    if signature.is_empty() || decode_segment(signature).is_none() {
        return false;
    }

    decode_object(header).is_some() && decode_object(payload).is_some()
}

/// Expiry carried in the token's `exp` claim, if present and readable
#[must_use]
pub fn expiry_claim(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let claims = decode_object(payload)?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}

fn decode_object(segment: &str) -> Option<serde_json::Map<String, Value>> {
    let bytes = decode_segment(segment)?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
