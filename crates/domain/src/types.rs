//! Transport-independent types produced by the client

use serde::{Deserialize, Serialize};

use crate::impl_string_enum_conversions;

/// Event emitted by a streaming subscription
///
/// A subscription yields `Connected` once, then any number of `Message`s.
/// `Error` may be emitted by a failed liveness probe without ending the
/// sequence; a receive failure emits `Error` and ends it, as does
/// `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected,
    Message(String),
    Disconnected(Option<String>),
    Error(Option<String>),
}

/// Fraction of an upload's payload handed to the transport, in `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct UploadProgress(f64);

impl UploadProgress {
    /// Progress for `sent` of `total` payload bytes, clamped into range.
    ///
    /// A zero-length total counts as complete.
    #[must_use]
    pub fn from_bytes(sent: u64, total: u64) -> Self {
        if total == 0 {
            return Self(1.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = sent as f64 / total as f64;
        Self(fraction.clamp(0.0, 1.0))
    }

    #[must_use]
    pub fn fraction(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.0 >= 1.0
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// HTTP status of the upload response (always 2xx)
    pub status: u16,

    /// Payload bytes written, excluding multipart framing
    pub bytes_sent: u64,

    /// Raw response body
    pub body: Vec<u8>,
}

impl UploadResult {
    /// Decode the response body as JSON
    ///
    /// # Errors
    /// Returns the `serde_json` error if the body is not valid JSON for `T`
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Response body as (lossy) UTF-8 text
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Scheduling hint carried by a call; never changes retry correctness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl_string_enum_conversions!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
});
