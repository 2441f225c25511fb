//! Raw response blob returned by one transport exchange.

use bytes::Bytes;
use std::borrow::Cow;

use crate::error::{Result, TelemetryError};

/// Bytes collected during one collection window.
///
/// No structural guarantee: the blob may be empty, cut mid-line, or start
/// with leftovers from a previous command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    /// Window elapsed normally, or the expected token arrived
    Completed(Bytes),
    /// Expected token never arrived; whatever was collected
    TimedOut(Bytes),
}

impl TransportResponse {
    /// Raw collected bytes.
    pub fn bytes(&self) -> &Bytes {
        match self {
            TransportResponse::Completed(bytes) | TransportResponse::TimedOut(bytes) => bytes,
        }
    }

    /// Collected bytes as text, invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes())
    }

    /// Substring search over the whole blob.
    pub fn contains(&self, token: &str) -> bool {
        contains_token(self.bytes(), token)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TransportResponse::Completed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, TransportResponse::TimedOut(_))
    }

    /// Turn a timed-out exchange into `TelemetryError::TransportTimeout`.
    pub fn into_result(self, command: &str) -> Result<Bytes> {
        match self {
            TransportResponse::Completed(bytes) => Ok(bytes),
            TransportResponse::TimedOut(_) => Err(TelemetryError::TransportTimeout {
                command: command.to_string(),
            }),
        }
    }
}

pub(crate) fn contains_token(haystack: &[u8], token: &str) -> bool {
    let needle = token.as_bytes();
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
