//! Error types for the wire protocol layer.
//!
//! [`ProtocolError`] covers frame decode/encode failures. Decode failures
//! carry a truncated preview of the offending payload for log context —
//! frames can be arbitrarily large and logs should not be.

use thiserror::Error;

/// Maximum number of payload characters included in a decode error.
const PREVIEW_MAX: usize = 120;

/// Errors from encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a valid envelope.
    #[error("malformed frame: {reason} (payload: {preview})")]
    Malformed {
        /// Underlying decode failure.
        reason: String,
        /// Truncated payload excerpt.
        preview: String,
    },

    /// An outgoing envelope failed to serialize.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Build a `Malformed` error with a truncated payload preview.
    #[must_use]
    pub fn malformed(reason: impl Into<String>, payload: &str) -> Self {
        let mut preview: String = payload.chars().take(PREVIEW_MAX).collect();
        if payload.chars().count() > PREVIEW_MAX {
            preview.push('…');
        }
        Self::Malformed {
            reason: reason.into(),
            preview,
        }
    }
}

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_includes_reason_and_preview() {
        let err = ProtocolError::malformed("missing kind", "{\"x\":1}");
        let msg = err.to_string();
        assert!(msg.contains("missing kind"));
        assert!(msg.contains("{\"x\":1}"));
    }

    #[test]
    fn malformed_truncates_long_payloads() {
        let payload = "a".repeat(500);
        let err = ProtocolError::malformed("bad", &payload);
        let ProtocolError::Malformed { preview, .. } = err else {
            panic!("expected Malformed");
        };
        assert!(preview.chars().count() <= PREVIEW_MAX + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn short_payload_not_truncated() {
        let err = ProtocolError::malformed("bad", "short");
        let ProtocolError::Malformed { preview, .. } = err else {
            panic!("expected Malformed");
        };
        assert_eq!(preview, "short");
    }

    #[test]
    fn encode_error_display() {
        // Force a serde error via a map with a non-string key type at the
        // value level — easiest is deserialize failure converted manually.
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = ProtocolError::Encode(serde_err);
        assert!(err.to_string().contains("encode error"));
    }
}
