//! Error types for model parsing and validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or validating model values.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A change type string was not CREATE, UPDATE or DELETE.
    #[error("unknown change type: {0}")]
    UnknownChangeType(String),

    /// A status string did not name a pending-change status.
    #[error("unknown change status: {0}")]
    UnknownStatus(String),

    /// A resource or entity kind string was not recognized.
    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    /// A status transition would move backwards or leave a terminal state.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// The serialized field diff of a pending change could not be decoded.
    #[error("invalid pending change payload (change_id={change_id}): {source}")]
    MalformedPayload {
        /// The change whose payload failed to decode.
        change_id: i64,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A date filter was not in `YYYY-MM-DD` form.
    #[error("invalid date format {0:?}, please use YYYY-MM-DD")]
    InvalidDate(String),

    /// An ordering string was not recognized.
    #[error("unknown sort order: {0}")]
    UnknownOrder(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::InvalidTransition {
            from: "completed".into(),
            to: "pending".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition from completed to pending"
        );

        let err = ModelError::InvalidDate("2024/01/01".into());
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn malformed_payload_mentions_change() {
        let source = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err = ModelError::MalformedPayload {
            change_id: 42,
            source,
        };
        assert!(err.to_string().contains("change_id=42"));
    }
}
