//! Error types for the sync engine.

use crate::api::ApiError;
use crate::config::ConfigError;
use crmsync_events::EventError;
use crmsync_model::{Direction, ModelError, ResourceKind};
use crmsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A remote API call failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// A local store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The working set of a group could not be resolved. Nothing was
    /// processed.
    #[error("failed to list {resource} for {direction}: {message}")]
    ListFailed {
        /// Resource the group processes.
        resource: ResourceKind,
        /// Direction of the group.
        direction: Direction,
        /// Underlying error message.
        message: String,
    },

    /// Some items of a group failed.
    #[error("encountered errors during {resource} {direction}:\n- {}", .errors.join("\n- "))]
    PartialFailure {
        /// Resource the group processed.
        resource: ResourceKind,
        /// Direction of the group.
        direction: Direction,
        /// One message per failed item.
        errors: Vec<String>,
        /// Number of items that succeeded.
        succeeded: usize,
    },

    /// A pending change payload could not be decoded.
    #[error(transparent)]
    MalformedPayload(ModelError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The event bus rejected a subscription.
    #[error("event bus error: {0}")]
    Events(#[from] EventError),

    /// The runtime is shutting down.
    #[error("sync runtime is shutting down")]
    ShuttingDown,
}

impl SyncError {
    /// Returns the per-item messages of a partial failure, or an empty
    /// slice for any other error.
    pub fn item_errors(&self) -> &[String] {
        match self {
            SyncError::PartialFailure { errors, .. } => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_lists_every_item() {
        let err = SyncError::PartialFailure {
            resource: ResourceKind::Accounts,
            direction: Direction::Pull,
            errors: vec!["error fetching account 2".into(), "error storing account 5".into()],
            succeeded: 3,
        };
        assert_eq!(
            err.to_string(),
            "encountered errors during accounts pull:\n- error fetching account 2\n- error storing account 5"
        );
        assert_eq!(err.item_errors().len(), 2);
    }

    #[test]
    fn wraps_collaborator_errors() {
        let err: SyncError = StoreError::Closed.into();
        assert_eq!(err.to_string(), "store error: database is closed");

        let err: SyncError = ApiError::Transport("connection reset".into()).into();
        assert!(err.to_string().contains("connection reset"));
        assert!(err.item_errors().is_empty());
    }
}
