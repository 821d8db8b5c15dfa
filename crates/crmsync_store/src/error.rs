//! Error types for persistence collaborators.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a persistence collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store has been closed.
    #[error("database is closed")]
    Closed,

    /// The store was never opened.
    #[error("database not initialized")]
    NotInitialized,

    /// The active dialect has no statement for a command name.
    #[error("unknown command {command} for dialect {dialect}")]
    UnknownCommand {
        /// Command name.
        command: String,
        /// Active dialect.
        dialect: String,
    },

    /// A row addressed by id does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of row.
        what: &'static str,
        /// Row id or key.
        id: String,
    },

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }

    /// Returns true if the store was already torn down (or never set up).
    ///
    /// These errors are expected for writes that race with shutdown.
    pub fn is_closed(&self) -> bool {
        match self {
            StoreError::Closed | StoreError::NotInitialized => true,
            StoreError::Backend(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("database is closed") || message.contains("not initialized")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_classification() {
        assert!(StoreError::Closed.is_closed());
        assert!(StoreError::NotInitialized.is_closed());
        assert!(StoreError::backend("sql: Database is closed").is_closed());
        assert!(StoreError::backend("pool not initialized").is_closed());
        assert!(!StoreError::backend("constraint failed").is_closed());
        assert!(!StoreError::NotFound {
            what: "history entry",
            id: "abc".into()
        }
        .is_closed());
    }

    #[test]
    fn error_display() {
        let err = StoreError::UnknownCommand {
            command: "MergeRoutes".into(),
            dialect: "mssql".into(),
        };
        assert_eq!(err.to_string(), "unknown command MergeRoutes for dialect mssql");
    }
}
