//! Error types for the event bus.

use thiserror::Error;

/// Result type for event bus operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur on the event bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A topic string was not `<namespace>.<verb>`.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// A pattern string was not `*`, `<namespace>.*` or a topic.
    #[error("invalid topic pattern: {0}")]
    InvalidPattern(String),

    /// Subscribing requires a running Tokio runtime.
    #[error("no tokio runtime available to run listener workers")]
    NoRuntime,

    /// The bus has been closed.
    #[error("event bus is closed")]
    Closed,
}
