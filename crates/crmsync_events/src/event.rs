//! Events and their typed payloads.

use crate::topic::{Namespace, Topic};
use crmsync_model::{ChangeType, Direction, HistoryStatus, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a `log.message` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose progress.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

/// Typed payload of an event.
///
/// Each topic carries exactly one of these shapes; listeners match on the
/// variant they expect for the topic they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// No data (`pull.group.start`, `push.scan.start`).
    None,
    /// A single-resource pull started.
    ResourceStart {
        /// Resource being pulled, if the pull targets one id.
        resource_id: Option<i64>,
    },
    /// Size of a resolved working set.
    Count {
        /// Number of items.
        count: u64,
    },
    /// A per-item step started.
    Item {
        /// Item id.
        resource_id: i64,
    },
    /// A per-item step succeeded.
    Record {
        /// Item id.
        resource_id: i64,
        /// Human-readable label of the record.
        label: String,
    },
    /// Something failed.
    Error {
        /// Error message.
        message: String,
        /// Item the error belongs to, absent for group-level errors.
        resource_id: Option<i64>,
    },
    /// A pull or pull group finished.
    Completion {
        /// True when nothing failed.
        success: bool,
        /// Number of items that succeeded.
        count: u64,
        /// Combined error message, if anything failed.
        error: Option<String>,
        /// Resource the pull targeted, for single-resource pulls.
        resource_id: Option<i64>,
    },
    /// A pending change is being or was pushed.
    Change {
        /// Pending change id.
        change_id: i64,
        /// Entity the change mutates.
        entity_id: i64,
        /// Requested mutation.
        change_type: ChangeType,
    },
    /// A pending change failed.
    ChangeError {
        /// Pending change id.
        change_id: i64,
        /// Error message.
        message: String,
    },
    /// A push over one entity kind finished.
    PushComplete {
        /// Number of changes that failed.
        error_count: u64,
        /// Number of changes that were attempted.
        processed: u64,
    },
    /// A sync history entry reached a terminal status.
    HistoryUpdated {
        /// Correlation id of the run.
        correlation_id: String,
        /// Terminal status written.
        status: HistoryStatus,
    },
    /// A free-form log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message.
        message: String,
    },
}

/// Something that happened during a sync, broadcast on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub topic: Topic,
    /// Resource kind being processed. Absent for free-form log events.
    pub source: Option<ResourceKind>,
    /// Topic-specific data.
    pub payload: EventPayload,
}

impl Event {
    /// Creates an event about `source`.
    pub fn new(topic: Topic, source: ResourceKind, payload: EventPayload) -> Self {
        Self {
            topic,
            source: Some(source),
            payload,
        }
    }

    /// Creates a `log.message` event.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            topic: Topic::LOG_MESSAGE,
            source: None,
            payload: EventPayload::Log {
                level,
                message: message.into(),
            },
        }
    }

    /// Returns the sync direction of the event, if it belongs to a run.
    pub fn direction(&self) -> Option<Direction> {
        match self.topic.namespace {
            Namespace::Pull => Some(Direction::Pull),
            Namespace::Push => Some(Direction::Push),
            Namespace::Sync | Namespace::Log => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "{} [{}]", self.topic, source),
            None => self.topic.fmt(f),
        }
    }
}
