//! Persisted sync history records.

use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Remote to local.
    Pull,
    /// Local to remote.
    Push,
}

impl Direction {
    /// Returns the topic namespace and stored form (`"pull"` / `"push"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a persisted sync history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// The run has started and not yet been finalized.
    Running,
    /// Every item succeeded.
    Completed,
    /// The run finished but some items failed.
    CompletedWithErrors,
    /// The run aborted with a group-level error.
    Failed,
}

impl HistoryStatus {
    /// Returns the stored form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Running => "running",
            HistoryStatus::Completed => "completed",
            HistoryStatus::CompletedWithErrors => "completed_with_errors",
            HistoryStatus::Failed => "failed",
        }
    }

    /// Returns true once the entry has been finalized.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HistoryStatus::Running)
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of one pull or push run.
///
/// Created with status `running` when the run starts, then updated at most
/// twice more: once with metrics, once with the terminal completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    /// Store-assigned row id (0 until inserted).
    pub history_id: i64,
    /// Opaque token tying the entry to one run.
    pub correlation_id: String,
    /// Kind of run (`pull` or `push`).
    pub run_type: Direction,
    /// Direction of the run.
    pub direction: Direction,
    /// Resource the run processed.
    pub source: ResourceKind,
    /// Who started the run (`manual`, `scheduler`, ...).
    pub initiator: String,
    /// Current status.
    pub status: HistoryStatus,
    /// Number of items processed (expected count until finalized).
    pub items_processed: u64,
    /// Number of failed items.
    pub error_count: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run was finalized.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in whole seconds.
    pub duration_seconds: u64,
    /// One-line human summary.
    pub summary: String,
    /// Error details for failed runs.
    pub details: String,
}

impl SyncHistoryEntry {
    /// Creates a `running` entry for a run that starts now.
    pub fn running(
        correlation_id: impl Into<String>,
        direction: Direction,
        source: ResourceKind,
        initiator: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            history_id: 0,
            correlation_id: correlation_id.into(),
            run_type: direction,
            direction,
            source,
            initiator: initiator.into(),
            status: HistoryStatus::Running,
            items_processed: 0,
            error_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: 0,
            summary: summary.into(),
            details: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_entry_defaults() {
        let entry = SyncHistoryEntry::running(
            "abc",
            Direction::Pull,
            ResourceKind::Accounts,
            "manual",
            "Pull started for Accounts",
        );
        assert_eq!(entry.status, HistoryStatus::Running);
        assert_eq!(entry.run_type, Direction::Pull);
        assert!(entry.completed_at.is_none());
        assert!(!entry.status.is_terminal());
    }

    #[test]
    fn status_strings() {
        assert_eq!(
            HistoryStatus::CompletedWithErrors.as_str(),
            "completed_with_errors"
        );
        assert!(HistoryStatus::Failed.is_terminal());
    }
}
