//! Sync history persistence.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use crmsync_model::{HistoryStatus, SyncHistoryEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// The terminal write of a sync history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCompletion {
    /// Terminal status.
    pub status: HistoryStatus,
    /// Items processed.
    pub items_processed: u64,
    /// Items that failed.
    pub error_count: u64,
    /// Wall-clock duration.
    pub duration_seconds: u64,
    /// One-line summary.
    pub summary: String,
    /// Error details, empty unless the run failed.
    pub details: String,
}

/// Durable store of sync history entries.
#[async_trait]
pub trait SyncHistoryStore: Send + Sync {
    /// Inserts a new entry and returns its row id.
    async fn insert(&self, entry: SyncHistoryEntry) -> StoreResult<i64>;

    /// Updates the expected item count and summary of a running entry.
    async fn update_metrics(
        &self,
        correlation_id: &str,
        items_processed: u64,
        summary: &str,
    ) -> StoreResult<()>;

    /// Writes the terminal state of an entry.
    async fn complete(&self, correlation_id: &str, completion: HistoryCompletion)
        -> StoreResult<()>;

    /// Returns up to `limit` entries, most recent first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<SyncHistoryEntry>>;

    /// Releases the underlying connection. Later calls fail with a closed
    /// error.
    async fn close(&self) -> StoreResult<()>;
}

/// An in-memory sync history store.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<SyncHistoryEntry>>,
    writes: Mutex<HashMap<String, usize>>,
    next_id: AtomicI64,
    closed: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl MemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry in insertion order.
    pub fn entries(&self) -> Vec<SyncHistoryEntry> {
        self.entries.lock().clone()
    }

    /// Returns the entry for `correlation_id`.
    pub fn entry(&self, correlation_id: &str) -> Option<SyncHistoryEntry> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.correlation_id == correlation_id)
            .cloned()
    }

    /// Returns how many times an entry has been written (insert included).
    pub fn write_count(&self, correlation_id: &str) -> usize {
        self.writes
            .lock()
            .get(correlation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every later write fail with `message` (or succeed again with
    /// `None`).
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    /// Returns true once [`SyncHistoryStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        match self.failure.lock().as_ref() {
            Some(message) => Err(StoreError::backend(message.clone())),
            None => Ok(()),
        }
    }

    fn with_entry(
        &self,
        correlation_id: &str,
        update: impl FnOnce(&mut SyncHistoryEntry),
    ) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.correlation_id == correlation_id)
            .ok_or_else(|| StoreError::NotFound {
                what: "sync history entry",
                id: correlation_id.to_string(),
            })?;
        update(entry);
        drop(entries);
        *self
            .writes
            .lock()
            .entry(correlation_id.to_string())
            .or_default() += 1;
        Ok(())
    }
}

#[async_trait]
impl SyncHistoryStore for MemoryHistoryStore {
    async fn insert(&self, mut entry: SyncHistoryEntry) -> StoreResult<i64> {
        self.check_writable()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        entry.history_id = id;
        *self
            .writes
            .lock()
            .entry(entry.correlation_id.clone())
            .or_default() += 1;
        self.entries.lock().push(entry);
        Ok(id)
    }

    async fn update_metrics(
        &self,
        correlation_id: &str,
        items_processed: u64,
        summary: &str,
    ) -> StoreResult<()> {
        self.check_writable()?;
        self.with_entry(correlation_id, |entry| {
            entry.items_processed = items_processed;
            entry.summary = summary.to_string();
        })
    }

    async fn complete(
        &self,
        correlation_id: &str,
        completion: HistoryCompletion,
    ) -> StoreResult<()> {
        self.check_writable()?;
        self.with_entry(correlation_id, |entry| {
            entry.status = completion.status;
            entry.items_processed = completion.items_processed;
            entry.error_count = completion.error_count;
            entry.duration_seconds = completion.duration_seconds;
            entry.summary = completion.summary;
            entry.details = completion.details;
            entry.completed_at = Some(Utc::now());
        })
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<SyncHistoryEntry>> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let mut entries = self.entries.lock().clone();
        entries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then(b.history_id.cmp(&a.history_id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("history store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_model::{Direction, ResourceKind};

    fn running(correlation_id: &str) -> SyncHistoryEntry {
        SyncHistoryEntry::running(
            correlation_id,
            Direction::Pull,
            ResourceKind::Accounts,
            "manual",
            "Pull started for Accounts",
        )
    }

    #[tokio::test]
    async fn insert_update_complete() {
        let store = MemoryHistoryStore::new();
        let id = store.insert(running("a")).await.unwrap();
        assert_eq!(id, 1);

        store.update_metrics("a", 10, "Pulling 10 Accounts").await.unwrap();
        store
            .complete(
                "a",
                HistoryCompletion {
                    status: HistoryStatus::CompletedWithErrors,
                    items_processed: 8,
                    error_count: 2,
                    duration_seconds: 1,
                    summary: "Pulled 8 Accounts".into(),
                    details: String::new(),
                },
            )
            .await
            .unwrap();

        let entry = store.entry("a").unwrap();
        assert_eq!(entry.status, HistoryStatus::CompletedWithErrors);
        assert_eq!(entry.error_count, 2);
        assert!(entry.completed_at.is_some());
        assert_eq!(store.write_count("a"), 3);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = MemoryHistoryStore::new();
        for id in ["a", "b", "c"] {
            store.insert(running(id)).await.unwrap();
        }
        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].correlation_id, "c");
    }

    #[tokio::test]
    async fn closed_store_rejects_writes() {
        let store = MemoryHistoryStore::new();
        store.insert(running("a")).await.unwrap();
        store.close().await.unwrap();
        let err = store.update_metrics("a", 1, "x").await.unwrap_err();
        assert!(err.is_closed());

        let store = MemoryHistoryStore::new();
        store.set_failure(Some("disk full"));
        let err = store.insert(running("b")).await.unwrap_err();
        assert!(!err.is_closed());
    }

    #[tokio::test]
    async fn unknown_correlation_is_not_found() {
        let store = MemoryHistoryStore::new();
        let err = store.update_metrics("nope", 1, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
