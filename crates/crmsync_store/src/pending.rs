//! Pending-change queue persistence.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use crmsync_model::{ChangeStatus, EntityKind, PendingChange, PendingFilter};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reads and advances queued local mutations.
#[async_trait]
pub trait PendingChangeStore: Send + Sync {
    /// Lists the changes of `kind` that match `filter`, in filter order.
    async fn list(&self, kind: EntityKind, filter: &PendingFilter)
        -> StoreResult<Vec<PendingChange>>;

    /// Writes `status` for one change.
    ///
    /// Idempotent per call. Lifecycle rules are the caller's concern.
    async fn set_status(
        &self,
        kind: EntityKind,
        change_id: i64,
        status: ChangeStatus,
    ) -> StoreResult<()>;
}

/// An in-memory pending-change queue.
///
/// Keeps a per-change log of every status written so tests can check the
/// lifecycle a change went through.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    rows: RwLock<HashMap<EntityKind, Vec<PendingChange>>>,
    status_log: Mutex<HashMap<(EntityKind, i64), Vec<ChangeStatus>>>,
    closed: AtomicBool,
}

impl MemoryPendingStore {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `change` under `kind`.
    pub fn insert(&self, kind: EntityKind, change: PendingChange) {
        self.status_log
            .lock()
            .insert((kind, change.change_id), vec![change.status]);
        self.rows.write().entry(kind).or_default().push(change);
    }

    /// Returns a copy of one change.
    pub fn get(&self, kind: EntityKind, change_id: i64) -> Option<PendingChange> {
        self.rows
            .read()
            .get(&kind)
            .and_then(|rows| rows.iter().find(|c| c.change_id == change_id))
            .cloned()
    }

    /// Returns every status a change has had, starting with its initial one.
    pub fn status_log(&self, kind: EntityKind, change_id: i64) -> Vec<ChangeStatus> {
        self.status_log
            .lock()
            .get(&(kind, change_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of queued changes of `kind`, in any status.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.rows.read().get(&kind).map_or(0, Vec::len)
    }

    /// Returns true if no changes of `kind` are queued.
    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    /// Simulates a closed database.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PendingChangeStore for MemoryPendingStore {
    async fn list(
        &self,
        kind: EntityKind,
        filter: &PendingFilter,
    ) -> StoreResult<Vec<PendingChange>> {
        self.check_open()?;
        let rows = self.rows.read().get(&kind).cloned().unwrap_or_default();
        Ok(filter.apply(rows))
    }

    async fn set_status(
        &self,
        kind: EntityKind,
        change_id: i64,
        status: ChangeStatus,
    ) -> StoreResult<()> {
        self.check_open()?;
        {
            let mut rows = self.rows.write();
            let change = rows
                .get_mut(&kind)
                .and_then(|rows| rows.iter_mut().find(|c| c.change_id == change_id))
                .ok_or_else(|| StoreError::NotFound {
                    what: kind.pending_table(),
                    id: change_id.to_string(),
                })?;
            change.status = status;
            if status.is_terminal() {
                change.processed_at = Some(Utc::now());
            }
        }
        self.status_log
            .lock()
            .entry((kind, change_id))
            .or_default()
            .push(status);
        tracing::trace!(%kind, change_id, %status, "pending change status written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_model::ChangeType;

    #[tokio::test]
    async fn list_applies_filter() {
        let store = MemoryPendingStore::new();
        store.insert(
            EntityKind::Accounts,
            PendingChange::new(1, 10, ChangeType::Update, "{}"),
        );
        store.insert(
            EntityKind::Checkins,
            PendingChange::new(2, 20, ChangeType::Create, "{}"),
        );

        let accounts = store
            .list(EntityKind::Accounts, &PendingFilter::pending())
            .await
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].change_id, 1);
    }

    #[tokio::test]
    async fn set_status_records_lifecycle() {
        let store = MemoryPendingStore::new();
        store.insert(
            EntityKind::Accounts,
            PendingChange::new(1, 10, ChangeType::Update, "{}"),
        );
        store
            .set_status(EntityKind::Accounts, 1, ChangeStatus::Processing)
            .await
            .unwrap();
        store
            .set_status(EntityKind::Accounts, 1, ChangeStatus::Completed)
            .await
            .unwrap();

        assert_eq!(
            store.status_log(EntityKind::Accounts, 1),
            vec![
                ChangeStatus::Pending,
                ChangeStatus::Processing,
                ChangeStatus::Completed
            ]
        );
        let change = store.get(EntityKind::Accounts, 1).unwrap();
        assert!(change.processed_at.is_some());

        // Completed rows drop out of the push read.
        assert!(store
            .list(EntityKind::Accounts, &PendingFilter::pending())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_change_is_not_found() {
        let store = MemoryPendingStore::new();
        let err = store
            .set_status(EntityKind::Checkins, 99, ChangeStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.close();
        assert!(store
            .list(EntityKind::Checkins, &PendingFilter::new())
            .await
            .unwrap_err()
            .is_closed());
    }
}
