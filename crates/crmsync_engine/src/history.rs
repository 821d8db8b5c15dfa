//! Sync history derived from bus traffic.
//!
//! The tracker is an ordinary bus listener. It keeps at most one active run
//! per `(direction, source)` and turns the start, metrics and completion
//! events of that run into one persisted [`SyncHistoryEntry`]:
//!
//! | Event | Effect |
//! |-------|--------|
//! | `pull.group.start`, `pull.start`, `push.scan.start` | open a run (ignored if one is active) |
//! | `pull.ids_fetched`, `push.scan.complete` | record the expected item count |
//! | `pull.error`, `push.item.error` | count an item error |
//! | `pull.group.complete`, `pull.complete`, `push.complete` | finalize |
//! | `pull.group.error`, `push.error` | finalize as `failed` |
//!
//! A run only closes on the completion that matches how it was opened: a
//! single-resource pull that overlaps a group pull of the same resource is
//! not recorded, and its `pull.error` / `pull.complete` leave the group's
//! run untouched.
//!
//! Persistence failures are logged and never reach the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crmsync_events::{Event, EventBus, EventPayload, Listener, LogLevel, Topic, Verb};
use crmsync_model::{Direction, HistoryStatus, ResourceKind, SyncHistoryEntry};
use crmsync_store::{HistoryCompletion, StoreError, SyncHistoryStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type RunKey = (Direction, ResourceKind);

/// Which kind of operation opened a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunScope {
    /// `pull.group.start` or `push.scan.start`.
    Group,
    /// `pull.start` for one resource.
    Single(Option<i64>),
}

#[derive(Debug, Clone)]
struct ActiveRun {
    correlation_id: String,
    scope: RunScope,
    started_at: DateTime<Utc>,
    expected_items: u64,
    error_count: u64,
    persisted: bool,
    /// Single pulls that started while this run was active. Their events
    /// share the run's key but never touch it.
    overlapping: Vec<Option<i64>>,
}

impl ActiveRun {
    /// Returns true if an item error for `resource_id` belongs to this run.
    fn owns_error(&self, resource_id: Option<i64>) -> bool {
        match self.scope {
            RunScope::Group => !self.overlapping.contains(&resource_id),
            RunScope::Single(id) => id == resource_id,
        }
    }
}

/// How a run ended, as seen on the bus.
enum Finish {
    /// The group completed and reported `count` successes.
    Completed { success: bool, count: u64 },
    /// The push completed with `error_count` failed changes.
    Pushed { error_count: u64 },
    /// The group failed as a whole.
    Failed { details: String },
}

/// Records pull and push runs by observing the event bus.
pub struct HistoryTracker {
    store: Arc<dyn SyncHistoryStore>,
    bus: EventBus,
    initiator: String,
    runs: Mutex<HashMap<RunKey, ActiveRun>>,
    shutting_down: AtomicBool,
}

impl HistoryTracker {
    /// Creates a tracker that persists to `store` and announces finalized
    /// entries on `bus`.
    pub fn new(store: Arc<dyn SyncHistoryStore>, bus: EventBus, initiator: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            initiator: initiator.into(),
            runs: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Number of runs currently open.
    pub fn active_runs(&self) -> usize {
        self.runs.lock().len()
    }

    /// Returns the correlation id of the open run for a key.
    pub fn active_correlation(&self, direction: Direction, source: ResourceKind) -> Option<String> {
        self.runs
            .lock()
            .get(&(direction, source))
            .map(|run| run.correlation_id.clone())
    }

    /// Enters the shutdown window: writes that fail because the store is
    /// already closed are no longer reported.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Returns true inside the shutdown window.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns up to `limit` entries, most recent first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<SyncHistoryEntry>, StoreError> {
        self.store.recent(limit).await
    }

    /// Applies one event.
    pub async fn record(&self, event: &Event) {
        let (Some(direction), Some(source)) = (event.direction(), event.source) else {
            return;
        };
        let key = (direction, source);
        let label = source.label();

        match (direction, event.topic.verb, &event.payload) {
            (Direction::Pull, Verb::GroupStart, _) => {
                self.start(key, RunScope::Group, format!("Pull started for {label}"))
                    .await;
            }
            (Direction::Pull, Verb::Start, payload) => {
                let resource_id = match payload {
                    EventPayload::ResourceStart { resource_id } => *resource_id,
                    _ => None,
                };
                self.start(
                    key,
                    RunScope::Single(resource_id),
                    format!("Pull started for {label}"),
                )
                .await;
            }
            (Direction::Push, Verb::ScanStart, _) => {
                self.start(
                    key,
                    RunScope::Group,
                    format!("Scanning {label} pending changes"),
                )
                .await;
            }
            (Direction::Pull, Verb::IdsFetched, EventPayload::Count { count }) => {
                self.update_metrics(key, *count, format!("Queued {count} {label} for pull"))
                    .await;
            }
            (Direction::Push, Verb::ScanComplete, EventPayload::Count { count }) => {
                self.update_metrics(key, *count, format!("Queued {count} {label} for push"))
                    .await;
            }
            (Direction::Pull, Verb::Error, payload) => {
                let resource_id = match payload {
                    EventPayload::Error { resource_id, .. } => *resource_id,
                    _ => None,
                };
                if let Some(run) = self.runs.lock().get_mut(&key) {
                    if run.owns_error(resource_id) {
                        run.error_count += 1;
                    }
                }
            }
            (Direction::Push, Verb::ItemError, _) => {
                if let Some(run) = self.runs.lock().get_mut(&key) {
                    run.error_count += 1;
                }
            }
            (
                Direction::Pull,
                Verb::GroupComplete,
                EventPayload::Completion { success, count, .. },
            ) => {
                let finish = Finish::Completed {
                    success: *success,
                    count: *count,
                };
                self.finish(key, RunScope::Group, finish).await;
            }
            (
                Direction::Pull,
                Verb::Complete,
                EventPayload::Completion {
                    success,
                    count,
                    resource_id,
                    ..
                },
            ) => {
                let finish = Finish::Completed {
                    success: *success,
                    count: *count,
                };
                self.finish(key, RunScope::Single(*resource_id), finish)
                    .await;
            }
            (Direction::Push, Verb::Complete, EventPayload::PushComplete { error_count, .. }) => {
                let finish = Finish::Pushed {
                    error_count: *error_count,
                };
                self.finish(key, RunScope::Group, finish).await;
            }
            (Direction::Pull, Verb::GroupError, payload) | (Direction::Push, Verb::Error, payload) => {
                let details = match payload {
                    EventPayload::Error { message, .. } => message.clone(),
                    _ => String::new(),
                };
                self.finish(key, RunScope::Group, Finish::Failed { details })
                    .await;
            }
            _ => {}
        }
    }

    async fn start(&self, key: RunKey, scope: RunScope, summary: String) {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        {
            let mut runs = self.runs.lock();
            if let Some(run) = runs.get_mut(&key) {
                if let RunScope::Single(resource_id) = scope {
                    run.overlapping.push(resource_id);
                }
                tracing::debug!(direction = %key.0, source = %key.1, "run already active, start ignored");
                return;
            }
            runs.insert(
                key,
                ActiveRun {
                    correlation_id: correlation_id.clone(),
                    scope,
                    started_at: Utc::now(),
                    expected_items: 0,
                    error_count: 0,
                    persisted: false,
                    overlapping: Vec::new(),
                },
            );
        }

        let entry =
            SyncHistoryEntry::running(&correlation_id, key.0, key.1, &self.initiator, summary);
        match self.store.insert(entry).await {
            Ok(history_id) => {
                if let Some(run) = self.runs.lock().get_mut(&key) {
                    run.persisted = true;
                }
                tracing::debug!(%correlation_id, history_id, "sync run started");
            }
            Err(err) => {
                self.runs.lock().remove(&key);
                self.report_failure("record sync start", &err);
            }
        }
    }

    async fn update_metrics(&self, key: RunKey, items: u64, summary: String) {
        let correlation_id = {
            let mut runs = self.runs.lock();
            let Some(run) = runs.get_mut(&key) else {
                return;
            };
            if run.scope != RunScope::Group {
                return;
            }
            run.expected_items = items;
            run.correlation_id.clone()
        };

        if let Err(err) = self
            .store
            .update_metrics(&correlation_id, items, &summary)
            .await
        {
            self.report_failure("update sync metrics", &err);
        }
    }

    /// Removes the run for `key` if `closer` is the completion that ends it.
    ///
    /// The completion of an overlapping single pull only forgets that pull.
    fn take_run(&self, key: RunKey, closer: RunScope) -> Option<ActiveRun> {
        let mut runs = self.runs.lock();
        let run = runs.get_mut(&key)?;
        let close = match (closer, run.scope) {
            (RunScope::Group, RunScope::Group) => true,
            (RunScope::Single(resource_id), scope) => {
                match run.overlapping.iter().position(|id| *id == resource_id) {
                    Some(index) => {
                        run.overlapping.swap_remove(index);
                        false
                    }
                    None => matches!(scope, RunScope::Single(_)),
                }
            }
            (RunScope::Group, RunScope::Single(_)) => false,
        };
        if close {
            runs.remove(&key)
        } else {
            None
        }
    }

    async fn finish(&self, key: RunKey, closer: RunScope, finish: Finish) {
        let Some(run) = self.take_run(key, closer) else {
            return;
        };
        if !run.persisted {
            return;
        }

        let label = key.1.label();
        let completion = match finish {
            Finish::Completed { success, count } => {
                let error_count = if run.expected_items > count {
                    run.expected_items - count
                } else if success {
                    0
                } else {
                    run.error_count
                };
                let status = if success && error_count == 0 {
                    HistoryStatus::Completed
                } else {
                    HistoryStatus::CompletedWithErrors
                };
                HistoryCompletion {
                    status,
                    items_processed: count,
                    error_count,
                    duration_seconds: 0,
                    summary: format!("Pulled {count} {label}"),
                    details: String::new(),
                }
            }
            Finish::Pushed { error_count } => {
                let expected = if run.expected_items == 0 {
                    error_count
                } else {
                    run.expected_items
                };
                let (status, summary) = if error_count == 0 {
                    (HistoryStatus::Completed, format!("Push completed for {label}"))
                } else {
                    (
                        HistoryStatus::CompletedWithErrors,
                        format!("Push finished for {label} with {error_count} errors"),
                    )
                };
                HistoryCompletion {
                    status,
                    items_processed: expected.saturating_sub(error_count),
                    error_count,
                    duration_seconds: 0,
                    summary,
                    details: String::new(),
                }
            }
            Finish::Failed { details } => {
                let verb = match key.0 {
                    Direction::Pull => "Pull",
                    Direction::Push => "Push",
                };
                HistoryCompletion {
                    status: HistoryStatus::Failed,
                    items_processed: run.expected_items,
                    error_count: run.error_count,
                    duration_seconds: 0,
                    summary: format!("{verb} failed for {label}"),
                    details,
                }
            }
        };
        let completion = HistoryCompletion {
            duration_seconds: (Utc::now() - run.started_at).num_seconds().max(0) as u64,
            ..completion
        };
        let status = completion.status;

        match self.store.complete(&run.correlation_id, completion).await {
            Ok(()) => {
                tracing::info!(
                    correlation_id = %run.correlation_id,
                    direction = %key.0,
                    source = %key.1,
                    %status,
                    "sync run recorded"
                );
                self.bus.publish(Event::new(
                    Topic::SYNC_HISTORY_UPDATED,
                    key.1,
                    EventPayload::HistoryUpdated {
                        correlation_id: run.correlation_id,
                        status,
                    },
                ));
            }
            Err(err) => self.report_failure("finalize sync history", &err),
        }
    }

    fn report_failure(&self, action: &str, err: &StoreError) {
        if self.is_shutting_down() && err.is_closed() {
            tracing::debug!(error = %err, "failed to {action} during shutdown");
            return;
        }
        tracing::warn!(error = %err, "failed to {action}");
        self.bus.publish(Event::log(
            LogLevel::Warn,
            format!("Failed to {action}: {err}"),
        ));
    }
}

#[async_trait]
impl Listener for HistoryTracker {
    async fn handle(&self, event: Event) {
        self.record(&event).await;
    }
}

impl std::fmt::Debug for HistoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryTracker")
            .field("initiator", &self.initiator)
            .field("active_runs", &self.active_runs())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_store::MemoryHistoryStore;

    fn tracker() -> (HistoryTracker, Arc<MemoryHistoryStore>) {
        let store = Arc::new(MemoryHistoryStore::new());
        let tracker = HistoryTracker::new(store.clone(), EventBus::new(), "manual");
        (tracker, store)
    }

    fn event(topic: Topic, source: ResourceKind, payload: EventPayload) -> Event {
        Event::new(topic, source, payload)
    }

    fn completion(success: bool, count: u64) -> EventPayload {
        EventPayload::Completion {
            success,
            count,
            error: None,
            resource_id: None,
        }
    }

    #[tokio::test]
    async fn group_with_missing_items_completes_with_errors() {
        let (tracker, store) = tracker();
        let accounts = ResourceKind::Accounts;
        tracker
            .record(&event(Topic::PULL_GROUP_START, accounts, EventPayload::None))
            .await;
        tracker
            .record(&event(
                Topic::PULL_IDS_FETCHED,
                accounts,
                EventPayload::Count { count: 10 },
            ))
            .await;
        tracker
            .record(&event(Topic::PULL_GROUP_COMPLETE, accounts, completion(false, 8)))
            .await;

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.status, HistoryStatus::CompletedWithErrors);
        assert_eq!(entry.error_count, 2);
        assert_eq!(entry.items_processed, 8);
        assert_eq!(entry.summary, "Pulled 8 Accounts");
        assert_eq!(entry.initiator, "manual");
        assert_eq!(tracker.active_runs(), 0);
    }

    #[tokio::test]
    async fn second_start_is_ignored() {
        let (tracker, store) = tracker();
        let start = event(Topic::PULL_GROUP_START, ResourceKind::Routes, EventPayload::None);
        tracker.record(&start).await;
        let first = tracker
            .active_correlation(Direction::Pull, ResourceKind::Routes)
            .unwrap();
        tracker.record(&start).await;

        assert_eq!(store.entries().len(), 1);
        assert_eq!(
            tracker.active_correlation(Direction::Pull, ResourceKind::Routes),
            Some(first)
        );
    }

    #[tokio::test]
    async fn completion_without_run_is_noop() {
        let (tracker, store) = tracker();
        tracker
            .record(&event(
                Topic::PULL_GROUP_COMPLETE,
                ResourceKind::Accounts,
                completion(true, 3),
            ))
            .await;
        tracker
            .record(&event(
                Topic::PUSH_COMPLETE,
                ResourceKind::Checkins,
                EventPayload::PushComplete {
                    error_count: 0,
                    processed: 0,
                },
            ))
            .await;
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn group_error_finalizes_failed_with_run_counters() {
        let (tracker, store) = tracker();
        let source = ResourceKind::Checkins;
        tracker
            .record(&event(Topic::PULL_GROUP_START, source, EventPayload::None))
            .await;
        tracker
            .record(&event(
                Topic::PULL_GROUP_ERROR,
                source,
                EventPayload::Error {
                    message: "transport error: timeout".into(),
                    resource_id: None,
                },
            ))
            .await;

        let entry = &store.entries()[0];
        assert_eq!(entry.status, HistoryStatus::Failed);
        assert_eq!(entry.details, "transport error: timeout");
        assert_eq!(entry.summary, "Pull failed for Checkins");
        assert_eq!(entry.items_processed, 0);
    }

    #[tokio::test]
    async fn push_counts_item_errors() {
        let (tracker, store) = tracker();
        let source = ResourceKind::Checkins;
        tracker
            .record(&event(Topic::PUSH_SCAN_START, source, EventPayload::None))
            .await;
        tracker
            .record(&event(
                Topic::PUSH_SCAN_COMPLETE,
                source,
                EventPayload::Count { count: 3 },
            ))
            .await;
        tracker
            .record(&event(
                Topic::PUSH_COMPLETE,
                source,
                EventPayload::PushComplete {
                    error_count: 1,
                    processed: 3,
                },
            ))
            .await;

        let entry = &store.entries()[0];
        assert_eq!(entry.direction, Direction::Push);
        assert_eq!(entry.status, HistoryStatus::CompletedWithErrors);
        assert_eq!(entry.items_processed, 2);
        assert_eq!(entry.error_count, 1);
        assert_eq!(entry.summary, "Push finished for Checkins with 1 errors");
    }

    #[tokio::test]
    async fn failed_start_does_not_leave_a_run() {
        let (tracker, store) = tracker();
        store.set_failure(Some("disk full"));
        tracker
            .record(&event(
                Topic::PULL_GROUP_START,
                ResourceKind::Accounts,
                EventPayload::None,
            ))
            .await;
        assert_eq!(tracker.active_runs(), 0);
    }

    #[tokio::test]
    async fn single_pull_failure_counts_the_error() {
        let (tracker, store) = tracker();
        let source = ResourceKind::UserProfile;
        tracker
            .record(&event(
                Topic::PULL_START,
                source,
                EventPayload::ResourceStart { resource_id: None },
            ))
            .await;
        tracker
            .record(&event(
                Topic::PULL_ERROR,
                source,
                EventPayload::Error {
                    message: "profile 0 not found".into(),
                    resource_id: None,
                },
            ))
            .await;
        tracker
            .record(&event(Topic::PULL_COMPLETE, source, completion(false, 0)))
            .await;

        let entry = &store.entries()[0];
        assert_eq!(entry.status, HistoryStatus::CompletedWithErrors);
        assert_eq!(entry.error_count, 1);
        assert_eq!(entry.summary, "Pulled 0 User Profile");
    }

    #[tokio::test]
    async fn overlapping_single_pull_leaves_group_run_alone() {
        let (tracker, store) = tracker();
        let accounts = ResourceKind::Accounts;
        tracker
            .record(&event(Topic::PULL_GROUP_START, accounts, EventPayload::None))
            .await;
        tracker
            .record(&event(
                Topic::PULL_IDS_FETCHED,
                accounts,
                EventPayload::Count { count: 6 },
            ))
            .await;
        tracker
            .record(&event(
                Topic::PULL_START,
                accounts,
                EventPayload::ResourceStart { resource_id: Some(1) },
            ))
            .await;
        tracker
            .record(&event(
                Topic::PULL_ERROR,
                accounts,
                EventPayload::Error {
                    message: "account 1 not found".into(),
                    resource_id: Some(1),
                },
            ))
            .await;
        tracker
            .record(&event(
                Topic::PULL_COMPLETE,
                accounts,
                EventPayload::Completion {
                    success: false,
                    count: 0,
                    error: Some("account 1 not found".into()),
                    resource_id: Some(1),
                },
            ))
            .await;

        assert_eq!(tracker.active_runs(), 1);
        assert_eq!(store.entries()[0].status, HistoryStatus::Running);

        tracker
            .record(&event(Topic::PULL_GROUP_COMPLETE, accounts, completion(true, 6)))
            .await;

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, HistoryStatus::Completed);
        assert_eq!(entries[0].items_processed, 6);
        assert_eq!(entries[0].error_count, 0);
        assert_eq!(tracker.active_runs(), 0);
    }

    #[tokio::test]
    async fn group_completion_does_not_close_single_run() {
        let (tracker, store) = tracker();
        let routes = ResourceKind::Routes;
        tracker
            .record(&event(
                Topic::PULL_START,
                routes,
                EventPayload::ResourceStart { resource_id: Some(4) },
            ))
            .await;
        tracker
            .record(&event(Topic::PULL_GROUP_START, routes, EventPayload::None))
            .await;
        tracker
            .record(&event(
                Topic::PULL_IDS_FETCHED,
                routes,
                EventPayload::Count { count: 9 },
            ))
            .await;
        tracker
            .record(&event(Topic::PULL_GROUP_COMPLETE, routes, completion(true, 9)))
            .await;
        assert_eq!(tracker.active_runs(), 1);

        tracker
            .record(&event(
                Topic::PULL_COMPLETE,
                routes,
                EventPayload::Completion {
                    success: true,
                    count: 1,
                    error: None,
                    resource_id: Some(4),
                },
            ))
            .await;

        let entry = &store.entries()[0];
        assert_eq!(entry.status, HistoryStatus::Completed);
        assert_eq!(entry.items_processed, 1);
        assert_eq!(entry.error_count, 0);
    }
}
