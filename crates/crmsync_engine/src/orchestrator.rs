//! The bulk orchestrator.
//!
//! Every pull-many operation runs through [`Orchestrator::pull_group`]:
//!
//! 1. `pull.group.start`
//! 2. resolve the working set; on failure `pull.group.error` and return
//! 3. `pull.ids_fetched`
//! 4. run one unit of work per item, at most `concurrency` at a time
//! 5. join every unit, then `pull.group.complete`
//!
//! Units emit their own per-item events. Cancellation is cooperative: the
//! cancel flag is polled once, at unit entry, before any I/O. A unit that is
//! already past that point runs to completion and its outcome is recorded.

use crate::api::{ApiResult, RemoteApi};
use crate::error::{SyncError, SyncResult};
use crmsync_events::{Event, EventBus, EventPayload, Topic};
use crmsync_model::{Direction, EntityKind, ResourceKind};
use crmsync_store::{CommandExecutor, PendingChangeStore};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What happens to the rest of a group when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Attempt every item regardless of earlier failures.
    ContinueOnError,
    /// Stop starting new items after the first failure. Items already
    /// running finish normally.
    CancelOnFirstError,
}

/// Outcome of a pull group in which every attempted item succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    /// Resource the group processed.
    pub resource: ResourceKind,
    /// Size of the working set.
    pub total: usize,
    /// Items that succeeded.
    pub succeeded: usize,
}

/// Outcome of a push over one entity kind in which every change succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Entity kind pushed.
    pub kind: EntityKind,
    /// Pending changes found.
    pub total: usize,
    /// Changes pushed.
    pub succeeded: usize,
}

/// Runs pulls and pushes against the remote API and the local store,
/// reporting progress on the event bus.
///
/// Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) api: Arc<dyn RemoteApi>,
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) pending: Arc<dyn PendingChangeStore>,
    pub(crate) bus: EventBus,
    concurrency: usize,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// A `concurrency` of zero is raised to one.
    pub fn new(
        api: Arc<dyn RemoteApi>,
        executor: Arc<dyn CommandExecutor>,
        pending: Arc<dyn PendingChangeStore>,
        bus: EventBus,
        concurrency: usize,
    ) -> Self {
        Self {
            api,
            executor,
            pending,
            bus,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns the concurrency bound of pull groups.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the bus progress is published on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn emit(&self, topic: Topic, source: ResourceKind, payload: EventPayload) {
        self.bus.publish(Event::new(topic, source, payload));
    }

    pub(crate) fn ensure_running(&self) -> SyncResult<()> {
        if self.bus.is_closed() {
            Err(SyncError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Emits `pull.error` for one item and returns the message.
    pub(crate) fn item_error(&self, source: ResourceKind, resource_id: i64, message: String) -> String {
        tracing::warn!(%source, resource_id, error = %message, "pull item failed");
        self.emit(
            Topic::PULL_ERROR,
            source,
            EventPayload::Error {
                message: message.clone(),
                resource_id: Some(resource_id),
            },
        );
        message
    }

    /// Runs one bounded pull group.
    ///
    /// `unit` is invoked once per item and must emit the item's own events;
    /// it returns the item's error message on failure. The future it
    /// returns is not polled at all when the group has been cancelled.
    pub(crate) async fn pull_group<T, R, F, Fut>(
        &self,
        source: ResourceKind,
        policy: CancelPolicy,
        resolve: R,
        unit: F,
    ) -> SyncResult<GroupReport>
    where
        T: Send + 'static,
        R: Future<Output = ApiResult<Vec<T>>>,
        F: Fn(Orchestrator, T) -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.ensure_running()?;
        self.emit(Topic::PULL_GROUP_START, source, EventPayload::None);

        let items = match resolve.await {
            Ok(items) => items,
            Err(err) => {
                let message = err.to_string();
                tracing::error!(%source, error = %message, "failed to resolve pull working set");
                self.emit(
                    Topic::PULL_GROUP_ERROR,
                    source,
                    EventPayload::Error {
                        message: message.clone(),
                        resource_id: None,
                    },
                );
                return Err(SyncError::ListFailed {
                    resource: source,
                    direction: Direction::Pull,
                    message,
                });
            }
        };

        let total = items.len();
        self.emit(
            Topic::PULL_IDS_FETCHED,
            source,
            EventPayload::Count {
                count: total as u64,
            },
        );
        tracing::info!(%source, total, concurrency = self.concurrency, "pull group started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let cancelled = Arc::new(AtomicBool::new(false));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let mut units = JoinSet::new();

        for item in items {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let work = unit(self.clone(), item);
            let cancelled = Arc::clone(&cancelled);
            let errors = Arc::clone(&errors);
            let succeeded = Arc::clone(&succeeded);

            units.spawn(async move {
                let _permit = permit;
                // Poll point: nothing below this runs once the group is cancelled.
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                match work.await {
                    Ok(()) => {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(message) => {
                        if policy == CancelPolicy::CancelOnFirstError {
                            cancelled.store(true, Ordering::SeqCst);
                        }
                        errors.lock().push(message);
                    }
                }
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(err) = joined {
                let message = format!("{source} pull unit aborted: {err}");
                tracing::error!(%source, error = %err, "pull unit panicked");
                if policy == CancelPolicy::CancelOnFirstError {
                    cancelled.store(true, Ordering::SeqCst);
                }
                errors.lock().push(message);
            }
        }

        let errors = std::mem::take(&mut *errors.lock());
        let succeeded = succeeded.load(Ordering::SeqCst);
        let skipped = total.saturating_sub(succeeded + errors.len());

        if errors.is_empty() {
            self.emit(
                Topic::PULL_GROUP_COMPLETE,
                source,
                EventPayload::Completion {
                    success: true,
                    count: succeeded as u64,
                    error: None,
                    resource_id: None,
                },
            );
            tracing::info!(%source, succeeded, "pull group completed");
            return Ok(GroupReport {
                resource: source,
                total,
                succeeded,
            });
        }

        let err = SyncError::PartialFailure {
            resource: source,
            direction: Direction::Pull,
            errors,
            succeeded,
        };
        self.emit(
            Topic::PULL_GROUP_COMPLETE,
            source,
            EventPayload::Completion {
                success: false,
                count: succeeded as u64,
                error: Some(err.to_string()),
                resource_id: None,
            },
        );
        tracing::warn!(
            %source,
            succeeded,
            failed = err.item_errors().len(),
            skipped,
            "pull group completed with errors"
        );
        Err(err)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("concurrency", &self.concurrency)
            .field("bus", &self.bus)
            .finish()
    }
}
