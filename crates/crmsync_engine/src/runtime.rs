//! Process-level wiring of the engine.

use crate::api::RemoteApi;
use crate::commands::REQUIRED_COMMANDS;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::history::HistoryTracker;
use crate::orchestrator::Orchestrator;
use crmsync_events::{EventBus, LogListener, Namespace};
use crmsync_model::SyncHistoryEntry;
use crmsync_store::{verify_commands, CommandExecutor, PendingChangeStore, SyncHistoryStore};
use std::sync::Arc;

/// Owns the bus, the orchestrator and the history tracker.
///
/// Shutdown order matters: the tracker is told first, the bus is drained so
/// that every queued history write lands, and only then is the history
/// store closed.
pub struct SyncRuntime {
    config: SyncConfig,
    bus: EventBus,
    orchestrator: Orchestrator,
    tracker: Arc<HistoryTracker>,
    history: Arc<dyn SyncHistoryStore>,
}

impl SyncRuntime {
    /// Builds a runtime.
    ///
    /// Fails if `executor` cannot resolve every command the engine issues.
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn RemoteApi>,
        executor: Arc<dyn CommandExecutor>,
        pending: Arc<dyn PendingChangeStore>,
        history: Arc<dyn SyncHistoryStore>,
    ) -> SyncResult<Self> {
        verify_commands(executor.as_ref(), &REQUIRED_COMMANDS)?;

        let bus = EventBus::with_workers(config.listener_workers);
        let tracker = Arc::new(HistoryTracker::new(
            Arc::clone(&history),
            bus.clone(),
            config.initiator.clone(),
        ));
        // One worker per direction keeps each run's events in order.
        bus.subscribe_with(Namespace::Pull, 1, tracker.clone())?;
        bus.subscribe_with(Namespace::Push, 1, tracker.clone())?;
        if !config.quiet {
            bus.subscribe(Namespace::Pull, LogListener::new())?;
            bus.subscribe(Namespace::Push, LogListener::new())?;
            bus.subscribe(Namespace::Log, LogListener::new())?;
        }

        let concurrency = config.effective_concurrency();
        let orchestrator = Orchestrator::new(api, executor, pending, bus.clone(), concurrency);
        tracing::info!(
            concurrency,
            dialect = %orchestrator.executor.dialect(),
            initiator = %config.initiator,
            "sync runtime ready"
        );

        Ok(Self {
            config,
            bus,
            orchestrator,
            tracker,
            history,
        })
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the history tracker.
    pub fn tracker(&self) -> &HistoryTracker {
        &self.tracker
    }

    /// Returns the configuration the runtime was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns recent history entries, newest first.
    ///
    /// A `limit` of zero uses the configured default.
    pub async fn recent_history(&self, limit: usize) -> SyncResult<Vec<SyncHistoryEntry>> {
        let limit = if limit == 0 {
            self.config.history_limit
        } else {
            limit
        };
        Ok(self.history.recent(limit).await?)
    }

    /// Waits until every event published so far has been handled.
    pub async fn settle(&self) {
        self.bus.drain().await;
    }

    /// Drains the bus, closes it and releases the history store.
    ///
    /// Operations started afterwards fail with `ShuttingDown`.
    pub async fn shutdown(&self) -> SyncResult<()> {
        tracing::info!(in_flight = self.bus.in_flight(), "sync runtime shutting down");
        self.tracker.begin_shutdown();
        self.bus.drain().await;
        self.bus.close();
        self.history.close().await?;
        tracing::info!("sync runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .field("tracker", &self.tracker)
            .finish()
    }
}
