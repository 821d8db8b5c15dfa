//! Renders bus traffic as `tracing` records.

use crate::bus::Listener;
use crate::event::{Event, EventPayload, LogLevel};
use async_trait::async_trait;

/// A listener that logs every event it receives.
///
/// Errors are logged at `warn` (item level) or `error` (group level),
/// completions at `info` and per-item progress at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl LogListener {
    /// Creates a log listener.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Listener for LogListener {
    async fn handle(&self, event: Event) {
        let topic = event.topic.to_string();
        let source = event.source.map(|s| s.as_str()).unwrap_or("-");

        match &event.payload {
            EventPayload::None => {
                tracing::info!(%topic, source, "started");
            }
            EventPayload::ResourceStart { resource_id } => {
                tracing::info!(%topic, source, resource_id = ?resource_id, "started");
            }
            EventPayload::Count { count } => {
                tracing::info!(%topic, source, count, "working set resolved");
            }
            EventPayload::Item { resource_id } => {
                tracing::debug!(%topic, source, resource_id, "fetching");
            }
            EventPayload::Record { resource_id, label } => {
                tracing::debug!(%topic, source, resource_id, label = %label, "ok");
            }
            EventPayload::Error {
                message,
                resource_id: Some(resource_id),
            } => {
                tracing::warn!(%topic, source, resource_id, error = %message, "item failed");
            }
            EventPayload::Error {
                message,
                resource_id: None,
            } => {
                tracing::error!(%topic, source, error = %message, "failed");
            }
            EventPayload::Completion {
                success: true,
                count,
                ..
            } => {
                tracing::info!(%topic, source, count, "completed");
            }
            EventPayload::Completion {
                success: false,
                count,
                error,
                ..
            } => {
                tracing::warn!(
                    %topic,
                    source,
                    count,
                    error = error.as_deref().unwrap_or(""),
                    "completed with errors"
                );
            }
            EventPayload::Change {
                change_id,
                entity_id,
                change_type,
            } => {
                tracing::debug!(%topic, source, change_id, entity_id, %change_type, "change");
            }
            EventPayload::ChangeError { change_id, message } => {
                tracing::warn!(%topic, source, change_id, error = %message, "change failed");
            }
            EventPayload::PushComplete {
                error_count,
                processed,
            } => {
                tracing::info!(%topic, source, error_count, processed, "push completed");
            }
            EventPayload::HistoryUpdated {
                correlation_id,
                status,
            } => {
                tracing::debug!(%topic, source, correlation_id = %correlation_id, %status, "history updated");
            }
            EventPayload::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!(source, "{message}"),
                LogLevel::Info => tracing::info!(source, "{message}"),
                LogLevel::Warn => tracing::warn!(source, "{message}"),
                LogLevel::Error => tracing::error!(source, "{message}"),
            },
        }
    }
}
