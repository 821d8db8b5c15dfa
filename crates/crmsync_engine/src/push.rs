//! Local-to-remote pushes of pending changes.
//!
//! Changes are pushed one at a time, oldest first, so the remote sees
//! mutations in the order they were made locally.

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{Orchestrator, PushReport};
use crmsync_events::{EventPayload, Topic};
use crmsync_model::{ChangeStatus, ChangeType, Direction, EntityKind, PendingChange, PendingFilter};

impl Orchestrator {
    /// Pushes every `pending` change of `kind`.
    ///
    /// Each change moves `pending → processing → completed | failed`. A
    /// change whose payload does not decode fails without any remote call.
    /// Returns a partial failure listing every failed change.
    pub async fn push_changes(&self, kind: EntityKind) -> SyncResult<PushReport> {
        self.ensure_running()?;
        let source = kind.resource();
        self.emit(Topic::PUSH_SCAN_START, source, EventPayload::None);

        let changes = match self.pending.list(kind, &PendingFilter::pending()).await {
            Ok(changes) => changes,
            Err(err) => {
                let message = err.to_string();
                tracing::error!(%kind, error = %message, "failed to list pending changes");
                self.emit(
                    Topic::PUSH_ERROR,
                    source,
                    EventPayload::Error {
                        message: message.clone(),
                        resource_id: None,
                    },
                );
                return Err(SyncError::ListFailed {
                    resource: source,
                    direction: Direction::Push,
                    message,
                });
            }
        };

        let total = changes.len();
        self.emit(
            Topic::PUSH_SCAN_COMPLETE,
            source,
            EventPayload::Count {
                count: total as u64,
            },
        );
        tracing::info!(%kind, total, "pushing pending changes");

        let mut errors = Vec::new();
        for change in &changes {
            if let Err(message) = self.push_one(kind, change).await {
                errors.push(message);
            }
        }

        self.emit(
            Topic::PUSH_COMPLETE,
            source,
            EventPayload::PushComplete {
                error_count: errors.len() as u64,
                processed: total as u64,
            },
        );

        if errors.is_empty() {
            tracing::info!(%kind, total, "push completed");
            Ok(PushReport {
                kind,
                total,
                succeeded: total,
            })
        } else {
            tracing::warn!(%kind, total, failed = errors.len(), "push completed with errors");
            Err(SyncError::PartialFailure {
                resource: source,
                direction: Direction::Push,
                succeeded: total - errors.len(),
                errors,
            })
        }
    }

    /// Pushes account changes, then check-in changes.
    ///
    /// Both kinds are attempted; the first error is returned.
    pub async fn push_all(&self) -> SyncResult<Vec<PushReport>> {
        let mut reports = Vec::new();
        let mut first_error = None;
        for kind in EntityKind::ALL {
            match self.push_changes(kind).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }

    /// Lists changes of `kind` matching `filter`.
    pub async fn list_changes(
        &self,
        kind: EntityKind,
        filter: &PendingFilter,
    ) -> SyncResult<Vec<PendingChange>> {
        Ok(self.pending.list(kind, filter).await?)
    }

    async fn push_one(&self, kind: EntityKind, change: &PendingChange) -> Result<(), String> {
        let source = kind.resource();
        self.emit(
            Topic::PUSH_ITEM_START,
            source,
            EventPayload::Change {
                change_id: change.change_id,
                entity_id: change.entity_id,
                change_type: change.change_type,
            },
        );

        let outcome = self.apply_change(kind, change).await;
        match &outcome {
            Ok(()) => self.emit(
                Topic::PUSH_ITEM_SUCCESS,
                source,
                EventPayload::Change {
                    change_id: change.change_id,
                    entity_id: change.entity_id,
                    change_type: change.change_type,
                },
            ),
            Err(message) => {
                tracing::warn!(%kind, change_id = change.change_id, error = %message, "change failed");
                self.emit(
                    Topic::PUSH_ITEM_ERROR,
                    source,
                    EventPayload::ChangeError {
                        change_id: change.change_id,
                        message: message.clone(),
                    },
                );
            }
        }
        outcome
    }

    async fn apply_change(&self, kind: EntityKind, change: &PendingChange) -> Result<(), String> {
        let id = change.change_id;
        let describe = |err: &dyn std::fmt::Display| format!("change {id} ({kind}): {err}");

        let processing = change
            .status
            .transition(ChangeStatus::Processing)
            .map_err(|err| describe(&err))?;
        self.pending
            .set_status(kind, id, processing)
            .await
            .map_err(|err| describe(&err))?;

        let fields = match change.decode_fields() {
            Ok(fields) => fields,
            Err(err) => {
                let err = SyncError::MalformedPayload(err);
                self.finish(kind, id, processing, ChangeStatus::Failed).await?;
                return Err(describe(&err));
            }
        };

        let result = match change.change_type {
            ChangeType::Create => self.api.create(kind, change.entity_id, &fields).await,
            ChangeType::Update => self.api.update(kind, change.entity_id, &fields).await,
            ChangeType::Delete => self.api.delete(kind, change.entity_id, &fields).await,
        };

        match result {
            Ok(_) => self.finish(kind, id, processing, ChangeStatus::Completed).await,
            Err(err) => {
                self.finish(kind, id, processing, ChangeStatus::Failed).await?;
                Err(describe(&err))
            }
        }
    }

    async fn finish(
        &self,
        kind: EntityKind,
        change_id: i64,
        current: ChangeStatus,
        next: ChangeStatus,
    ) -> Result<(), String> {
        let status = current
            .transition(next)
            .map_err(|err| format!("change {change_id} ({kind}): {err}"))?;
        self.pending
            .set_status(kind, change_id, status)
            .await
            .map_err(|err| format!("change {change_id} ({kind}): failed to mark {status}: {err}"))
    }
}
