//! Pending changes and their status lifecycle.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Decoded field diff of a pending change, keyed by remote field name.
pub type FieldMap = BTreeMap<String, String>;

/// Kind of mutation a pending change requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// Create a new remote entity.
    Create,
    /// Update fields of an existing remote entity.
    Update,
    /// Delete a remote entity.
    Delete,
}

impl ChangeType {
    /// Returns the stored form (`"CREATE"`, `"UPDATE"`, `"DELETE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(ChangeType::Create),
            "UPDATE" => Ok(ChangeType::Update),
            "DELETE" => Ok(ChangeType::Delete),
            _ => Err(ModelError::UnknownChangeType(s.to_string())),
        }
    }
}

/// Status of a pending change.
///
/// Status only moves forward: `pending → processing → {completed | failed}`.
/// `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Queued, not yet picked up by a push.
    Pending,
    /// Picked up by a push, remote call not yet resolved.
    Processing,
    /// The remote mutation succeeded.
    Completed,
    /// Decoding or the remote mutation failed.
    Failed,
}

impl ChangeStatus {
    /// Returns the stored form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Processing => "processing",
            ChangeStatus::Completed => "completed",
            ChangeStatus::Failed => "failed",
        }
    }

    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChangeStatus::Completed | ChangeStatus::Failed)
    }

    /// Returns true if moving from `self` to `next` respects the lifecycle
    /// `pending → processing → completed | failed`.
    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        matches!(
            (self, next),
            (ChangeStatus::Pending, ChangeStatus::Processing)
                | (ChangeStatus::Processing, ChangeStatus::Completed)
                | (ChangeStatus::Processing, ChangeStatus::Failed)
        )
    }

    /// Validates a transition, returning an error if it is not allowed.
    pub fn transition(&self, next: ChangeStatus) -> ModelResult<ChangeStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                from: self.as_str().into(),
                to: next.as_str().into(),
            })
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ChangeStatus::Pending),
            "processing" => Ok(ChangeStatus::Processing),
            "completed" => Ok(ChangeStatus::Completed),
            "failed" => Ok(ChangeStatus::Failed),
            _ => Err(ModelError::UnknownStatus(s.to_string())),
        }
    }
}

/// A queued local mutation awaiting push to the remote API.
///
/// Rows are produced by local edits and read and advanced only by the push
/// path of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Unique id of the change row.
    pub change_id: i64,
    /// Id of the entity being mutated (account id or check-in id).
    pub entity_id: i64,
    /// Account the change belongs to. Equal to `entity_id` for accounts.
    pub account_id: i64,
    /// Requested mutation.
    pub change_type: ChangeType,
    /// Serialized field diff (a JSON object).
    pub payload: String,
    /// Current lifecycle status.
    pub status: ChangeStatus,
    /// When the change was queued.
    pub created_at: DateTime<Utc>,
    /// When the change reached a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
}

impl PendingChange {
    /// Creates a new `pending` change queued now.
    pub fn new(
        change_id: i64,
        entity_id: i64,
        change_type: ChangeType,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            change_id,
            entity_id,
            account_id: entity_id,
            change_type,
            payload: payload.into(),
            status: ChangeStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Sets the owning account (for check-in changes).
    pub fn with_account(mut self, account_id: i64) -> Self {
        self.account_id = account_id;
        self
    }

    /// Sets the creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Decodes the serialized field diff.
    ///
    /// The payload must be a JSON object. String values are kept verbatim;
    /// numbers and booleans are rendered in their JSON form; `null` becomes
    /// an empty string.
    pub fn decode_fields(&self) -> ModelResult<FieldMap> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&self.payload)
            .map_err(|source| ModelError::MalformedPayload {
                change_id: self.change_id,
                source,
            })?;

        Ok(raw
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = ChangeStatus> {
        prop_oneof![
            Just(ChangeStatus::Pending),
            Just(ChangeStatus::Processing),
            Just(ChangeStatus::Completed),
            Just(ChangeStatus::Failed),
        ]
    }

    #[test]
    fn forward_transitions() {
        assert!(ChangeStatus::Pending.can_transition_to(ChangeStatus::Processing));
        assert!(ChangeStatus::Processing.can_transition_to(ChangeStatus::Completed));
        assert!(ChangeStatus::Processing.can_transition_to(ChangeStatus::Failed));
        assert!(!ChangeStatus::Processing.can_transition_to(ChangeStatus::Pending));
        assert!(!ChangeStatus::Completed.can_transition_to(ChangeStatus::Failed));
        assert!(ChangeStatus::Failed.transition(ChangeStatus::Pending).is_err());
    }

    #[test]
    fn pending_cannot_skip_processing() {
        assert!(!ChangeStatus::Pending.can_transition_to(ChangeStatus::Failed));
        assert!(!ChangeStatus::Pending.can_transition_to(ChangeStatus::Completed));
        assert!(matches!(
            ChangeStatus::Pending.transition(ChangeStatus::Failed),
            Err(ModelError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn change_type_round_trip_strings() {
        assert_eq!("update".parse::<ChangeType>().unwrap(), ChangeType::Update);
        assert_eq!(ChangeType::Delete.to_string(), "DELETE");
        assert!("UPSERT".parse::<ChangeType>().is_err());
    }

    #[test]
    fn decode_fields_stringifies_scalars() {
        let change = PendingChange::new(
            1,
            10,
            ChangeType::Update,
            r#"{"last_name":"Smith","custom_numeric":4,"active":true,"notes":null}"#,
        );
        let fields = change.decode_fields().unwrap();
        assert_eq!(fields["last_name"], "Smith");
        assert_eq!(fields["custom_numeric"], "4");
        assert_eq!(fields["active"], "true");
        assert_eq!(fields["notes"], "");
    }

    #[test]
    fn decode_fields_rejects_malformed_payload() {
        let change = PendingChange::new(7, 10, ChangeType::Create, "{invalid");
        let err = change.decode_fields().unwrap_err();
        assert!(matches!(err, ModelError::MalformedPayload { change_id: 7, .. }));
    }

    proptest! {
        #[test]
        fn no_transition_reenters_pending(from in any_status(), to in any_status()) {
            if to == ChangeStatus::Pending {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        #[test]
        fn terminal_states_are_reached_only_from_processing(from in any_status(), to in any_status()) {
            if to.is_terminal() && from.can_transition_to(to) {
                prop_assert_eq!(from, ChangeStatus::Processing);
            }
        }

        #[test]
        fn terminal_states_are_final(from in any_status(), to in any_status()) {
            if from.is_terminal() {
                prop_assert!(from.transition(to).is_err());
            }
        }

        #[test]
        fn status_strings_parse_back(status in any_status()) {
            prop_assert_eq!(status.as_str().parse::<ChangeStatus>().unwrap(), status);
        }
    }
}
