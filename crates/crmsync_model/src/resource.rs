//! Resource and entity kinds.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A kind of remote resource the engine pulls or pushes.
///
/// The string form (`"accounts"`, `"checkins"`, ...) is what appears as the
/// `source` of every event and as the `source` column of sync history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Customer accounts.
    Accounts,
    /// Visit records logged against accounts.
    Checkins,
    /// Planned routes.
    Routes,
    /// The authenticated user's profile and data-field metadata.
    UserProfile,
}

impl ResourceKind {
    /// All resource kinds, in pull order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Accounts,
        ResourceKind::Checkins,
        ResourceKind::Routes,
        ResourceKind::UserProfile,
    ];

    /// Returns the wire name used for event sources.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Accounts => "accounts",
            ResourceKind::Checkins => "checkins",
            ResourceKind::Routes => "routes",
            ResourceKind::UserProfile => "user_profile",
        }
    }

    /// Returns a human-readable, title-cased label ("User Profile").
    pub fn label(&self) -> String {
        self.as_str()
            .split(['_', '-'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns the pushable entity kind for this resource, if it has one.
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            ResourceKind::Accounts => Some(EntityKind::Accounts),
            ResourceKind::Checkins => Some(EntityKind::Checkins),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "accounts" | "account" => Ok(ResourceKind::Accounts),
            "checkins" | "checkin" | "check-in" | "check-ins" => Ok(ResourceKind::Checkins),
            "routes" | "route" => Ok(ResourceKind::Routes),
            "user_profile" | "user profile" | "profile" => Ok(ResourceKind::UserProfile),
            _ => Err(ModelError::UnknownResource(s.to_string())),
        }
    }
}

/// A kind of entity that has a local pending-change queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Account edits, pushed through the account create/update/delete calls.
    Accounts,
    /// Check-in edits, pushed through the check-in calls.
    Checkins,
}

impl EntityKind {
    /// All entity kinds, in push order.
    pub const ALL: [EntityKind; 2] = [EntityKind::Accounts, EntityKind::Checkins];

    /// Returns the resource kind this entity belongs to.
    pub fn resource(&self) -> ResourceKind {
        match self {
            EntityKind::Accounts => ResourceKind::Accounts,
            EntityKind::Checkins => ResourceKind::Checkins,
        }
    }

    /// Returns the name of the pending-change table for this entity.
    pub fn pending_table(&self) -> &'static str {
        match self {
            EntityKind::Accounts => "AccountsPendingChanges",
            EntityKind::Checkins => "AccountCheckinsPendingChanges",
        }
    }

    /// Returns the wire name of the entity kind.
    pub fn as_str(&self) -> &'static str {
        self.resource().as_str()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        ResourceKind::from_str(s)?
            .entity()
            .ok_or_else(|| ModelError::UnknownResource(s.to_string()))
    }
}

impl From<EntityKind> for ResourceKind {
    fn from(kind: EntityKind) -> Self {
        kind.resource()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(ResourceKind::Accounts.label(), "Accounts");
        assert_eq!(ResourceKind::UserProfile.label(), "User Profile");
    }

    #[test]
    fn parse_resource_aliases() {
        assert_eq!("check-in".parse::<ResourceKind>().unwrap(), ResourceKind::Checkins);
        assert_eq!("ACCOUNTS".parse::<ResourceKind>().unwrap(), ResourceKind::Accounts);
        assert!("widgets".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn only_accounts_and_checkins_are_pushable() {
        assert_eq!(ResourceKind::Accounts.entity(), Some(EntityKind::Accounts));
        assert_eq!(ResourceKind::Routes.entity(), None);
        assert!("routes".parse::<EntityKind>().is_err());
        assert_eq!(
            EntityKind::Checkins.pending_table(),
            "AccountCheckinsPendingChanges"
        );
    }
}
