//! Structured topics and topic patterns.
//!
//! Topics are `(namespace, verb)` pairs rendered as dotted names such as
//! `pull.group.complete`. Patterns match on the structure rather than on
//! string prefixes, so `pull.*` can never accidentally match a `pullx.*`
//! namespace.

use crate::error::{EventError, EventResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Top-level topic namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Remote-to-local pulls.
    Pull,
    /// Local-to-remote pushes.
    Push,
    /// Sync bookkeeping (history updates).
    Sync,
    /// Free-form log messages.
    Log,
}

impl Namespace {
    /// Returns the namespace name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Pull => "pull",
            Namespace::Push => "push",
            Namespace::Sync => "sync",
            Namespace::Log => "log",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pull" => Some(Namespace::Pull),
            "push" => Some(Namespace::Push),
            "sync" => Some(Namespace::Sync),
            "log" => Some(Namespace::Log),
            _ => None,
        }
    }
}

/// What happened, within a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// A single-resource pull started.
    Start,
    /// The working set of a group was resolved.
    IdsFetched,
    /// A per-item detail fetch started.
    FetchDetailStart,
    /// A per-item detail fetch succeeded.
    FetchDetailSuccess,
    /// A per-item store succeeded.
    StoreSuccess,
    /// An item-level (pull) or group-fatal (push) error.
    Error,
    /// A single-resource pull or a push group completed.
    Complete,
    /// A pull group started.
    GroupStart,
    /// A pull group completed.
    GroupComplete,
    /// A pull group failed as a whole.
    GroupError,
    /// A push scan of the pending queue started.
    ScanStart,
    /// A push scan of the pending queue completed.
    ScanComplete,
    /// A pending change push started.
    ItemStart,
    /// A pending change was pushed.
    ItemSuccess,
    /// A pending change failed.
    ItemError,
    /// A sync history entry was finalized.
    HistoryUpdated,
    /// A log message.
    Message,
}

impl Verb {
    /// Returns the dotted verb name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::IdsFetched => "ids_fetched",
            Verb::FetchDetailStart => "fetch_detail.start",
            Verb::FetchDetailSuccess => "fetch_detail.success",
            Verb::StoreSuccess => "store.success",
            Verb::Error => "error",
            Verb::Complete => "complete",
            Verb::GroupStart => "group.start",
            Verb::GroupComplete => "group.complete",
            Verb::GroupError => "group.error",
            Verb::ScanStart => "scan.start",
            Verb::ScanComplete => "scan.complete",
            Verb::ItemStart => "item.start",
            Verb::ItemSuccess => "item.success",
            Verb::ItemError => "item.error",
            Verb::HistoryUpdated => "history.updated",
            Verb::Message => "message",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        const ALL: [Verb; 17] = [
            Verb::Start,
            Verb::IdsFetched,
            Verb::FetchDetailStart,
            Verb::FetchDetailSuccess,
            Verb::StoreSuccess,
            Verb::Error,
            Verb::Complete,
            Verb::GroupStart,
            Verb::GroupComplete,
            Verb::GroupError,
            Verb::ScanStart,
            Verb::ScanComplete,
            Verb::ItemStart,
            Verb::ItemSuccess,
            Verb::ItemError,
            Verb::HistoryUpdated,
            Verb::Message,
        ];
        ALL.into_iter().find(|verb| verb.as_str() == s)
    }
}

/// A structured event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    /// Namespace (`pull`, `push`, ...).
    pub namespace: Namespace,
    /// Verb within the namespace.
    pub verb: Verb,
}

impl Topic {
    /// `pull.start`
    pub const PULL_START: Topic = Topic::new(Namespace::Pull, Verb::Start);
    /// `pull.ids_fetched`
    pub const PULL_IDS_FETCHED: Topic = Topic::new(Namespace::Pull, Verb::IdsFetched);
    /// `pull.fetch_detail.start`
    pub const PULL_FETCH_DETAIL_START: Topic = Topic::new(Namespace::Pull, Verb::FetchDetailStart);
    /// `pull.fetch_detail.success`
    pub const PULL_FETCH_DETAIL_SUCCESS: Topic =
        Topic::new(Namespace::Pull, Verb::FetchDetailSuccess);
    /// `pull.store.success`
    pub const PULL_STORE_SUCCESS: Topic = Topic::new(Namespace::Pull, Verb::StoreSuccess);
    /// `pull.error`
    pub const PULL_ERROR: Topic = Topic::new(Namespace::Pull, Verb::Error);
    /// `pull.complete`
    pub const PULL_COMPLETE: Topic = Topic::new(Namespace::Pull, Verb::Complete);
    /// `pull.group.start`
    pub const PULL_GROUP_START: Topic = Topic::new(Namespace::Pull, Verb::GroupStart);
    /// `pull.group.complete`
    pub const PULL_GROUP_COMPLETE: Topic = Topic::new(Namespace::Pull, Verb::GroupComplete);
    /// `pull.group.error`
    pub const PULL_GROUP_ERROR: Topic = Topic::new(Namespace::Pull, Verb::GroupError);
    /// `push.scan.start`
    pub const PUSH_SCAN_START: Topic = Topic::new(Namespace::Push, Verb::ScanStart);
    /// `push.scan.complete`
    pub const PUSH_SCAN_COMPLETE: Topic = Topic::new(Namespace::Push, Verb::ScanComplete);
    /// `push.item.start`
    pub const PUSH_ITEM_START: Topic = Topic::new(Namespace::Push, Verb::ItemStart);
    /// `push.item.success`
    pub const PUSH_ITEM_SUCCESS: Topic = Topic::new(Namespace::Push, Verb::ItemSuccess);
    /// `push.item.error`
    pub const PUSH_ITEM_ERROR: Topic = Topic::new(Namespace::Push, Verb::ItemError);
    /// `push.error`
    pub const PUSH_ERROR: Topic = Topic::new(Namespace::Push, Verb::Error);
    /// `push.complete`
    pub const PUSH_COMPLETE: Topic = Topic::new(Namespace::Push, Verb::Complete);
    /// `sync.history.updated`
    pub const SYNC_HISTORY_UPDATED: Topic = Topic::new(Namespace::Sync, Verb::HistoryUpdated);
    /// `log.message`
    pub const LOG_MESSAGE: Topic = Topic::new(Namespace::Log, Verb::Message);

    /// Creates a topic.
    pub const fn new(namespace: Namespace, verb: Verb) -> Self {
        Self { namespace, verb }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace.as_str(), self.verb.as_str())
    }
}

impl FromStr for Topic {
    type Err = EventError;

    fn from_str(s: &str) -> EventResult<Self> {
        let (namespace, verb) = s
            .split_once('.')
            .ok_or_else(|| EventError::InvalidTopic(s.to_string()))?;
        let namespace =
            Namespace::parse(namespace).ok_or_else(|| EventError::InvalidTopic(s.to_string()))?;
        let verb = Verb::parse(verb).ok_or_else(|| EventError::InvalidTopic(s.to_string()))?;
        Ok(Topic::new(namespace, verb))
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which topics a listener is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    /// Exactly one topic.
    Exact(Topic),
    /// Every topic in a namespace (`pull.*`).
    Namespace(Namespace),
    /// Every topic (`*`).
    Any,
}

impl TopicPattern {
    /// Returns true if `topic` is covered by this pattern.
    pub fn matches(&self, topic: &Topic) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Namespace(namespace) => *namespace == topic.namespace,
            TopicPattern::Any => true,
        }
    }
}

impl From<Topic> for TopicPattern {
    fn from(topic: Topic) -> Self {
        TopicPattern::Exact(topic)
    }
}

impl From<Namespace> for TopicPattern {
    fn from(namespace: Namespace) -> Self {
        TopicPattern::Namespace(namespace)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::Exact(topic) => topic.fmt(f),
            TopicPattern::Namespace(namespace) => write!(f, "{}.*", namespace.as_str()),
            TopicPattern::Any => f.write_str("*"),
        }
    }
}

impl FromStr for TopicPattern {
    type Err = EventError;

    /// Parses `*`, `<namespace>.*` or an exact topic.
    fn from_str(s: &str) -> EventResult<Self> {
        if s == "*" {
            return Ok(TopicPattern::Any);
        }
        if let Some(namespace) = s.strip_suffix(".*") {
            return Namespace::parse(namespace)
                .map(TopicPattern::Namespace)
                .ok_or_else(|| EventError::InvalidPattern(s.to_string()));
        }
        s.parse::<Topic>()
            .map(TopicPattern::Exact)
            .map_err(|_| EventError::InvalidPattern(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(Topic::PULL_GROUP_COMPLETE.to_string(), "pull.group.complete");
        assert_eq!(Topic::PULL_FETCH_DETAIL_START.to_string(), "pull.fetch_detail.start");
        assert_eq!(Topic::PUSH_SCAN_COMPLETE.to_string(), "push.scan.complete");
        assert_eq!(
            "pull.store.success".parse::<Topic>().unwrap(),
            Topic::PULL_STORE_SUCCESS
        );
        assert!("pull.teleport".parse::<Topic>().is_err());
        assert!("pull".parse::<Topic>().is_err());
    }

    #[test]
    fn namespace_pattern_matches_only_its_namespace() {
        let pattern: TopicPattern = "pull.*".parse().unwrap();
        assert!(pattern.matches(&Topic::PULL_START));
        assert!(pattern.matches(&Topic::PULL_IDS_FETCHED));
        assert!(pattern.matches(&Topic::PULL_GROUP_COMPLETE));
        assert!(!pattern.matches(&Topic::PUSH_COMPLETE));
        assert!(!pattern.matches(&Topic::SYNC_HISTORY_UPDATED));
    }

    #[test]
    fn exact_and_any_patterns() {
        let exact = TopicPattern::from(Topic::PUSH_ITEM_ERROR);
        assert!(exact.matches(&Topic::PUSH_ITEM_ERROR));
        assert!(!exact.matches(&Topic::PUSH_ITEM_SUCCESS));
        assert!(TopicPattern::Any.matches(&Topic::LOG_MESSAGE));
        assert_eq!("*".parse::<TopicPattern>().unwrap(), TopicPattern::Any);
        assert!("pullx.*".parse::<TopicPattern>().is_err());
    }

    #[test]
    fn pattern_display_round_trips() {
        for text in ["*", "push.*", "pull.group.error"] {
            let pattern: TopicPattern = text.parse().unwrap();
            assert_eq!(pattern.to_string(), text);
        }
    }
}
