//! # crmsync events
//!
//! Topic-based event bus for the crmsync engine.
//!
//! This crate provides:
//! - Structured topics (`namespace.verb`) and topic patterns
//! - Typed event payloads, one shape per topic
//! - An [`EventBus`] that dispatches to each subscriber on a bounded
//!   worker pool, isolates listener panics and can be drained
//! - A [`LogListener`] that renders events as `tracing` records
//!
//! The bus holds no business state. Pull/push orchestration publishes to it
//! and everything else (progress output, sync history) subscribes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod error;
mod event;
mod log_listener;
mod topic;

pub use bus::{EventBus, FnListener, Listener, SubscriptionId, DEFAULT_LISTENER_WORKERS};
pub use error::{EventError, EventResult};
pub use event::{Event, EventPayload, LogLevel};
pub use log_listener::LogListener;
pub use topic::{Namespace, Topic, TopicPattern, Verb};
