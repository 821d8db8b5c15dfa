//! # crmsync engine
//!
//! Bidirectional sync between a remote CRM API and a local database.
//!
//! This crate provides:
//! - [`Orchestrator`]: bounded-concurrency pulls and sequential pushes
//! - [`HistoryTracker`]: turns bus traffic into persisted sync history
//! - [`SyncRuntime`]: wires the bus, orchestrator and tracker together
//! - [`RemoteApi`] and [`MockRemoteApi`] for the remote side
//!
//! ## Architecture
//!
//! The orchestrator never talks to the tracker directly. Every step of a
//! pull or push is published on the [`EventBus`](crmsync_events::EventBus),
//! and the tracker, the log listener and any UI subscriber observe the same
//! stream:
//!
//! ```text
//! RemoteApi ──► Orchestrator ──► CommandExecutor / PendingChangeStore
//!                    │
//!                    ▼ publish
//!                EventBus ──► HistoryTracker ──► SyncHistoryStore
//!                    └──────► LogListener, UI subscribers
//! ```
//!
//! ## Key Invariants
//!
//! - At most `concurrency` pull units run at once
//! - A pending change only moves forward: pending, processing, then
//!   completed or failed
//! - A malformed change never reaches the remote API
//! - History failures never fail a sync

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
pub mod commands;
mod config;
mod error;
mod history;
mod mock;
mod orchestrator;
mod pull;
mod push;
mod runtime;

pub use api::{ApiError, ApiResult, RemoteApi};
pub use config::{ConfigError, SyncConfig, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use error::{SyncError, SyncResult};
pub use history::HistoryTracker;
pub use mock::{ApiCall, MockRemoteApi};
pub use orchestrator::{CancelPolicy, GroupReport, Orchestrator, PushReport};
pub use runtime::SyncRuntime;
