//! # crmsync store
//!
//! Persistence collaborators of the crmsync engine.
//!
//! The engine talks to the local database through three narrow traits:
//! - [`CommandExecutor`]: runs dialect-independent named commands
//! - [`PendingChangeStore`]: reads and advances the pending-change queue
//! - [`SyncHistoryStore`]: persists sync history entries
//!
//! In-memory implementations ([`RecordingExecutor`], [`MemoryPendingStore`],
//! [`MemoryHistoryStore`]) are provided for testing and embedding.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod error;
mod history;
mod pending;
mod value;

pub use command::{verify_commands, CommandCall, CommandExecutor, Dialect, RecordingExecutor};
pub use error::{StoreError, StoreResult};
pub use history::{HistoryCompletion, MemoryHistoryStore, SyncHistoryStore};
pub use pending::{MemoryPendingStore, PendingChangeStore};
pub use value::SqlValue;
