//! # crmsync model
//!
//! Data types shared by every layer of the crmsync engine.
//!
//! This crate provides:
//! - [`ResourceKind`] / [`EntityKind`] for naming what is being synced
//! - Remote records ([`Account`], [`Checkin`], [`Route`], [`UserProfile`])
//! - [`PendingChange`] with its forward-only [`ChangeStatus`] lifecycle
//! - [`PendingFilter`] for the filtered/sorted pending-change listing
//! - [`SyncHistoryEntry`] for the persisted audit trail of pull/push runs
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod filter;
mod history;
mod record;
mod resource;

pub use change::{ChangeStatus, ChangeType, FieldMap, PendingChange};
pub use error::{ModelError, ModelResult};
pub use filter::{OrderBy, OrderField, PendingFilter};
pub use history::{Direction, HistoryStatus, SyncHistoryEntry};
pub use record::{Account, Checkin, Company, DataField, DataFieldValue, Route, UserProfile};
pub use resource::{EntityKind, ResourceKind};
