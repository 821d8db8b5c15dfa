//! Filtering and ordering of pending changes.

use crate::change::{ChangeStatus, ChangeType, PendingChange};
use crate::error::{ModelError, ModelResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Field a pending-change listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    /// Creation time.
    Date,
    /// Lifecycle status.
    Status,
    /// Change type.
    Type,
    /// Owning account id.
    Account,
}

/// Ordering of a pending-change listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to order by.
    pub field: OrderField,
    /// Whether the order is descending.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: OrderField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: OrderField) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    fn compare(&self, a: &PendingChange, b: &PendingChange) -> Ordering {
        let ordering = match self.field {
            OrderField::Date => a.created_at.cmp(&b.created_at),
            OrderField::Status => a.status.as_str().cmp(b.status.as_str()),
            OrderField::Type => a.change_type.as_str().cmp(b.change_type.as_str()),
            OrderField::Account => a.account_id.cmp(&b.account_id),
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl FromStr for OrderBy {
    type Err = ModelError;

    /// Parses `date`, `date_desc`, `status`, `type_asc`, `account_desc`, ...
    fn from_str(s: &str) -> ModelResult<Self> {
        let lowered = s.to_ascii_lowercase();
        let (field, direction) = match lowered.split_once('_') {
            Some((field, direction)) => (field, Some(direction)),
            None => (lowered.as_str(), None),
        };

        let field = match field {
            "date" => OrderField::Date,
            "status" => OrderField::Status,
            "type" => OrderField::Type,
            "account" => OrderField::Account,
            _ => return Err(ModelError::UnknownOrder(s.to_string())),
        };

        match direction {
            None | Some("asc") => Ok(OrderBy::asc(field)),
            Some("desc") => Ok(OrderBy::desc(field)),
            Some(_) => Err(ModelError::UnknownOrder(s.to_string())),
        }
    }
}

/// Criteria for listing pending changes.
///
/// Every criterion is optional; an empty filter keeps all rows in storage
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingFilter {
    /// Keep only changes with this status.
    pub status: Option<ChangeStatus>,
    /// Keep only changes of this type.
    pub change_type: Option<ChangeType>,
    /// Keep only changes created on this (UTC) day.
    pub date: Option<NaiveDate>,
    /// Keep only changes for this entity.
    pub entity_id: Option<i64>,
    /// Keep only changes belonging to this account.
    pub account_id: Option<i64>,
    /// Ordering applied after filtering.
    pub order_by: Option<OrderBy>,
}

impl PendingFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// The filter the push path reads with: `pending` rows, oldest first.
    pub fn pending() -> Self {
        Self::new()
            .with_status(ChangeStatus::Pending)
            .with_order(OrderBy::asc(OrderField::Date))
    }

    /// Filters by status.
    pub fn with_status(mut self, status: ChangeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by change type.
    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    /// Filters by creation day.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Filters by creation day given as `YYYY-MM-DD`.
    pub fn with_date_str(self, date: &str) -> ModelResult<Self> {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ModelError::InvalidDate(date.to_string()))?;
        Ok(self.with_date(parsed))
    }

    /// Filters by entity id.
    pub fn with_entity(mut self, entity_id: i64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Filters by owning account id.
    pub fn with_account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Sets the ordering.
    pub fn with_order(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    /// Returns true if `change` satisfies every criterion.
    pub fn matches(&self, change: &PendingChange) -> bool {
        if self.status.is_some_and(|status| status != change.status) {
            return false;
        }
        if self
            .change_type
            .is_some_and(|change_type| change_type != change.change_type)
        {
            return false;
        }
        if self
            .date
            .is_some_and(|date| date != change.created_at.date_naive())
        {
            return false;
        }
        if self.entity_id.is_some_and(|id| id != change.entity_id) {
            return false;
        }
        if self.account_id.is_some_and(|id| id != change.account_id) {
            return false;
        }
        true
    }

    /// Filters and orders `changes`.
    ///
    /// Ordering is stable, so rows that compare equal keep storage order.
    pub fn apply(&self, changes: Vec<PendingChange>) -> Vec<PendingChange> {
        let mut filtered: Vec<PendingChange> =
            changes.into_iter().filter(|c| self.matches(c)).collect();
        if let Some(order_by) = self.order_by {
            filtered.sort_by(|a, b| order_by.compare(a, b));
        }
        filtered
    }
}
