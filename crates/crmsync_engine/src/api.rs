//! Remote API abstraction.

use async_trait::async_trait;
use crmsync_model::{Account, Checkin, EntityKind, FieldMap, Route, UserProfile};
use thiserror::Error;

/// Result type for remote API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the remote API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The requested record does not exist.
    #[error("{what} {id} not found")]
    NotFound {
        /// Kind of record.
        what: &'static str,
        /// Requested id.
        id: i64,
    },

    /// The request did not complete (network, timeout, 5xx).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote rejected the request (4xx, field validation).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ApiError {
    /// Returns the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "not_found",
            ApiError::Transport(_) => "transport",
            ApiError::Validation(_) => "validation",
        }
    }
}

/// The remote CRM API.
///
/// Retries and timeouts, if any, belong to the implementation.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Lists the ids of every account visible to the user.
    async fn list_account_ids(&self) -> ApiResult<Vec<i64>>;

    /// Fetches one account.
    async fn get_account(&self, id: i64) -> ApiResult<Account>;

    /// Fetches one check-in.
    async fn get_checkin(&self, id: i64) -> ApiResult<Checkin>;

    /// Fetches every check-in of one account.
    async fn get_checkins_for_account(&self, account_id: i64) -> ApiResult<Vec<Checkin>>;

    /// Lists every route.
    async fn list_routes(&self) -> ApiResult<Vec<Route>>;

    /// Fetches one route.
    async fn get_route(&self, id: i64) -> ApiResult<Route>;

    /// Fetches the authenticated user's profile.
    async fn get_profile(&self) -> ApiResult<UserProfile>;

    /// Creates an entity from `fields`. Returns the created record.
    async fn create(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value>;

    /// Updates an entity with `fields`. Returns the updated record.
    async fn update(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value>;

    /// Deletes an entity.
    async fn delete(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let not_found = ApiError::NotFound {
            what: "account",
            id: 4,
        };
        assert_eq!(not_found.to_string(), "account 4 not found");
        assert_eq!(not_found.category(), "not_found");
        assert_eq!(ApiError::Transport("x".into()).category(), "transport");
        assert_eq!(ApiError::Validation("x".into()).category(), "validation");
    }
}
