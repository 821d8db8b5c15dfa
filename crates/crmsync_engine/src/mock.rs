//! An in-memory remote API for testing.

use crate::api::{ApiError, ApiResult, RemoteApi};
use async_trait::async_trait;
use crmsync_model::{Account, Checkin, EntityKind, FieldMap, Route, UserProfile};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One call made against [`MockRemoteApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    /// `list_account_ids`
    ListAccountIds,
    /// `get_account(id)`
    GetAccount(i64),
    /// `get_checkin(id)`
    GetCheckin(i64),
    /// `get_checkins_for_account(account_id)`
    GetCheckinsForAccount(i64),
    /// `list_routes`
    ListRoutes,
    /// `get_route(id)`
    GetRoute(i64),
    /// `get_profile`
    GetProfile,
    /// `create(kind, entity_id)`
    Create(EntityKind, i64),
    /// `update(kind, entity_id)`
    Update(EntityKind, i64),
    /// `delete(kind, entity_id)`
    Delete(EntityKind, i64),
}

impl ApiCall {
    /// Returns true for create/update/delete.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ApiCall::Create(..) | ApiCall::Update(..) | ApiCall::Delete(..)
        )
    }
}

/// A scriptable in-memory [`RemoteApi`].
///
/// Serves records from memory, records every call, can be told to fail
/// specific calls, and tracks the highest number of calls in flight at
/// once.
#[derive(Debug, Default)]
pub struct MockRemoteApi {
    accounts: RwLock<BTreeMap<i64, Account>>,
    checkins: RwLock<BTreeMap<i64, Vec<Checkin>>>,
    routes: RwLock<Vec<Route>>,
    profile: RwLock<Option<UserProfile>>,
    failures: Mutex<HashMap<ApiCall, ApiError>>,
    calls: Mutex<Vec<ApiCall>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockRemoteApi {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds accounts with the given ids and generated names.
    pub fn with_account_ids(self, ids: impl IntoIterator<Item = i64>) -> Self {
        for id in ids {
            self.add_account(Account {
                id,
                full_name: Some(format!("Account {id}")),
                ..Account::default()
            });
        }
        self
    }

    /// Adds check-ins for an account.
    pub fn with_checkins(self, account_id: i64, checkins: Vec<Checkin>) -> Self {
        self.checkins.write().insert(account_id, checkins);
        self
    }

    /// Sets the route list.
    pub fn with_routes(self, routes: Vec<Route>) -> Self {
        *self.routes.write() = routes;
        self
    }

    /// Sets the user profile.
    pub fn with_profile(self, profile: UserProfile) -> Self {
        *self.profile.write() = Some(profile);
        self
    }

    /// Delays every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds or replaces an account.
    pub fn add_account(&self, account: Account) {
        self.accounts.write().insert(account.id, account);
    }

    /// Makes `call` fail with `error`.
    pub fn fail(&self, call: ApiCall, error: ApiError) {
        self.failures.lock().insert(call, error);
    }

    /// Removes a scripted failure.
    pub fn clear_failure(&self, call: ApiCall) {
        self.failures.lock().remove(&call);
    }

    /// Returns every call made, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Returns the create/update/delete calls made, in order.
    pub fn mutation_calls(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .iter()
            .copied()
            .filter(ApiCall::is_mutation)
            .collect()
    }

    /// Returns the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the highest number of calls that were in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: ApiCall) -> ApiResult<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().get(&call).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }

    fn echo(kind: EntityKind, entity_id: i64, fields: &FieldMap) -> serde_json::Value {
        let mut record: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        record.insert("id".into(), entity_id.into());
        record.insert("kind".into(), kind.as_str().into());
        serde_json::Value::Object(record)
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn list_account_ids(&self) -> ApiResult<Vec<i64>> {
        let _guard = self.enter(ApiCall::ListAccountIds).await?;
        Ok(self.accounts.read().keys().copied().collect())
    }

    async fn get_account(&self, id: i64) -> ApiResult<Account> {
        let _guard = self.enter(ApiCall::GetAccount(id)).await?;
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(ApiError::NotFound { what: "account", id })
    }

    async fn get_checkin(&self, id: i64) -> ApiResult<Checkin> {
        let _guard = self.enter(ApiCall::GetCheckin(id)).await?;
        self.checkins
            .read()
            .values()
            .flatten()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ApiError::NotFound {
                what: "check-in",
                id,
            })
    }

    async fn get_checkins_for_account(&self, account_id: i64) -> ApiResult<Vec<Checkin>> {
        let _guard = self
            .enter(ApiCall::GetCheckinsForAccount(account_id))
            .await?;
        Ok(self
            .checkins
            .read()
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_routes(&self) -> ApiResult<Vec<Route>> {
        let _guard = self.enter(ApiCall::ListRoutes).await?;
        Ok(self.routes.read().clone())
    }

    async fn get_route(&self, id: i64) -> ApiResult<Route> {
        let _guard = self.enter(ApiCall::GetRoute(id)).await?;
        self.routes
            .read()
            .iter()
            .find(|r| r.id == Some(id))
            .cloned()
            .ok_or(ApiError::NotFound { what: "route", id })
    }

    async fn get_profile(&self) -> ApiResult<UserProfile> {
        let _guard = self.enter(ApiCall::GetProfile).await?;
        self.profile
            .read()
            .clone()
            .ok_or(ApiError::NotFound {
                what: "profile",
                id: 0,
            })
    }

    async fn create(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value> {
        let _guard = self.enter(ApiCall::Create(kind, entity_id)).await?;
        Ok(Self::echo(kind, entity_id, fields))
    }

    async fn update(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value> {
        let _guard = self.enter(ApiCall::Update(kind, entity_id)).await?;
        Ok(Self::echo(kind, entity_id, fields))
    }

    async fn delete(
        &self,
        kind: EntityKind,
        entity_id: i64,
        fields: &FieldMap,
    ) -> ApiResult<serde_json::Value> {
        let _guard = self.enter(ApiCall::Delete(kind, entity_id)).await?;
        Ok(Self::echo(kind, entity_id, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_and_records() {
        let api = MockRemoteApi::new().with_account_ids([3, 1, 2]);
        assert_eq!(api.list_account_ids().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(
            api.get_account(2).await.unwrap().full_name.as_deref(),
            Some("Account 2")
        );
        assert!(matches!(
            api.get_account(9).await,
            Err(ApiError::NotFound { id: 9, .. })
        ));
        assert_eq!(api.call_count(), 3);
        assert!(api.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn scripted_failure() {
        let api = MockRemoteApi::new().with_account_ids([1]);
        api.fail(ApiCall::GetAccount(1), ApiError::Transport("reset".into()));
        assert_eq!(
            api.get_account(1).await.unwrap_err(),
            ApiError::Transport("reset".into())
        );
        api.clear_failure(ApiCall::GetAccount(1));
        assert!(api.get_account(1).await.is_ok());
    }

    #[tokio::test]
    async fn mutations_echo_fields() {
        let api = MockRemoteApi::new();
        let mut fields = FieldMap::new();
        fields.insert("last_name".into(), "Smith".into());
        let record = api.update(EntityKind::Accounts, 7, &fields).await.unwrap();
        assert_eq!(record["id"], 7);
        assert_eq!(record["last_name"], "Smith");
        assert_eq!(
            api.mutation_calls(),
            vec![ApiCall::Update(EntityKind::Accounts, 7)]
        );
    }
}
