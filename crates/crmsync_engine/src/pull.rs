//! Remote-to-local pulls.

use crate::api::ApiError;
use crate::commands::{
    account_args, checkin_args, data_set_args, data_set_value_args, profile_args,
    profile_configuration, route_args, DELETE_DATA_SETS, DELETE_DATA_SET_VALUES,
    INSERT_DATA_SETS, INSERT_DATA_SET_VALUES, MERGE_ACCOUNTS_DETAILED, MERGE_ACCOUNT_CHECKINS,
    MERGE_ROUTES, MERGE_USER_PROFILES, UPDATE_CONFIGURATION,
};
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{CancelPolicy, GroupReport, Orchestrator};
use crmsync_events::{EventPayload, Topic};
use crmsync_model::{Account, Checkin, ResourceKind, Route, UserProfile};
use crmsync_store::SqlValue;
use std::future::Future;

impl Orchestrator {
    /// Pulls every account, or the first `top` account ids when given.
    ///
    /// Every account is attempted even if earlier ones fail.
    pub async fn pull_accounts(&self, top: Option<usize>) -> SyncResult<GroupReport> {
        let api = self.api.clone();
        let resolve = async move {
            let mut ids = api.list_account_ids().await?;
            if let Some(top) = top {
                ids.truncate(top);
            }
            Ok::<_, ApiError>(ids)
        };
        self.pull_group(
            ResourceKind::Accounts,
            CancelPolicy::ContinueOnError,
            resolve,
            Orchestrator::account_unit,
        )
        .await
    }

    /// Pulls the check-ins of every account.
    ///
    /// One unit per account. The first failing account stops accounts that
    /// have not started yet; check-ins already stored are kept.
    pub async fn pull_checkins(&self) -> SyncResult<GroupReport> {
        let api = self.api.clone();
        self.pull_group(
            ResourceKind::Checkins,
            CancelPolicy::CancelOnFirstError,
            async move { api.list_account_ids().await },
            Orchestrator::account_checkins_unit,
        )
        .await
    }

    /// Pulls every route. Routes without an id are skipped.
    pub async fn pull_routes(&self) -> SyncResult<GroupReport> {
        let api = self.api.clone();
        let resolve = async move {
            let routes = api.list_routes().await?;
            let total = routes.len();
            let routes: Vec<(i64, Route)> = routes
                .into_iter()
                .filter_map(|route| route.id.map(|id| (id, route)))
                .collect();
            if routes.len() < total {
                tracing::debug!(skipped = total - routes.len(), "routes without id skipped");
            }
            Ok::<_, ApiError>(routes)
        };
        self.pull_group(
            ResourceKind::Routes,
            CancelPolicy::ContinueOnError,
            resolve,
            Orchestrator::route_unit,
        )
        .await
    }

    /// Pulls accounts, then check-ins, then routes, stopping at the first
    /// group that fails.
    pub async fn pull_all(&self, top: Option<usize>) -> SyncResult<Vec<GroupReport>> {
        Ok(vec![
            self.pull_accounts(top).await?,
            self.pull_checkins().await?,
            self.pull_routes().await?,
        ])
    }

    /// Pulls and stores one account.
    pub async fn pull_account(&self, id: i64) -> SyncResult<Account> {
        self.pull_single(ResourceKind::Accounts, Some(id), async {
            let account = self.api.get_account(id).await?;
            self.executor
                .run(MERGE_ACCOUNTS_DETAILED, account_args(&account))
                .await?;
            Ok::<_, SyncError>((account, 1))
        })
        .await
    }

    /// Pulls and stores one check-in.
    pub async fn pull_checkin(&self, id: i64) -> SyncResult<Checkin> {
        self.pull_single(ResourceKind::Checkins, Some(id), async {
            let checkin = self.api.get_checkin(id).await?;
            self.executor
                .run(MERGE_ACCOUNT_CHECKINS, checkin_args(&checkin))
                .await?;
            Ok::<_, SyncError>((checkin, 1))
        })
        .await
    }

    /// Pulls and stores every check-in of one account.
    pub async fn pull_checkins_for_account(&self, account_id: i64) -> SyncResult<Vec<Checkin>> {
        self.pull_single(ResourceKind::Checkins, Some(account_id), async {
            let checkins = self.api.get_checkins_for_account(account_id).await?;
            for checkin in &checkins {
                self.executor
                    .run(MERGE_ACCOUNT_CHECKINS, checkin_args(checkin))
                    .await?;
            }
            let count = checkins.len() as u64;
            Ok::<_, SyncError>((checkins, count))
        })
        .await
    }

    /// Pulls and stores one route.
    pub async fn pull_route(&self, id: i64) -> SyncResult<Route> {
        self.pull_single(ResourceKind::Routes, Some(id), async {
            let route = self.api.get_route(id).await?;
            self.executor.run(MERGE_ROUTES, route_args(id, &route)).await?;
            Ok::<_, SyncError>((route, 1))
        })
        .await
    }

    /// Pulls the user profile, stores it, records its identity in the
    /// configuration table and replaces its data fields.
    pub async fn pull_profile(&self) -> SyncResult<UserProfile> {
        self.pull_single(ResourceKind::UserProfile, None, async {
            let profile = self.api.get_profile().await?;
            self.store_profile(&profile).await?;
            tracing::info!(email = ?profile.email, "user profile pulled");
            Ok::<_, SyncError>((profile, 1))
        })
        .await
    }

    async fn store_profile(&self, profile: &UserProfile) -> SyncResult<()> {
        self.executor
            .run(MERGE_USER_PROFILES, profile_args(profile))
            .await?;
        for (key, value) in profile_configuration(profile) {
            self.executor
                .run(UPDATE_CONFIGURATION, vec![key.into(), value.into()])
                .await?;
        }

        let profile_id = SqlValue::Int(profile.id);
        self.executor
            .run(DELETE_DATA_SET_VALUES, vec![profile_id.clone()])
            .await?;
        self.executor
            .run(DELETE_DATA_SETS, vec![profile_id])
            .await?;
        for field in &profile.datafields {
            self.executor
                .run(INSERT_DATA_SETS, data_set_args(profile.id, field))
                .await?;
            for value in &field.values {
                self.executor
                    .run(
                        INSERT_DATA_SET_VALUES,
                        data_set_value_args(profile.id, field, value),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Wraps a single-resource pull in `pull.start` and `pull.complete`.
    async fn pull_single<V, Fut>(
        &self,
        source: ResourceKind,
        resource_id: Option<i64>,
        work: Fut,
    ) -> SyncResult<V>
    where
        Fut: Future<Output = SyncResult<(V, u64)>>,
    {
        self.ensure_running()?;
        self.emit(
            Topic::PULL_START,
            source,
            EventPayload::ResourceStart { resource_id },
        );

        match work.await {
            Ok((value, count)) => {
                self.emit(
                    Topic::PULL_COMPLETE,
                    source,
                    EventPayload::Completion {
                        success: true,
                        count,
                        error: None,
                        resource_id,
                    },
                );
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%source, resource_id = ?resource_id, error = %message, "pull failed");
                self.emit(
                    Topic::PULL_ERROR,
                    source,
                    EventPayload::Error {
                        message: message.clone(),
                        resource_id,
                    },
                );
                self.emit(
                    Topic::PULL_COMPLETE,
                    source,
                    EventPayload::Completion {
                        success: false,
                        count: 0,
                        error: Some(message),
                        resource_id,
                    },
                );
                Err(err)
            }
        }
    }

    async fn account_unit(self, id: i64) -> Result<(), String> {
        let source = ResourceKind::Accounts;
        self.emit(
            Topic::PULL_FETCH_DETAIL_START,
            source,
            EventPayload::Item { resource_id: id },
        );
        let account = match self.api.get_account(id).await {
            Ok(account) => account,
            Err(err) => {
                return Err(self.item_error(source, id, format!("error fetching account {id}: {err}")))
            }
        };
        let label = account.label();
        self.emit(
            Topic::PULL_FETCH_DETAIL_SUCCESS,
            source,
            EventPayload::Record {
                resource_id: id,
                label: label.clone(),
            },
        );

        if let Err(err) = self
            .executor
            .run(MERGE_ACCOUNTS_DETAILED, account_args(&account))
            .await
        {
            return Err(self.item_error(source, id, format!("error storing account {id}: {err}")));
        }
        self.emit(
            Topic::PULL_STORE_SUCCESS,
            source,
            EventPayload::Record {
                resource_id: id,
                label,
            },
        );
        Ok(())
    }

    async fn account_checkins_unit(self, account_id: i64) -> Result<(), String> {
        let source = ResourceKind::Checkins;
        self.emit(
            Topic::PULL_FETCH_DETAIL_START,
            source,
            EventPayload::Item {
                resource_id: account_id,
            },
        );
        let checkins = match self.api.get_checkins_for_account(account_id).await {
            Ok(checkins) => checkins,
            Err(err) => {
                return Err(self.item_error(
                    source,
                    account_id,
                    format!("error getting checkins for account {account_id}: {err}"),
                ))
            }
        };
        self.emit(
            Topic::PULL_FETCH_DETAIL_SUCCESS,
            source,
            EventPayload::Record {
                resource_id: account_id,
                label: format!("{} check-ins for account {account_id}", checkins.len()),
            },
        );

        let mut failures = Vec::new();
        for checkin in &checkins {
            match self
                .executor
                .run(MERGE_ACCOUNT_CHECKINS, checkin_args(checkin))
                .await
            {
                Ok(()) => self.emit(
                    Topic::PULL_STORE_SUCCESS,
                    source,
                    EventPayload::Record {
                        resource_id: checkin.id,
                        label: checkin.label(),
                    },
                ),
                Err(err) => failures.push(self.item_error(
                    source,
                    checkin.id,
                    format!("error storing checkin {}: {err}", checkin.id),
                )),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }

    async fn route_unit(self, (id, route): (i64, Route)) -> Result<(), String> {
        let source = ResourceKind::Routes;
        let label = route.label();
        // The list already carries full routes, so the fetch step is a no-op.
        self.emit(
            Topic::PULL_FETCH_DETAIL_START,
            source,
            EventPayload::Item { resource_id: id },
        );
        self.emit(
            Topic::PULL_FETCH_DETAIL_SUCCESS,
            source,
            EventPayload::Record {
                resource_id: id,
                label: label.clone(),
            },
        );

        if let Err(err) = self.executor.run(MERGE_ROUTES, route_args(id, &route)).await {
            return Err(self.item_error(source, id, format!("error storing route {id}: {err}")));
        }
        self.emit(
            Topic::PULL_STORE_SUCCESS,
            source,
            EventPayload::Record {
                resource_id: id,
                label,
            },
        );
        Ok(())
    }
}
