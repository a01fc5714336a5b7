//! Control-plane client implementations for amlinfra.
//!
//! This crate provides concrete implementations of the `MlClient` trait.
//!
//! # Clients
//!
//! - **Mock**: in-memory workspace for testing and dry runs
//! - **Azure**: Azure Machine Learning over the Resource Manager REST API

pub mod azure;
pub mod credential;
pub mod upload;
mod wire;

use amlinfra_abstraction::{
    AmlCompute, ApiError, ApiResult, DataAsset, Environment, MlClient, Workspace, WorkspaceScope,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub use azure::{AzureMlClient, ClientOptions, DEFAULT_API_VERSION, DEFAULT_BASE_URL};
pub use credential::{
    AccessToken, AzureCliCredential, ClientSecretCredential, DefaultAzureCredential,
    MANAGEMENT_SCOPE, StaticTokenCredential, TokenCredential,
};
pub use upload::is_remote_uri;

/// Number of calls a [`MockMlClient`] has served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub list_workspaces: usize,
    pub get_data: usize,
    pub create_data: usize,
    pub get_compute: usize,
    pub create_compute: usize,
    pub get_environment: usize,
    pub create_environment: usize,
}

impl MockCalls {
    /// Total remote writes.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.create_data + self.create_compute + self.create_environment
    }
}

#[derive(Debug, Default)]
struct MockState {
    workspaces: Vec<Workspace>,
    data: HashMap<(String, String), DataAsset>,
    computes: HashMap<String, AmlCompute>,
    environments: HashMap<(String, String), Environment>,
    list_error: Option<ApiError>,
    lookup_error: Option<ApiError>,
    create_error: Option<ApiError>,
    calls: MockCalls,
}

/// An in-memory implementation of the `MlClient` trait.
///
/// Lookups consult in-memory tables, creations insert into them, and every
/// call is counted. Failures can be scripted per call family.
#[derive(Debug, Default)]
pub struct MockMlClient {
    scope: WorkspaceScope,
    state: Mutex<MockState>,
}

impl MockMlClient {
    /// Creates an empty workspace that lists itself as the only accessible workspace.
    #[must_use]
    pub fn new(scope: WorkspaceScope) -> Self {
        let workspace =
            Workspace { name: scope.workspace_name.clone(), id: None, location: Some("westeurope".to_string()) };
        Self {
            scope,
            state: Mutex::new(MockState { workspaces: vec![workspace], ..MockState::default() }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the workspaces returned by `list_workspaces`.
    #[must_use]
    pub fn with_workspaces(self, workspaces: Vec<Workspace>) -> Self {
        self.state().workspaces = workspaces;
        self
    }

    /// Seeds an existing data asset.
    #[must_use]
    pub fn with_data(self, asset: DataAsset) -> Self {
        self.state().data.insert((asset.name.clone(), asset.version.clone()), asset);
        self
    }

    /// Seeds an existing compute cluster.
    #[must_use]
    pub fn with_compute(self, compute: AmlCompute) -> Self {
        self.state().computes.insert(compute.name.clone(), compute);
        self
    }

    /// Seeds an existing environment.
    #[must_use]
    pub fn with_environment(self, environment: Environment) -> Self {
        self.state()
            .environments
            .insert((environment.name.clone(), environment.version.clone()), environment);
        self
    }

    /// Makes `list_workspaces` fail with `error`.
    pub fn fail_list_workspaces(&self, error: ApiError) {
        self.state().list_error = Some(error);
    }

    /// Makes every `get_*` lookup fail with `error`.
    pub fn fail_lookups(&self, error: ApiError) {
        self.state().lookup_error = Some(error);
    }

    /// Makes every create call fail with `error`.
    pub fn fail_creates(&self, error: ApiError) {
        self.state().create_error = Some(error);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn calls(&self) -> MockCalls {
        self.state().calls
    }

    /// The compute currently stored under `name`.
    #[must_use]
    pub fn compute(&self, name: &str) -> Option<AmlCompute> {
        self.state().computes.get(name).cloned()
    }
}

#[async_trait]
impl MlClient for MockMlClient {
    fn scope(&self) -> &WorkspaceScope {
        &self.scope
    }

    async fn list_workspaces(&self) -> ApiResult<Vec<Workspace>> {
        let mut state = self.state();
        state.calls.list_workspaces += 1;
        match state.list_error.clone() {
            Some(err) => Err(err),
            None => Ok(state.workspaces.clone()),
        }
    }

    async fn get_data(&self, name: &str, version: &str) -> ApiResult<Option<DataAsset>> {
        let mut state = self.state();
        state.calls.get_data += 1;
        if let Some(err) = state.lookup_error.clone() {
            return Err(err);
        }
        Ok(state.data.get(&(name.to_string(), version.to_string())).cloned())
    }

    async fn create_or_update_data(&self, data: &DataAsset) -> ApiResult<DataAsset> {
        let mut state = self.state();
        state.calls.create_data += 1;
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        debug!(name = %data.name, version = %data.version, "MockMlClient registering data");
        state.data.insert((data.name.clone(), data.version.clone()), data.clone());
        Ok(data.clone())
    }

    async fn get_compute(&self, name: &str) -> ApiResult<Option<AmlCompute>> {
        let mut state = self.state();
        state.calls.get_compute += 1;
        if let Some(err) = state.lookup_error.clone() {
            return Err(err);
        }
        Ok(state.computes.get(name).cloned())
    }

    async fn begin_create_or_update_compute(&self, compute: &AmlCompute) -> ApiResult<()> {
        let mut state = self.state();
        state.calls.create_compute += 1;
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        debug!(name = %compute.name, "MockMlClient accepting compute");
        let mut stored = compute.clone();
        stored.provisioning_state = Some("Creating".to_string());
        state.computes.insert(compute.name.clone(), stored);
        Ok(())
    }

    async fn get_environment(&self, name: &str, version: &str) -> ApiResult<Option<Environment>> {
        let mut state = self.state();
        state.calls.get_environment += 1;
        if let Some(err) = state.lookup_error.clone() {
            return Err(err);
        }
        Ok(state.environments.get(&(name.to_string(), version.to_string())).cloned())
    }

    async fn create_or_update_environment(
        &self,
        environment: &Environment,
    ) -> ApiResult<Environment> {
        let mut state = self.state();
        state.calls.create_environment += 1;
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        debug!(name = %environment.name, version = %environment.version, "MockMlClient registering environment");
        state.environments.insert(
            (environment.name.clone(), environment.version.clone()),
            environment.clone(),
        );
        Ok(environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amlinfra_abstraction::{AssetType, ComputeTier};

    fn asset() -> DataAsset {
        DataAsset {
            name: "ds1".to_string(),
            version: "1".to_string(),
            description: "d".to_string(),
            path: "/data/a.csv".to_string(),
            asset_type: AssetType::UriFile,
        }
    }

    #[tokio::test]
    async fn test_mock_lists_own_workspace() {
        let client = MockMlClient::new(WorkspaceScope::new("s", "rg", "ws"));
        let workspaces = client.list_workspaces().await.unwrap();
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].name, "ws");
        assert_eq!(client.calls().list_workspaces, 1);
    }

    #[tokio::test]
    async fn test_mock_data_round_trip_counts_calls() {
        let client = MockMlClient::new(WorkspaceScope::default());
        assert!(client.get_data("ds1", "1").await.unwrap().is_none());

        client.create_or_update_data(&asset()).await.unwrap();
        let found = client.get_data("ds1", "1").await.unwrap();

        assert_eq!(found, Some(asset()));
        assert_eq!(client.calls().get_data, 2);
        assert_eq!(client.calls().create_data, 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_lookup_failure() {
        let client = MockMlClient::new(WorkspaceScope::default()).with_data(asset());
        client.fail_lookups(ApiError::Status { status: 429, message: "throttled".to_string() });

        let err = client.get_data("ds1", "1").await.unwrap_err();
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_mock_compute_marked_creating() {
        let client = MockMlClient::new(WorkspaceScope::default());
        let compute = AmlCompute {
            name: "cpu".to_string(),
            compute_type: "amlcompute".to_string(),
            size: "STANDARD_DS3_V2".to_string(),
            min_instances: 0,
            max_instances: 2,
            idle_time_before_scale_down: 120,
            tier: ComputeTier::Dedicated,
            provisioning_state: None,
        };

        client.begin_create_or_update_compute(&compute).await.unwrap();

        let stored = client.compute("cpu").unwrap();
        assert_eq!(stored.provisioning_state.as_deref(), Some("Creating"));
        assert_eq!(client.calls().writes(), 1);
    }
}
