//! Azure Machine Learning control-plane client.
//!
//! This module provides an implementation of the `MlClient` trait over the
//! Azure Resource Manager REST API.

use crate::credential::{AccessToken, DefaultAzureCredential, MANAGEMENT_SCOPE, TokenCredential};
use crate::upload::{BlobUploader, is_remote_uri};
use crate::wire::{
    ComputeResource, DataVersionResource, EnvironmentVersionResource, PendingUploadRequest,
    PendingUploadResponse, WorkspaceList, WorkspaceResource,
};
use amlinfra_abstraction::{
    AmlCompute, ApiError, ApiResult, DataAsset, Environment, MlClient, Workspace, WorkspaceScope,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, warn};

/// Public Azure Resource Manager endpoint.
pub const DEFAULT_BASE_URL: &str = "https://management.azure.com";

/// Workspace API version used for every call.
pub const DEFAULT_API_VERSION: &str = "2023-04-01";

/// Upper bound on `nextLink` pages followed by a single listing.
const MAX_LIST_PAGES: usize = 100;

/// Transport options for [`AzureMlClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Resource Manager endpoint.
    pub base_url: String,
    /// `api-version` query parameter.
    pub api_version: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Azure Machine Learning client bound to one workspace.
pub struct AzureMlClient {
    /// The workspace every request targets.
    scope: WorkspaceScope,
    /// Endpoint and API version.
    options: ClientOptions,
    /// HTTP client for making requests.
    client: Client,
    /// Source of bearer tokens.
    credential: Arc<dyn TokenCredential>,
    /// Token reused until it nears expiry.
    token: Mutex<Option<AccessToken>>,
    /// Region of the bound workspace, needed when creating computes.
    location: OnceCell<Option<String>>,
}

impl fmt::Debug for AzureMlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureMlClient")
            .field("scope", &self.scope)
            .field("options", &self.options)
            .field("credential", &self.credential.name())
            .finish_non_exhaustive()
    }
}

impl AzureMlClient {
    /// Creates a client authenticated with `DefaultAzureCredential`.
    ///
    /// # Errors
    /// Returns an `ApiError` if the HTTP client cannot be created.
    pub fn new(scope: WorkspaceScope) -> ApiResult<Self> {
        Self::with_credential(scope, Arc::new(DefaultAzureCredential::new()), ClientOptions::default())
    }

    /// Creates a client with an explicit credential and transport options.
    ///
    /// # Errors
    /// Returns an `ApiError` if the HTTP client cannot be created.
    pub fn with_credential(
        scope: WorkspaceScope,
        credential: Arc<dyn TokenCredential>,
        options: ClientOptions,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| ApiError::RequestError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            scope,
            options,
            client,
            credential,
            token: Mutex::new(None),
            location: OnceCell::new(),
        })
    }

    fn workspaces_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces",
            self.options.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.scope.subscription_id),
            urlencoding::encode(&self.scope.resource_group_name),
        )
    }

    fn workspace_url(&self) -> String {
        format!("{}/{}", self.workspaces_url(), urlencoding::encode(&self.scope.workspace_name))
    }

    fn data_version_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/data/{}/versions/{}",
            self.workspace_url(),
            urlencoding::encode(name),
            urlencoding::encode(version)
        )
    }

    fn code_version_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/codes/{}/versions/{}",
            self.workspace_url(),
            urlencoding::encode(name),
            urlencoding::encode(version)
        )
    }

    fn compute_url(&self, name: &str) -> String {
        format!("{}/computes/{}", self.workspace_url(), urlencoding::encode(name))
    }

    fn environment_version_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/environments/{}/versions/{}",
            self.workspace_url(),
            urlencoding::encode(name),
            urlencoding::encode(version)
        )
    }

    async fn bearer(&self) -> ApiResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.expires_within(chrono::Duration::minutes(5)) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.credential.get_token(MANAGEMENT_SCOPE).await?;
        let bearer = fresh.token.clone();
        *cached = Some(fresh);
        Ok(bearer)
    }

    /// Builds an authorized request carrying the `api-version` query parameter.
    async fn request(&self, method: Method, url: &str) -> ApiResult<RequestBuilder> {
        let token = self.bearer().await?;
        debug!(method = %method, url = %url, "Control plane request");
        Ok(self
            .client
            .request(method, url)
            .query(&[("api-version", self.options.api_version.as_str())])
            .bearer_auth(token))
    }

    async fn send(builder: RequestBuilder) -> ApiResult<Response> {
        builder.send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to control plane");
            ApiError::RequestError(format!("Network error: {}", e))
        })
    }

    async fn ensure_success(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(status = %status, error = %error_text, "Control plane returned error status");
        Err(ApiError::Status { status: status.as_u16(), message: error_text })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse control plane response");
            ApiError::SerializationError(format!("Failed to parse response: {}", e))
        })
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> ApiResult<Option<T>> {
        let response = Self::send(self.request(Method::GET, url).await?).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(url = %url, "Resource not found");
            return Ok(None);
        }
        let response = Self::ensure_success(response).await?;
        Self::parse(response).await.map(Some)
    }

    async fn put_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> ApiResult<Response> {
        let response = Self::send(self.request(Method::PUT, url).await?.json(body)).await?;
        Self::ensure_success(response).await
    }

    async fn workspace_location(&self) -> ApiResult<Option<String>> {
        self.location
            .get_or_try_init(|| async {
                let workspace: Option<WorkspaceResource> =
                    self.get_optional(&self.workspace_url()).await?;
                Ok::<_, ApiError>(workspace.and_then(|ws| ws.location))
            })
            .await
            .cloned()
    }

    /// Uploads a local path through a pending-upload reference rooted at
    /// `version_url` and returns the registered blob URI.
    async fn upload_local(&self, version_url: &str, local: &Path) -> ApiResult<String> {
        let url = format!("{version_url}/startPendingUpload");
        let builder = self.request(Method::POST, &url).await?.json(&PendingUploadRequest::default());
        let response = Self::ensure_success(Self::send(builder).await?).await?;
        let pending: PendingUploadResponse = Self::parse(response).await?;

        let reference = pending.blob_reference_for_consumption;
        let sas_uri = reference.credential.sas_uri.ok_or_else(|| {
            ApiError::UploadError("pending upload returned no SAS credential".to_string())
        })?;

        let relative = BlobUploader::new(&self.client, &sas_uri).upload_path(local).await?;
        Ok(format!("{}/{relative}", reference.blob_uri.trim_end_matches('/')))
    }
}

#[async_trait]
impl MlClient for AzureMlClient {
    fn scope(&self) -> &WorkspaceScope {
        &self.scope
    }

    async fn list_workspaces(&self) -> ApiResult<Vec<Workspace>> {
        let first = Self::send(self.request(Method::GET, &self.workspaces_url()).await?).await?;
        let mut page: WorkspaceList = Self::parse(Self::ensure_success(first).await?).await?;
        let mut workspaces: Vec<Workspace> = page.value.drain(..).map(Workspace::from).collect();

        let mut visited = HashSet::new();
        while let Some(next) = page.next_link.take() {
            if visited.len() >= MAX_LIST_PAGES || !visited.insert(next.clone()) {
                warn!(next_link = %next, pages = visited.len(), "Stopping workspace listing at repeated or excess nextLink");
                break;
            }
            let token = self.bearer().await?;
            let response = Self::send(self.client.get(&next).bearer_auth(token)).await?;
            page = Self::parse(Self::ensure_success(response).await?).await?;
            workspaces.extend(page.value.drain(..).map(Workspace::from));
        }

        debug!(count = workspaces.len(), "Listed workspaces");
        Ok(workspaces)
    }

    async fn get_data(&self, name: &str, version: &str) -> ApiResult<Option<DataAsset>> {
        let resource: Option<DataVersionResource> =
            self.get_optional(&self.data_version_url(name, version)).await?;
        Ok(resource.map(|r| r.into_asset(name, version)))
    }

    async fn create_or_update_data(&self, data: &DataAsset) -> ApiResult<DataAsset> {
        let url = self.data_version_url(&data.name, &data.version);
        let data_uri = if is_remote_uri(&data.path) {
            data.path.clone()
        } else {
            self.upload_local(&url, Path::new(&data.path)).await?
        };

        let body = DataVersionResource::from_asset(data, data_uri);
        let response = self.put_json(&url, &body).await?;
        let created: DataVersionResource = Self::parse(response).await?;
        Ok(created.into_asset(&data.name, &data.version))
    }

    async fn get_compute(&self, name: &str) -> ApiResult<Option<AmlCompute>> {
        let resource: Option<ComputeResource> = self.get_optional(&self.compute_url(name)).await?;
        Ok(resource.map(|r| r.into_compute(name)))
    }

    async fn begin_create_or_update_compute(&self, compute: &AmlCompute) -> ApiResult<()> {
        let location = self.workspace_location().await?;
        let body = ComputeResource::from_compute(compute, location);
        let response = self.put_json(&self.compute_url(&compute.name), &body).await?;
        debug!(
            compute = %compute.name,
            status = %response.status(),
            "Compute create accepted"
        );
        Ok(())
    }

    async fn get_environment(&self, name: &str, version: &str) -> ApiResult<Option<Environment>> {
        let resource: Option<EnvironmentVersionResource> =
            self.get_optional(&self.environment_version_url(name, version)).await?;
        Ok(resource.map(|r| r.into_environment(name, version)))
    }

    async fn create_or_update_environment(
        &self,
        environment: &Environment,
    ) -> ApiResult<Environment> {
        let context_uri = match environment.build.as_ref() {
            Some(build) if is_remote_uri(&build.path) => Some(build.path.clone()),
            Some(build) => {
                let code_url = self.code_version_url(&environment.name, &environment.version);
                Some(self.upload_local(&code_url, Path::new(&build.path)).await?)
            }
            None => None,
        };

        let url = self.environment_version_url(&environment.name, &environment.version);
        let body = EnvironmentVersionResource::from_environment(environment, context_uri);
        let response = self.put_json(&url, &body).await?;
        let created: EnvironmentVersionResource = Self::parse(response).await?;
        Ok(created.into_environment(&environment.name, &environment.version))
    }
}
