//! Authenticated workspace handle.
//!
//! `AzureCredential` is constructed all-or-nothing: the workspace identifiers
//! are validated before any network call, a client is opened, and the
//! connection is probed by listing accessible workspaces. The handle is then
//! shared by reference with every registrar.

use crate::error::{InfraError, InfraResult, require};
use amlinfra_abstraction::{ApiError, ApiResult, MlClient, Workspace, WorkspaceScope};
use amlinfra_client::{AzureMlClient, ClientOptions, DefaultAzureCredential};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fails with a validation error naming the first empty identifier.
pub fn validate_scope(scope: &WorkspaceScope) -> InfraResult<()> {
    require("subscription_id", &scope.subscription_id)?;
    require("resource_group_name", &scope.resource_group_name)?;
    require("workspace_name", &scope.workspace_name)
}

pub struct AzureCredential {
    scope: WorkspaceScope,
    client: Arc<dyn MlClient>,
}

impl fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredential").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl AzureCredential {
    /// Authenticates with the ambient default credential against the public endpoint.
    pub async fn connect(scope: WorkspaceScope) -> InfraResult<Self> {
        Self::connect_with_options(scope, ClientOptions::default()).await
    }

    /// Authenticates with the ambient default credential using explicit transport options.
    pub async fn connect_with_options(
        scope: WorkspaceScope,
        options: ClientOptions,
    ) -> InfraResult<Self> {
        validate_scope(&scope)?;

        let credential = Arc::new(DefaultAzureCredential::new());
        debug!(sources = ?credential.source_names(), "Resolved default credential chain");

        let client = AzureMlClient::with_credential(scope.clone(), credential, options).map_err(|e| {
            error!(error = %e, "AzureCredential: Failed to create workspace client");
            InfraError::Authentication {
                message: "Failed to create workspace client".to_string(),
                source: Some(e),
            }
        })?;

        Self::establish(scope, Arc::new(client)).await
    }

    /// Authenticates through an already-built client.
    pub async fn with_client(scope: WorkspaceScope, client: Arc<dyn MlClient>) -> InfraResult<Self> {
        validate_scope(&scope)?;
        Self::establish(scope, client).await
    }

    async fn establish(scope: WorkspaceScope, client: Arc<dyn MlClient>) -> InfraResult<Self> {
        let credential = Self { scope, client };

        match credential.probe().await {
            Ok(workspaces) => {
                if !workspaces.iter().any(|ws| ws.name == credential.scope.workspace_name) {
                    warn!(
                        workspace = %credential.scope.workspace_name,
                        "Target workspace is not among the listed workspaces"
                    );
                }
                info!(
                    scope = %credential.scope,
                    "AzureCredential: Successfully authenticated to Azure Machine Learning workspace"
                );
                Ok(credential)
            }
            Err(source) => {
                error!(
                    scope = %credential.scope,
                    error = ?source,
                    "AzureCredential: Failed to authenticate to Azure Machine Learning workspace"
                );
                Err(InfraError::Authentication {
                    message: "Invalid Azure credentials".to_string(),
                    source,
                })
            }
        }
    }

    /// Lists workspaces; an empty list is a failure with no underlying cause.
    async fn probe(&self) -> Result<Vec<Workspace>, Option<ApiError>> {
        let listed: ApiResult<Vec<Workspace>> = self.client.list_workspaces().await;
        match listed {
            Ok(workspaces) if workspaces.is_empty() => Err(None),
            Ok(workspaces) => Ok(workspaces),
            Err(e) => Err(Some(e)),
        }
    }

    /// Checks the connection to the workspace.
    ///
    /// Returns the non-empty list of accessible workspaces, or `None` when
    /// enumeration fails or finds nothing. Never errors.
    pub async fn check_connection(&self) -> Option<Vec<Workspace>> {
        match self.probe().await {
            Ok(workspaces) => Some(workspaces),
            Err(cause) => {
                warn!(error = ?cause, "Workspace connection check failed");
                None
            }
        }
    }

    #[must_use]
    pub fn scope(&self) -> &WorkspaceScope {
        &self.scope
    }

    #[must_use]
    pub fn client(&self) -> &dyn MlClient {
        self.client.as_ref()
    }
}
