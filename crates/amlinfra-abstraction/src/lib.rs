//! Control-plane abstraction layer for amlinfra.
//!
//! This module defines the resource types and the client trait used to talk to
//! an Azure Machine Learning workspace. Concrete transports live in
//! `amlinfra-client`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Represents an error that can occur when talking to the control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    /// The request could not be sent (DNS, TLS, connection reset, timeout).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// A request or response body could not be (de)serialized.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// No access token could be obtained.
    #[error("Credential Error: {0}")]
    CredentialError(String),

    /// A local file or directory could not be uploaded.
    #[error("Upload Error: {0}")]
    UploadError(String),

    /// Other unexpected errors.
    #[error("Other API Error: {0}")]
    Other(String),
}

impl ApiError {
    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for control-plane calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Environment variable holding the subscription id.
pub const SUBSCRIPTION_ID_VAR: &str = "SUBSCRIPTION_ID";
/// Environment variable holding the resource group name.
pub const RESOURCE_GROUP_NAME_VAR: &str = "RESOURCE_GROUP_NAME";
/// Environment variable holding the workspace name.
pub const WORKSPACE_NAME_VAR: &str = "WORKSPACE_NAME";

/// The (subscription, resource group, workspace) triple a client is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceScope {
    /// Azure subscription id.
    #[serde(default)]
    pub subscription_id: String,
    /// Resource group containing the workspace.
    #[serde(default)]
    pub resource_group_name: String,
    /// Azure Machine Learning workspace name.
    #[serde(default)]
    pub workspace_name: String,
}

impl WorkspaceScope {
    /// Creates a scope from its three identifiers.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        workspace_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            workspace_name: workspace_name.into(),
        }
    }

    /// Reads the scope from `SUBSCRIPTION_ID`, `RESOURCE_GROUP_NAME` and
    /// `WORKSPACE_NAME`. Unset variables become empty strings.
    #[allow(clippy::disallowed_methods)] // env::var is the explicit opt-in source here
    #[must_use]
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).unwrap_or_default();
        Self::new(read(SUBSCRIPTION_ID_VAR), read(RESOURCE_GROUP_NAME_VAR), read(WORKSPACE_NAME_VAR))
    }
}

impl fmt::Display for WorkspaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subscription_id, self.resource_group_name, self.workspace_name)
    }
}

/// A workspace visible to the authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace name.
    pub name: String,
    /// Fully-qualified ARM resource id.
    #[serde(default)]
    pub id: Option<String>,
    /// Azure region.
    #[serde(default)]
    pub location: Option<String>,
}

/// Asset type tag attached to a data asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// A single file.
    #[default]
    UriFile,
    /// A folder of files.
    UriFolder,
    /// A table definition.
    Mltable,
}

impl AssetType {
    /// Wire name of the asset type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UriFile => "uri_file",
            Self::UriFolder => "uri_folder",
            Self::Mltable => "mltable",
        }
    }
}

impl FromStr for AssetType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uri_file" | "urifile" => Ok(Self::UriFile),
            "uri_folder" | "urifolder" => Ok(Self::UriFolder),
            "mltable" => Ok(Self::Mltable),
            other => Err(ApiError::SerializationError(format!("unknown asset type: {other}"))),
        }
    }
}

/// A versioned data asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAsset {
    /// Asset name.
    pub name: String,
    /// Asset version.
    pub version: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Local path or remote URI of the data.
    pub path: String,
    /// Asset type tag.
    #[serde(default)]
    pub asset_type: AssetType,
}

/// Priority tier of a compute cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeTier {
    /// Dedicated nodes.
    #[default]
    Dedicated,
    /// Preemptible nodes.
    LowPriority,
}

impl ComputeTier {
    /// The `vmPriority` value the control plane expects.
    #[must_use]
    pub const fn vm_priority(self) -> &'static str {
        match self {
            Self::Dedicated => "Dedicated",
            Self::LowPriority => "LowPriority",
        }
    }
}

impl FromStr for ComputeTier {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "dedicated" => Ok(Self::Dedicated),
            "low_priority" | "lowpriority" => Ok(Self::LowPriority),
            other => Err(ApiError::SerializationError(format!("unknown compute tier: {other}"))),
        }
    }
}

impl fmt::Display for ComputeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dedicated => write!(f, "dedicated"),
            Self::LowPriority => write!(f, "low_priority"),
        }
    }
}

/// An Azure Machine Learning compute cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlCompute {
    /// Cluster name.
    pub name: String,
    /// Compute type (normally `amlcompute`).
    pub compute_type: String,
    /// VM size, e.g. `STANDARD_DS3_V2`.
    pub size: String,
    /// Minimum node count.
    pub min_instances: u32,
    /// Maximum node count.
    pub max_instances: u32,
    /// Seconds a node may idle before the cluster scales down.
    pub idle_time_before_scale_down: u64,
    /// Priority tier.
    pub tier: ComputeTier,
    /// Provisioning state reported by the service, absent on local specs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// Docker build context of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Local directory or remote URI holding the build files.
    pub path: String,
    /// Dockerfile location relative to the context root.
    pub dockerfile_path: String,
}

/// A versioned environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name.
    pub name: String,
    /// Environment version.
    pub version: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Tags attached to the environment.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Build context, absent for image-based environments.
    #[serde(default)]
    pub build: Option<BuildContext>,
    /// Base image, absent for build-context environments.
    #[serde(default)]
    pub image: Option<String>,
}

/// The narrow client interface every component talks through.
///
/// Lookups return `Ok(None)` only when the service confirmed the resource is
/// absent; any other failure is an `Err`.
#[async_trait]
pub trait MlClient: Send + Sync {
    /// The workspace this client is bound to.
    fn scope(&self) -> &WorkspaceScope;

    /// Lists the workspaces accessible in the bound resource group.
    async fn list_workspaces(&self) -> ApiResult<Vec<Workspace>>;

    /// Fetches a data asset by name and version.
    async fn get_data(&self, name: &str, version: &str) -> ApiResult<Option<DataAsset>>;

    /// Registers a data asset, uploading local files first.
    async fn create_or_update_data(&self, data: &DataAsset) -> ApiResult<DataAsset>;

    /// Fetches a compute cluster by name.
    async fn get_compute(&self, name: &str) -> ApiResult<Option<AmlCompute>>;

    /// Submits a compute cluster; returns once the service accepted the request.
    async fn begin_create_or_update_compute(&self, compute: &AmlCompute) -> ApiResult<()>;

    /// Fetches an environment by name and version.
    async fn get_environment(&self, name: &str, version: &str) -> ApiResult<Option<Environment>>;

    /// Registers an environment, uploading a local build context first.
    async fn create_or_update_environment(&self, environment: &Environment)
    -> ApiResult<Environment>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_tier_parsing() {
        assert_eq!("dedicated".parse::<ComputeTier>().unwrap(), ComputeTier::Dedicated);
        assert_eq!("low_priority".parse::<ComputeTier>().unwrap(), ComputeTier::LowPriority);
        assert_eq!("LowPriority".parse::<ComputeTier>().unwrap(), ComputeTier::LowPriority);
        assert_eq!("low-priority".parse::<ComputeTier>().unwrap(), ComputeTier::LowPriority);
        assert!("spot".parse::<ComputeTier>().is_err());
    }

    #[test]
    fn test_compute_tier_vm_priority() {
        assert_eq!(ComputeTier::Dedicated.vm_priority(), "Dedicated");
        assert_eq!(ComputeTier::LowPriority.vm_priority(), "LowPriority");
    }

    #[test]
    fn test_asset_type_wire_names() {
        assert_eq!(AssetType::UriFile.as_str(), "uri_file");
        assert_eq!("uri_folder".parse::<AssetType>().unwrap(), AssetType::UriFolder);
        let json = serde_json::to_string(&AssetType::Mltable).unwrap();
        assert_eq!(json, "\"mltable\"");
    }

    #[test]
    fn test_api_error_status() {
        let err = ApiError::Status { status: 403, message: "forbidden".to_string() };
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("403"));
        assert_eq!(ApiError::RequestError("reset".to_string()).status(), None);
    }

    #[test]
    fn test_workspace_scope_display() {
        let scope = WorkspaceScope::new("sub", "rg", "ws");
        assert_eq!(scope.to_string(), "sub/rg/ws");
    }

    #[test]
    fn test_workspace_scope_deserialize_defaults() {
        let scope: WorkspaceScope = serde_json::from_str(r#"{"workspace_name": "ws"}"#).unwrap();
        assert_eq!(scope.subscription_id, "");
        assert_eq!(scope.workspace_name, "ws");
    }
}
