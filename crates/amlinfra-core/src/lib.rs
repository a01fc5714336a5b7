//! amlinfra core
//!
//! Get-or-create components for an Azure Machine Learning workspace:
//! - Authenticating against the workspace (`AzureCredential`)
//! - Registering a versioned dataset (`AzureData`)
//! - Provisioning a compute cluster (`AzureCluster`)
//! - Registering a build-context environment (`AzureEnvironment`)
//! - Running all of the above in one call (`setup_infrastructure`)

pub mod cluster;
pub mod config;
pub mod credential;
pub mod data;
pub mod environment;
pub mod error;
pub mod policy;
pub mod setup;

pub use cluster::{AzureCluster, ClusterSpec};
pub use crate::config::{ClientSettings, DataSettings, EnvironmentSettings, InfraConfig};
pub use credential::{AzureCredential, validate_scope};
pub use data::AzureData;
pub use environment::{AzureEnvironment, DOCKERFILE_PATH};
pub use error::{FieldDrift, InfraError, InfraResult};
pub use policy::{DriftPolicy, LookupPolicy, ReusePolicy};
pub use setup::{Infrastructure, setup_infrastructure, setup_infrastructure_with_client};

pub use amlinfra_abstraction::{
    AmlCompute, ComputeTier, DataAsset, Environment, MlClient, Workspace, WorkspaceScope,
};
