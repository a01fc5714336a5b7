//! One-call workspace setup.
//!
//! Authenticates, then registers the dataset, submits the compute cluster and
//! registers the environment, in that order. The first failure aborts the
//! remaining steps; resources registered by earlier steps are left in place.

use crate::cluster::AzureCluster;
use crate::config::InfraConfig;
use crate::credential::AzureCredential;
use crate::data::AzureData;
use crate::environment::AzureEnvironment;
use crate::error::InfraResult;
use amlinfra_abstraction::{AmlCompute, DataAsset, Environment, MlClient};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handles produced by a successful setup.
#[derive(Debug)]
pub struct Infrastructure {
    pub credential: AzureCredential,
    pub data: DataAsset,
    pub cluster: AmlCompute,
    pub environment: Environment,
}

impl Infrastructure {
    #[must_use]
    pub fn into_parts(self) -> (AzureCredential, DataAsset, AmlCompute, Environment) {
        (self.credential, self.data, self.cluster, self.environment)
    }
}

/// Sets up the workspace described by `config` using the ambient credential.
///
/// The environment's dependencies directory is resolved against `base_dir`.
pub async fn setup_infrastructure(config: &InfraConfig, base_dir: &Path) -> InfraResult<Infrastructure> {
    let credential =
        AzureCredential::connect_with_options(config.workspace_scope(), config.client.to_options()).await?;
    provision(config, base_dir, credential).await
}

/// Same as [`setup_infrastructure`] over an injected client.
pub async fn setup_infrastructure_with_client(
    config: &InfraConfig,
    base_dir: &Path,
    client: Arc<dyn MlClient>,
) -> InfraResult<Infrastructure> {
    let credential = AzureCredential::with_client(config.workspace_scope(), client).await?;
    provision(config, base_dir, credential).await
}

async fn provision(
    config: &InfraConfig,
    base_dir: &Path,
    credential: AzureCredential,
) -> InfraResult<Infrastructure> {
    let policy = config.reuse;

    let data = AzureData::new(
        &credential,
        config.data.data_path.as_str(),
        config.data.name.as_str(),
        config.data.description.as_str(),
        config.data.version.as_str(),
    )
    .with_policy(policy)
    .upload_data()
    .await?;

    let cluster = AzureCluster::new(&credential, config.cluster.clone())
        .with_policy(policy)
        .create_cluster()
        .await?;

    let environment = AzureEnvironment::new(
        &credential,
        config.environment.name.as_str(),
        base_dir.join(&config.environment.dependencies_dir),
        config.environment.version.as_str(),
        config.environment.tags.clone(),
        config.environment.description.as_str(),
    )
    .with_policy(policy)
    .create_environment()
    .await?;

    info!(
        scope = %credential.scope(),
        data = %data.name,
        cluster = %cluster.name,
        environment = %environment.name,
        "Infrastructure setup complete"
    );

    Ok(Infrastructure { credential, data, cluster, environment })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterSpec;
    use crate::config::{ClientSettings, DataSettings, EnvironmentSettings};
    use crate::error::InfraError;
    use crate::policy::ReusePolicy;
    use amlinfra_abstraction::{ComputeTier, WorkspaceScope};
    use amlinfra_client::MockMlClient;
    use std::collections::BTreeMap;

    fn config() -> InfraConfig {
        InfraConfig {
            workspace: Some(WorkspaceScope::new("sub", "rg", "ws")),
            data: DataSettings {
                data_path: "/data/a.csv".to_string(),
                name: "ds1".to_string(),
                description: "intents".to_string(),
                version: "1".to_string(),
            },
            cluster: ClusterSpec {
                name: "cpu-cluster".to_string(),
                compute_type: "amlcompute".to_string(),
                size: "STANDARD_DS3_V2".to_string(),
                min_instances: 0,
                max_instances: 4,
                idle_time_before_scale_down: 180,
                tier: ComputeTier::Dedicated,
            },
            environment: EnvironmentSettings {
                name: "bert-env".to_string(),
                dependencies_dir: "src/dependencies".to_string(),
                version: "2".to_string(),
                tags: BTreeMap::new(),
                description: String::new(),
            },
            reuse: ReusePolicy::default(),
            client: ClientSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_setup_resolves_dependencies_against_base_dir() {
        let client = Arc::new(MockMlClient::new(WorkspaceScope::new("sub", "rg", "ws")));

        let infra = setup_infrastructure_with_client(&config(), Path::new("/repo"), client.clone())
            .await
            .unwrap();

        let expected = Path::new("/repo").join("src/dependencies");
        assert_eq!(
            infra.environment.build.as_ref().map(|b| b.path.clone()),
            Some(expected.to_string_lossy().into_owned())
        );
        let (credential, data, cluster, _) = infra.into_parts();
        assert_eq!(credential.scope().workspace_name, "ws");
        assert_eq!(data.name, "ds1");
        assert_eq!(cluster.name, "cpu-cluster");
        assert_eq!(client.calls().writes(), 3);
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let client = Arc::new(MockMlClient::new(WorkspaceScope::new("sub", "rg", "ws")));

        setup_infrastructure_with_client(&config(), Path::new("/repo"), client.clone()).await.unwrap();
        setup_infrastructure_with_client(&config(), Path::new("/repo"), client.clone()).await.unwrap();

        assert_eq!(client.calls().writes(), 3);
        assert_eq!(client.calls().list_workspaces, 2);
    }

    #[tokio::test]
    async fn test_invalid_workspace_stops_before_any_call() {
        let client = Arc::new(MockMlClient::new(WorkspaceScope::default()));
        let mut config = config();
        config.workspace = Some(WorkspaceScope::new("sub", "", "ws"));

        let err = setup_infrastructure_with_client(&config, Path::new("."), client.clone()).await.unwrap_err();

        assert!(matches!(err, InfraError::Validation(ref m) if m == "resource_group_name is required"));
        assert_eq!(client.calls(), amlinfra_client::MockCalls::default());
    }
}
