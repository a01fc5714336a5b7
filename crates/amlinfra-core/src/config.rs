//! Infrastructure configuration.
//!
//! Loaded from a TOML/YAML/JSON file with `AMLINFRA__SECTION__FIELD`
//! environment overrides layered on top.

use crate::cluster::ClusterSpec;
use crate::error::InfraResult;
use crate::policy::ReusePolicy;
use amlinfra_abstraction::WorkspaceScope;
use amlinfra_client::ClientOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AMLINFRA";

/// Dataset section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Local path or remote URI of the data.
    pub data_path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
}

/// Environment section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub name: String,
    /// Build context directory, relative to the setup base directory.
    pub dependencies_dir: String,
    pub version: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
}

/// Transport overrides for the REST client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientSettings {
    #[must_use]
    pub fn to_options(&self) -> ClientOptions {
        let defaults = ClientOptions::default();
        ClientOptions {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            api_version: self.api_version.clone().unwrap_or(defaults.api_version),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
        }
    }
}

/// Root configuration for `setup_infrastructure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Workspace identity; falls back to the process environment when absent.
    #[serde(default)]
    pub workspace: Option<WorkspaceScope>,
    pub data: DataSettings,
    pub cluster: ClusterSpec,
    pub environment: EnvironmentSettings,
    #[serde(default)]
    pub reuse: ReusePolicy,
    #[serde(default)]
    pub client: ClientSettings,
}

impl InfraConfig {
    /// Loads configuration from `path` with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the schema.
    pub fn load(path: impl AsRef<Path>) -> InfraResult<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// `env` replaces the process environment as the override source when given.
    fn load_with_env(path: &Path, env: Option<HashMap<String, String>>) -> InfraResult<Self> {
        let overrides = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .source(env);

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(overrides)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The configured workspace, or `WorkspaceScope::from_env()` when none is configured.
    #[must_use]
    pub fn workspace_scope(&self) -> WorkspaceScope {
        self.workspace.clone().unwrap_or_else(WorkspaceScope::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DriftPolicy, LookupPolicy};
    use amlinfra_abstraction::ComputeTier;
    use tempfile::TempDir;

    const TOML: &str = r#"
[data]
data_path = "data/processed/intents.csv"
name = "text-bert-intentions"
description = "Intent classification dataset"
version = "1"

[cluster]
name = "cpu-cluster"
type = "amlcompute"
size = "STANDARD_DS3_V2"
min_instances = 0
max_instances = 4
idle_time_before_scale_down = 180
tier = "dedicated"

[environment]
name = "bert-env"
dependencies_dir = "src/dependencies"
version = "2"
description = "Training environment"

[environment.tags]
framework = "pytorch"

[reuse]
drift = "fail"
"#;

    fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "infra.toml", TOML);

        let config = InfraConfig::load_with_env(&path, Some(HashMap::new())).unwrap();

        assert_eq!(config.data.name, "text-bert-intentions");
        assert_eq!(config.cluster.compute_type, "amlcompute");
        assert_eq!(config.cluster.max_instances, 4);
        assert_eq!(config.cluster.tier, ComputeTier::Dedicated);
        assert_eq!(config.environment.tags.get("framework").map(String::as_str), Some("pytorch"));
        assert_eq!(config.reuse.drift, DriftPolicy::Fail);
        assert_eq!(config.reuse.lookup, LookupPolicy::Lenient);
        assert!(config.workspace.is_none());
        assert_eq!(config.client, ClientSettings::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "infra.toml", TOML);
        let env = HashMap::from([
            ("AMLINFRA__CLUSTER__SIZE".to_string(), "STANDARD_NC6".to_string()),
            ("AMLINFRA__WORKSPACE__SUBSCRIPTION_ID".to_string(), "sub-from-env".to_string()),
        ]);

        let config = InfraConfig::load_with_env(&path, Some(env)).unwrap();

        assert_eq!(config.cluster.size, "STANDARD_NC6");
        let workspace = config.workspace.unwrap();
        assert_eq!(workspace.subscription_id, "sub-from-env");
        assert_eq!(workspace.workspace_name, "");
    }

    #[test]
    fn test_load_yaml_with_numeric_version() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "infra.yaml",
            r#"
workspace:
  subscription_id: sub
  resource_group_name: rg
  workspace_name: ws
data:
  data_path: azureml://datastores/blob/paths/a.csv
  name: ds1
  version: 3
cluster:
  name: gpu
  type: amlcompute
  size: STANDARD_NC6
  min_instances: 0
  max_instances: 1
  idle_time_before_scale_down: 120
  tier: low_priority
environment:
  name: env
  dependencies_dir: deps
  version: 1
client:
  timeout_secs: 5
"#,
        );

        let config = InfraConfig::load_with_env(&path, Some(HashMap::new())).unwrap();

        assert_eq!(config.data.version, "3");
        assert_eq!(config.environment.version, "1");
        assert_eq!(config.cluster.tier, ComputeTier::LowPriority);
        assert_eq!(config.workspace_scope(), WorkspaceScope::new("sub", "rg", "ws"));
        assert_eq!(config.client.to_options().timeout_secs, 5);
        assert_eq!(config.client.to_options().base_url, "https://management.azure.com");
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "infra.toml", "[data]\nname = \"x\"\n");
        let err = InfraConfig::load_with_env(&path, Some(HashMap::new())).unwrap_err();
        assert!(matches!(err, crate::error::InfraError::Config(_)));
    }
}
