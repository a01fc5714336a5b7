//! Environment registrar.

use crate::credential::AzureCredential;
use crate::error::{InfraResult, require};
use crate::policy::{DriftCheck, ReusePolicy, resolve_lookup};
use amlinfra_abstraction::{BuildContext, Environment};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dockerfile location relative to the build context root.
pub const DOCKERFILE_PATH: &str = "Dockerfile";

/// Ensures a versioned build-context environment exists in the workspace.
#[derive(Debug)]
pub struct AzureEnvironment<'a> {
    credential: &'a AzureCredential,
    name: String,
    dependencies_dir: PathBuf,
    version: String,
    tags: BTreeMap<String, String>,
    description: String,
    policy: ReusePolicy,
}

impl<'a> AzureEnvironment<'a> {
    pub fn new(
        credential: &'a AzureCredential,
        name: impl Into<String>,
        dependencies_dir: impl Into<PathBuf>,
        version: impl Into<String>,
        tags: BTreeMap<String, String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            name: name.into(),
            dependencies_dir: dependencies_dir.into(),
            version: version.into(),
            tags,
            description: description.into(),
            policy: ReusePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn dependencies_dir(&self) -> &Path {
        &self.dependencies_dir
    }

    fn requested(&self) -> Environment {
        Environment {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            build: Some(BuildContext {
                path: self.dependencies_dir.to_string_lossy().into_owned(),
                dockerfile_path: DOCKERFILE_PATH.to_string(),
            }),
            image: None,
        }
    }

    /// Returns the existing `(name, version)` environment, or registers one
    /// built from the dependencies directory.
    ///
    /// The returned record is the one the service confirmed.
    pub async fn create_environment(&self) -> InfraResult<Environment> {
        require("environment name", &self.name)?;
        require("environment version", &self.version)?;

        let resource = format!("environment {}:{}", self.name, self.version);
        let client = self.credential.client();
        let lookup = client.get_environment(&self.name, &self.version).await;

        if let Some(existing) = resolve_lookup(self.policy.lookup, &resource, lookup)? {
            DriftCheck::new(resource)
                .compare("description", self.description.as_str(), existing.description.as_str())
                .compare_debug("tags", &self.tags, &existing.tags)
                .apply(self.policy.drift)?;

            info!(name = %existing.name, version = %existing.version, "Environment already exists, reusing");
            return Ok(existing);
        }

        let environment = self.requested();
        debug!(
            name = %environment.name,
            version = %environment.version,
            context = %self.dependencies_dir.display(),
            "Environment not found, registering build context"
        );
        let created = client.create_or_update_environment(&environment).await?;
        info!(name = %created.name, version = %created.version, "Environment registered");
        Ok(created)
    }
}
