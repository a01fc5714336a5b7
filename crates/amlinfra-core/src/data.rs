//! Dataset registrar.

use crate::credential::AzureCredential;
use crate::error::{InfraResult, require};
use crate::policy::{DriftCheck, ReusePolicy, resolve_lookup};
use amlinfra_abstraction::{AssetType, DataAsset};
use amlinfra_client::is_remote_uri;
use tracing::{debug, info};

/// Ensures a versioned data asset exists in the workspace.
#[derive(Debug)]
pub struct AzureData<'a> {
    credential: &'a AzureCredential,
    path: String,
    name: String,
    description: String,
    version: String,
    policy: ReusePolicy,
}

impl<'a> AzureData<'a> {
    pub fn new(
        credential: &'a AzureCredential,
        path: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            path: path.into(),
            name: name.into(),
            description: description.into(),
            version: version.into(),
            policy: ReusePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn resource(&self) -> String {
        format!("data asset {}:{}", self.name, self.version)
    }

    /// The asset record that would be registered.
    fn requested(&self) -> DataAsset {
        DataAsset {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            path: self.path.clone(),
            asset_type: AssetType::UriFile,
        }
    }

    /// Returns the existing `(name, version)` asset, or registers it from `path`.
    ///
    /// Local paths are uploaded by the client before registration, so an
    /// existing asset's path is only compared when `path` is already remote.
    pub async fn upload_data(&self) -> InfraResult<DataAsset> {
        require("data name", &self.name)?;
        require("data version", &self.version)?;

        let client = self.credential.client();
        let lookup = client.get_data(&self.name, &self.version).await;

        if let Some(existing) = resolve_lookup(self.policy.lookup, &self.resource(), lookup)? {
            let mut check = DriftCheck::new(self.resource()).compare(
                "description",
                self.description.as_str(),
                existing.description.as_str(),
            );
            if is_remote_uri(&self.path) {
                check = check.compare("path", self.path.as_str(), existing.path.as_str());
            }
            check.apply(self.policy.drift)?;

            info!(name = %existing.name, version = %existing.version, "Data asset already exists, reusing");
            return Ok(existing);
        }

        debug!(name = %self.name, version = %self.version, path = %self.path, "Data asset not found, registering");
        let created = client.create_or_update_data(&self.requested()).await?;
        info!(
            name = %created.name,
            version = %created.version,
            path = %created.path,
            "Data asset registered"
        );
        Ok(created)
    }
}
