//! Compute cluster provisioner.
//!
//! Creation is submitted and accepted, never awaited: the cluster returned
//! for a new name is the spec that was submitted, not a record the
//! service has finished provisioning.

use crate::credential::AzureCredential;
use crate::error::{InfraError, InfraResult, require};
use crate::policy::{DriftCheck, ReusePolicy, resolve_lookup};
use amlinfra_abstraction::{AmlCompute, ComputeTier};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

fn default_compute_type() -> String {
    "amlcompute".to_string()
}

/// Sizing parameters of a compute cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_compute_type")]
    pub compute_type: String,
    /// VM size, e.g. `STANDARD_DS3_V2`.
    pub size: String,
    #[serde(default)]
    pub min_instances: u32,
    pub max_instances: u32,
    /// Seconds before idle nodes are released.
    pub idle_time_before_scale_down: u64,
    #[serde(default)]
    pub tier: ComputeTier,
}

impl ClusterSpec {
    pub fn validate(&self) -> InfraResult<()> {
        require("cluster name", &self.name)?;
        require("cluster type", &self.compute_type)?;
        require("cluster size", &self.size)?;
        if self.max_instances == 0 {
            return Err(InfraError::Validation("max_instances must be at least 1".to_string()));
        }
        if self.min_instances > self.max_instances {
            return Err(InfraError::Validation(format!(
                "min_instances ({}) must not exceed max_instances ({})",
                self.min_instances, self.max_instances
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_compute(&self) -> AmlCompute {
        AmlCompute {
            name: self.name.clone(),
            compute_type: self.compute_type.clone(),
            size: self.size.clone(),
            min_instances: self.min_instances,
            max_instances: self.max_instances,
            idle_time_before_scale_down: self.idle_time_before_scale_down,
            tier: self.tier,
            provisioning_state: None,
        }
    }
}

/// Ensures a named compute cluster exists in the workspace.
#[derive(Debug)]
pub struct AzureCluster<'a> {
    credential: &'a AzureCredential,
    spec: ClusterSpec,
    policy: ReusePolicy,
}

impl<'a> AzureCluster<'a> {
    pub fn new(credential: &'a AzureCredential, spec: ClusterSpec) -> Self {
        Self { credential, spec, policy: ReusePolicy::default() }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// Returns the existing cluster named `spec.name`, or submits a new one.
    pub async fn create_cluster(&self) -> InfraResult<AmlCompute> {
        let spec = &self.spec;
        require("cluster name", &spec.name)?;

        let resource = format!("compute cluster {}", spec.name);
        let client = self.credential.client();
        let lookup = client.get_compute(&spec.name).await;

        if let Some(existing) = resolve_lookup(self.policy.lookup, &resource, lookup)? {
            DriftCheck::new(resource)
                .compare("size", spec.size.as_str(), existing.size.as_str())
                .compare("min_instances", &spec.min_instances, &existing.min_instances)
                .compare("max_instances", &spec.max_instances, &existing.max_instances)
                .compare(
                    "idle_time_before_scale_down",
                    &spec.idle_time_before_scale_down,
                    &existing.idle_time_before_scale_down,
                )
                .compare("tier", &spec.tier, &existing.tier)
                .apply(self.policy.drift)?;

            info!(
                name = %existing.name,
                size = %existing.size,
                state = existing.provisioning_state.as_deref().unwrap_or("unknown"),
                "Compute cluster already exists, reusing"
            );
            return Ok(existing);
        }

        spec.validate()?;
        let compute = spec.to_compute();
        debug!(name = %compute.name, size = %compute.size, tier = %compute.tier, "Compute cluster not found, creating");

        client.begin_create_or_update_compute(&compute).await?;
        info!(
            name = %compute.name,
            min_instances = compute.min_instances,
            max_instances = compute.max_instances,
            "Compute cluster creation submitted"
        );
        Ok(compute)
    }
}
