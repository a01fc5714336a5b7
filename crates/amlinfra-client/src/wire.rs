//! Azure Resource Manager request/response bodies for the workspace APIs.

use amlinfra_abstraction::{
    AmlCompute, AssetType, BuildContext, ComputeTier, DataAsset, Environment, Workspace,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorkspaceList {
    #[serde(default)]
    pub value: Vec<WorkspaceResource>,
    #[serde(default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspaceResource {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl From<WorkspaceResource> for Workspace {
    fn from(ws: WorkspaceResource) -> Self {
        Self { name: ws.name, id: ws.id, location: ws.location }
    }
}

// Data versions

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DataVersionResource {
    pub properties: DataVersionProperties,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataVersionProperties {
    pub data_type: String,
    pub data_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DataVersionResource {
    pub fn from_asset(asset: &DataAsset, data_uri: String) -> Self {
        Self {
            properties: DataVersionProperties {
                data_type: asset.asset_type.as_str().to_string(),
                data_uri,
                description: Some(asset.description.clone()).filter(|d| !d.is_empty()),
            },
        }
    }

    /// ARM names a version resource by its version, so the asset name comes from the URL.
    pub fn into_asset(self, name: &str, version: &str) -> DataAsset {
        DataAsset {
            name: name.to_string(),
            version: version.to_string(),
            description: self.properties.description.unwrap_or_default(),
            path: self.properties.data_uri,
            asset_type: self.properties.data_type.parse().unwrap_or(AssetType::UriFile),
        }
    }
}

// Computes

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ComputeResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub properties: ComputeProperties,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ComputeProperties {
    pub compute_type: String,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<AmlComputeProperties>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AmlComputeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_settings: Option<ScaleSettings>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScaleSettings {
    #[serde(default)]
    pub min_node_count: u32,
    #[serde(default)]
    pub max_node_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_idle_time_before_scale_down: Option<String>,
}

/// The service names AmlCompute clusters `AmlCompute`; users write `amlcompute`.
fn wire_compute_type(compute_type: &str) -> String {
    if compute_type.eq_ignore_ascii_case("amlcompute") {
        "AmlCompute".to_string()
    } else {
        compute_type.to_string()
    }
}

impl ComputeResource {
    pub fn from_compute(compute: &AmlCompute, location: Option<String>) -> Self {
        Self {
            location,
            properties: ComputeProperties {
                compute_type: wire_compute_type(&compute.compute_type),
                provisioning_state: None,
                properties: Some(AmlComputeProperties {
                    vm_size: Some(compute.size.clone()),
                    vm_priority: Some(compute.tier.vm_priority().to_string()),
                    scale_settings: Some(ScaleSettings {
                        min_node_count: compute.min_instances,
                        max_node_count: compute.max_instances,
                        node_idle_time_before_scale_down: Some(format_idle_duration(
                            compute.idle_time_before_scale_down,
                        )),
                    }),
                }),
            },
        }
    }

    pub fn into_compute(self, name: &str) -> AmlCompute {
        let props = self.properties.properties.unwrap_or_default();
        let scale = props.scale_settings.unwrap_or_default();

        AmlCompute {
            name: name.to_string(),
            compute_type: self.properties.compute_type.to_lowercase(),
            size: props.vm_size.unwrap_or_default(),
            min_instances: scale.min_node_count,
            max_instances: scale.max_node_count,
            idle_time_before_scale_down: scale
                .node_idle_time_before_scale_down
                .as_deref()
                .and_then(parse_idle_duration)
                .unwrap_or(0),
            tier: props
                .vm_priority
                .as_deref()
                .and_then(|p| p.parse::<ComputeTier>().ok())
                .unwrap_or_default(),
            provisioning_state: self.properties.provisioning_state,
        }
    }
}

/// Formats seconds as an ISO-8601 duration (`PT120S`).
pub(crate) fn format_idle_duration(secs: u64) -> String {
    format!("PT{secs}S")
}

/// Parses the `PT#H#M#S` durations the service returns.
pub(crate) fn parse_idle_duration(value: &str) -> Option<u64> {
    let rest = value.strip_prefix("PT")?;
    let mut total = 0u64;
    let mut digits = String::new();

    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let secs = match ch {
            'H' => n.checked_mul(3600)?,
            'M' => n.checked_mul(60)?,
            'S' => n,
            _ => return None,
        };
        total = total.checked_add(secs)?;
    }

    digits.is_empty().then_some(total)
}

// Environment versions

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EnvironmentVersionResource {
    pub properties: EnvironmentVersionProperties,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnvironmentVersionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildContextWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuildContextWire {
    pub context_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
}

impl EnvironmentVersionResource {
    pub fn from_environment(env: &Environment, context_uri: Option<String>) -> Self {
        Self {
            properties: EnvironmentVersionProperties {
                description: Some(env.description.clone()).filter(|d| !d.is_empty()),
                tags: env.tags.clone(),
                build: env.build.as_ref().zip(context_uri).map(|(build, uri)| BuildContextWire {
                    context_uri: uri,
                    dockerfile_path: Some(build.dockerfile_path.clone()),
                }),
                image: env.image.clone(),
            },
        }
    }

    pub fn into_environment(self, name: &str, version: &str) -> Environment {
        Environment {
            name: name.to_string(),
            version: version.to_string(),
            description: self.properties.description.unwrap_or_default(),
            tags: self.properties.tags,
            build: self.properties.build.map(|b| BuildContext {
                path: b.context_uri,
                dockerfile_path: b.dockerfile_path.unwrap_or_else(|| "Dockerfile".to_string()),
            }),
            image: self.properties.image,
        }
    }
}

// Pending uploads

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PendingUploadRequest {
    pub pending_upload_type: &'static str,
}

impl Default for PendingUploadRequest {
    fn default() -> Self {
        Self { pending_upload_type: "TemporaryBlobReference" }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PendingUploadResponse {
    pub blob_reference_for_consumption: BlobReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlobReference {
    pub blob_uri: String,
    pub credential: BlobCredential,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlobCredential {
    #[serde(default)]
    pub sas_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_duration_round_trip() {
        assert_eq!(format_idle_duration(120), "PT120S");
        assert_eq!(parse_idle_duration("PT120S"), Some(120));
        assert_eq!(parse_idle_duration("PT2M"), Some(120));
        assert_eq!(parse_idle_duration("PT1H30M15S"), Some(5415));
        assert_eq!(parse_idle_duration("P1D"), None);
        assert_eq!(parse_idle_duration("PT12"), None);
        assert_eq!(parse_idle_duration("PT99999999999999999H"), None);
        assert_eq!(parse_idle_duration("PT18446744073709551615S1S"), None);
        assert_eq!(parse_idle_duration("PT18446744073709551615S"), Some(u64::MAX));
    }

    #[test]
    fn test_compute_resource_body() {
        let compute = AmlCompute {
            name: "cpu-cluster".to_string(),
            compute_type: "amlcompute".to_string(),
            size: "STANDARD_DS3_V2".to_string(),
            min_instances: 0,
            max_instances: 4,
            idle_time_before_scale_down: 180,
            tier: ComputeTier::LowPriority,
            provisioning_state: None,
        };

        let body = serde_json::to_value(ComputeResource::from_compute(&compute, Some("westeurope".to_string())))
            .unwrap();

        assert_eq!(body["location"], "westeurope");
        assert_eq!(body["properties"]["computeType"], "AmlCompute");
        assert_eq!(body["properties"]["properties"]["vmSize"], "STANDARD_DS3_V2");
        assert_eq!(body["properties"]["properties"]["vmPriority"], "LowPriority");
        assert_eq!(body["properties"]["properties"]["scaleSettings"]["maxNodeCount"], 4);
        assert_eq!(
            body["properties"]["properties"]["scaleSettings"]["nodeIdleTimeBeforeScaleDown"],
            "PT180S"
        );
        assert!(body["properties"].get("provisioningState").is_none());
    }

    #[test]
    fn test_compute_resource_parse() {
        let json = r#"{
            "location": "westeurope",
            "properties": {
                "computeType": "AmlCompute",
                "provisioningState": "Succeeded",
                "properties": {
                    "vmSize": "STANDARD_NC6",
                    "vmPriority": "Dedicated",
                    "scaleSettings": {"minNodeCount": 1, "maxNodeCount": 2, "nodeIdleTimeBeforeScaleDown": "PT2M"}
                }
            }
        }"#;
        let resource: ComputeResource = serde_json::from_str(json).unwrap();
        let compute = resource.into_compute("gpu");

        assert_eq!(compute.name, "gpu");
        assert_eq!(compute.compute_type, "amlcompute");
        assert_eq!(compute.size, "STANDARD_NC6");
        assert_eq!(compute.min_instances, 1);
        assert_eq!(compute.max_instances, 2);
        assert_eq!(compute.idle_time_before_scale_down, 120);
        assert_eq!(compute.tier, ComputeTier::Dedicated);
        assert_eq!(compute.provisioning_state.as_deref(), Some("Succeeded"));
    }

    #[test]
    fn test_data_version_parse_uses_url_identity() {
        let json = r#"{"name": "1", "properties": {"dataType": "uri_folder", "dataUri": "azureml://x", "description": "d"}}"#;
        let resource: DataVersionResource = serde_json::from_str(json).unwrap();
        let asset = resource.into_asset("ds1", "1");

        assert_eq!(asset.name, "ds1");
        assert_eq!(asset.version, "1");
        assert_eq!(asset.asset_type, AssetType::UriFolder);
        assert_eq!(asset.path, "azureml://x");
    }

    #[test]
    fn test_environment_body_omits_empty_fields() {
        let env = Environment {
            name: "env".to_string(),
            version: "1".to_string(),
            description: String::new(),
            tags: BTreeMap::new(),
            build: Some(BuildContext { path: "./deps".to_string(), dockerfile_path: "Dockerfile".to_string() }),
            image: None,
        };

        let body = serde_json::to_value(EnvironmentVersionResource::from_environment(
            &env,
            Some("https://blob/ctx/".to_string()),
        ))
        .unwrap();

        assert!(body["properties"].get("description").is_none());
        assert!(body["properties"].get("tags").is_none());
        assert_eq!(body["properties"]["build"]["contextUri"], "https://blob/ctx/");
        assert_eq!(body["properties"]["build"]["dockerfilePath"], "Dockerfile");
    }
}
