//! Resource DTOs for the container-infra API.
//!
//! # Design
//! The service adds fields between microversions, so every resource keeps
//! the fields it does not name in `extra` instead of rejecting them. Almost
//! everything is optional: a create call answers with just `{"uuid": ...}`,
//! which still deserializes into the full resource type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

/// Field order of list responses and the fields present depend on the
/// microversion; `extra` holds the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coe_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_volume_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nodegroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A CA certificate, or a signed client certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_limit: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cluster and node totals, for one project or the whole deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub clusters: u64,
    #[serde(default)]
    pub nodes: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Magnum conductor service record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy name of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baymodel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy name of a cluster template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BayModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request payload for `POST /v1/clusters`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCluster {
    pub name: String,
    pub cluster_template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
}

/// Request payload for `POST /v1/clustertemplates`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClusterTemplate {
    pub name: String,
    pub coe: String,
    pub image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypair_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNodegroup {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_node_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateQuota {
    pub project_id: String,
    pub resource: String,
    pub hard_limit: i64,
}

/// Body of `POST /v1/clusters/{id}/actions/resize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResizeCluster {
    pub node_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub nodes_to_remove: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodegroup: Option<String>,
}

/// Body of `POST /v1/clusters/{id}/actions/upgrade`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeCluster {
    pub cluster_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodegroup: Option<String>,
}

/// Body of `POST /v1/certificates`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignCertificate {
    pub cluster_uuid: String,
    pub csr: String,
}

/// JSON-patch operation kinds accepted by `PATCH` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Add,
    Replace,
    Remove,
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchOperation::Add => "add",
            PatchOperation::Replace => "replace",
            PatchOperation::Remove => "remove",
        })
    }
}

impl FromStr for PatchOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(PatchOperation::Add),
            "replace" => Ok(PatchOperation::Replace),
            "remove" => Ok(PatchOperation::Remove),
            other => Err(Error::Config(format!("Unknown PATCH operation: {other}"))),
        }
    }
}

/// One entry of a JSON-patch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOperation,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Paging and sorting for list calls.
///
/// `limit: None` issues one request and returns what the server sends.
/// `Some(0)` follows `next` links until the collection is exhausted;
/// `Some(n)` follows them until `n` items are collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub marker: Option<String>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    /// Use the `/detail` collection, which returns full records.
    pub detail: bool,
}

impl ListOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn sort(mut self, key: impl Into<String>, dir: impl Into<String>) -> Self {
        self.sort_key = Some(key.into());
        self.sort_dir = Some(dir.into());
        self
    }

    pub fn detail(mut self) -> Self {
        self.detail = true;
        self
    }

    /// Query string without the leading `?`; empty when nothing is set.
    pub fn query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            query.append_pair("limit", &limit.to_string());
        }
        if let Some(marker) = &self.marker {
            query.append_pair("marker", marker);
        }
        if let Some(key) = &self.sort_key {
            query.append_pair("sort_key", key);
        }
        if let Some(dir) = &self.sort_dir {
            query.append_pair("sort_dir", dir);
        }
        query.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "uuid": "7ab8c4c2-4f33-4c1c-8f5e-1d0f5c8b2a11",
            "name": "k8s",
            "node_count": 3,
            "master_lb_enabled": true
        });
        let cluster: Cluster = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(cluster.node_count, Some(3));
        assert_eq!(cluster.extra.get("master_lb_enabled"), Some(&json!(true)));
        assert_eq!(serde_json::to_value(&cluster).unwrap(), raw);
    }

    #[test]
    fn create_reply_with_only_uuid_deserializes() {
        let cluster: Cluster =
            serde_json::from_value(json!({"uuid": "7ab8c4c2-4f33-4c1c-8f5e-1d0f5c8b2a11"})).unwrap();
        assert!(cluster.uuid.is_some());
        assert!(cluster.name.is_none());
    }

    #[test]
    fn remove_patch_has_no_value() {
        let op = PatchOp {
            op: PatchOperation::Remove,
            path: "/labels".to_string(),
            value: None,
        };
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"op": "remove", "path": "/labels"}));
    }

    #[test]
    fn unknown_patch_operation_is_rejected() {
        assert!("move".parse::<PatchOperation>().is_err());
        assert_eq!("replace".parse::<PatchOperation>().unwrap(), PatchOperation::Replace);
    }

    #[test]
    fn list_query_skips_unset_and_zero_limit() {
        assert_eq!(ListOptions::default().query(), "");
        assert_eq!(ListOptions::default().limit(0).query(), "");
        assert_eq!(
            ListOptions::default().limit(5).marker("abc").sort("name", "asc").query(),
            "limit=5&marker=abc&sort_key=name&sort_dir=asc"
        );
    }
}
