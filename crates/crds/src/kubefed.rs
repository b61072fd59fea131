//! KubeFed types consumed and produced by the WAOFed controllers.
//!
//! KubeFed owns these CRDs, so their schemas are not generated here:
//! - `KubeFedCluster` (read): registered member clusters
//! - `ReplicaSchedulingPreference` (written): replica weights for a FederatedDeployment
//! - `FederatedDeployment` / `FederatedService` (read): watched as dynamic objects

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the federated source types
pub const FEDERATED_TYPES_GROUP: &str = "types.kubefed.io";

/// API version of the federated source types
pub const FEDERATED_TYPES_VERSION: &str = "v1beta1";

/// Kind of federated workloads
pub const FEDERATED_DEPLOYMENT_KIND: &str = "FederatedDeployment";

/// Kind of federated services
pub const FEDERATED_SERVICE_KIND: &str = "FederatedService";

/// Condition type reported by KubeFed's cluster health checks
pub const CLUSTER_READY_CONDITION: &str = "Ready";

/// Group/version/kind of a FederatedDeployment
#[must_use]
pub fn federated_deployment_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(FEDERATED_TYPES_GROUP, FEDERATED_TYPES_VERSION, FEDERATED_DEPLOYMENT_KIND)
}

/// Group/version/kind of a FederatedService
#[must_use]
pub fn federated_service_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(FEDERATED_TYPES_GROUP, FEDERATED_TYPES_VERSION, FEDERATED_SERVICE_KIND)
}

/// Dynamic API resource for FederatedDeployments
#[must_use]
pub fn federated_deployment_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&federated_deployment_gvk(), "federateddeployments")
}

/// Dynamic API resource for FederatedServices
#[must_use]
pub fn federated_service_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&federated_service_gvk(), "federatedservices")
}

/// `spec.placement` of a federated object.
///
/// When both fields are set the explicit cluster list takes precedence.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenericPlacementFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<Vec<GenericClusterReference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct GenericClusterReference {
    pub name: String,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "core.kubefed.io",
    version = "v1beta1",
    kind = "KubeFedCluster",
    namespaced,
    status = "KubeFedClusterStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeFedClusterSpec {
    /// API endpoint of the member cluster
    #[serde(default)]
    pub api_endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalSecretReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LocalSecretReference {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeFedClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl KubeFedCluster {
    /// Whether KubeFed currently reports the cluster as `Ready=True`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == CLUSTER_READY_CONDITION && c.status == "True")
        })
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[kube(
    group = "scheduling.kubefed.io",
    version = "v1alpha1",
    kind = "ReplicaSchedulingPreference",
    shortname = "rsp",
    derive = "PartialEq",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSchedulingPreferenceSpec {
    /// Kind of the scheduled object, e.g. `FederatedDeployment`
    pub target_kind: String,

    /// Replicas distributed across `clusters`
    pub total_replicas: i32,

    /// Move replicas away from clusters that cannot run them
    #[serde(default)]
    pub rebalance: bool,

    /// Cluster name to scheduling preference. `"*"` matches every cluster.
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterPreferences>,

    /// Only schedule onto clusters also selected by the target's placement
    #[serde(default)]
    pub intersect_with_cluster_selector: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPreferences {
    #[serde(default)]
    pub min_replicas: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i64>,

    pub weight: i64,
}
