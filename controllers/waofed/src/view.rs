//! Typed views over schema-less federated objects.
//!
//! FederatedDeployments and FederatedServices are watched as dynamic objects.
//! [`FederatedObjectView::from_value`] checks the type tag and the mandatory
//! top-level fields, then decodes `spec.placement` and `spec.template`
//! independently: a field that fails to decode is left as `None` so the object
//! can still be scope-checked and cleaned up.

use crate::error::ControllerError;
use crds::{GenericPlacementFields, PolicyKind, federated_deployment_gvk, federated_service_gvk};
use k8s_openapi::api::core::v1::{PodTemplateSpec, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{ApiResource, GroupVersionKind};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Replica count Kubernetes assumes when a Deployment omits `spec.replicas`
pub const DEFAULT_REPLICAS: i32 = 1;

/// The federated source kinds the controllers watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `types.kubefed.io/v1beta1` FederatedDeployment
    FederatedDeployment,
    /// `types.kubefed.io/v1beta1` FederatedService
    FederatedService,
}

impl SourceKind {
    /// Group, version and kind of the source
    pub fn gvk(self) -> GroupVersionKind {
        match self {
            Self::FederatedDeployment => federated_deployment_gvk(),
            Self::FederatedService => federated_service_gvk(),
        }
    }

    /// Resource descriptor for dynamic API access
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::FederatedDeployment => crds::federated_deployment_resource(),
            Self::FederatedService => crds::federated_service_resource(),
        }
    }

    /// Sub-policy of the WAOFedConfig that governs this kind
    pub fn policy_kind(self) -> PolicyKind {
        match self {
            Self::FederatedDeployment => PolicyKind::Scheduling,
            Self::FederatedService => PolicyKind::LoadBalancing,
        }
    }

    /// Kind name as it appears in `kind` and owner references
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FederatedDeployment => crds::FEDERATED_DEPLOYMENT_KIND,
            Self::FederatedService => crds::FEDERATED_SERVICE_KIND,
        }
    }
}

/// `spec.template` of a FederatedDeployment.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTemplate {
    #[serde(default)]
    pub metadata: Option<ObjectMeta>,
    #[serde(default)]
    pub spec: Option<DeploymentTemplateSpec>,
}

/// The parts of a Deployment spec the reconciler reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTemplateSpec {
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub template: Option<PodTemplateSpec>,
}

/// `spec.template` of a FederatedService.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    #[serde(default)]
    pub metadata: Option<ObjectMeta>,
    #[serde(default)]
    pub spec: Option<ServiceSpec>,
}

/// Typed view of a federated object.
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedObjectView<T> {
    /// Kind the object was checked against
    pub kind: SourceKind,
    /// `apiVersion` of the source, used in owner references
    pub api_version: String,
    /// Source metadata
    pub metadata: ObjectMeta,
    /// `spec.placement`, absent when missing or malformed
    pub placement: Option<GenericPlacementFields>,
    /// `spec.template`, absent when missing or malformed
    pub template: Option<T>,
}

pub type FederatedDeploymentView = FederatedObjectView<DeploymentTemplate>;
pub type FederatedServiceView = FederatedObjectView<ServiceTemplate>;

impl<T: DeserializeOwned> FederatedObjectView<T> {
    /// Converts a schema-less object of the expected `kind`.
    pub fn from_value(kind: SourceKind, obj: &Value) -> Result<Self, ControllerError> {
        let gvk = kind.gvk();
        let expected_api_version = gvk.api_version();
        let api_version = obj.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
        let actual_kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
        if api_version != expected_api_version || actual_kind != gvk.kind {
            return Err(ControllerError::Conversion(format!(
                "wrong GVK: expected {expected_api_version}/{}, got {api_version}/{actual_kind}",
                gvk.kind
            )));
        }

        let metadata = match obj.get("metadata") {
            Some(m @ Value::Object(_)) => ObjectMeta::deserialize(m)
                .map_err(|e| ControllerError::Conversion(format!("could not decode metadata: {e}")))?,
            _ => return Err(ControllerError::Conversion("could not get metadata".to_string())),
        };

        let Some(Value::Object(spec)) = obj.get("spec") else {
            return Err(ControllerError::Conversion("could not get spec".to_string()));
        };

        Ok(Self {
            kind,
            api_version: expected_api_version,
            placement: decode_field(spec, "placement"),
            template: decode_field(spec, "template"),
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// Annotations of the source (empty map when none)
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata.annotations.clone().unwrap_or_default()
    }
}

fn decode_field<T: DeserializeOwned>(spec: &serde_json::Map<String, Value>, field: &str) -> Option<T> {
    let raw = spec.get(field)?;
    match T::deserialize(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("could not decode spec.{}: {}", field, e);
            None
        }
    }
}

impl FederatedDeploymentView {
    /// Desired replica count of the template
    pub fn replicas(&self) -> Option<i32> {
        self.template
            .as_ref()
            .map(|t| t.spec.as_ref().and_then(|s| s.replicas).unwrap_or(DEFAULT_REPLICAS))
    }

    /// Sum of the containers' CPU requests in milli-cores
    pub fn total_cpu_request_milli(&self) -> Result<i64, ControllerError> {
        let containers = self
            .template
            .as_ref()
            .and_then(|t| t.spec.as_ref())
            .and_then(|s| s.template.as_ref())
            .and_then(|p| p.spec.as_ref())
            .map(|p| p.containers.as_slice())
            .unwrap_or_default();

        let mut total = 0_i64;
        for container in containers {
            let request = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("cpu"));
            if let Some(q) = request {
                let milli = parse_cpu_milli(&q.0).ok_or_else(|| {
                    ControllerError::Conversion(format!(
                        "container {} has invalid cpu request {:?}",
                        container.name, q.0
                    ))
                })?;
                total = total.checked_add(milli).ok_or_else(|| {
                    ControllerError::Conversion(format!("cpu requests overflow at container {}", container.name))
                })?;
            }
        }
        Ok(total)
    }
}

const QUANTITY_SUFFIXES: [(&str, f64); 15] = [
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parses a Kubernetes CPU quantity into milli-cores, rounding up.
pub fn parse_cpu_milli(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = QUANTITY_SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| raw.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((raw, 1.0));

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let exact = value * multiplier * 1000.0;
    // float noise must not push "0.3" up to 301m
    let nearest = exact.round();
    let milli = if (exact - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        exact.ceil()
    };
    f64_to_i64(milli)
}

#[allow(clippy::cast_possible_truncation, reason = "range is checked before the cast")]
fn f64_to_i64(value: f64) -> Option<i64> {
    if value >= 9.2e18 { None } else { Some(value as i64) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fdeploy(spec: Value) -> Value {
        json!({
            "apiVersion": "types.kubefed.io/v1beta1",
            "kind": "FederatedDeployment",
            "metadata": {
                "name": "web",
                "namespace": "apps",
                "annotations": { "waofed.bitmedia.co.jp/scheduling": "" }
            },
            "spec": spec
        })
    }

    #[test]
    fn test_converts_full_object() {
        let obj = fdeploy(json!({
            "placement": { "clusters": [{ "name": "c1" }] },
            "template": {
                "spec": {
                    "replicas": 3,
                    "selector": { "matchLabels": { "app": "web" } },
                    "template": {
                        "spec": {
                            "containers": [
                                { "name": "a", "resources": { "requests": { "cpu": "500m" } } },
                                { "name": "b", "resources": { "requests": { "cpu": "1.5" } } },
                                { "name": "c" }
                            ]
                        }
                    }
                }
            }
        }));
        let view = FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj)
            .expect("Should convert");
        assert_eq!(view.name(), "web");
        assert_eq!(view.namespace(), "apps");
        assert!(view.annotations().contains_key("waofed.bitmedia.co.jp/scheduling"));
        assert_eq!(view.replicas(), Some(3));
        assert_eq!(view.total_cpu_request_milli().expect("cpu"), 2000);
        assert_eq!(view.placement.and_then(|p| p.clusters).map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_wrong_kind_is_conversion_error() {
        let mut obj = fdeploy(json!({}));
        obj["kind"] = json!("FederatedService");
        let result = FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj);
        assert!(matches!(result, Err(ControllerError::Conversion(_))));
    }

    #[test]
    fn test_missing_spec_or_metadata_is_conversion_error() {
        let mut obj = fdeploy(json!({}));
        obj.as_object_mut().expect("object").remove("spec");
        assert!(matches!(
            FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj),
            Err(ControllerError::Conversion(_))
        ));

        let mut obj = fdeploy(json!({}));
        obj["metadata"] = json!("not-an-object");
        assert!(matches!(
            FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj),
            Err(ControllerError::Conversion(_))
        ));
    }

    #[test]
    fn test_bad_fields_are_left_absent() {
        let obj = fdeploy(json!({
            "placement": { "clusters": "c1" },
            "template": { "spec": { "replicas": "three" } }
        }));
        let view = FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj)
            .expect("Partial conversion should succeed");
        assert!(view.placement.is_none());
        assert!(view.template.is_none());
        assert_eq!(view.replicas(), None);
    }

    #[test]
    fn test_replicas_default_to_one() {
        let obj = fdeploy(json!({ "template": { "spec": {} } }));
        let view = FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj)
            .expect("Should convert");
        assert_eq!(view.replicas(), Some(DEFAULT_REPLICAS));
        assert_eq!(view.total_cpu_request_milli().expect("cpu"), 0);
    }

    #[test]
    fn test_service_view() {
        let obj = json!({
            "apiVersion": "types.kubefed.io/v1beta1",
            "kind": "FederatedService",
            "metadata": { "name": "web", "namespace": "apps" },
            "spec": {
                "placement": { "clusterSelector": { "matchLabels": { "tier": "edge" } } },
                "template": { "spec": { "type": "ClusterIP", "ports": [{ "port": 80 }] } }
            }
        });
        let view = FederatedServiceView::from_value(SourceKind::FederatedService, &obj)
            .expect("Should convert");
        assert!(view.placement.and_then(|p| p.cluster_selector).is_some());
        let spec = view.template.and_then(|t| t.spec).expect("service spec");
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    }

    #[test]
    fn test_parse_cpu_milli() {
        assert_eq!(parse_cpu_milli("250m"), Some(250));
        assert_eq!(parse_cpu_milli("1"), Some(1000));
        assert_eq!(parse_cpu_milli("0.1"), Some(100));
        assert_eq!(parse_cpu_milli("1.0005"), Some(1001), "Should round up");
        assert_eq!(parse_cpu_milli("2k"), Some(2_000_000));
        assert_eq!(parse_cpu_milli("1e3m"), Some(1000));
        assert_eq!(parse_cpu_milli("0.3"), Some(300));
        assert_eq!(parse_cpu_milli("1n"), Some(1), "Sub-milli requests round up");
        assert_eq!(parse_cpu_milli("1500u"), Some(2));
        assert_eq!(parse_cpu_milli("2P"), Some(2_000_000_000_000_000_000));
        assert_eq!(parse_cpu_milli("1E"), None, "Out of i64 range");
        assert_eq!(parse_cpu_milli("abc"), None);
        assert_eq!(parse_cpu_milli("-1"), None);
        assert_eq!(parse_cpu_milli(""), None);
    }

    #[test]
    fn test_cpu_total_overflow_is_conversion_error() {
        let obj = fdeploy(json!({
            "template": {
                "spec": {
                    "template": {
                        "spec": {
                            "containers": [
                                { "name": "a", "resources": { "requests": { "cpu": "9e15" } } },
                                { "name": "b", "resources": { "requests": { "cpu": "9e15" } } }
                            ]
                        }
                    }
                }
            }
        }));
        let view = FederatedDeploymentView::from_value(SourceKind::FederatedDeployment, &obj)
            .expect("Should convert");
        assert!(matches!(view.total_cpu_request_milli(), Err(ControllerError::Conversion(_))));
    }
}
