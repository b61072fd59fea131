//! WAOFedConfig CRD
//!
//! Cluster-scoped singleton holding the scheduling and load-balancing policies.
//! The object is only honoured when it is named [`WAOFED_CONFIG_NAME`].

use crate::error::PolicyError;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Operator name, used as the prefix of every controller name
pub const OPERATOR_NAME: &str = "waofed";

/// Well-known name of the singleton policy object
pub const WAOFED_CONFIG_NAME: &str = "default";

/// Opt-in annotation for FederatedDeployments when the policy does not name one
pub const DEFAULT_SCHEDULING_ANNOTATION: &str = "waofed.bitmedia.co.jp/scheduling";

/// Opt-in annotation for FederatedServices when the policy does not name one
pub const DEFAULT_LOADBALANCING_ANNOTATION: &str = "waofed.bitmedia.co.jp/loadbalancing";

/// Estimator namespace used when an entry leaves it empty
pub const DEFAULT_ESTIMATOR_NAMESPACE: &str = "default";

/// Estimator name used when an entry leaves it empty
pub const DEFAULT_ESTIMATOR_NAME: &str = "default";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "waofed.bitmedia.co.jp",
    version = "v1beta1",
    kind = "WAOFedConfig",
    shortname = "wfc"
)]
#[serde(rename_all = "camelCase")]
pub struct WAOFedConfigSpec {
    /// Namespace where KubeFedCluster objects are registered
    #[serde(default)]
    pub kubefed_namespace: String,

    /// Policy for FederatedDeployments (ReplicaSchedulingPreference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<PolicySettings>,

    /// Policy for FederatedServices (ServiceLoadbalancingPreference)
    #[serde(default, rename = "loadbalancing", skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<PolicySettings>,
}

/// One sub-policy: which sources are in scope and how weights are computed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ResourceSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerSettings>,
}

/// Selects the source objects a sub-policy applies to.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    /// Select every source regardless of annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<bool>,

    /// Select sources carrying this annotation key (the value is ignored)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_annotation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerSettings {
    /// Optimizer method: `rr` or `wao`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Per-cluster WAO estimator settings, keyed by KubeFedCluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wao_estimators: Option<BTreeMap<String, WaoEstimatorSetting>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaoEstimatorSetting {
    /// Base URL of the estimator service (e.g. `http://estimator.cluster1:5656`)
    pub endpoint: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,
}

/// Optimizer methods understood by the controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizerMethod {
    /// Weight 1 for every candidate cluster
    RoundRobin,
    /// Least power-consumption distribution computed from WAO estimators
    Wao,
}

impl OptimizerMethod {
    /// Wire name of the method as written in the policy object
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "rr",
            Self::Wao => "wao",
        }
    }
}

impl fmt::Display for OptimizerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rr" => Ok(Self::RoundRobin),
            "wao" => Ok(Self::Wao),
            other => Err(other.to_string()),
        }
    }
}

/// The two sub-policies of a `WAOFedConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// `spec.scheduling`, applied to FederatedDeployments
    Scheduling,
    /// `spec.loadbalancing`, applied to FederatedServices
    LoadBalancing,
}

impl PolicyKind {
    /// JSON path of the sub-policy, used in validation messages
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Scheduling => "spec.scheduling",
            Self::LoadBalancing => "spec.loadbalancing",
        }
    }

    /// Annotation key used when the selector does not name one
    #[must_use]
    pub fn default_annotation(self) -> &'static str {
        match self {
            Self::Scheduling => DEFAULT_SCHEDULING_ANNOTATION,
            Self::LoadBalancing => DEFAULT_LOADBALANCING_ANNOTATION,
        }
    }
}

impl WAOFedConfigSpec {
    /// Returns the sub-policy for `kind`, if configured.
    #[must_use]
    pub fn policy(&self, kind: PolicyKind) -> Option<&PolicySettings> {
        match kind {
            PolicyKind::Scheduling => self.scheduling.as_ref(),
            PolicyKind::LoadBalancing => self.load_balancing.as_ref(),
        }
    }
}

impl PolicySettings {
    /// Fills every unset field with its default.
    pub fn apply_defaults(&mut self, kind: PolicyKind) {
        let selector = self.selector.get_or_insert_with(ResourceSelector::default);
        selector.any.get_or_insert(false);
        selector
            .has_annotation
            .get_or_insert_with(|| kind.default_annotation().to_string());

        let optimizer = self.optimizer.get_or_insert_with(OptimizerSettings::default);
        let method = optimizer
            .method
            .get_or_insert_with(|| OptimizerMethod::RoundRobin.as_str().to_string());

        if method.as_str() == OptimizerMethod::Wao.as_str() {
            for setting in optimizer.wao_estimators.iter_mut().flat_map(BTreeMap::values_mut) {
                if setting.namespace.is_empty() {
                    setting.namespace = DEFAULT_ESTIMATOR_NAMESPACE.to_string();
                }
                if setting.name.is_empty() {
                    setting.name = DEFAULT_ESTIMATOR_NAME.to_string();
                }
            }
        }
    }

    /// Parsed optimizer method; `rr` when the field is unset.
    ///
    /// # Errors
    ///
    /// Returns the raw string when it does not name a known method.
    pub fn method(&self) -> Result<OptimizerMethod, String> {
        match self.optimizer.as_ref().and_then(|o| o.method.as_deref()) {
            Some(raw) => raw.parse(),
            None => Ok(OptimizerMethod::RoundRobin),
        }
    }

    /// Estimator settings for the cost-driven optimizer (empty when unset).
    #[must_use]
    pub fn estimators(&self) -> BTreeMap<String, WaoEstimatorSetting> {
        self.optimizer
            .as_ref()
            .and_then(|o| o.wao_estimators.clone())
            .unwrap_or_default()
    }

    fn validate(&self, kind: PolicyKind) -> Result<(), PolicyError> {
        let method = self.method().map_err(|method| PolicyError::UnknownMethod {
            path: format!("{}.optimizer.method", kind.path()),
            method,
        })?;

        if method == OptimizerMethod::Wao {
            let path = format!("{}.optimizer.waoEstimators", kind.path());
            validate_estimators(&self.estimators(), &path)?;
        }
        Ok(())
    }
}

fn validate_estimators(
    estimators: &BTreeMap<String, WaoEstimatorSetting>,
    path: &str,
) -> Result<(), PolicyError> {
    if estimators.is_empty() {
        return Err(PolicyError::NoEstimators(path.to_string()));
    }
    for (cluster, setting) in estimators {
        if cluster.is_empty() {
            return Err(PolicyError::EmptyEstimatorKey(path.to_string()));
        }
        let invalid = |reason: String| PolicyError::InvalidEndpoint {
            path: path.to_string(),
            cluster: cluster.clone(),
            reason,
        };
        let parsed = url::Url::parse(&setting.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
        }
    }
    Ok(())
}

impl WAOFedConfig {
    /// Applies defaults to every configured sub-policy.
    pub fn apply_defaults(&mut self) {
        if let Some(p) = self.spec.scheduling.as_mut() {
            p.apply_defaults(PolicyKind::Scheduling);
        }
        if let Some(p) = self.spec.load_balancing.as_mut() {
            p.apply_defaults(PolicyKind::LoadBalancing);
        }
    }

    /// Fails when no KubeFed control-plane namespace is set.
    pub fn validate_kubefed_namespace(&self) -> Result<(), PolicyError> {
        if self.spec.kubefed_namespace.is_empty() {
            return Err(PolicyError::MissingKubeFedNamespace);
        }
        Ok(())
    }

    /// Checks the object the way admission does.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyError`] found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let name = self.metadata.name.as_deref().unwrap_or_default();
        if name != WAOFED_CONFIG_NAME {
            return Err(PolicyError::InvalidName {
                expected: WAOFED_CONFIG_NAME.to_string(),
                actual: name.to_string(),
            });
        }
        self.validate_kubefed_namespace()?;
        if let Some(p) = &self.spec.scheduling {
            p.validate(PolicyKind::Scheduling)?;
        }
        if let Some(p) = &self.spec.load_balancing {
            p.validate(PolicyKind::LoadBalancing)?;
        }
        Ok(())
    }
}
