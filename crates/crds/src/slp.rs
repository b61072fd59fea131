//! ServiceLoadbalancingPreference CRD
//!
//! Per-cluster traffic weights for a FederatedService. Consumers normalize the
//! weights; a cluster absent from the map receives no traffic.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "waofed.bitmedia.co.jp",
    version = "v1beta1",
    kind = "ServiceLoadbalancingPreference",
    shortname = "slp",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLoadbalancingPreferenceSpec {
    /// Cluster name to weight. `"*"` applies to clusters without an explicit entry.
    pub clusters: BTreeMap<String, SlpClusterPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlpClusterPreferences {
    /// Signed 64-bit weight
    pub weight: i64,
}
