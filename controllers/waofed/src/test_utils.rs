//! Test utilities for unit testing reconcilers
//!
//! Builders for the objects a pass reads, plus [`MockStore`], an in-memory
//! [`FederationStore`] with resource versions and injectable write conflicts.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::FederationStore;
use crate::view::SourceKind;
use async_trait::async_trait;
use crds::*;
use estimator_client::MockEstimatorProvider;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "apps";
pub const KUBEFED_NAMESPACE: &str = "kube-federation-system";

/// Helper to create a ready KubeFedCluster with labels
pub fn create_test_cluster(name: &str, labels: &[(&str, &str)]) -> KubeFedCluster {
    let mut cluster = KubeFedCluster::new(
        name,
        KubeFedClusterSpec {
            api_endpoint: format!("https://{name}.example.com:6443"),
            ..Default::default()
        },
    );
    cluster.metadata.namespace = Some(KUBEFED_NAMESPACE.to_string());
    cluster.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    );
    cluster.status = Some(KubeFedClusterStatus {
        conditions: vec![ClusterCondition {
            type_: CLUSTER_READY_CONDITION.to_string(),
            status: "True".to_string(),
            reason: Some("ClusterReady".to_string()),
            message: None,
        }],
        ..Default::default()
    });
    cluster
}

/// Helper to create a WAOFedConfig named `default`
pub fn create_test_config(
    scheduling: Option<PolicySettings>,
    load_balancing: Option<PolicySettings>,
) -> WAOFedConfig {
    WAOFedConfig::new(
        WAOFED_CONFIG_NAME,
        WAOFedConfigSpec {
            kubefed_namespace: KUBEFED_NAMESPACE.to_string(),
            scheduling,
            load_balancing,
        },
    )
}

/// Policy selecting sources annotated with `annotation`, uniform weights
pub fn annotation_policy(annotation: &str) -> PolicySettings {
    PolicySettings {
        selector: Some(ResourceSelector {
            any: Some(false),
            has_annotation: Some(annotation.to_string()),
        }),
        optimizer: Some(OptimizerSettings {
            method: Some("rr".to_string()),
            wao_estimators: None,
        }),
    }
}

/// Policy selecting every source, cost-driven over `clusters`
pub fn wao_policy(clusters: &[&str]) -> PolicySettings {
    let estimators = clusters
        .iter()
        .map(|c| {
            (
                (*c).to_string(),
                WaoEstimatorSetting {
                    endpoint: format!("http://estimator.{c}:5656"),
                    namespace: String::new(),
                    name: String::new(),
                },
            )
        })
        .collect();
    PolicySettings {
        selector: Some(ResourceSelector {
            any: Some(true),
            has_annotation: None,
        }),
        optimizer: Some(OptimizerSettings {
            method: Some("wao".to_string()),
            wao_estimators: Some(estimators),
        }),
    }
}

fn annotation_map(annotations: &[(&str, &str)]) -> BTreeMap<String, String> {
    annotations
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn placement(clusters: &[&str]) -> Value {
    json!({ "clusters": clusters.iter().map(|c| json!({ "name": c })).collect::<Vec<_>>() })
}

/// Helper to create a schema-less FederatedDeployment with `replicas` pods of 500m CPU
pub fn create_test_fdeploy_value(
    name: &str,
    annotations: &[(&str, &str)],
    clusters: &[&str],
    replicas: i32,
) -> Value {
    json!({
        "apiVersion": "types.kubefed.io/v1beta1",
        "kind": "FederatedDeployment",
        "metadata": {
            "name": name,
            "namespace": TEST_NAMESPACE,
            "uid": format!("uid-{name}"),
            "annotations": annotation_map(annotations),
        },
        "spec": {
            "placement": placement(clusters),
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": {
                    "replicas": replicas,
                    "template": {
                        "metadata": { "labels": { "app": name } },
                        "spec": {
                            "containers": [{
                                "name": "app",
                                "image": "nginx:1.25",
                                "resources": { "requests": { "cpu": "500m" } }
                            }]
                        }
                    }
                }
            }
        }
    })
}

/// Helper to create a schema-less FederatedService
pub fn create_test_fsvc_value(name: &str, annotations: &[(&str, &str)], clusters: &[&str]) -> Value {
    json!({
        "apiVersion": "types.kubefed.io/v1beta1",
        "kind": "FederatedService",
        "metadata": {
            "name": name,
            "namespace": TEST_NAMESPACE,
            "uid": format!("uid-{name}"),
            "annotations": annotation_map(annotations),
        },
        "spec": {
            "placement": placement(clusters),
            "template": {
                "spec": {
                    "selector": { "app": name },
                    "ports": [{ "port": 80, "targetPort": 8080 }]
                }
            }
        }
    })
}

/// Controlling owner reference of a test source
pub fn source_owner(kind: SourceKind, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: kind.gvk().api_version(),
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Reconciler over `store` and `estimators` with short test deadlines
pub fn create_test_reconciler(store: &MockStore, estimators: &MockEstimatorProvider) -> Reconciler {
    let config = ControllerConfig {
        reconcile_timeout: Duration::from_secs(5),
        estimator_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    Reconciler::new(Arc::new(store.clone()), Arc::new(estimators.clone()), config)
}

type Key = (String, String);

#[derive(Default)]
struct MockState {
    config: Option<WAOFedConfig>,
    sources: HashMap<(SourceKind, String, String), Value>,
    clusters: Vec<KubeFedCluster>,
    rsps: HashMap<Key, ReplicaSchedulingPreference>,
    slps: HashMap<Key, ServiceLoadbalancingPreference>,
    version: u64,
    writes: usize,
    conflicts: usize,
}

impl MockState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Consumes one injected conflict, counting the write otherwise.
    fn begin_write(&mut self, what: &str) -> Result<(), ControllerError> {
        if self.conflicts > 0 {
            self.conflicts -= 1;
            return Err(ControllerError::UpsertConflict(format!("{what}: injected conflict")));
        }
        self.writes += 1;
        Ok(())
    }
}

/// In-memory [`FederationStore`].
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock store lock poisoned")
    }

    pub fn set_config(&self, config: Option<WAOFedConfig>) {
        self.state().config = config;
    }

    pub fn set_clusters(&self, clusters: Vec<KubeFedCluster>) {
        self.state().clusters = clusters;
    }

    pub fn put_source(&self, kind: SourceKind, source: Value) {
        let namespace = source["metadata"]["namespace"].as_str().unwrap_or_default().to_string();
        let name = source["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.state().sources.insert((kind, namespace, name), source);
    }

    pub fn remove_source(&self, kind: SourceKind, name: &str) {
        self.state()
            .sources
            .remove(&(kind, TEST_NAMESPACE.to_string(), name.to_string()));
    }

    /// Stores a preference directly, bypassing write accounting
    pub fn seed_rsp(&self, mut rsp: ReplicaSchedulingPreference) {
        let mut state = self.state();
        rsp.metadata.resource_version = Some(state.next_version());
        state.rsps.insert(key_of(&rsp), rsp);
    }

    pub fn seed_slp(&self, mut slp: ServiceLoadbalancingPreference) {
        let mut state = self.state();
        slp.metadata.resource_version = Some(state.next_version());
        state.slps.insert(key_of(&slp), slp);
    }

    pub fn rsp(&self, name: &str) -> Option<ReplicaSchedulingPreference> {
        self.state()
            .rsps
            .get(&(TEST_NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn slp(&self, name: &str) -> Option<ServiceLoadbalancingPreference> {
        self.state()
            .slps
            .get(&(TEST_NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of successful create/replace/delete calls
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Fail the next `n` writes with a conflict
    pub fn inject_conflicts(&self, n: usize) {
        self.state().conflicts = n;
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn create_in<K: Resource + Clone>(
    state: &mut MockState,
    map: fn(&mut MockState) -> &mut HashMap<Key, K>,
    obj: &K,
) -> Result<(), ControllerError> {
    let key = key_of(obj);
    if map(state).contains_key(&key) {
        return Err(ControllerError::UpsertConflict(format!("{}/{} already exists", key.0, key.1)));
    }
    state.begin_write("create")?;
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(state.next_version());
    map(state).insert(key, stored);
    Ok(())
}

fn replace_in<K: Resource + Clone>(
    state: &mut MockState,
    map: fn(&mut MockState) -> &mut HashMap<Key, K>,
    obj: &K,
) -> Result<(), ControllerError> {
    let key = key_of(obj);
    let current = map(state)
        .get(&key)
        .and_then(|o| o.meta().resource_version.clone());
    if current.is_none() || current != obj.meta().resource_version {
        return Err(ControllerError::UpsertConflict(format!("{}/{} has a newer version", key.0, key.1)));
    }
    state.begin_write("replace")?;
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(state.next_version());
    map(state).insert(key, stored);
    Ok(())
}

fn rsps(state: &mut MockState) -> &mut HashMap<Key, ReplicaSchedulingPreference> {
    &mut state.rsps
}

fn slps(state: &mut MockState) -> &mut HashMap<Key, ServiceLoadbalancingPreference> {
    &mut state.slps
}

#[async_trait]
impl FederationStore for MockStore {
    async fn get_config(&self, name: &str) -> Result<Option<WAOFedConfig>, ControllerError> {
        Ok(self.state().config.clone().filter(|c| c.name_any() == name))
    }

    async fn get_source(
        &self,
        kind: SourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, ControllerError> {
        Ok(self
            .state()
            .sources
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<KubeFedCluster>, ControllerError> {
        Ok(self
            .state()
            .clusters
            .iter()
            .filter(|c| c.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_rsp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicaSchedulingPreference>, ControllerError> {
        Ok(self
            .state()
            .rsps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError> {
        create_in(&mut self.state(), rsps, rsp)
    }

    async fn replace_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError> {
        replace_in(&mut self.state(), rsps, rsp)
    }

    async fn delete_rsp(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let mut state = self.state();
        state.begin_write("delete")?;
        state.rsps.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_slp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceLoadbalancingPreference>, ControllerError> {
        Ok(self
            .state()
            .slps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError> {
        create_in(&mut self.state(), slps, slp)
    }

    async fn replace_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError> {
        replace_in(&mut self.state(), slps, slp)
    }

    async fn delete_slp(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let mut state = self.state();
        state.begin_write("delete")?;
        state.slps.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}
