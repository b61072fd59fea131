//! FederatedDeployment -> ReplicaSchedulingPreference.

use super::{Preference, Reconciler, source_reference};
use crate::error::ControllerError;
use crate::optimizer::{WeightMap, WorkloadDemand};
use crate::ownership::controller_reference;
use crate::scope::in_scope;
use crate::store::FederationStore;
use crate::view::{FederatedDeploymentView, SourceKind};
use async_trait::async_trait;
use crds::{
    ClusterPreferences, FEDERATED_DEPLOYMENT_KIND, OptimizerMethod, ReplicaSchedulingPreference,
    ReplicaSchedulingPreferenceSpec,
};
use tracing::{debug, info};

#[async_trait]
impl Preference for ReplicaSchedulingPreference {
    type Spec = ReplicaSchedulingPreferenceSpec;

    const CONTROLLER_NAME: &'static str = "waofed-rspoptimizer-controller";

    fn with_spec(namespace: &str, name: &str, spec: Self::Spec) -> Self {
        let mut rsp = ReplicaSchedulingPreference::new(name, spec);
        rsp.metadata.namespace = Some(namespace.to_string());
        rsp
    }

    fn set_spec(&mut self, spec: Self::Spec) {
        self.spec = spec;
    }

    async fn fetch(
        store: &dyn FederationStore,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, ControllerError> {
        store.get_rsp(namespace, name).await
    }

    async fn create(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError> {
        store.create_rsp(obj).await
    }

    async fn replace(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError> {
        store.replace_rsp(obj).await
    }

    async fn delete(store: &dyn FederationStore, namespace: &str, name: &str) -> Result<(), ControllerError> {
        store.delete_rsp(namespace, name).await
    }
}

/// Preference spec for `total_replicas` spread by `weights`.
pub fn rsp_spec(total_replicas: i32, weights: &WeightMap) -> ReplicaSchedulingPreferenceSpec {
    ReplicaSchedulingPreferenceSpec {
        target_kind: FEDERATED_DEPLOYMENT_KIND.to_string(),
        total_replicas,
        rebalance: true,
        clusters: weights
            .iter()
            .map(|(cluster, w)| {
                (
                    cluster.clone(),
                    ClusterPreferences {
                        min_replicas: w.min_replicas.unwrap_or_default(),
                        max_replicas: w.max_replicas,
                        weight: w.weight,
                    },
                )
            })
            .collect(),
        intersect_with_cluster_selector: true,
    }
}

impl Reconciler {
    /// Reconciles the ReplicaSchedulingPreference of FederatedDeployment `namespace/name`.
    pub async fn reconcile_federated_deployment(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling FederatedDeployment {}/{}", namespace, name);
        let kind = SourceKind::FederatedDeployment;
        let gone = source_reference(kind, name);

        let Some(snapshot) = self.load_policy(kind.policy_kind()).await? else {
            return self.cleanup::<ReplicaSchedulingPreference>(&gone, namespace, name).await;
        };
        let Some(raw) = self.store.get_source(kind, namespace, name).await? else {
            info!("FederatedDeployment {}/{} not found, cleaning up", namespace, name);
            return self.cleanup::<ReplicaSchedulingPreference>(&gone, namespace, name).await;
        };
        let view = FederatedDeploymentView::from_value(kind, &raw)?;
        debug!("Loaded {} {}/{}", view.kind.as_str(), view.namespace(), view.name());
        let owner = controller_reference(&view.api_version, view.kind.as_str(), &view.metadata);

        if !in_scope(&view.annotations(), snapshot.policy.selector.as_ref()) {
            info!("FederatedDeployment {}/{} is out of scope", namespace, name);
            return self.cleanup::<ReplicaSchedulingPreference>(&owner, namespace, name).await;
        }

        let total_replicas = view.replicas().ok_or_else(|| {
            ControllerError::Conversion(format!("FederatedDeployment {namespace}/{name} has no template"))
        })?;
        let demand = match snapshot.policy.method() {
            Ok(OptimizerMethod::Wao) => Some(WorkloadDemand {
                cpu_milli: view.total_cpu_request_milli()?,
                replicas: total_replicas,
            }),
            _ => None,
        };

        let clusters = self.candidates(&snapshot.kubefed_namespace, view.placement.as_ref()).await?;
        let weights = self
            .optimizer()
            .optimize(kind.policy_kind(), &snapshot.policy, &clusters, demand)
            .await?;

        self.upsert::<ReplicaSchedulingPreference>(&owner, namespace, name, rsp_spec(total_replicas, &weights))
            .await
    }
}
