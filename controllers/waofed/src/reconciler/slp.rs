//! FederatedService -> ServiceLoadbalancingPreference.

use super::{Preference, Reconciler, source_reference, weights_of};
use crate::error::ControllerError;
use crate::optimizer::WeightMap;
use crate::ownership::controller_reference;
use crate::scope::in_scope;
use crate::store::FederationStore;
use crate::view::{FederatedServiceView, SourceKind};
use async_trait::async_trait;
use crds::{ServiceLoadbalancingPreference, ServiceLoadbalancingPreferenceSpec, SlpClusterPreferences};
use tracing::{debug, info};

#[async_trait]
impl Preference for ServiceLoadbalancingPreference {
    type Spec = ServiceLoadbalancingPreferenceSpec;

    const CONTROLLER_NAME: &'static str = "waofed-slpoptimizer-controller";

    fn with_spec(namespace: &str, name: &str, spec: Self::Spec) -> Self {
        let mut slp = ServiceLoadbalancingPreference::new(name, spec);
        slp.metadata.namespace = Some(namespace.to_string());
        slp
    }

    fn set_spec(&mut self, spec: Self::Spec) {
        self.spec = spec;
    }

    async fn fetch(
        store: &dyn FederationStore,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Self>, ControllerError> {
        store.get_slp(namespace, name).await
    }

    async fn create(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError> {
        store.create_slp(obj).await
    }

    async fn replace(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError> {
        store.replace_slp(obj).await
    }

    async fn delete(store: &dyn FederationStore, namespace: &str, name: &str) -> Result<(), ControllerError> {
        store.delete_slp(namespace, name).await
    }
}

/// Preference spec carrying `weights` as traffic weights.
pub fn slp_spec(weights: &WeightMap) -> ServiceLoadbalancingPreferenceSpec {
    ServiceLoadbalancingPreferenceSpec {
        clusters: weights_of(weights)
            .map(|(cluster, weight)| (cluster, SlpClusterPreferences { weight }))
            .collect(),
    }
}

impl Reconciler {
    /// Reconciles the ServiceLoadbalancingPreference of FederatedService `namespace/name`.
    pub async fn reconcile_federated_service(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling FederatedService {}/{}", namespace, name);
        let kind = SourceKind::FederatedService;
        let gone = source_reference(kind, name);

        let Some(snapshot) = self.load_policy(kind.policy_kind()).await? else {
            return self.cleanup::<ServiceLoadbalancingPreference>(&gone, namespace, name).await;
        };
        let Some(raw) = self.store.get_source(kind, namespace, name).await? else {
            info!("FederatedService {}/{} not found, cleaning up", namespace, name);
            return self.cleanup::<ServiceLoadbalancingPreference>(&gone, namespace, name).await;
        };
        let view = FederatedServiceView::from_value(kind, &raw)?;
        debug!("Loaded {} {}/{}", view.kind.as_str(), view.namespace(), view.name());
        let owner = controller_reference(&view.api_version, view.kind.as_str(), &view.metadata);

        if !in_scope(&view.annotations(), snapshot.policy.selector.as_ref()) {
            info!("FederatedService {}/{} is out of scope", namespace, name);
            return self.cleanup::<ServiceLoadbalancingPreference>(&owner, namespace, name).await;
        }

        let clusters = self.candidates(&snapshot.kubefed_namespace, view.placement.as_ref()).await?;
        let weights = self
            .optimizer()
            .optimize(kind.policy_kind(), &snapshot.policy, &clusters, None)
            .await?;

        self.upsert::<ServiceLoadbalancingPreference>(&owner, namespace, name, slp_spec(&weights))
            .await
    }
}
