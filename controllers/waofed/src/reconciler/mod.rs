//! Reconciliation of federated sources into preference objects.
//!
//! This module is organized by derived kind:
//! - `rsp`: FederatedDeployment -> ReplicaSchedulingPreference
//! - `slp`: FederatedService -> ServiceLoadbalancingPreference
//!
//! Both share the pass skeleton implemented here: load the policy snapshot,
//! load the source, decide scope, resolve candidates, then either upsert the
//! preference or run the cleanup path.

pub mod rsp;
pub mod slp;


use crate::backoff::BackoffRegistry;
use crate::candidates::resolve_candidates;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::optimizer::{Optimizer, WeightMap};
use crate::ownership::{is_controlled_by, set_controller_reference};
use crate::store::FederationStore;
use crate::view::SourceKind;
use async_trait::async_trait;
use crds::{GenericPlacementFields, PolicyKind, PolicySettings};
use estimator_client::EstimatorProvider;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::core::NamespaceResourceScope;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Label recording which controller manages a preference object
pub const CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";

/// Attempts per upsert before a write conflict is reported
const MAX_UPSERT_ATTEMPTS: usize = 5;

/// A derived preference kind the reconciler can write.
#[async_trait]
pub trait Preference:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + PartialEq + Send + Sync + 'static
{
    type Spec: Clone + Send + Sync;

    /// Value of the created-by label
    const CONTROLLER_NAME: &'static str;

    fn with_spec(namespace: &str, name: &str, spec: Self::Spec) -> Self;
    fn set_spec(&mut self, spec: Self::Spec);

    async fn fetch(store: &dyn FederationStore, namespace: &str, name: &str)
        -> Result<Option<Self>, ControllerError>;
    async fn create(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError>;
    async fn replace(store: &dyn FederationStore, obj: &Self) -> Result<(), ControllerError>;
    async fn delete(store: &dyn FederationStore, namespace: &str, name: &str) -> Result<(), ControllerError>;
}

/// Policy values a pass works from, read once at its start.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub kubefed_namespace: String,
    pub policy: PolicySettings,
}

/// Reconciles federated sources into preference objects.
pub struct Reconciler {
    pub(crate) store: Arc<dyn FederationStore>,
    pub(crate) estimators: Arc<dyn EstimatorProvider>,
    pub(crate) config: ControllerConfig,
    /// Per-object retry delays (kind/namespace/name -> backoff)
    pub(crate) backoff: BackoffRegistry,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn FederationStore>,
        estimators: Arc<dyn EstimatorProvider>,
        config: ControllerConfig,
    ) -> Self {
        let backoff = BackoffRegistry::new(config.backoff_min, config.backoff_max);
        Self {
            store,
            estimators,
            config,
            backoff,
        }
    }

    /// Runs one pass for `kind` `namespace/name` under the pass deadline.
    pub async fn reconcile(&self, kind: SourceKind, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let pass = async {
            match kind {
                SourceKind::FederatedDeployment => self.reconcile_federated_deployment(namespace, name).await,
                SourceKind::FederatedService => self.reconcile_federated_service(namespace, name).await,
            }
        };
        let deadline = self.config.reconcile_timeout;
        tokio::time::timeout(deadline, pass)
            .await
            .map_err(|_| ControllerError::Timeout(deadline))?
    }

    /// The sub-policy governing `kind`, with defaults applied.
    ///
    /// `None` when the WAOFedConfig or the sub-policy is absent.
    pub(crate) async fn load_policy(&self, kind: PolicyKind) -> Result<Option<PolicySnapshot>, ControllerError> {
        let Some(mut config) = self.store.get_config(&self.config.config_name).await? else {
            debug!("WAOFedConfig {} not found", self.config.config_name);
            return Ok(None);
        };
        config.apply_defaults();
        let Some(policy) = config.spec.policy(kind).cloned() else {
            debug!("WAOFedConfig {} has no {} policy", self.config.config_name, kind.path());
            return Ok(None);
        };
        config
            .validate_kubefed_namespace()
            .map_err(|e| ControllerError::InvalidConfig(format!("WAOFedConfig {}: {e}", self.config.config_name)))?;
        Ok(Some(PolicySnapshot {
            kubefed_namespace: config.spec.kubefed_namespace,
            policy,
        }))
    }

    /// Candidate clusters for a source's placement.
    pub(crate) async fn candidates(
        &self,
        kubefed_namespace: &str,
        placement: Option<&GenericPlacementFields>,
    ) -> Result<Vec<String>, ControllerError> {
        let registered = self.store.list_clusters(kubefed_namespace).await?;
        let candidates = resolve_candidates(placement, &registered)?;
        debug!("Candidate clusters: {:?}", candidates);
        Ok(candidates)
    }

    pub(crate) fn optimizer(&self) -> Optimizer<'_> {
        Optimizer {
            estimators: self.estimators.as_ref(),
            estimator_timeout: self.config.estimator_timeout,
        }
    }

    /// Creates or updates the preference `namespace/name` controlled by `owner`.
    pub(crate) async fn upsert<P: Preference>(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        name: &str,
        spec: P::Spec,
    ) -> Result<(), ControllerError> {
        let mut attempt = 1;
        loop {
            match self.try_upsert::<P>(owner, namespace, name, spec.clone()).await {
                Err(ControllerError::UpsertConflict(msg)) if attempt < MAX_UPSERT_ATTEMPTS => {
                    debug!(
                        "Conflict writing {} {}/{} (attempt {}): {}",
                        P::kind(&()),
                        namespace,
                        name,
                        attempt,
                        msg
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_upsert<P: Preference>(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        name: &str,
        spec: P::Spec,
    ) -> Result<(), ControllerError> {
        let kind = P::kind(&());
        let current = P::fetch(self.store.as_ref(), namespace, name).await?;

        let mut desired = match &current {
            Some(obj) => obj.clone(),
            None => P::with_spec(namespace, name, spec.clone()),
        };
        desired
            .meta_mut()
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(CREATED_BY_LABEL.to_string(), P::CONTROLLER_NAME.to_string());
        desired.set_spec(spec);
        set_controller_reference(desired.meta_mut(), owner.clone(), &kind)?;

        match current {
            None => {
                P::create(self.store.as_ref(), &desired).await?;
                info!("Created {} {}/{}", kind, namespace, name);
            }
            Some(obj) if obj == desired => {
                debug!("{} {}/{} is up to date", kind, namespace, name);
            }
            Some(_) => {
                P::replace(self.store.as_ref(), &desired).await?;
                info!("Updated {} {}/{}", kind, namespace, name);
            }
        }
        Ok(())
    }

    /// Deletes the preference `namespace/name` if `owner` controls it.
    pub(crate) async fn cleanup<P: Preference>(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let kind = P::kind(&());
        let Some(current) = P::fetch(self.store.as_ref(), namespace, name).await? else {
            return Ok(());
        };
        if !is_controlled_by(current.meta(), owner) {
            debug!(
                "{} {}/{} is not controlled by {} {}, leaving it",
                kind, namespace, name, owner.kind, owner.name
            );
            return Ok(());
        }
        P::delete(self.store.as_ref(), namespace, name).await?;
        info!("Deleted {} {}/{}", kind, namespace, name);
        Ok(())
    }
}

/// Controlling reference of a source known only by kind and name.
pub(crate) fn source_reference(kind: SourceKind, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: kind.gvk().api_version(),
        kind: kind.as_str().to_string(),
        name: name.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..Default::default()
    }
}

/// Weights as the `(cluster, weight)` pairs preference specs store.
pub(crate) fn weights_of(weights: &WeightMap) -> impl Iterator<Item = (String, i64)> + '_ {
    weights.iter().map(|(cluster, w)| (cluster.clone(), w.weight))
}
