//! Object store seam between the reconcilers and the Kubernetes API.
//!
//! Reconcilers read and write through [`FederationStore`] so tests can swap in
//! an in-memory store. Writes use optimistic concurrency: `replace_*` sends the
//! `resourceVersion` the caller read and a stale one fails with
//! [`ControllerError::UpsertConflict`].

use crate::error::ControllerError;
use crate::view::SourceKind;
use async_trait::async_trait;
use crds::{KubeFedCluster, ReplicaSchedulingPreference, ServiceLoadbalancingPreference, WAOFedConfig};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::core::{DynamicObject, NamespaceResourceScope};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

/// Reads and writes the objects a reconcile pass touches.
#[async_trait]
pub trait FederationStore: Send + Sync {
    /// Cluster-scoped WAOFedConfig by name
    async fn get_config(&self, name: &str) -> Result<Option<WAOFedConfig>, ControllerError>;

    /// A federated source as a schema-less JSON object
    async fn get_source(
        &self,
        kind: SourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, ControllerError>;

    /// KubeFedClusters registered in `namespace`
    async fn list_clusters(&self, namespace: &str) -> Result<Vec<KubeFedCluster>, ControllerError>;

    async fn get_rsp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicaSchedulingPreference>, ControllerError>;
    async fn create_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError>;
    async fn replace_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError>;
    async fn delete_rsp(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    async fn get_slp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceLoadbalancingPreference>, ControllerError>;
    async fn create_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError>;
    async fn replace_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError>;
    async fn delete_slp(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;
}

/// [`FederationStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Maps write failures: 409 becomes [`ControllerError::UpsertConflict`].
fn write_error(what: &str, err: kube::Error) -> ControllerError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => {
            ControllerError::UpsertConflict(format!("{what}: {}", ae.message))
        }
        e => ControllerError::Kube(e),
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

async fn create_in<K>(api: Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let key = object_key(obj);
    api.create(&PostParams::default(), obj)
        .await
        .map_err(|e| write_error(&format!("create {key}"), e))?;
    debug!("Created {}", key);
    Ok(())
}

async fn replace_in<K>(api: Api<K>, obj: &K) -> Result<(), ControllerError>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let key = object_key(obj);
    let name = obj.meta().name.clone().unwrap_or_default();
    api.replace(&name, &PostParams::default(), obj)
        .await
        .map_err(|e| write_error(&format!("replace {key}"), e))?;
    debug!("Replaced {}", key);
    Ok(())
}

async fn delete_in<K>(api: Api<K>, namespace: &str, name: &str) -> Result<(), ControllerError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!("Deleted {}/{}", namespace, name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

#[async_trait]
impl FederationStore for KubeStore {
    async fn get_config(&self, name: &str) -> Result<Option<WAOFedConfig>, ControllerError> {
        let api: Api<WAOFedConfig> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_source(
        &self,
        kind: SourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>, ControllerError> {
        let ar = kind.api_resource();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        match api.get_opt(name).await? {
            Some(obj) => serde_json::to_value(&obj)
                .map(Some)
                .map_err(|e| ControllerError::Conversion(format!("could not encode {}: {e}", kind.as_str()))),
            None => Ok(None),
        }
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<KubeFedCluster>, ControllerError> {
        let api: Api<KubeFedCluster> = self.namespaced(namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_rsp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicaSchedulingPreference>, ControllerError> {
        let api: Api<ReplicaSchedulingPreference> = self.namespaced(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError> {
        let ns = rsp.meta().namespace.clone().unwrap_or_default();
        create_in(self.namespaced(&ns), rsp).await
    }

    async fn replace_rsp(&self, rsp: &ReplicaSchedulingPreference) -> Result<(), ControllerError> {
        let ns = rsp.meta().namespace.clone().unwrap_or_default();
        replace_in(self.namespaced(&ns), rsp).await
    }

    async fn delete_rsp(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        delete_in::<ReplicaSchedulingPreference>(self.namespaced(namespace), namespace, name).await
    }

    async fn get_slp(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceLoadbalancingPreference>, ControllerError> {
        let api: Api<ServiceLoadbalancingPreference> = self.namespaced(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError> {
        let ns = slp.meta().namespace.clone().unwrap_or_default();
        create_in(self.namespaced(&ns), slp).await
    }

    async fn replace_slp(&self, slp: &ServiceLoadbalancingPreference) -> Result<(), ControllerError> {
        let ns = slp.meta().namespace.clone().unwrap_or_default();
        replace_in(self.namespaced(&ns), slp).await
    }

    async fn delete_slp(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        delete_in::<ServiceLoadbalancingPreference>(self.namespaced(namespace), namespace, name).await
    }
}
