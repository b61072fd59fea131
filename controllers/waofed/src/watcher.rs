//! Kubernetes resource watchers.
//!
//! Each source kind runs its own `kube_runtime::Controller` over
//! `DynamicObject`s. The controller also watches the preference kind it owns,
//! so deleting a derived object re-triggers its source, and it re-reconciles
//! every source whenever the WAOFedConfig changes.

use crate::config::ControllerConfig;
use crate::error::{ControllerError, RetryPolicy};
use crate::reconciler::{Preference, Reconciler};
use crate::view::SourceKind;
use crds::{ReplicaSchedulingPreference, ServiceLoadbalancingPreference, WAOFedConfig};
use futures::StreamExt;
use futures::channel::mpsc;
use kube::core::{DynamicObject, NamespaceResourceScope};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before retrying a pass that lost a write race
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Shared state handed to the runtime's reconcile and error callbacks.
struct WatchContext {
    reconciler: Arc<Reconciler>,
    kind: SourceKind,
}

impl WatchContext {
    fn key(&self, obj: &DynamicObject) -> String {
        format!(
            "{}/{}/{}",
            self.kind.as_str(),
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        )
    }
}

async fn reconcile(obj: Arc<DynamicObject>, ctx: Arc<WatchContext>) -> Result<Action, ControllerError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    ctx.reconciler.reconcile(ctx.kind, &namespace, &name).await?;
    ctx.reconciler.backoff.reset(&ctx.key(&obj));
    Ok(Action::await_change())
}

fn error_policy(obj: Arc<DynamicObject>, err: &ControllerError, ctx: Arc<WatchContext>) -> Action {
    let key = ctx.key(&obj);
    match err.retry() {
        RetryPolicy::AwaitChange => {
            warn!("Reconciliation of {} failed, waiting for a change: {}", key, err);
            Action::await_change()
        }
        RetryPolicy::Immediate => {
            debug!("Reconciliation of {} hit a conflict, requeueing: {}", key, err);
            Action::requeue(CONFLICT_REQUEUE)
        }
        RetryPolicy::Backoff => {
            let delay = ctx.reconciler.backoff.next_for(&key);
            error!("Reconciliation of {} failed, retrying in {:?}: {}", key, delay, err);
            Action::requeue(delay)
        }
    }
}

/// Signals once per WAOFedConfig change until the watch stream ends.
fn config_changes(client: Client) -> mpsc::Receiver<()> {
    let (mut tx, rx) = mpsc::channel(1);
    let api: Api<WAOFedConfig> = Api::all(client);
    tokio::spawn(async move {
        let mut changes = watcher(api, watcher::Config::default())
            .default_backoff()
            .touched_objects()
            .boxed();
        while let Some(change) = changes.next().await {
            match change {
                Ok(config) => {
                    debug!("WAOFedConfig {} changed", config.name_any());
                    // A full channel already has a pending reconcile-all.
                    if tx.try_send(()).is_err() && tx.is_closed() {
                        break;
                    }
                }
                Err(e) => warn!("WAOFedConfig watch error: {}", e),
            }
        }
    });
    rx
}

/// Watches federated sources and drives the reconciler.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    config: ControllerConfig,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, client: Client, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            client,
            config,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn source_api(&self, kind: SourceKind) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match &self.config.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// Runs the controller for `kind`, owning preferences of type `P`.
    async fn watch_source<P>(&self, kind: SourceKind) -> Result<(), ControllerError>
    where
        P: Preference + DeserializeOwned + Debug,
    {
        info!("Starting {} watcher", kind.as_str());

        let runtime_config = RuntimeConfig::default()
            .debounce(self.config.debounce)
            .concurrency(self.config.concurrency);
        let ctx = Arc::new(WatchContext {
            reconciler: self.reconciler.clone(),
            kind,
        });

        Controller::new_with(self.source_api(kind), watcher::Config::default(), kind.api_resource())
            .owns(self.api::<P>(), watcher::Config::default())
            .reconcile_all_on(config_changes(self.client.clone()))
            .with_config(runtime_config)
            .run(reconcile, error_policy, ctx)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!(
                        "Reconciled {} {}/{}",
                        kind.as_str(),
                        obj.namespace.unwrap_or_default(),
                        obj.name
                    ),
                    Err(e) => debug!("Controller error for {}: {}", kind.as_str(), e),
                }
            })
            .await;

        Ok(())
    }

    /// Starts watching FederatedDeployment resources.
    pub async fn watch_federated_deployments(&self) -> Result<(), ControllerError> {
        self.watch_source::<ReplicaSchedulingPreference>(SourceKind::FederatedDeployment)
            .await
    }

    /// Starts watching FederatedService resources.
    pub async fn watch_federated_services(&self) -> Result<(), ControllerError> {
        self.watch_source::<ServiceLoadbalancingPreference>(SourceKind::FederatedService)
            .await
    }
}
