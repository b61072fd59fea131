//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the estimator provider and the reconciler together and runs one
//! watcher per enabled source kind:
//! - FederatedDeployment: derives ReplicaSchedulingPreferences
//! - FederatedService: derives ServiceLoadbalancingPreferences

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::Watcher;
use estimator_client::HttpEstimatorProvider;
use kube::Client;
use std::future::pending;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

type WatcherHandle = JoinHandle<Result<(), ControllerError>>;

/// Main controller for WAOFed preference management.
pub struct Controller {
    scheduling_watcher: Option<WatcherHandle>,
    loadbalancing_watcher: Option<WatcherHandle>,
}

impl Controller {
    /// Creates a controller and starts the enabled watchers.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing WAOFed Controller");

        let client = Client::try_default().await?;
        let estimators = HttpEstimatorProvider::new(config.estimator_timeout).map_err(|e| {
            ControllerError::InvalidConfig(format!("could not build estimator HTTP client: {e}"))
        })?;

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(estimators),
            config.clone(),
        ));
        let watcher = Arc::new(Watcher::new(reconciler, client, config.clone()));

        let scheduling_watcher = config.enable_scheduling.then(|| {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_federated_deployments().await })
        });
        let loadbalancing_watcher = config.enable_loadbalancing.then(|| {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_federated_services().await })
        });

        Ok(Self {
            scheduling_watcher,
            loadbalancing_watcher,
        })
    }

    /// Runs until any watcher stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("WAOFed Controller running");

        tokio::select! {
            result = join_or_pending(self.scheduling_watcher) => {
                finished("FederatedDeployment", result)
            }
            result = join_or_pending(self.loadbalancing_watcher) => {
                finished("FederatedService", result)
            }
        }
    }
}

/// Awaits `handle`, or never resolves when the watcher is disabled.
async fn join_or_pending(handle: Option<WatcherHandle>) -> Result<Result<(), ControllerError>, tokio::task::JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

fn finished(
    name: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) => {
            error!("{} watcher stopped", name);
            Err(ControllerError::Watch(format!("{name} watcher stopped")))
        }
        Ok(Err(e)) => {
            error!("{} watcher failed: {}", name, e);
            Err(e)
        }
        Err(e) => Err(ControllerError::Watch(format!("{name} watcher panicked: {e}"))),
    }
}
