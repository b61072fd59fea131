//! WAOFed Controller
//!
//! Derives KubeFed placement preferences from federated workloads:
//! - FederatedDeployment: ReplicaSchedulingPreference with per-cluster replica weights
//! - FederatedService: ServiceLoadbalancingPreference with per-cluster traffic weights
//!
//! Weights come from the optimizer configured in the `default` WAOFedConfig,
//! either uniform (`rr`) or power-cost driven through WAO estimators (`wao`).

mod backoff;
mod candidates;
mod config;
mod controller;
mod error;
mod optimizer;
mod ownership;
mod reconciler;
mod scope;
mod store;
mod view;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting WAOFed Controller");

    let config = ControllerConfig::from_env()?;
    config.log();

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
