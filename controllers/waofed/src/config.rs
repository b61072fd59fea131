//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use crds::WAOFED_CONFIG_NAME;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime settings shared by both controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch for federated objects (`None` = all namespaces)
    pub namespace: Option<String>,
    /// Name of the singleton WAOFedConfig
    pub config_name: String,
    /// Maximum concurrent reconcile passes per controller
    pub concurrency: u16,
    /// Quiet period before a burst of events triggers a pass
    pub debounce: Duration,
    /// Deadline for a whole reconcile pass
    pub reconcile_timeout: Duration,
    /// Deadline for one estimator call
    pub estimator_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Run the FederatedDeployment -> ReplicaSchedulingPreference controller
    pub enable_scheduling: bool,
    /// Run the FederatedService -> ServiceLoadbalancingPreference controller
    pub enable_loadbalancing: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            config_name: WAOFED_CONFIG_NAME.to_string(),
            concurrency: 3,
            debounce: Duration::from_secs(1),
            reconcile_timeout: Duration::from_secs(60),
            estimator_timeout: Duration::from_secs(10),
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            enable_scheduling: true,
            enable_loadbalancing: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            namespace: get("WATCH_NAMESPACE"),
            config_name: get("WAOFED_CONFIG_NAME").unwrap_or(defaults.config_name),
            concurrency: parse_or(&get, "CONTROLLER_CONCURRENCY", defaults.concurrency)?,
            debounce: secs_or(&get, "DEBOUNCE_SECS", defaults.debounce)?,
            reconcile_timeout: secs_or(&get, "RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?,
            estimator_timeout: secs_or(&get, "ESTIMATOR_TIMEOUT_SECS", defaults.estimator_timeout)?,
            backoff_min: secs_or(&get, "BACKOFF_MIN_SECS", defaults.backoff_min)?,
            backoff_max: secs_or(&get, "BACKOFF_MAX_SECS", defaults.backoff_max)?,
            enable_scheduling: parse_or(&get, "ENABLE_SCHEDULING", defaults.enable_scheduling)?,
            enable_loadbalancing: parse_or(&get, "ENABLE_LOADBALANCING", defaults.enable_loadbalancing)?,
        };

        if config.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if config.backoff_min.is_zero() || config.backoff_min > config.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff range {:?}..{:?} is invalid",
                config.backoff_min, config.backoff_max
            )));
        }
        if config.reconcile_timeout.is_zero() || config.estimator_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if !config.enable_scheduling && !config.enable_loadbalancing {
            return Err(ControllerError::InvalidConfig(
                "at least one of ENABLE_SCHEDULING and ENABLE_LOADBALANCING must be true".to_string(),
            ));
        }
        Ok(config)
    }

    /// Log the effective configuration.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Namespace: {}", self.namespace.as_deref().unwrap_or("all namespaces"));
        info!("  WAOFedConfig: {}", self.config_name);
        info!("  Concurrency: {}", self.concurrency);
        info!("  Debounce: {:?}", self.debounce);
        info!("  Reconcile timeout: {:?}", self.reconcile_timeout);
        info!("  Estimator timeout: {:?}", self.estimator_timeout);
        info!("  Backoff: {:?}..{:?}", self.backoff_min, self.backoff_max);
        info!("  Scheduling controller: {}", self.enable_scheduling);
        info!("  Loadbalancing controller: {}", self.enable_loadbalancing);
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ControllerError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}
