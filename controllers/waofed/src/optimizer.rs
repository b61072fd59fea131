//! Per-cluster weight optimizers.
//!
//! The policy's method string is parsed into [`OptimizerMethod`] and resolved
//! against a fixed strategy table per policy kind:
//!
//! | kind          | `rr`    | `wao`       |
//! |---------------|---------|-------------|
//! | scheduling    | uniform | cost-driven |
//! | loadbalancing | uniform | -           |
//!
//! The cost-driven strategy asks every candidate cluster's WAO estimator for
//! the power increase of running 1..=N replicas, concurrently, and hands the
//! curves to the least-cost search. A cluster whose estimator fails, errors or
//! times out is priced at infinity so it never receives replicas.

use crate::error::ControllerError;
use crds::{OptimizerMethod, PolicyKind, PolicySettings, WaoEstimatorSetting};
use estimator_client::{EstimatorProvider, EstimatorTarget, SearchError, compute_least_cost_patterns};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Weight record for one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterWeight {
    /// Relative share of replicas or traffic
    pub weight: i64,
    /// Lower replica bound, unset by both strategies
    pub min_replicas: Option<i64>,
    /// Upper replica bound, unset by both strategies
    pub max_replicas: Option<i64>,
}

impl ClusterWeight {
    fn weight(weight: i64) -> Self {
        Self {
            weight,
            ..Default::default()
        }
    }
}

/// Cluster name to weight
pub type WeightMap = BTreeMap<String, ClusterWeight>;

/// Resource demand of a workload, needed by the cost-driven strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadDemand {
    /// CPU request of one replica in milli-cores
    pub cpu_milli: i64,
    /// Replicas to distribute
    pub replicas: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Uniform,
    CostDriven,
}

fn strategy_for(kind: PolicyKind, method: OptimizerMethod) -> Option<Strategy> {
    match (kind, method) {
        (_, OptimizerMethod::RoundRobin) => Some(Strategy::Uniform),
        (PolicyKind::Scheduling, OptimizerMethod::Wao) => Some(Strategy::CostDriven),
        (PolicyKind::LoadBalancing, OptimizerMethod::Wao) => None,
    }
}

/// Computes weights for a pass.
pub struct Optimizer<'a> {
    pub estimators: &'a dyn EstimatorProvider,
    pub estimator_timeout: Duration,
}

impl Optimizer<'_> {
    /// Weight map over `clusters` following the method configured in `settings`.
    pub async fn optimize(
        &self,
        kind: PolicyKind,
        settings: &PolicySettings,
        clusters: &[String],
        demand: Option<WorkloadDemand>,
    ) -> Result<WeightMap, ControllerError> {
        let unknown = |method: String| ControllerError::UnknownOptimizerMethod {
            method,
            kind: kind.path().to_string(),
        };
        let method = settings.method().map_err(unknown)?;
        let strategy = strategy_for(kind, method).ok_or_else(|| unknown(method.to_string()))?;

        info!("Optimizing {} cluster weights with method {}", clusters.len(), method);
        match strategy {
            Strategy::Uniform => Ok(uniform(clusters)),
            Strategy::CostDriven => {
                let demand = demand.ok_or_else(|| {
                    ControllerError::Conversion("cost-driven optimization needs a deployment template".to_string())
                })?;
                self.cost_driven(clusters, &settings.estimators(), demand).await
            }
        }
    }

    async fn cost_driven(
        &self,
        clusters: &[String],
        settings: &BTreeMap<String, WaoEstimatorSetting>,
        demand: WorkloadDemand,
    ) -> Result<WeightMap, ControllerError> {
        if clusters.is_empty() {
            return Ok(WeightMap::new());
        }
        let replicas = usize::try_from(demand.replicas).unwrap_or_default();

        let calls = clusters
            .iter()
            .map(|cluster| self.estimate(cluster, settings.get(cluster), demand, replicas));
        let costs: Vec<Vec<f64>> = join_all(calls).await;
        debug!("Estimated costs for {:?}: {:?}", clusters, costs);

        let result = compute_least_cost_patterns(clusters.len(), replicas, &costs)?;
        let pattern = result
            .patterns
            .first()
            .ok_or(SearchError::NoFinitePattern(replicas))?;
        info!("Least cost {} with pattern {:?} over {:?}", result.min_cost, pattern, clusters);

        Ok(clusters
            .iter()
            .zip(pattern)
            .map(|(cluster, &count)| {
                (cluster.clone(), ClusterWeight::weight(i64::try_from(count).unwrap_or(i64::MAX)))
            })
            .collect())
    }

    /// Cost curve for one cluster; all-infinite on any failure.
    async fn estimate(
        &self,
        cluster: &str,
        setting: Option<&WaoEstimatorSetting>,
        demand: WorkloadDemand,
        replicas: usize,
    ) -> Vec<f64> {
        let unreachable = vec![f64::INFINITY; replicas];
        let Some(setting) = setting else {
            warn!("No WAO estimator configured for cluster {}", cluster);
            return unreachable;
        };
        let target = EstimatorTarget {
            endpoint: setting.endpoint.clone(),
            namespace: setting.namespace.clone(),
            name: setting.name.clone(),
        };
        let estimator = match self.estimators.estimator(cluster, &target) {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot build estimator for cluster {}: {}", cluster, e);
                return unreachable;
            }
        };

        let call = estimator.estimate_power_consumption(demand.cpu_milli, i64::from(demand.replicas));
        match tokio::time::timeout(self.estimator_timeout, call).await {
            Ok(Ok(costs)) if costs.len() >= replicas => costs,
            Ok(Ok(costs)) => {
                warn!(
                    "Estimator for cluster {} returned {} costs, need {}",
                    cluster,
                    costs.len(),
                    replicas
                );
                unreachable
            }
            Ok(Err(e)) => {
                warn!("EstimatePowerConsumption failed for cluster {}: {}", cluster, e);
                unreachable
            }
            Err(_) => {
                warn!(
                    "EstimatePowerConsumption for cluster {} timed out after {:?}",
                    cluster, self.estimator_timeout
                );
                unreachable
            }
        }
    }
}

/// Weight 1 for every cluster.
pub fn uniform(clusters: &[String]) -> WeightMap {
    clusters
        .iter()
        .map(|c| (c.clone(), ClusterWeight::weight(1)))
        .collect()
}
