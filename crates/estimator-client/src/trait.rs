//! Estimator traits for mocking
//!
//! The concrete [`EstimatorClient`](crate::EstimatorClient) implements
//! [`CostEstimator`]; tests swap in the mocks behind the `test-util` feature.

use crate::error::EstimatorError;
use crate::models::EstimatorTarget;
use std::sync::Arc;

/// Prices running a number of identical workloads on one cluster.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CostEstimator: Send + Sync {
    /// Returns one cumulative cost per workload count `1..=num_workloads`.
    async fn estimate_power_consumption(
        &self,
        cpu_milli: i64,
        num_workloads: i64,
    ) -> Result<Vec<f64>, EstimatorError>;
}

/// Hands out an estimator for a cluster.
pub trait EstimatorProvider: Send + Sync {
    /// Builds the estimator serving `cluster` at `target`.
    fn estimator(
        &self,
        cluster: &str,
        target: &EstimatorTarget,
    ) -> Result<Arc<dyn CostEstimator>, EstimatorError>;
}
