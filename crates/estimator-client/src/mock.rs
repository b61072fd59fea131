//! Mock estimators for unit testing
//!
//! Responses are configured per cluster and every call is recorded, so tests
//! can assert on the fan-out without a running estimator.

use crate::error::EstimatorError;
use crate::estimator_trait::{CostEstimator, EstimatorProvider};
use crate::models::EstimatorTarget;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned behaviour of a mocked estimator
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return exactly these cumulative costs
    Costs(Vec<f64>),
    /// Cost grows linearly: `k` workloads cost `k * per_workload`
    Linear(f64),
    /// Answer with an estimator error body
    ApiError { code: String, message: String },
    /// Fail as if the endpoint were unreachable
    Unreachable,
    /// Never answer within any reasonable timeout
    Hang,
}

/// One recorded estimation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub cluster: String,
    pub cpu_milli: i64,
    pub num_workloads: i64,
}

/// Mock estimator for one cluster
#[derive(Debug, Clone)]
pub struct MockEstimator {
    cluster: String,
    response: MockResponse,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

#[async_trait::async_trait]
impl CostEstimator for MockEstimator {
    async fn estimate_power_consumption(
        &self,
        cpu_milli: i64,
        num_workloads: i64,
    ) -> Result<Vec<f64>, EstimatorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                cluster: self.cluster.clone(),
                cpu_milli,
                num_workloads,
            });
        }
        match &self.response {
            MockResponse::Costs(costs) => Ok(costs.clone()),
            MockResponse::Linear(per) => {
                #[allow(clippy::cast_precision_loss, reason = "test replica counts are small")]
                let costs = (1..=num_workloads).map(|k| k as f64 * per).collect();
                Ok(costs)
            }
            MockResponse::ApiError { code, message } => Err(EstimatorError::Api {
                code: code.clone(),
                message: message.clone(),
            }),
            MockResponse::Unreachable => Err(EstimatorError::InvalidEndpoint(format!(
                "{} is unreachable",
                self.cluster
            ))),
            MockResponse::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(EstimatorError::InvalidResponse("timed out".to_string()))
            }
        }
    }
}

/// Mock provider keyed by cluster name.
///
/// Clusters without a configured response get [`MockResponse::Unreachable`].
#[derive(Debug, Clone, Default)]
pub struct MockEstimatorProvider {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEstimatorProvider {
    /// Create a provider with no configured clusters
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the response for `cluster`
    pub fn set_response(&self, cluster: impl Into<String>, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(cluster.into(), response);
        }
    }

    /// Calls recorded so far, in completion order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl EstimatorProvider for MockEstimatorProvider {
    fn estimator(
        &self,
        cluster: &str,
        _target: &EstimatorTarget,
    ) -> Result<Arc<dyn CostEstimator>, EstimatorError> {
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(cluster).cloned())
            .unwrap_or(MockResponse::Unreachable);
        Ok(Arc::new(MockEstimator {
            cluster: cluster.to_string(),
            response,
            calls: Arc::clone(&self.calls),
        }))
    }
}
