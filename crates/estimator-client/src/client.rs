//! WAO estimator API client
//!
//! Endpoint: `POST {endpoint}/namespaces/{namespace}/estimators/{name}/values/powerconsumption`

use crate::error::EstimatorError;
use crate::estimator_trait::{CostEstimator, EstimatorProvider};
use crate::models::{ApiErrorBody, EstimatorTarget, PowerConsumption, PowerConsumptionRequest};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// WAO estimator API client bound to one estimator
#[derive(Debug, Clone)]
pub struct EstimatorClient {
    client: Client,
    url: Url,
}

impl EstimatorClient {
    /// Create a new estimator client
    ///
    /// # Arguments
    /// * `target` - Endpoint, namespace and name of the estimator
    /// * `timeout` - Per-request timeout
    pub fn new(target: &EstimatorTarget, timeout: Duration) -> Result<Self, EstimatorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, target)
    }

    /// Create a client sharing an existing HTTP connection pool
    pub fn with_client(client: Client, target: &EstimatorTarget) -> Result<Self, EstimatorError> {
        let base = target.endpoint.trim_end_matches('/');
        if target.namespace.is_empty() || target.name.is_empty() {
            return Err(EstimatorError::InvalidEndpoint(format!(
                "estimator namespace and name must be set for {base}"
            )));
        }
        let raw = format!(
            "{}/namespaces/{}/estimators/{}/values/powerconsumption",
            base, target.namespace, target.name
        );
        let url = Url::parse(&raw).map_err(|e| EstimatorError::InvalidEndpoint(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EstimatorError::InvalidEndpoint(format!(
                "unsupported scheme in {raw}"
            )));
        }
        Ok(Self { client, url })
    }

    /// Full request URL
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Estimate the power increase of running `num_workloads` workloads of `cpu_milli` each
    ///
    /// # Returns
    /// * `Ok(PowerConsumption)` - The decoded estimation
    /// * `Err(EstimatorError)` - Transport failure or an estimator error body
    pub async fn power_consumption(
        &self,
        request: &PowerConsumptionRequest,
    ) -> Result<PowerConsumption, EstimatorError> {
        debug!(
            "POST {} cpuMilli={} numWorkloads={}",
            self.url, request.cpu_milli, request.num_workloads
        );

        let response = self
            .client
            .post(self.url.clone())
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(e) => EstimatorError::Api {
                    code: e.code,
                    message: e.message,
                },
                Err(_) => EstimatorError::Api {
                    code: status.as_u16().to_string(),
                    message: body.chars().take(500).collect(),
                },
            });
        }

        let pc: PowerConsumption = serde_json::from_str(&body)?;
        Ok(pc)
    }
}

#[async_trait::async_trait]
impl CostEstimator for EstimatorClient {
    async fn estimate_power_consumption(
        &self,
        cpu_milli: i64,
        num_workloads: i64,
    ) -> Result<Vec<f64>, EstimatorError> {
        let pc = self
            .power_consumption(&PowerConsumptionRequest {
                cpu_milli,
                num_workloads,
            })
            .await?;

        let increases = pc.watt_increases.ok_or_else(|| {
            EstimatorError::InvalidResponse("wattIncreases missing".to_string())
        })?;
        let expected = usize::try_from(num_workloads).unwrap_or_default();
        if increases.len() < expected {
            return Err(EstimatorError::InvalidResponse(format!(
                "wattIncreases has {} entries, requested {}",
                increases.len(),
                num_workloads
            )));
        }
        Ok(increases)
    }
}

/// Builds [`EstimatorClient`]s that share one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct HttpEstimatorProvider {
    client: Client,
}

impl HttpEstimatorProvider {
    /// Create a provider whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, EstimatorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl EstimatorProvider for HttpEstimatorProvider {
    fn estimator(
        &self,
        _cluster: &str,
        target: &EstimatorTarget,
    ) -> Result<Arc<dyn CostEstimator>, EstimatorError> {
        Ok(Arc::new(EstimatorClient::with_client(self.client.clone(), target)?))
    }
}
