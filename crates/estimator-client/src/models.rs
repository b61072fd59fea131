//! WAO estimator request and response models

use serde::{Deserialize, Serialize};

/// Identifies one estimator behind a base endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EstimatorTarget {
    /// Base URL of the estimator service
    pub endpoint: String,
    /// Namespace of the Estimator resource
    pub namespace: String,
    /// Name of the Estimator resource
    pub name: String,
}

/// Body of a power consumption estimation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PowerConsumptionRequest {
    /// CPU request of one workload in milli-cores
    pub cpu_milli: i64,
    /// Number of workloads to price
    pub num_workloads: i64,
}

/// Successful estimation response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerConsumption {
    /// CPU request the estimate was made for, in milli-cores
    #[serde(default)]
    pub cpu_milli: i64,

    /// Largest workload count priced
    #[serde(default)]
    pub num_workloads: i64,

    /// `watt_increases[k]` is the extra power drawn when running `k + 1` workloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watt_increases: Option<Vec<f64>>,
}

/// Error body returned by the estimator on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}
