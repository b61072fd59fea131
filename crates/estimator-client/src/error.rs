//! Estimator client errors

use thiserror::Error;

/// Errors that can occur when querying a WAO estimator
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The estimator answered with an error body
    #[error("Estimator API error {code}: {message}")]
    Api {
        /// Error code reported by the estimator
        code: String,
        /// Human readable message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Endpoint could not be turned into a request URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Response decoded but does not answer the question asked
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors returned by the least-cost distribution search
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    /// The cost matrix does not have one row per cluster
    #[error("expected {expected} cost rows, got {actual}")]
    ClusterCountMismatch {
        /// Number of clusters requested
        expected: usize,
        /// Number of rows supplied
        actual: usize,
    },

    /// A cost row is too short to price every replica count
    #[error("cost row {cluster} has {actual} entries, need at least {expected}")]
    RowTooShort {
        /// Index of the offending row
        cluster: usize,
        /// Required length (total replicas)
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Every distribution of the replicas has infinite cost
    #[error("no distribution of {0} replicas has a finite cost")]
    NoFinitePattern(usize),
}
