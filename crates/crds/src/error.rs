//! Policy validation errors

use thiserror::Error;

/// Reasons a `WAOFedConfig` is rejected before the controllers act on it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The singleton carries a name other than the well-known one
    #[error("name must be {expected}, got {actual}")]
    InvalidName {
        /// Required name
        expected: String,
        /// Name found on the object
        actual: String,
    },

    /// `spec.kubefedNamespace` is empty
    #[error("kubefedNamespace must be set")]
    MissingKubeFedNamespace,

    /// Optimizer method string is not a known method
    #[error("invalid {path} {method}")]
    UnknownMethod {
        /// JSON path of the offending field
        path: String,
        /// Method string as written
        method: String,
    },

    /// Cost-driven optimizer without any estimator entries
    #[error("{0} requires 1 or more items")]
    NoEstimators(String),

    /// Estimator map keyed by an empty cluster name
    #[error("{0} cannot use empty string as key")]
    EmptyEstimatorKey(String),

    /// Estimator endpoint is not an absolute http(s) URL
    #[error("{path}[{cluster}] is not a valid URL: {reason}")]
    InvalidEndpoint {
        /// JSON path of the estimator map
        path: String,
        /// Cluster key of the entry
        cluster: String,
        /// Parser message
        reason: String,
    },
}
