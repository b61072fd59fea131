//! Controller-specific error types.
//!
//! Every error is scoped to one reconcile pass; none of them stop the process.
//! [`ControllerError::retry`] decides how the driving loop requeues a failed pass.

use estimator_client::SearchError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the WAOFed controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error (store unavailable, transport failure, ...)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Source object is malformed (wrong kind, missing metadata/spec, bad template)
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Optimizer method not registered for this kind
    #[error("Unknown optimizer method \"{method}\" for {kind}")]
    UnknownOptimizerMethod {
        /// Method string from the policy object
        method: String,
        /// Preference kind being computed
        kind: String,
    },

    /// Derived object is controlled by another owner
    #[error("{kind} {name} is already controlled by {owner}")]
    OwnershipConflict {
        /// Kind of the derived object
        kind: String,
        /// namespace/name of the derived object
        name: String,
        /// Kind and name of the current controller
        owner: String,
    },

    /// Optimistic-concurrency conflict persisted after retries
    #[error("Upsert conflict: {0}")]
    UpsertConflict(String),

    /// Placement cluster selector cannot be evaluated
    #[error("Invalid cluster selector: {0}")]
    InvalidSelector(String),

    /// Least-cost search failed
    #[error("Cost search failed: {0}")]
    CostSearch(#[from] SearchError),

    /// Reconcile pass exceeded its deadline
    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// How the driving loop should retry a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Only retry when the watched objects change
    AwaitChange,
    /// Retry almost immediately
    Immediate,
    /// Retry with the per-object Fibonacci backoff
    Backoff,
}

impl ControllerError {
    /// Retry classification of this error.
    pub fn retry(&self) -> RetryPolicy {
        match self {
            // Retrying cannot fix these until someone edits the objects involved
            Self::Conversion(_)
            | Self::OwnershipConflict { .. }
            | Self::InvalidSelector(_)
            | Self::UnknownOptimizerMethod { .. } => RetryPolicy::AwaitChange,
            Self::UpsertConflict(_) => RetryPolicy::Immediate,
            _ => RetryPolicy::Backoff,
        }
    }
}
