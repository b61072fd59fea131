//! WAO Estimator Client
//!
//! Client for the WAO estimator REST API plus the least-cost search that turns
//! per-cluster cost curves into replica distributions.
//!
//! # Example
//!
//! ```no_run
//! use estimator_client::{CostEstimator, EstimatorClient, EstimatorTarget};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let target = EstimatorTarget {
//!     endpoint: "http://estimator.cluster1:5656".to_string(),
//!     namespace: "default".to_string(),
//!     name: "default".to_string(),
//! };
//! let client = EstimatorClient::new(&target, Duration::from_secs(10))?;
//!
//! // Extra watts for running 1, 2 and 3 pods of 500m CPU each
//! let watts = client.estimate_power_consumption(500, 3).await?;
//!
//! let result = estimator_client::compute_least_cost_patterns(1, 3, &[watts])?;
//! println!("min cost {} with {:?}", result.min_cost, result.patterns[0]);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod search;
#[path = "trait.rs"]
pub mod estimator_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{EstimatorClient, HttpEstimatorProvider};
pub use error::{EstimatorError, SearchError};
pub use estimator_trait::{CostEstimator, EstimatorProvider};
pub use models::*;
pub use search::{LeastCostPatterns, MAX_PATTERNS, compute_least_cost_patterns};
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockEstimator, MockEstimatorProvider, MockResponse};
