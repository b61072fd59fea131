//! WAOFed CRD Definitions
//!
//! Kubernetes Custom Resource Definitions owned by WAOFed, plus the KubeFed
//! types the controllers read and write.

pub mod error;
pub mod kubefed;
pub mod slp;
pub mod waofed_config;

pub use error::PolicyError;
pub use kubefed::*;
pub use slp::*;
pub use waofed_config::*;
