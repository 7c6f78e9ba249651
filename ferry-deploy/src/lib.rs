//! Ferry Deploy
//!
//! Installs the newest successful build artifact of a project into a live
//! directory.
//!
//! Architecture:
//! - Configuration: run inputs, filled by the `ferry` binary from flags and environment
//! - Registry: seam over the HTTP client so the pipeline can run against fakes
//! - Services: workspace, archive extraction, deployment directory operations
//! - Pipeline: the state machine tying one run together
//!
//! The deployment directory is backed up before it is modified. A failed run
//! is never rolled back automatically; the backup archive is the way back.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod service;

pub use config::{Config, DeployStrategy};
pub use error::{ArchiveError, DeployError};
pub use pipeline::{DeployReport, Pipeline, PipelineState};
pub use registry::BuildRegistry;
