//! Ferry Core
//!
//! Core types and rules for the Ferry deployment tool.
//!
//! This crate contains:
//! - Domain types: Build records and project identities as reported by the build registry
//! - Selector: The rule that picks which build gets deployed
//! - Errors shared by the client and the deployer

pub mod domain;
pub mod error;
pub mod selector;

pub use error::{CoreError, ResolutionError};
pub use selector::{DEPLOY_STAGE, select_build, select_build_for_stage};
