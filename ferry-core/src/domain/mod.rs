//! Core domain types
//!
//! These types mirror the records returned by the build registry. They are
//! shared between the registry client (which fetches them) and the deployer
//! (which decides what to do with them).

pub mod build;
pub mod project;
