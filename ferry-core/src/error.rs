//! Error types shared across Ferry crates

use thiserror::Error;

/// Failure to determine which project a run targets
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Neither a numeric id nor a project name was configured
    #[error("Cannot determine project: neither a project id nor a project name was given")]
    MissingIdentity,

    /// The name search returned nothing
    #[error("No project matches the name '{name}'")]
    NotFound { name: String },

    /// The name search returned several projects and none matched exactly
    #[error("Project name '{name}' is ambiguous, candidates: {}", format_ids(.ids))]
    Ambiguous { name: String, ids: Vec<u64> },
}

/// Errors raised by core domain rules
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No successful build carries the deploy stage marker
    #[error("No deployable build found for stage '{stage}'")]
    NoBuildFound { stage: String },
}

fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
