//! Build domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status reported by the registry for a build that finished successfully
pub const STATUS_SUCCESS: &str = "success";

/// Build record as reported by the build registry
///
/// Immutable once fetched. Identity is `id`; unknown fields in the registry
/// payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: u64,
    pub stage: String,
    pub status: String,
    /// `None` while the build is still pending or running
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifacts_file: Option<ArtifactFile>,
}

/// Artifact archive attached to a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl BuildRecord {
    /// Returns true if the registry reports this build as successful
    pub fn is_successful(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// File name of the build's artifact archive, if it has one
    pub fn artifact_filename(&self) -> Option<&str> {
        self.artifacts_file.as_ref().map(|a| a.filename.as_str())
    }
}
