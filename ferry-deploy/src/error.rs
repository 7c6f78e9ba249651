//! Error types for the deployment pipeline

use std::path::PathBuf;

use ferry_client::ClientError;
use ferry_core::{CoreError, ResolutionError};
use thiserror::Error;

/// Errors that abort a deployment run
///
/// None of them is retried. Filesystem mutations already applied to the
/// deployment directory are not rolled back; the backup archive is the
/// recovery path.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration is incomplete or inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Scratch workspace could not be created or removed
    #[error("Workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Project identity could not be determined
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// HTTP, transport, or parse failure talking to the build registry
    #[error("Build registry error: {0}")]
    Registry(#[source] ClientError),

    /// No successful build of the deploy stage exists
    #[error("No deployable build found for stage '{stage}'")]
    NoBuildFound { stage: String },

    /// The selected build has no artifact archive attached
    #[error("Build {build_id} has no artifact archive")]
    MissingArtifact { build_id: u64 },

    /// Downloaded archive could not be expanded
    #[error("Failed to extract {}: {source}", archive.display())]
    Extraction {
        archive: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// Snapshot of the deployment directory could not be written
    #[error("Backup to {} failed: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A deployment directory entry could not be removed
    #[error("Failed to remove {}: {source}", path.display())]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A new entry could not be moved into the deployment directory
    #[error("Failed to install {}: {source}", path.display())]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons an artifact archive cannot be expanded
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format")]
    UnsupportedFormat,

    #[error("corrupt zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The archive lacks the directory that holds the deployable files
    #[error("artifact has no '{0}' directory")]
    MissingSubdir(String),
}

impl From<ClientError> for DeployError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Resolution(err) => Self::Resolution(err),
            other => Self::Registry(other),
        }
    }
}

impl From<CoreError> for DeployError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoBuildFound { stage } => Self::NoBuildFound { stage },
        }
    }
}
