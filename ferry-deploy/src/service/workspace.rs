//! Scratch workspace
//!
//! Holds the downloaded archive and the extracted tree for one run. The
//! directory is removed when the value is dropped, so it never outlives the
//! run whether that run succeeds, fails, or is cancelled.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::DeployError;

const WORKSPACE_PREFIX: &str = "ferry.";

/// Directory name the artifact is extracted into
const EXTRACT_DIR: &str = "dist";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a uniquely named workspace under `base`, or the OS temp dir
    pub fn create(base: Option<&Path>) -> Result<Self, DeployError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(|source| DeployError::Workspace {
            path: base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the artifact archive is extracted
    pub fn extract_dir(&self) -> PathBuf {
        self.dir.path().join(EXTRACT_DIR)
    }

    /// Removes the workspace, reporting failures instead of ignoring them
    pub async fn remove(self) -> Result<(), DeployError> {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;

        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
            .map_err(|source| DeployError::Workspace { path, source })
    }
}
