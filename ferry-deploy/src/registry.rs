//! Build registry seam
//!
//! The pipeline talks to the registry through this trait so it can be run
//! against an in-memory registry in tests. `RegistryClient` is the HTTP
//! implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ferry_client::{ClientError, RegistryClient};
use ferry_core::domain::build::BuildRecord;
use ferry_core::domain::project::ProjectIdentity;

/// Operations the pipeline needs from the build registry
#[async_trait]
pub trait BuildRegistry: Send + Sync {
    /// Resolves a project identity to its numeric id
    async fn get_project_id(&self, identity: &ProjectIdentity) -> Result<u64, ClientError>;

    /// Lists successful builds, optionally pinned to a commit
    async fn list_builds(
        &self,
        project_id: u64,
        commit: Option<&str>,
    ) -> Result<Vec<BuildRecord>, ClientError>;

    /// Downloads a build's artifact archive into `dest_dir`
    async fn download_artifact(
        &self,
        project_id: u64,
        build_id: u64,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ClientError>;
}

#[async_trait]
impl BuildRegistry for RegistryClient {
    async fn get_project_id(&self, identity: &ProjectIdentity) -> Result<u64, ClientError> {
        RegistryClient::get_project_id(self, identity).await
    }

    async fn list_builds(
        &self,
        project_id: u64,
        commit: Option<&str>,
    ) -> Result<Vec<BuildRecord>, ClientError> {
        RegistryClient::list_builds(self, project_id, commit).await
    }

    async fn download_artifact(
        &self,
        project_id: u64,
        build_id: u64,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        RegistryClient::download_artifact(self, project_id, build_id, filename, dest_dir).await
    }
}
