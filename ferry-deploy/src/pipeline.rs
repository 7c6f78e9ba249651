//! Deployment pipeline
//!
//! Drives one run from an empty workspace to an installed build:
//!
//! ```text
//! Init -> WorkspaceReady -> ProjectResolved -> BuildSelected
//!      -> ArtifactDownloaded -> ArtifactExtracted -> BackedUp
//!      -> [Purged] -> Installed -> CleanedUp
//! ```
//!
//! Any failure moves the pipeline to `Failed` and aborts the run. Nothing
//! touches the deployment directory before the backup archive is on disk.

use std::path::PathBuf;

use chrono::Local;
use ferry_core::select_build_for_stage;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{Config, DeployStrategy};
use crate::error::DeployError;
use crate::registry::BuildRegistry;
use crate::service::extract::install_source;
use crate::service::{Workspace, backup, backup_path_for, extract, install, purge, swap};

/// Progress of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    WorkspaceReady,
    ProjectResolved,
    BuildSelected,
    ArtifactDownloaded,
    ArtifactExtracted,
    BackedUp,
    /// Only reached with the in-place strategy
    Purged,
    Installed,
    CleanedUp,
    Failed,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub run_id: String,
    pub project_id: u64,
    pub build_id: u64,
    /// File name of the deployed artifact archive
    pub artifact: String,
    pub backup_path: PathBuf,
    /// Top-level entries now in the deployment directory
    pub installed: Vec<String>,
    pub strategy: DeployStrategy,
}

/// One deployment run against a build registry
pub struct Pipeline<R: BuildRegistry> {
    config: Config,
    registry: R,
    state: PipelineState,
}

impl<R: BuildRegistry> Pipeline<R> {
    pub fn new(config: Config, registry: R) -> Self {
        Self {
            config,
            registry,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the deployment to completion
    ///
    /// The scratch workspace lives only as long as this future. Dropping the
    /// future part way, or returning an error, removes it.
    pub async fn run(&mut self) -> Result<DeployReport, DeployError> {
        let run_id = Uuid::new_v4().simple().to_string();
        info!("Starting deployment run {}", run_id);

        match self.execute(run_id).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, run_id: String) -> Result<DeployReport, DeployError> {
        let workspace = Workspace::create(self.config.work_dir_base.as_deref())?;
        self.transition(PipelineState::WorkspaceReady);

        // Project
        let identity = self.config.project_identity()?;
        let project_id = self.registry.get_project_id(&identity).await?;
        info!("Project {} resolved to id {}", identity, project_id);
        self.transition(PipelineState::ProjectResolved);

        // Build
        let builds = self
            .registry
            .list_builds(project_id, self.config.commit.as_deref())
            .await?;
        info!("Registry returned {} successful builds", builds.len());

        let build = select_build_for_stage(builds, &self.config.deploy_stage)?;
        let artifact = build
            .artifact_filename()
            .ok_or(DeployError::MissingArtifact { build_id: build.id })?
            .to_string();
        info!("Selected build {} ({})", build.id, artifact);
        self.transition(PipelineState::BuildSelected);

        // Artifact
        let archive = self
            .registry
            .download_artifact(project_id, build.id, &artifact, workspace.path())
            .await?;
        self.transition(PipelineState::ArtifactDownloaded);

        let extracted = extract(&archive, &workspace.extract_dir()).await?;
        let source = install_source(&extracted, &self.config.artifact_subdir).map_err(|source| {
            DeployError::Extraction {
                archive: archive.clone(),
                source,
            }
        })?;
        self.transition(PipelineState::ArtifactExtracted);

        // Backup
        tokio::fs::create_dir_all(&self.config.backup_dir)
            .await
            .map_err(|source| DeployError::Backup {
                path: self.config.backup_dir.clone(),
                source,
            })?;
        let backup_path = backup_path_for(&self.config.backup_dir, &Local::now());
        backup(&self.config.dest_dir, &backup_path).await?;
        self.transition(PipelineState::BackedUp);

        // Install
        let installed = match self.config.strategy {
            DeployStrategy::InPlace => {
                purge(&self.config.dest_dir).await?;
                self.transition(PipelineState::Purged);
                install(&source, &self.config.dest_dir).await?
            }
            DeployStrategy::Swap => swap(&source, &self.config.dest_dir, &run_id).await?,
        };
        self.transition(PipelineState::Installed);

        workspace.remove().await?;
        self.transition(PipelineState::CleanedUp);

        Ok(DeployReport {
            run_id,
            project_id,
            build_id: build.id,
            artifact,
            backup_path,
            installed,
            strategy: self.config.strategy,
        })
    }

    fn transition(&mut self, next: PipelineState) {
        info!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
