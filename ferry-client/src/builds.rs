//! Build listing endpoints

use ferry_core::domain::build::{BuildRecord, STATUS_SUCCESS};
use tracing::debug;

use crate::RegistryClient;
use crate::error::Result;

impl RegistryClient {
    // =============================================================================
    // Build Listing
    // =============================================================================

    /// List successful builds of a project
    ///
    /// With a commit, only builds for that commit are fetched and the registry
    /// filters them to successful ones. Without a commit, every build of the
    /// project is fetched and filtered here.
    ///
    /// # Arguments
    /// * `project_id` - Numeric project id
    /// * `commit` - Optional commit SHA to pin the builds to
    pub async fn list_builds(&self, project_id: u64, commit: Option<&str>) -> Result<Vec<BuildRecord>> {
        match commit {
            Some(sha) => self.list_commit_builds(project_id, sha).await,
            None => {
                let builds = self.list_project_builds(project_id).await?;
                let total = builds.len();
                let successful: Vec<BuildRecord> =
                    builds.into_iter().filter(BuildRecord::is_successful).collect();
                debug!(
                    "Project {} has {} build(s), {} successful",
                    project_id,
                    total,
                    successful.len()
                );
                Ok(successful)
            }
        }
    }

    /// List every build of a project, whatever its status
    pub async fn list_project_builds(&self, project_id: u64) -> Result<Vec<BuildRecord>> {
        let url = format!("{}/projects/{}/builds", self.base_url, project_id);
        self.get_json(self.get(&url)).await
    }

    /// List the successful builds of a single commit
    ///
    /// The ref is sent as one escaped path segment, so refs containing `/`
    /// or `?` still address the commit endpoint.
    pub async fn list_commit_builds(&self, project_id: u64, sha: &str) -> Result<Vec<BuildRecord>> {
        let project_id = project_id.to_string();
        let url = self.endpoint(&[
            "projects",
            &project_id,
            "repository",
            "commits",
            sha,
            "builds",
        ])?;
        let request = self.get(url.as_str()).query(&[("scope", STATUS_SUCCESS)]);
        self.get_json(request).await
    }
}
