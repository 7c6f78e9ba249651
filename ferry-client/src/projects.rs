//! Project resolution endpoints

use ferry_core::ResolutionError;
use ferry_core::domain::project::{Project, ProjectIdentity};
use tracing::{debug, info};

use crate::RegistryClient;
use crate::error::Result;

impl RegistryClient {
    // =============================================================================
    // Project Resolution
    // =============================================================================

    /// Search the projects owned by the token holder
    ///
    /// # Arguments
    /// * `name` - Search term, matched by the registry against project names
    pub async fn search_projects(&self, name: &str) -> Result<Vec<Project>> {
        let url = format!("{}/projects/owned", self.base_url);
        let request = self.get(&url).query(&[("search", name)]);

        self.get_json(request).await
    }

    /// Resolve a project identity to its numeric id
    ///
    /// A numeric identity is returned without contacting the registry. A name
    /// costs exactly one search request.
    ///
    /// # Errors
    /// Returns a resolution error if:
    /// - The search yields no project
    /// - The search yields several projects and no single one matches the name exactly
    pub async fn get_project_id(&self, identity: &ProjectIdentity) -> Result<u64> {
        let name = match identity {
            ProjectIdentity::Id(id) => return Ok(*id),
            ProjectIdentity::Name(name) => name,
        };

        let projects = self.search_projects(name).await?;
        debug!("Project search for '{}' returned {} result(s)", name, projects.len());

        let id = resolve_search_result(name, &projects)?;
        info!("Resolved project '{}' to id {}", name, id);
        Ok(id)
    }
}

/// Pick the project id a name search refers to
pub(crate) fn resolve_search_result(name: &str, projects: &[Project]) -> std::result::Result<u64, ResolutionError> {
    match projects {
        [] => Err(ResolutionError::NotFound {
            name: name.to_string(),
        }),
        [only] => Ok(only.id),
        _ => {
            let exact: Vec<&Project> = projects.iter().filter(|p| p.matches_exactly(name)).collect();
            match exact.as_slice() {
                [project] => Ok(project.id),
                _ => Err(ResolutionError::Ambiguous {
                    name: name.to_string(),
                    ids: projects.iter().map(|p| p.id).collect(),
                }),
            }
        }
    }
}
