//! Deployer configuration
//!
//! Defines every input of a deployment run: where the registry lives, which
//! project and build to take, and where the live and backup directories are.
//! The binary fills this from command-line flags and environment variables.

use std::path::{Component, Path, PathBuf};

use ferry_client::Timeouts;
use ferry_core::ResolutionError;
use ferry_core::domain::project::ProjectIdentity;
use serde::Serialize;

use crate::error::DeployError;

/// Directory inside the extracted artifact whose contents get deployed
pub const DEFAULT_ARTIFACT_SUBDIR: &str = "dest";

/// How the deployment directory gets its new contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStrategy {
    /// Stage the new tree next to the live directory, then rename it into place
    #[default]
    Swap,
    /// Empty the live directory, then move the new entries into it
    InPlace,
}

/// Deployer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry host name or API base URL
    pub host: String,

    /// Private token for the registry
    pub token: String,

    /// Live deployment directory
    pub dest_dir: PathBuf,

    /// Where backup archives are written
    pub backup_dir: PathBuf,

    /// Commit SHA the build must belong to
    pub commit: Option<String>,

    /// Project name, used only without a numeric id
    pub project_name: Option<String>,

    /// Authoritative numeric project id
    pub project_id: Option<u64>,

    /// Directory of the extracted artifact that gets installed
    pub artifact_subdir: PathBuf,

    /// Stage marker of deployable builds
    pub deploy_stage: String,

    pub strategy: DeployStrategy,

    /// Parent of the scratch workspace (OS temp dir when unset)
    pub work_dir_base: Option<PathBuf>,

    /// Deadlines for registry traffic
    pub timeouts: Timeouts,
}

impl Config {
    /// Creates a new configuration with defaults for everything optional
    pub fn new(
        host: impl Into<String>,
        token: impl Into<String>,
        dest_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            dest_dir: dest_dir.into(),
            backup_dir: backup_dir.into(),
            commit: None,
            project_name: None,
            project_id: None,
            artifact_subdir: PathBuf::from(DEFAULT_ARTIFACT_SUBDIR),
            deploy_stage: ferry_core::DEPLOY_STAGE.to_string(),
            strategy: DeployStrategy::default(),
            work_dir_base: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Sets the project id
    pub fn with_project_id(mut self, id: u64) -> Self {
        self.project_id = Some(id);
        self
    }

    /// Sets the project name
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Pins the deployment to builds of one commit; a blank SHA means no pin
    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        let sha = sha.into();
        self.commit = (!sha.trim().is_empty()).then(|| sha.trim().to_string());
        self
    }

    pub fn with_strategy(mut self, strategy: DeployStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_work_dir_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.work_dir_base = Some(base.into());
        self
    }

    /// Identity of the target project
    pub fn project_identity(&self) -> Result<ProjectIdentity, ResolutionError> {
        ProjectIdentity::from_parts(self.project_id, self.project_name.as_deref())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host cannot be empty"));
        }

        if self.token.is_empty() {
            return Err(invalid("token cannot be empty"));
        }

        self.project_identity()?;

        if self.deploy_stage.is_empty() {
            return Err(invalid("deploy stage cannot be empty"));
        }

        if self.dest_dir.as_os_str().is_empty() || self.backup_dir.as_os_str().is_empty() {
            return Err(invalid("destination and backup directories are required"));
        }

        if self.backup_dir.starts_with(&self.dest_dir) {
            return Err(invalid(
                "backup directory must not be the destination directory or inside it",
            ));
        }

        if !is_plain_relative(&self.artifact_subdir) {
            return Err(invalid(
                "artifact subdirectory must be a relative path without '..'",
            ));
        }

        let Timeouts {
            request,
            connect,
            read,
        } = self.timeouts;
        if request.is_zero() || connect.is_zero() || read.is_zero() {
            return Err(invalid("timeouts must be greater than 0"));
        }

        Ok(())
    }
}

/// Parses a numeric project id, treating a blank value as absent
pub fn parse_project_id(raw: Option<&str>) -> Result<Option<u64>, DeployError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(&format!("project id must be a number, got '{}'", value))),
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn invalid(message: &str) -> DeployError {
    DeployError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> Config {
        Config::new("gitlab.example.com", "secret", "/srv/www", "/srv/backups").with_project_id(3)
    }

    #[test]
    fn test_default_config() {
        let config = config();
        assert_eq!(config.artifact_subdir, PathBuf::from("dest"));
        assert_eq!(config.deploy_stage, "build");
        assert_eq!(config.strategy, DeployStrategy::Swap);
        assert!(config.commit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = config();

        config.host = String::new();
        assert!(config.validate().is_err());
        config.host = "gitlab.example.com".to_string();

        config.token = String::new();
        assert!(config.validate().is_err());
        config.token = "secret".to_string();

        config.artifact_subdir = PathBuf::from("../escape");
        assert!(config.validate().is_err());
        config.artifact_subdir = PathBuf::from("/abs");
        assert!(config.validate().is_err());
        config.artifact_subdir = PathBuf::from("dist/dest");
        assert!(config.validate().is_ok());

        config.timeouts.read = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backup_dir_inside_dest_rejected() {
        let config = Config::new("h", "t", "/srv/www", "/srv/www/backups").with_project_id(1);
        assert!(matches!(config.validate(), Err(DeployError::Config(_))));

        let config = Config::new("h", "t", "/srv/www", "/srv/www").with_project_id(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_project_identity_required() {
        let config = Config::new("h", "t", "/srv/www", "/srv/backups");
        assert!(matches!(
            config.validate(),
            Err(DeployError::Resolution(ResolutionError::MissingIdentity))
        ));

        let config = config.with_project_name("site");
        assert_eq!(
            config.project_identity().unwrap(),
            ProjectIdentity::Name("site".to_string())
        );
    }

    #[test]
    fn test_blank_commit_means_no_pin() {
        assert_eq!(config().with_commit("  ").commit, None);
        assert_eq!(config().with_commit("abc123").commit.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_parse_project_id() {
        assert_eq!(parse_project_id(None).unwrap(), None);
        assert_eq!(parse_project_id(Some("")).unwrap(), None);
        assert_eq!(parse_project_id(Some(" 42 ")).unwrap(), Some(42));
        assert!(parse_project_id(Some("forty-two")).is_err());
    }
}
