//! Ferry
//!
//! Deploys the latest successful build artifact of a registry project into a
//! directory, backing up what was there first. Every option can be given as a
//! flag or through the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ferry_client::{RegistryClient, Timeouts};
use ferry_deploy::config::{DEFAULT_ARTIFACT_SUBDIR, parse_project_id};
use ferry_deploy::{Config, DeployStrategy, Pipeline};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ferry", version)]
#[command(about = "Deploy the latest successful build artifact", long_about = None)]
struct Cli {
    /// Registry host name, or full API base URL
    #[arg(long, env = "HOST")]
    host: String,

    /// Private token for the registry API
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    token: String,

    /// Live deployment directory
    #[arg(long, env = "DEST_DIR")]
    dest_dir: PathBuf,

    /// Directory receiving backup archives
    #[arg(long, env = "BACKUP_DIR")]
    backup_dir: PathBuf,

    /// Only deploy builds of this commit
    #[arg(long, env = "CI_BUILD_REF")]
    commit: Option<String>,

    /// Project name, used when no project id is given
    #[arg(long, env = "PROJECT_NAME")]
    project_name: Option<String>,

    /// Numeric project id
    #[arg(long, env = "CI_PROJECT_ID")]
    project_id: Option<String>,

    /// Directory inside the artifact whose contents are deployed
    #[arg(long, env = "ARTIFACT_SUBDIR", default_value = DEFAULT_ARTIFACT_SUBDIR)]
    artifact_subdir: PathBuf,

    /// Stage of the builds to deploy
    #[arg(long, env = "DEPLOY_STAGE", default_value = ferry_core::DEPLOY_STAGE)]
    deploy_stage: String,

    /// How the new contents replace the old ones
    #[arg(long, env = "DEPLOY_STRATEGY", value_enum, default_value_t = DeployStrategy::Swap)]
    strategy: DeployStrategy,

    /// Parent directory of the scratch workspace
    #[arg(long, env = "WORK_DIR_BASE")]
    work_dir_base: Option<PathBuf>,

    /// Deadline for registry API calls, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    /// Connect deadline, in seconds
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Longest stall allowed while downloading, in seconds
    #[arg(long, env = "READ_TIMEOUT", default_value_t = 60)]
    read_timeout: u64,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = Config::new(self.host, self.token, self.dest_dir, self.backup_dir)
            .with_strategy(self.strategy);

        config.project_id = parse_project_id(self.project_id.as_deref())?;
        config.project_name = self.project_name.filter(|name| !name.trim().is_empty());
        if let Some(commit) = self.commit {
            config = config.with_commit(commit);
        }
        if let Some(base) = self.work_dir_base {
            config = config.with_work_dir_base(base);
        }
        config.artifact_subdir = self.artifact_subdir;
        config.deploy_stage = self.deploy_stage;
        config.timeouts = Timeouts {
            request: Duration::from_secs(self.request_timeout),
            connect: Duration::from_secs(self.connect_timeout),
            read: Duration::from_secs(self.read_timeout),
        };

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info,ferry_deploy=info,ferry_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        "Deploying to {} (backups in {}, strategy {:?})",
        config.dest_dir.display(),
        config.backup_dir.display(),
        config.strategy
    );

    let client = RegistryClient::from_host(&config.host, config.token.clone(), config.timeouts)
        .context("Failed to initialize registry client")?;
    info!("Registry client initialized for {}", client.base_url());

    let mut pipeline = Pipeline::new(config, client);

    let result = tokio::select! {
        result = pipeline.run() => result,
        _ = tokio::signal::ctrl_c() => {
            error!("Interrupted, scratch workspace released");
            bail!("Deployment interrupted");
        }
    };

    match result {
        Ok(report) => {
            info!(
                "Deployed build {} of project {} ({} entries)",
                report.build_id,
                report.project_id,
                report.installed.len()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("Deployment failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let base = [
            "ferry",
            "--host",
            "gitlab.example.com",
            "--token",
            "secret",
            "--dest-dir",
            "/srv/www",
            "--backup-dir",
            "/srv/backups",
        ];
        let argv: Vec<&str> = base.iter().chain(args).copied().collect();
        Cli::try_parse_from(argv)?.into_config()
    }

    #[test]
    fn flags_map_onto_config() {
        let config = parse(&[
            "--project-id",
            "12",
            "--commit",
            "deadbeef",
            "--strategy",
            "in-place",
            "--read-timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(config.project_id, Some(12));
        assert_eq!(config.commit.as_deref(), Some("deadbeef"));
        assert_eq!(config.strategy, DeployStrategy::InPlace);
        assert_eq!(config.timeouts.read, Duration::from_secs(5));
        assert_eq!(config.artifact_subdir, PathBuf::from("dest"));
    }

    #[test]
    fn blank_project_id_falls_back_to_name() {
        let config = parse(&["--project-id", "", "--project-name", "site"]).unwrap();
        assert_eq!(config.project_id, None);
        assert_eq!(config.project_name.as_deref(), Some("site"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse(&["--project-id", "abc"]).is_err());
        assert!(parse(&["--project-id", "1", "--strategy", "rsync"]).is_err());
        assert!(parse(&["--project-id", "1", "--request-timeout", "0"]).is_err());
    }
}
