//! Build selection
//!
//! Picks the single build to deploy out of the candidates the registry
//! returned. Selection is pure: no I/O, no clock.

use crate::domain::build::BuildRecord;
use crate::error::CoreError;

/// Stage marker of builds that produce a deployable artifact
pub const DEPLOY_STAGE: &str = "build";

/// Selects the most recently finished build of the deploy stage
pub fn select_build(builds: Vec<BuildRecord>) -> Result<BuildRecord, CoreError> {
    select_build_for_stage(builds, DEPLOY_STAGE)
}

/// Selects the most recently finished build of `stage`
///
/// Candidates are sorted ascending by `finished_at` with a stable sort, so
/// among builds that finished at the same instant the one listed last by the
/// registry wins. Unfinished builds sort before every finished one.
pub fn select_build_for_stage(
    builds: Vec<BuildRecord>,
    stage: &str,
) -> Result<BuildRecord, CoreError> {
    let mut candidates: Vec<BuildRecord> = builds.into_iter().filter(|b| b.stage == stage).collect();

    candidates.sort_by_key(|b| b.finished_at);

    candidates.pop().ok_or_else(|| CoreError::NoBuildFound {
        stage: stage.to_string(),
    })
}
