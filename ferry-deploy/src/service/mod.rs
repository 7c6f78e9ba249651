//! Service layer
//!
//! Filesystem work of a deployment run: the scratch workspace, archive
//! extraction, and the backup/purge/install operations on the live directory.

pub mod deploy_dir;
pub mod extract;
pub mod workspace;

pub use deploy_dir::{backup, backup_path_for, install, purge, swap};
pub use extract::extract;
pub use workspace::Workspace;
