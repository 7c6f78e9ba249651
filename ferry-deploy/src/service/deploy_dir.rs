//! Deployment directory management
//!
//! Operations on the live directory, in the order a run applies them:
//! - `backup`: snapshot the current contents into a `.tar.gz`
//! - `purge` + `install`: empty the directory, then move the new entries in
//! - `swap`: alternative to purge + install that stages the new tree beside
//!   the live directory and renames it into place
//!
//! None of these is transactional. Entries already removed or moved stay that
//! way when a later entry fails.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::task::{JoinSet, spawn_blocking};
use tracing::{debug, info, warn};

use crate::error::DeployError;

/// Timestamp layout of backup archive names, to minute granularity
pub const BACKUP_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M";

pub const BACKUP_EXTENSION: &str = "tar.gz";

/// Outcome of one per-entry task: the entry's file name, or the path that failed
type EntryResult = Result<String, (PathBuf, io::Error)>;

// =============================================================================
// Backup
// =============================================================================

/// Path of the backup archive for a run started at `now`
///
/// Archives are never overwritten: when the name for this minute is taken, a
/// numeric suffix is appended.
pub fn backup_path_for<Tz: TimeZone>(backup_dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = now.format(BACKUP_NAME_FORMAT).to_string();
    let mut path = backup_dir.join(format!("{}.{}", stamp, BACKUP_EXTENSION));
    let mut n = 1;
    while path.exists() {
        path = backup_dir.join(format!("{}-{}.{}", stamp, n, BACKUP_EXTENSION));
        n += 1;
    }
    path
}

/// Compress the contents of `live_dir` into a new archive at `backup_path`
///
/// Returns once the archive is finished, flushed, and synced to disk. On
/// failure the partial archive is removed and the live directory is untouched.
pub async fn backup(live_dir: &Path, backup_path: &Path) -> Result<(), DeployError> {
    let (src, dst) = (live_dir.to_owned(), backup_path.to_owned());

    spawn_blocking(move || backup_sync(&src, &dst))
        .await
        .map_err(io::Error::other)
        .and_then(|result| result)
        .map_err(|source| DeployError::Backup {
            path: backup_path.to_path_buf(),
            source,
        })?;

    info!(
        "Backed up {} to {}",
        live_dir.display(),
        backup_path.display()
    );
    Ok(())
}

fn backup_sync(live_dir: &Path, backup_path: &Path) -> io::Result<()> {
    if !live_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", live_dir.display()),
        ));
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(backup_path)?;

    if let Err(e) = write_archive(file, live_dir) {
        if let Err(rm) = std::fs::remove_file(backup_path) {
            warn!(
                "Failed to remove partial backup {}: {}",
                backup_path.display(),
                rm
            );
        }
        return Err(e);
    }
    Ok(())
}

fn write_archive(file: File, live_dir: &Path) -> io::Result<()> {
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for entry in std::fs::read_dir(live_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_dir() {
            builder.append_dir_all(&name, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    let file = builder.into_inner()?.finish()?;
    file.sync_all()
}

// =============================================================================
// Purge
// =============================================================================

/// Remove every direct child of `live_dir`, keeping the directory itself
///
/// Children are listed before anything is removed. Every removal runs to
/// completion; the first failure is returned and the rest are logged.
///
/// # Returns
/// Number of entries removed
pub async fn purge(live_dir: &Path) -> Result<usize, DeployError> {
    let children = list_children(live_dir)
        .await
        .map_err(|source| DeployError::Purge {
            path: live_dir.to_path_buf(),
            source,
        })?;

    let mut tasks = JoinSet::new();
    for path in children {
        tasks.spawn(async move {
            match remove_entry(&path).await {
                Ok(()) => Ok(entry_name(&path)),
                Err(e) => Err((path, e)),
            }
        });
    }

    let removed = join_entries(tasks)
        .await
        .map_err(|(path, source)| DeployError::Purge { path, source })?;

    info!("Removed {} entries from {}", removed.len(), live_dir.display());
    Ok(removed.len())
}

async fn remove_entry(path: &Path) -> io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

// =============================================================================
// Install
// =============================================================================

/// Move every direct child of `source_dir` into `live_dir`
///
/// Moves run concurrently. Each is a rename, falling back to copy and
/// delete when the two directories are on different filesystems.
///
/// # Returns
/// Sorted names of the installed entries
pub async fn install(source_dir: &Path, live_dir: &Path) -> Result<Vec<String>, DeployError> {
    let children = list_children(source_dir)
        .await
        .map_err(|source| DeployError::Install {
            path: source_dir.to_path_buf(),
            source,
        })?;

    let mut tasks = JoinSet::new();
    for src in children {
        let dst = live_dir.join(entry_name(&src));
        tasks.spawn(async move {
            match move_entry(&src, &dst).await {
                Ok(()) => Ok(entry_name(&src)),
                Err(e) => Err((src, e)),
            }
        });
    }

    let mut installed = join_entries(tasks)
        .await
        .map_err(|(path, source)| DeployError::Install { path, source })?;
    installed.sort();

    info!(
        "Installed {} entries into {}",
        installed.len(),
        live_dir.display()
    );
    Ok(installed)
}

async fn move_entry(src: &Path, dst: &Path) -> io::Result<()> {
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Copying {} across filesystems", src.display());
            let (src, dst) = (src.to_owned(), dst.to_owned());
            spawn_blocking(move || {
                copy_tree(&src, &dst)?;
                remove_tree(&src)
            })
            .await
            .map_err(io::Error::other)?
        }
        Err(e) => Err(e),
    }
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = std::fs::symlink_metadata(src)?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        #[cfg(unix)]
        std::os::unix::fs::symlink(std::fs::read_link(src)?, dst)?;
        #[cfg(not(unix))]
        std::fs::copy(src, dst)?;
    } else if file_type.is_dir() {
        std::fs::create_dir(dst)?;
        std::fs::set_permissions(dst, metadata.permissions())?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(src, dst)?;
    }
    Ok(())
}

fn remove_tree(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

// =============================================================================
// Swap
// =============================================================================

/// Replace the contents of `live_dir` with the children of `source_dir` by renaming
///
/// The new tree is assembled in a hidden sibling of `live_dir`, so it shares
/// the live directory's filesystem. Then the live directory is renamed aside
/// and the staged tree renamed into its place, both in one blocking call. If
/// that second rename fails the old tree is put back. The old tree is deleted
/// once the swap succeeded.
///
/// # Returns
/// Sorted names of the installed entries
pub async fn swap(
    source_dir: &Path,
    live_dir: &Path,
    run_id: &str,
) -> Result<Vec<String>, DeployError> {
    let (staging, previous) = sibling_paths(live_dir, run_id)?;
    let install_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| DeployError::Install { path, source }
    };

    let permissions = tokio::fs::metadata(live_dir)
        .await
        .map_err(install_err(live_dir))?
        .permissions();
    tokio::fs::create_dir(&staging)
        .await
        .map_err(install_err(&staging))?;

    let installed = match stage(source_dir, &staging, permissions).await {
        Ok(installed) => installed,
        Err(e) => {
            discard(&staging).await;
            return Err(e);
        }
    };

    let (incoming, live, retired) = (staging.clone(), live_dir.to_owned(), previous.clone());
    let committed = spawn_blocking(move || commit_swap(&incoming, &live, &retired))
        .await
        .unwrap_or_else(|e| {
            Err(DeployError::Install {
                path: live_dir.to_path_buf(),
                source: io::Error::other(e),
            })
        });
    if let Err(e) = committed {
        discard(&staging).await;
        return Err(e);
    }

    info!("Swapped new tree into {}", live_dir.display());
    discard(&previous).await;
    Ok(installed)
}

/// Rename `live` to `previous` and `staging` to `live`
///
/// Both renames, and putting `previous` back when the second one fails, run
/// in one blocking call. Dropping the calling future cannot stop it between
/// the two renames, so `live` never stays missing.
fn commit_swap(staging: &Path, live: &Path, previous: &Path) -> Result<(), DeployError> {
    std::fs::rename(live, previous).map_err(|source| DeployError::Install {
        path: live.to_path_buf(),
        source,
    })?;

    if let Err(source) = std::fs::rename(staging, live) {
        if let Err(e) = std::fs::rename(previous, live) {
            warn!(
                "Failed to restore {} from {}: {}",
                live.display(),
                previous.display(),
                e
            );
        }
        return Err(DeployError::Install {
            path: staging.to_path_buf(),
            source,
        });
    }
    Ok(())
}

async fn stage(
    source_dir: &Path,
    staging: &Path,
    permissions: std::fs::Permissions,
) -> Result<Vec<String>, DeployError> {
    tokio::fs::set_permissions(staging, permissions)
        .await
        .map_err(|source| DeployError::Install {
            path: staging.to_path_buf(),
            source,
        })?;
    install(source_dir, staging).await
}

/// Hidden staging and retirement names next to `live_dir`
fn sibling_paths(live_dir: &Path, run_id: &str) -> Result<(PathBuf, PathBuf), DeployError> {
    let name = live_dir.file_name().ok_or_else(|| DeployError::Install {
        path: live_dir.to_path_buf(),
        source: io::Error::new(
            io::ErrorKind::InvalidInput,
            "destination directory has no name to swap",
        ),
    })?;
    let parent = match live_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = name.to_string_lossy();

    Ok((
        parent.join(format!(".{}.incoming-{}", name, run_id)),
        parent.join(format!(".{}.previous-{}", name, run_id)),
    ))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn list_children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        children.push(entry.path());
    }
    Ok(children)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Wait for every task, keeping the first failure
async fn join_entries(mut tasks: JoinSet<EntryResult>) -> Result<Vec<String>, (PathBuf, io::Error)> {
    let mut done = Vec::new();
    let mut first_failure = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err((PathBuf::new(), io::Error::other(e))));
        match outcome {
            Ok(name) => done.push(name),
            Err((path, e)) if first_failure.is_none() => first_failure = Some((path, e)),
            Err((path, e)) => warn!("Also failed on {}: {}", path.display(), e),
        }
    }

    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(done),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Local, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::service::extract::extract;

    /// Relative path -> contents of every file under `root`
    fn snapshot(root: &Path) -> BTreeMap<String, String> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                    out.insert(rel, std::fs::read_to_string(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    fn snapshot_names(root: &Path) -> Vec<std::ffi::OsString> {
        let mut names: Vec<_> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        names.sort();
        names
    }

    fn populate(root: &Path) {
        std::fs::write(root.join("index.html"), "old index").unwrap();
        std::fs::create_dir_all(root.join("assets/img")).unwrap();
        std::fs::write(root.join("assets/app.js"), "old app").unwrap();
        std::fs::write(root.join("assets/img/logo.svg"), "<svg/>").unwrap();
    }

    #[test]
    fn backup_name_uses_minute_timestamp() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap();

        let path = backup_path_for(dir.path(), &now);

        assert_eq!(path, dir.path().join("2023-04-05_06-07.tar.gz"));
    }

    #[test]
    fn backup_name_never_reuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let now = Local::now();
        let first = backup_path_for(dir.path(), &now);
        std::fs::write(&first, b"taken").unwrap();

        let second = backup_path_for(dir.path(), &now);

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-1.tar.gz"));
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips() {
        let live = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        populate(live.path());
        let archive = work.path().join("backup.tar.gz");

        backup(live.path(), &archive).await.unwrap();

        let extracted = extract(&archive, &work.path().join("restored")).await.unwrap();
        let target = TempDir::new().unwrap();
        install(&extracted, target.path()).await.unwrap();

        assert_eq!(snapshot(target.path()), snapshot(live.path()));
    }

    #[tokio::test]
    async fn backup_of_missing_dir_fails_without_leaving_file() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("backup.tar.gz");

        let err = backup(&work.path().join("missing"), &archive).await.unwrap_err();

        assert!(matches!(err, DeployError::Backup { .. }));
        assert!(!archive.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backup_failing_mid_stream_removes_partial_archive() {
        let live = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        populate(live.path());
        let _socket = std::os::unix::net::UnixListener::bind(live.path().join("app.sock")).unwrap();
        let before = snapshot_names(live.path());
        let archive = work.path().join("backup.tar.gz");

        let err = backup(live.path(), &archive).await.unwrap_err();

        assert!(matches!(err, DeployError::Backup { .. }));
        assert!(!archive.exists());
        assert_eq!(snapshot_names(live.path()), before);
    }

    #[tokio::test]
    async fn backup_refuses_to_overwrite() {
        let live = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let archive = work.path().join("backup.tar.gz");
        std::fs::write(&archive, b"earlier backup").unwrap();

        let err = backup(live.path(), &archive).await.unwrap_err();

        assert!(matches!(err, DeployError::Backup { .. }));
        assert_eq!(std::fs::read(&archive).unwrap(), b"earlier backup");
    }

    #[tokio::test]
    async fn purge_removes_children_but_keeps_dir() {
        let live = TempDir::new().unwrap();
        populate(live.path());

        let removed = purge(live.path()).await.unwrap();

        assert_eq!(removed, 2);
        assert!(live.path().is_dir());
        assert_eq!(std::fs::read_dir(live.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn purge_of_empty_dir_is_noop() {
        let live = TempDir::new().unwrap();

        assert_eq!(purge(live.path()).await.unwrap(), 0);
        assert_eq!(purge(live.path()).await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(live.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn purge_removes_symlink_not_target() {
        let live = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("keep.txt"), "keep").unwrap();
        std::os::unix::fs::symlink(outside.path(), live.path().join("link")).unwrap();

        purge(live.path()).await.unwrap();

        assert!(outside.path().join("keep.txt").exists());
        assert_eq!(std::fs::read_dir(live.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn purge_of_missing_dir_fails() {
        let work = TempDir::new().unwrap();

        let err = purge(&work.path().join("missing")).await.unwrap_err();

        assert!(matches!(err, DeployError::Purge { .. }));
    }

    #[tokio::test]
    async fn install_moves_children() {
        let source = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        populate(source.path());
        let expected = snapshot(source.path());

        let installed = install(source.path(), live.path()).await.unwrap();

        assert_eq!(installed, vec!["assets".to_string(), "index.html".to_string()]);
        assert_eq!(snapshot(live.path()), expected);
        assert_eq!(std::fs::read_dir(source.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn install_into_missing_dir_fails() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        populate(source.path());

        let err = install(source.path(), &work.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Install { .. }));
    }

    #[test]
    fn copy_tree_duplicates_nested_layout() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        populate(source.path());

        copy_tree(&source.path().join("assets"), &target.path().join("assets")).unwrap();
        remove_tree(&source.path().join("assets")).unwrap();

        assert_eq!(
            std::fs::read_to_string(target.path().join("assets/img/logo.svg")).unwrap(),
            "<svg/>"
        );
        assert!(!source.path().join("assets").exists());
    }

    #[tokio::test]
    async fn swap_replaces_contents_and_cleans_siblings() {
        let root = TempDir::new().unwrap();
        let live = root.path().join("site");
        std::fs::create_dir(&live).unwrap();
        populate(&live);
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("new.html"), "new").unwrap();

        let installed = swap(source.path(), &live, "run1").await.unwrap();

        assert_eq!(installed, vec!["new.html".to_string()]);
        assert_eq!(
            snapshot(&live),
            BTreeMap::from([("new.html".to_string(), "new".to_string())])
        );
        let siblings: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings, vec![std::ffi::OsString::from("site")]);
    }

    #[tokio::test]
    async fn failed_swap_leaves_live_dir_untouched() {
        let root = TempDir::new().unwrap();
        let live = root.path().join("site");
        std::fs::create_dir(&live).unwrap();
        populate(&live);
        let before = snapshot(&live);

        let err = swap(&root.path().join("no-source"), &live, "run2")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Install { .. }));
        assert_eq!(snapshot(&live), before);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn commit_swap_restores_live_dir_when_staging_is_gone() {
        let root = TempDir::new().unwrap();
        let live = root.path().join("site");
        std::fs::create_dir(&live).unwrap();
        populate(&live);
        let before = snapshot(&live);
        let previous = root.path().join(".site.previous-run3");

        let err = commit_swap(&root.path().join(".site.incoming-run3"), &live, &previous)
            .unwrap_err();

        assert!(matches!(err, DeployError::Install { .. }));
        assert_eq!(snapshot(&live), before);
        assert!(!previous.exists());
    }

    #[test]
    fn commit_swap_moves_old_tree_aside() {
        let root = TempDir::new().unwrap();
        let live = root.path().join("site");
        let staging = root.path().join(".site.incoming-run4");
        let previous = root.path().join(".site.previous-run4");
        std::fs::create_dir(&live).unwrap();
        populate(&live);
        std::fs::create_dir(&staging).unwrap();
        std::fs::write(staging.join("new.html"), "new").unwrap();

        commit_swap(&staging, &live, &previous).unwrap();

        assert_eq!(std::fs::read_to_string(live.join("new.html")).unwrap(), "new");
        assert_eq!(
            std::fs::read_to_string(previous.join("index.html")).unwrap(),
            "old index"
        );
        assert!(!staging.exists());
    }

    #[test]
    fn sibling_names_are_hidden_and_run_scoped() {
        let (staging, previous) = sibling_paths(Path::new("/srv/www"), "abc").unwrap();
        assert_eq!(staging, PathBuf::from("/srv/.www.incoming-abc"));
        assert_eq!(previous, PathBuf::from("/srv/.www.previous-abc"));

        let (staging, _) = sibling_paths(Path::new("www"), "abc").unwrap();
        assert_eq!(staging, PathBuf::from("./.www.incoming-abc"));

        assert!(sibling_paths(Path::new("/"), "abc").is_err());
    }
}
