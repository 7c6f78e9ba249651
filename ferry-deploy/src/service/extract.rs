//! Artifact archive extraction
//!
//! Expands a downloaded artifact into the workspace. Zip archives are what
//! the registry produces; gzip-compressed tarballs are accepted as well.
//! The format is detected from the file's leading bytes, not its name.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::error::{ArchiveError, DeployError};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

/// Extract `archive` into `dest_dir`, creating it if needed
///
/// # Returns
/// The destination directory
pub async fn extract(archive: &Path, dest_dir: &Path) -> Result<PathBuf, DeployError> {
    let (src, dest) = (archive.to_owned(), dest_dir.to_owned());

    let result = spawn_blocking(move || extract_sync(&src, &dest))
        .await
        .map_err(|e| ArchiveError::Io(io::Error::other(e)))
        .and_then(|result| result);

    match result {
        Ok(()) => Ok(dest_dir.to_path_buf()),
        Err(source) => Err(DeployError::Extraction {
            archive: archive.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the directory inside an extracted tree that holds the deployable files
pub fn install_source(extracted: &Path, subdir: &Path) -> Result<PathBuf, ArchiveError> {
    let source = extracted.join(subdir);
    if source.is_dir() {
        Ok(source)
    } else {
        Err(ArchiveError::MissingSubdir(subdir.display().to_string()))
    }
}

fn extract_sync(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let mut file = File::open(archive)?;
    let format = detect_format(&mut file)?;
    debug!("Extracting {} as {:?}", archive.display(), format);

    std::fs::create_dir_all(dest)?;

    match format {
        ArchiveFormat::Zip => extract_zip(file, dest),
        ArchiveFormat::TarGz => extract_tar_gz(file, dest),
    }
}

fn detect_format(file: &mut File) -> Result<ArchiveFormat, ArchiveError> {
    let mut magic = [0u8; 4];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..])? {
            0 => break,
            n => read += n,
        }
    }
    file.seek(SeekFrom::Start(0))?;

    let magic = &magic[..read];
    if magic == ZIP_MAGIC || magic == ZIP_EMPTY_MAGIC {
        Ok(ArchiveFormat::Zip)
    } else if magic.starts_with(&GZIP_MAGIC) {
        Ok(ArchiveFormat::TarGz)
    } else {
        Err(ArchiveError::UnsupportedFormat)
    }
}

fn extract_zip(file: File, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // Entries that would land outside `dest` are skipped
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let outpath = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        if entry.is_symlink() {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            if link_stays_inside(&relative, Path::new(&target)) {
                std::os::unix::fs::symlink(&target, &outpath)?;
            } else {
                debug!("Skipping zip symlink {} -> {}", entry.name(), target);
            }
            continue;
        }

        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

/// Whether a link stored at `link` (relative to the extraction root) and
/// pointing at `target` resolves to a path inside that root
#[cfg(unix)]
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    use std::path::Component;

    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn extract_tar_gz(file: File, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dest)?;
    Ok(())
}
