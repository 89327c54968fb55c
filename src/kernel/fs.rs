//! Path predicates shared by administration and launch.
//!
//! Permission errors are reported, never folded into "missing".

use crate::config::types::Result;
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use std::io::ErrorKind;
use std::path::Path;

/// What a path is, from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Missing,
    Exists,
    IsSymlink,
    IsExecutable,
}

/// Classify `path` without following a final symlink.
pub fn classify(path: &Path) -> Result<PathStatus> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PathStatus::Missing),
        Err(e) => {
            log::error!("can't get status of {}: {}", path.display(), e);
            return Err(e.into());
        }
    };

    if metadata.file_type().is_symlink() {
        return Ok(PathStatus::IsSymlink);
    }
    if metadata.is_file() && is_executable(path)? {
        return Ok(PathStatus::IsExecutable);
    }
    Ok(PathStatus::Exists)
}

/// Whether `path` exists, following symlinks. A dangling link does not exist.
pub fn exists(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => {
            log::error!("can't get access of {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Whether `path` resolves to a regular file the caller may execute.
pub fn is_executable(path: &Path) -> Result<bool> {
    match access(path, AccessFlags::X_OK) {
        Ok(()) => {}
        Err(Errno::EACCES) | Err(Errno::ENOENT) | Err(Errno::ENOTDIR) | Err(Errno::ELOOP) => {
            return Ok(false)
        }
        Err(errno) => {
            log::error!("can't get access of {}: {}", path.display(), errno);
            return Err(std::io::Error::from(errno).into());
        }
    }

    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
