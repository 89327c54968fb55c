//! Validation chain behind `staunch check`.

use crate::kernel::fs::{self, PathStatus};
use crate::link::store::{AttributeStore, LinkStore};
use std::fmt;
use std::path::{Path, PathBuf};

/// First failing predicate of the chain, or `Valid`.
///
/// The chain runs in declaration order: exists, is a symlink, record
/// decodes, points to the launcher, target exists, target executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// The link or its target can't be inspected for a reason other than absence.
    Inaccessible,
    Missing,
    NotSymlink,
    InvalidRecord,
    WrongLauncher,
    TargetMissing,
    TargetNotExecutable,
    Valid,
}

impl CheckStatus {
    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Inaccessible => "ERROR(can't be inspected)",
            CheckStatus::Missing => "ERROR(doesn't exist)",
            CheckStatus::NotSymlink => "ERROR(isn't a link)",
            CheckStatus::InvalidRecord => "ERROR(isn't a valid staunch link)",
            CheckStatus::WrongLauncher => "ERROR(isn't linked to launcher)",
            CheckStatus::TargetMissing => "ERROR(app path doesn't exist)",
            CheckStatus::TargetNotExecutable => "ERROR(app path isn't executable)",
            CheckStatus::Valid => "valid",
        }
    }

    pub fn is_valid(self) -> bool {
        self == CheckStatus::Valid
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEntry {
    pub link: PathBuf,
    pub status: CheckStatus,
}

/// Outcome of a `check` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub entries: Vec<CheckEntry>,
    pub launcher: PathBuf,
    pub launcher_executable: bool,
}

impl CheckReport {
    /// True if any link, or the launcher itself, failed.
    pub fn failed(&self) -> bool {
        !self.launcher_executable || self.entries.iter().any(|e| !e.status.is_valid())
    }
}

pub(crate) fn check_link<A: AttributeStore>(
    store: &LinkStore<A>,
    launcher: &Path,
    link: &Path,
) -> CheckStatus {
    match fs::classify(link) {
        Ok(PathStatus::Missing) => return CheckStatus::Missing,
        Ok(PathStatus::IsSymlink) => {}
        Ok(_) => return CheckStatus::NotSymlink,
        Err(_) => return CheckStatus::Inaccessible,
    }

    let record = match store.read_link_record(link) {
        Ok(record) => record,
        Err(e) => {
            log::debug!("{}: {}", link.display(), e);
            return CheckStatus::InvalidRecord;
        }
    };

    if !points_to(link, launcher) {
        return CheckStatus::WrongLauncher;
    }

    let target = record.target_path();
    match fs::exists(target) {
        Ok(true) => {}
        Ok(false) => return CheckStatus::TargetMissing,
        Err(_) => return CheckStatus::Inaccessible,
    }
    match fs::is_executable(target) {
        Ok(true) => {}
        Ok(false) => return CheckStatus::TargetNotExecutable,
        Err(_) => return CheckStatus::Inaccessible,
    }

    CheckStatus::Valid
}

/// Whether `link` points to `launcher`, literally or after resolution.
fn points_to(link: &Path, launcher: &Path) -> bool {
    match std::fs::read_link(link) {
        Ok(target) if target == launcher => return true,
        Ok(_) => {}
        Err(_) => return false,
    }

    match (std::fs::canonicalize(link), std::fs::canonicalize(launcher)) {
        (Ok(resolved), Ok(expected)) => resolved == expected,
        _ => false,
    }
}
