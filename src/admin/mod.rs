//! Link administration: `set`, `get` and `check`.
//!
//! Batch operations visit every link even after failures; the caller decides
//! how to report each entry.

mod check;

pub use check::{CheckEntry, CheckReport, CheckStatus};

use crate::config::settings::StaunchSettings;
use crate::config::types::{Result, StaunchError};
use crate::kernel::fs;
use crate::link::record::{GroupId, LinkRecord};
use crate::link::store::{AttributeStore, LinkStore, XattrStore};
use crate::observability::audit::events;
use nix::unistd::{Gid, Group};
use std::path::{Path, PathBuf};

/// Arguments of `staunch set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRequest {
    pub identity: String,
    pub target: PathBuf,
    pub link: PathBuf,
    pub groups: Vec<GroupId>,
    pub force: bool,
}

/// Result of reading one link during `get`.
#[derive(Debug)]
pub struct GetEntry {
    pub link: PathBuf,
    pub record: Result<LinkRecord>,
}

pub struct LinkAdmin<A: AttributeStore> {
    store: LinkStore<A>,
    launcher: PathBuf,
}

impl LinkAdmin<XattrStore> {
    pub fn system(settings: &StaunchSettings) -> Self {
        Self::new(
            LinkStore::new(XattrStore, settings.max_attribute_size),
            settings.launcher.clone(),
        )
    }
}

impl<A: AttributeStore> LinkAdmin<A> {
    pub fn new(store: LinkStore<A>, launcher: PathBuf) -> Self {
        Self { store, launcher }
    }

    /// Use `launcher` instead of the configured one.
    pub fn with_launcher(mut self, launcher: PathBuf) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    pub fn store(&self) -> &LinkStore<A> {
        &self.store
    }

    /// Create (or with `force`, replace) a secure link.
    pub fn set(&self, request: &SetRequest) -> Result<()> {
        let result = self.prepare_record(request).and_then(|record| {
            match self
                .store
                .create_link(&request.link, &self.launcher, &record, request.force)
            {
                Ok(()) => Ok(record),
                Err(e) => {
                    if matches!(e, StaunchError::VerificationFailed(_)) {
                        events::link_verification_failed(&request.link, &record, &e);
                    }
                    Err(e)
                }
            }
        });

        match result {
            Ok(record) => {
                events::link_created(&request.link, &self.launcher, &record);
                Ok(())
            }
            Err(e) => {
                if !matches!(e, StaunchError::VerificationFailed(_)) {
                    events::link_rejected(&request.link, &e);
                }
                Err(e)
            }
        }
    }

    fn prepare_record(&self, request: &SetRequest) -> Result<LinkRecord> {
        let target = std::fs::canonicalize(&request.target).map_err(|e| {
            log::debug!("Cannot resolve {}: {}", request.target.display(), e);
            StaunchError::InvalidTarget(request.target.clone())
        })?;
        if !fs::is_executable(&target)? {
            return Err(StaunchError::InvalidTarget(target));
        }

        if !self.launcher.is_absolute() || !fs::is_executable(&self.launcher)? {
            return Err(StaunchError::InvalidLauncher(self.launcher.clone()));
        }

        LinkRecord::new(
            request.identity.clone(),
            target,
            request.groups.iter().copied(),
        )
    }

    /// Read every link in `links`, one entry per link, in order.
    pub fn get(&self, links: &[PathBuf]) -> Vec<GetEntry> {
        links
            .iter()
            .map(|link| GetEntry {
                link: link.clone(),
                record: self.store.read_link_record(link),
            })
            .collect()
    }

    /// Run the validation chain on every link, then check the launcher.
    pub fn check(&self, links: &[PathBuf]) -> CheckReport {
        let entries = links
            .iter()
            .map(|link| CheckEntry {
                link: link.clone(),
                status: check::check_link(&self.store, &self.launcher, link),
            })
            .collect();

        let launcher_executable = fs::is_executable(&self.launcher).unwrap_or(false);
        if !launcher_executable {
            log::warn!("Launcher {} is not executable", self.launcher.display());
        }

        CheckReport {
            entries,
            launcher: self.launcher.clone(),
            launcher_executable,
        }
    }
}

/// Resolve a `--group` argument: a decimal gid or a group name.
pub fn resolve_group(name: &str) -> Result<GroupId> {
    let gid = if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse::<libc::gid_t>()
            .map_err(|_| StaunchError::InvalidGroup(format!("{}: out of range", name)))?
    } else {
        match Group::from_name(name) {
            Ok(Some(group)) => group.gid.as_raw(),
            Ok(None) => {
                return Err(StaunchError::InvalidGroup(format!("{}: no such group", name)))
            }
            Err(e) => {
                return Err(StaunchError::InvalidGroup(format!(
                    "{}: group lookup failed: {}",
                    name, e
                )))
            }
        }
    };

    GroupId::new(gid)
        .ok_or_else(|| StaunchError::InvalidGroup(format!("{}: gid {} is reserved", name, gid)))
}

/// One `get` output line: `<link>: <identity> <target>[ groups=<gid>(<name>),...]`.
pub fn describe(link: &Path, record: &LinkRecord) -> String {
    let mut line = format!(
        "{}: {} {}",
        link.display(),
        record.identity(),
        record.target_path().display()
    );

    if !record.groups().is_empty() {
        let groups: Vec<String> = record
            .groups()
            .iter()
            .map(|gid| format!("{}({})", gid, group_name(*gid)))
            .collect();
        line.push_str(" groups=");
        line.push_str(&groups.join(","));
    }
    line
}

fn group_name(gid: GroupId) -> String {
    match Group::from_gid(Gid::from_raw(gid.value())) {
        Ok(Some(group)) => group.name,
        _ => "?".to_string(),
    }
}
