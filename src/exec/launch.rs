//! Launch through a secure link: the `stauncher` side.
//!
//! The invoked path must be a symlink carrying a record. Everything up to the
//! privilege drop is side-effect free; from there on any failure ends the
//! launch without reaching the target.

use super::identity::{IdentityService, NoSecurityManager};
use super::preexec::drop_privileges;
use crate::config::settings::{Argv0Mode, IdentityMode, StaunchSettings};
use crate::config::types::{Result, StaunchError};
use crate::kernel::fs::{self, PathStatus};
use crate::kernel::process::{LinuxProcess, ProcessControl};
use crate::link::record::LinkRecord;
use crate::link::store::{AttributeStore, LinkStore, XattrStore};
use crate::observability::audit::events;
use std::convert::Infallible;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

/// Launch behavior fixed at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchOptions {
    pub check_target_executable: bool,
    pub argv0: Argv0Mode,
    pub identity_mode: IdentityMode,
}

impl LaunchOptions {
    pub fn from_settings(settings: &StaunchSettings) -> Self {
        Self {
            check_target_executable: settings.check_target_executable,
            argv0: settings.argv0,
            identity_mode: settings.identity_mode,
        }
    }
}

pub struct LaunchEngine<A: AttributeStore, P: ProcessControl, I: IdentityService> {
    store: LinkStore<A>,
    process: P,
    identity: I,
    options: LaunchOptions,
}

impl LaunchEngine<XattrStore, LinuxProcess, NoSecurityManager> {
    /// Engine acting on the real process and the `security.staunch` attribute.
    pub fn system(settings: &StaunchSettings) -> Self {
        Self::new(
            LinkStore::new(XattrStore, settings.max_attribute_size),
            LinuxProcess,
            NoSecurityManager,
            LaunchOptions::from_settings(settings),
        )
    }
}

impl<A: AttributeStore, P: ProcessControl, I: IdentityService> LaunchEngine<A, P, I> {
    pub fn new(store: LinkStore<A>, process: P, identity: I, options: LaunchOptions) -> Self {
        Self {
            store,
            process,
            identity,
            options,
        }
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    /// Run the target of the link at `invoked`. Returns only on failure.
    ///
    /// `argv` and `envp` are handed to the target unchanged, except for
    /// `argv[0]` when an argv0 rewrite is configured.
    pub fn launch(
        &self,
        invoked: &Path,
        argv: Vec<OsString>,
        envp: Vec<(OsString, OsString)>,
    ) -> Result<Infallible> {
        let link = resolve_invoked_path(invoked, search_path(&envp))?;

        match fs::classify(&link)? {
            PathStatus::IsSymlink => {}
            PathStatus::Missing => return Err(StaunchError::NotFound(link)),
            _ => return Err(StaunchError::NotSymlink(link)),
        }

        let record = self.store.read_link_record(&link)?;
        log::debug!(
            "{} carries identity '{}' for {}",
            link.display(),
            record.identity(),
            record.target_path().display()
        );

        if self.options.check_target_executable && !fs::is_executable(record.target_path())? {
            return Err(StaunchError::InvalidTarget(record.target_path().to_path_buf()));
        }

        // Built before any privilege change so a bad argument cannot fail mid-drop.
        let argv = to_c_strings(rewrite_argv0(argv, &record, self.options.argv0))?;
        let envp = to_c_strings(envp.into_iter().map(join_env_entry))?;

        events::launch_started(&link, &record);

        let ready = drop_privileges(
            &self.process,
            &self.identity,
            self.options.identity_mode,
            record.clone(),
        )
        .map_err(|e| {
            events::privilege_drop_failed(&link, &record, &e);
            e
        })?;

        let err = ready.exec(argv, envp);
        events::exec_failed(&link, &record, &err);
        Err(err)
    }
}

/// Locate the link the launcher was started through.
///
/// A bare name (no `/`) is looked up in `path_var` like a shell would.
pub fn resolve_invoked_path(invoked: &Path, path_var: Option<&OsStr>) -> Result<PathBuf> {
    if invoked.as_os_str().is_empty() {
        return Err(StaunchError::NotFound(invoked.to_path_buf()));
    }
    if invoked.as_os_str().as_bytes().contains(&b'/') {
        return Ok(invoked.to_path_buf());
    }

    let Some(path_var) = path_var else {
        return Err(StaunchError::NotFound(invoked.to_path_buf()));
    };
    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(invoked);
        if fs::classify(&candidate)? != PathStatus::Missing {
            return Ok(candidate);
        }
    }
    Err(StaunchError::NotFound(invoked.to_path_buf()))
}

fn search_path(envp: &[(OsString, OsString)]) -> Option<&OsStr> {
    envp.iter()
        .find(|(key, _)| key == "PATH")
        .map(|(_, value)| value.as_os_str())
}

/// Apply the configured `argv[0]` policy.
pub fn rewrite_argv0(mut argv: Vec<OsString>, record: &LinkRecord, mode: Argv0Mode) -> Vec<OsString> {
    let replacement = match mode {
        Argv0Mode::Preserve => return argv,
        Argv0Mode::RealPath => record.target_path().as_os_str().to_os_string(),
        Argv0Mode::BaseName => {
            let bytes = record.target_path().as_os_str().as_bytes();
            let start = bytes.iter().rposition(|b| *b == b'/').map_or(0, |i| i + 1);
            OsStr::from_bytes(&bytes[start..]).to_os_string()
        }
    };

    match argv.first_mut() {
        Some(first) => *first = replacement,
        None => argv.push(replacement),
    }
    argv
}

fn join_env_entry((key, value): (OsString, OsString)) -> OsString {
    let mut entry = key;
    entry.push("=");
    entry.push(value);
    entry
}

fn to_c_strings(items: impl IntoIterator<Item = OsString>) -> Result<Vec<CString>> {
    items
        .into_iter()
        .map(|item| {
            CString::new(item.into_vec()).map_err(|e| {
                StaunchError::Format(format!("argument contains a NUL byte: {}", e))
            })
        })
        .collect()
}
