//! Privilege drop between "record read" and "process replaced".
//!
//! The sequence is FIXED and must not drift:
//! 1. supplementary groups: add the record's groups (setgroups only if changed)
//! 2. identity: bind the security label through the identity service
//! 3. umask: most restrictive file creation mask
//! 4. bounding set: drop every capability 0..=last_cap, each failure fatal
//! 5. capability sets: zero effective, permitted, inheritable
//! 6. execve the target
//!
//! Steps 1-2 are replaced by [`PrivilegeDrop::identity_assigned_externally`]
//! when a trusted service already did both atomically.
//!
//! Each step consumes the prior state and returns exactly one next state on
//! success, so a failed step leaves nothing to continue from. Only
//! `PrivilegeDrop<ExecReady>` exposes exec:
//!
//! ```compile_fail
//! use staunch::exec::preexec::{PrivilegeDrop, RecordLoaded};
//! use staunch::kernel::process::LinuxProcess;
//!
//! fn early_exec(drop: PrivilegeDrop<'_, LinuxProcess, RecordLoaded>) {
//!     drop.exec(Vec::new(), Vec::new());
//! }
//! ```
//!
//! Nor can the bounding set be skipped on the way:
//!
//! ```compile_fail
//! use staunch::exec::preexec::{MaskTightened, PrivilegeDrop};
//! use staunch::kernel::process::LinuxProcess;
//!
//! fn skip_bounding(drop: PrivilegeDrop<'_, LinuxProcess, MaskTightened>) {
//!     let _ = drop.zero_capabilities();
//! }
//! ```

use super::identity::IdentityService;
use crate::config::settings::IdentityMode;
use crate::config::types::{Result, StaunchError};
use crate::kernel::groups::reconcile;
use crate::kernel::process::ProcessControl;
use crate::link::record::LinkRecord;
use nix::sys::stat::Mode;
use std::ffi::CString;
use std::marker::PhantomData;
use std::os::unix::ffi::OsStrExt;

/// No permission bits for anything the launched process creates.
pub const RESTRICTIVE_UMASK: u32 = 0o777;

/// Type-state marker: record decoded, nothing changed yet
pub struct RecordLoaded;

/// Type-state marker: supplementary groups include the record's groups
pub struct GroupsAssigned;

/// Type-state marker: security identity bound
pub struct IdentityAssigned;

/// Type-state marker: umask tightened
pub struct MaskTightened;

/// Type-state marker: bounding set emptied
pub struct BoundingCleared;

/// Type-state marker: capability sets zeroed, ready to exec
pub struct ExecReady;

/// Launch in progress, with the type parameter tracking the completed step.
pub struct PrivilegeDrop<'p, P: ProcessControl + ?Sized, S> {
    process: &'p P,
    record: LinkRecord,
    _state: PhantomData<S>,
}

impl<'p, P: ProcessControl + ?Sized, S> PrivilegeDrop<'p, P, S> {
    pub fn record(&self) -> &LinkRecord {
        &self.record
    }

    fn advance<T>(self) -> PrivilegeDrop<'p, P, T> {
        PrivilegeDrop {
            process: self.process,
            record: self.record,
            _state: PhantomData,
        }
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, RecordLoaded> {
    pub fn new(process: &'p P, record: LinkRecord) -> Self {
        Self {
            process,
            record,
            _state: PhantomData,
        }
    }

    /// Step 1: add the record's groups to the current supplementary list.
    pub fn assign_groups(self) -> Result<PrivilegeDrop<'p, P, GroupsAssigned>> {
        if self.record.groups().is_empty() {
            log::debug!("Record requires no groups");
            return Ok(self.advance());
        }

        let current = self.process.supplementary_groups()?;
        let reconciled = reconcile(
            &current,
            self.record.groups(),
            self.process.max_supplementary_groups(),
        )?;

        if reconciled.changed {
            self.process.set_supplementary_groups(&reconciled.groups)?;
            log::info!(
                "Supplementary groups extended from {} to {} entries",
                current.len(),
                reconciled.groups.len()
            );
        } else {
            log::debug!("Supplementary groups already satisfy the record");
        }

        Ok(self.advance())
    }

    /// Steps 1-2 were performed by a trusted external service.
    pub fn identity_assigned_externally(self) -> PrivilegeDrop<'p, P, IdentityAssigned> {
        log::debug!("Group and identity assignment delegated to external service");
        self.advance()
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, GroupsAssigned> {
    /// Step 2: bind the record's identity.
    pub fn assign_identity<I: IdentityService + ?Sized>(
        self,
        service: &I,
    ) -> Result<PrivilegeDrop<'p, P, IdentityAssigned>> {
        let identity = self.record.identity();
        service
            .assign_identity(identity)
            .map_err(|code| StaunchError::Identity {
                identity: identity.to_string(),
                code,
            })?;

        log::info!("Identity '{}' assigned", identity);
        Ok(self.advance())
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, IdentityAssigned> {
    /// Step 3: most restrictive umask.
    pub fn tighten_umask(self) -> PrivilegeDrop<'p, P, MaskTightened> {
        let previous = self
            .process
            .set_umask(Mode::from_bits_truncate(RESTRICTIVE_UMASK as libc::mode_t));
        log::debug!(
            "umask {:o} -> {:o}",
            previous.bits(),
            RESTRICTIVE_UMASK
        );
        self.advance()
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, MaskTightened> {
    /// Step 4: drop every capability from the bounding set.
    pub fn clear_bounding_set(self) -> Result<PrivilegeDrop<'p, P, BoundingCleared>> {
        let last = self.process.last_capability();
        for cap in last.through() {
            self.process.drop_bounding_capability(cap)?;
        }

        log::info!("Bounding set cleared (0..={})", last.value());
        Ok(self.advance())
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, BoundingCleared> {
    /// Step 5: zero the effective, permitted and inheritable sets.
    pub fn zero_capabilities(self) -> Result<PrivilegeDrop<'p, P, ExecReady>> {
        self.process.zero_capability_sets()?;
        log::info!("Capability sets zeroed");
        Ok(self.advance())
    }
}

impl<'p, P: ProcessControl + ?Sized> PrivilegeDrop<'p, P, ExecReady> {
    /// Replace the process image with the record's target.
    ///
    /// This is the ONLY legal way to start the target. Returns only on failure.
    pub fn exec(self, argv: Vec<CString>, envp: Vec<CString>) -> StaunchError {
        let target = self.record.target_path();
        let path = match CString::new(target.as_os_str().as_bytes()) {
            Ok(path) => path,
            Err(_) => {
                return StaunchError::Format(format!(
                    "target {} contains a NUL byte",
                    target.display()
                ))
            }
        };

        log::debug!("Executing {}", target.display());
        let errno = self.process.execute(&path, &argv, &envp);
        StaunchError::Exec {
            path: target.to_path_buf(),
            errno,
        }
    }
}

/// Run the whole sequence for `record`, stopping at the first failure.
pub fn drop_privileges<'p, P, I>(
    process: &'p P,
    identity: &I,
    mode: IdentityMode,
    record: LinkRecord,
) -> Result<PrivilegeDrop<'p, P, ExecReady>>
where
    P: ProcessControl + ?Sized,
    I: IdentityService + ?Sized,
{
    let loaded = PrivilegeDrop::new(process, record);

    let labeled = match mode {
        IdentityMode::Collaborator => loaded.assign_groups()?.assign_identity(identity)?,
        IdentityMode::External => loaded.identity_assigned_externally(),
    };

    labeled
        .tighten_umask()
        .clear_bounding_set()?
        .zero_capabilities()
}

#[cfg(test)]
mod typestate_tests {
    use super::*;
    use crate::exec::identity::NoSecurityManager;
    use crate::link::record::GroupId;
    use crate::testing::{FailAt, ProcessCall, RecordingIdentity, RecordingProcess};

    fn record(groups: &[u32]) -> LinkRecord {
        LinkRecord::new(
            "app.42",
            "/usr/bin/true",
            groups.iter().map(|g| GroupId::new(*g).unwrap()),
        )
        .unwrap()
    }

    fn bounding(last: u32) -> Vec<ProcessCall> {
        (0..=last).map(ProcessCall::DropBounding).collect()
    }

    #[test]
    fn test_full_sequence_runs_in_order() {
        let process = RecordingProcess::new().with_groups(&[100]).with_last_cap(2);
        let identity = RecordingIdentity::default();

        let ready = drop_privileges(&process, &identity, IdentityMode::Collaborator, record(&[7]))
            .expect("sequence failed");
        let _ = ready.exec(vec![CString::new("app").unwrap()], Vec::new());

        let mut expected = vec![
            ProcessCall::ReadGroups,
            ProcessCall::SetGroups(vec![100, 7]),
            ProcessCall::SetUmask(RESTRICTIVE_UMASK),
        ];
        expected.extend(bounding(2));
        expected.push(ProcessCall::ZeroCapabilities);
        expected.push(ProcessCall::Execute {
            path: "/usr/bin/true".to_string(),
            argv: vec!["app".to_string()],
            envp: Vec::new(),
        });

        assert_eq!(process.calls(), expected);
        assert_eq!(identity.assigned(), vec!["app.42".to_string()]);
    }

    #[test]
    fn test_unchanged_groups_skip_setgroups() {
        let process = RecordingProcess::new().with_groups(&[7, 8]).with_last_cap(0);
        drop_privileges(&process, &NoSecurityManager, IdentityMode::Collaborator, record(&[8, 7]))
            .expect("sequence failed");

        assert!(!process
            .calls()
            .iter()
            .any(|c| matches!(c, ProcessCall::SetGroups(_))));
    }

    #[test]
    fn test_no_required_groups_never_reads_groups() {
        let process = RecordingProcess::new().with_last_cap(0);
        drop_privileges(&process, &NoSecurityManager, IdentityMode::Collaborator, record(&[]))
            .expect("sequence failed");

        assert_eq!(process.calls()[0], ProcessCall::SetUmask(RESTRICTIVE_UMASK));
    }

    #[test]
    fn test_external_mode_starts_at_umask() {
        let process = RecordingProcess::new().with_last_cap(1);
        let identity = RecordingIdentity::default();
        drop_privileges(&process, &identity, IdentityMode::External, record(&[5]))
            .expect("sequence failed");

        let mut expected = vec![ProcessCall::SetUmask(RESTRICTIVE_UMASK)];
        expected.extend(bounding(1));
        expected.push(ProcessCall::ZeroCapabilities);
        assert_eq!(process.calls(), expected);
        assert!(identity.assigned().is_empty());
    }

    #[test]
    fn test_setgroups_failure_stops_everything() {
        let process = RecordingProcess::new()
            .with_last_cap(3)
            .failing_at(FailAt::SetGroups);
        let identity = RecordingIdentity::default();

        let result = drop_privileges(&process, &identity, IdentityMode::Collaborator, record(&[9]));
        assert!(matches!(result, Err(StaunchError::Privilege(_))));
        assert_eq!(
            process.calls(),
            vec![ProcessCall::ReadGroups, ProcessCall::SetGroups(vec![9])]
        );
        assert!(identity.assigned().is_empty());
    }

    #[test]
    fn test_identity_refusal_stops_before_umask() {
        let process = RecordingProcess::new().with_last_cap(3);
        let identity = RecordingIdentity::refusing_with(-3);

        let result = drop_privileges(&process, &identity, IdentityMode::Collaborator, record(&[]));
        assert!(matches!(result, Err(StaunchError::Identity { code: -3, .. })));
        assert!(process.calls().is_empty());
    }

    #[test]
    fn test_bounding_failure_names_capability_and_stops() {
        let process = RecordingProcess::new()
            .with_last_cap(10)
            .failing_at(FailAt::DropBounding(4));

        let result = drop_privileges(&process, &NoSecurityManager, IdentityMode::External, record(&[]));
        assert!(matches!(result, Err(StaunchError::BoundingSet { cap: 4, .. })));

        let calls = process.calls();
        assert_eq!(calls.last(), Some(&ProcessCall::DropBounding(4)));
        assert!(!calls.contains(&ProcessCall::DropBounding(5)));
        assert!(!calls.contains(&ProcessCall::ZeroCapabilities));
    }

    #[test]
    fn test_capset_failure_never_reaches_exec() {
        let process = RecordingProcess::new()
            .with_last_cap(0)
            .failing_at(FailAt::ZeroCapabilities);

        let result = drop_privileges(&process, &NoSecurityManager, IdentityMode::External, record(&[]));
        assert!(result.is_err());
        assert!(!process.executed());
    }

    #[test]
    fn test_too_many_groups_is_fatal() {
        let process = RecordingProcess::new()
            .with_groups(&[1, 2])
            .with_max_groups(2)
            .with_last_cap(0);

        let result = drop_privileges(&process, &NoSecurityManager, IdentityMode::Collaborator, record(&[3]));
        assert!(matches!(result, Err(StaunchError::TooManyGroups { .. })));
        assert_eq!(process.calls(), vec![ProcessCall::ReadGroups]);
    }

    #[test]
    fn test_step_by_step_chain_preserves_record() {
        let process = RecordingProcess::new().with_last_cap(0);
        let loaded = PrivilegeDrop::new(&process, record(&[]));
        let groups = loaded.assign_groups().unwrap();
        assert_eq!(groups.record().identity(), "app.42");
        let labeled = groups.assign_identity(&NoSecurityManager).unwrap();
        let masked = labeled.tighten_umask();
        let cleared = masked.clear_bounding_set().unwrap();
        let ready = cleared.zero_capabilities().unwrap();
        assert_eq!(ready.record().target_path(), std::path::Path::new("/usr/bin/true"));
    }

    #[test]
    fn test_exec_failure_carries_errno() {
        let process = RecordingProcess::new().with_last_cap(0);
        let ready = drop_privileges(&process, &NoSecurityManager, IdentityMode::External, record(&[]))
            .unwrap();
        let err = ready.exec(Vec::new(), Vec::new());
        assert!(matches!(
            err,
            StaunchError::Exec { errno: nix::errno::Errno::ENOEXEC, .. }
        ));
    }
}
