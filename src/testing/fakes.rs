use crate::config::types::{Result, StaunchError};
use crate::exec::identity::{IdentityCode, IdentityService};
use crate::kernel::capabilities::CapabilityNumber;
use crate::kernel::process::ProcessControl;
use crate::link::store::AttributeStore;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::Gid;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Attribute store kept in memory, keyed by link path.
#[derive(Debug, Default)]
pub struct MemoryAttributes {
    values: Mutex<HashMap<PathBuf, Vec<u8>>>,
    fail_writes: Mutex<bool>,
    corrupted_reads: Mutex<Option<Vec<u8>>>,
}

impl MemoryAttributes {
    /// Make every subsequent write fail with EIO.
    pub fn fail_writes(&self) {
        *lock(&self.fail_writes) = true;
    }

    /// Simulate out-of-band corruption: every read returns `payload`.
    pub fn corrupt_reads_with(&self, payload: Vec<u8>) {
        *lock(&self.corrupted_reads) = Some(payload);
    }

    pub fn insert(&self, link: &Path, payload: &[u8]) {
        lock(&self.values).insert(link.to_path_buf(), payload.to_vec());
    }

    pub fn get(&self, link: &Path) -> Option<Vec<u8>> {
        lock(&self.values).get(link).cloned()
    }
}

impl AttributeStore for MemoryAttributes {
    fn read(&self, link: &Path, max_len: usize) -> Result<Vec<u8>> {
        let payload = match lock(&self.corrupted_reads).clone() {
            Some(corrupted) => corrupted,
            None => self
                .get(link)
                .ok_or_else(|| StaunchError::NotFound(link.to_path_buf()))?,
        };
        if payload.len() > max_len {
            return Err(StaunchError::TooLong {
                len: payload.len(),
                max: max_len,
            });
        }
        Ok(payload)
    }

    fn write(&self, link: &Path, payload: &[u8]) -> Result<()> {
        if *lock(&self.fail_writes) {
            return Err(StaunchError::Io(std::io::Error::from_raw_os_error(libc::EIO)));
        }
        self.insert(link, payload);
        Ok(())
    }
}

/// One observable operation performed through [`ProcessControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    ReadGroups,
    SetGroups(Vec<u32>),
    SetUmask(u32),
    DropBounding(u32),
    ZeroCapabilities,
    Execute {
        path: String,
        argv: Vec<String>,
        envp: Vec<String>,
    },
}

/// Which operation a [`RecordingProcess`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    ReadGroups,
    SetGroups,
    DropBounding(u32),
    ZeroCapabilities,
}

/// Process fake that records every call in order and never touches the
/// real process. `execute` records the request and reports ENOEXEC.
#[derive(Debug)]
pub struct RecordingProcess {
    calls: Mutex<Vec<ProcessCall>>,
    groups: Mutex<Vec<Gid>>,
    max_groups: usize,
    last_cap: CapabilityNumber,
    fail_at: Option<FailAt>,
}

impl Default for RecordingProcess {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            max_groups: 65536,
            last_cap: CapabilityNumber::last_known(),
            fail_at: None,
        }
    }
}

impl RecordingProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(self, groups: &[u32]) -> Self {
        *lock(&self.groups) = groups.iter().copied().map(Gid::from_raw).collect();
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn with_last_cap(mut self, last_cap: u32) -> Self {
        self.last_cap = CapabilityNumber::new(last_cap).unwrap_or(self.last_cap);
        self
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        lock(&self.calls).clone()
    }

    pub fn groups(&self) -> Vec<u32> {
        lock(&self.groups).iter().map(|g| g.as_raw()).collect()
    }

    pub fn executed(&self) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, ProcessCall::Execute { .. }))
    }

    fn record(&self, call: ProcessCall) {
        lock(&self.calls).push(call);
    }

    fn fails(&self, step: FailAt) -> bool {
        self.fail_at == Some(step)
    }
}

impl ProcessControl for RecordingProcess {
    fn supplementary_groups(&self) -> Result<Vec<Gid>> {
        self.record(ProcessCall::ReadGroups);
        if self.fails(FailAt::ReadGroups) {
            return Err(StaunchError::Privilege("getgroups: EINVAL".to_string()));
        }
        Ok(lock(&self.groups).clone())
    }

    fn max_supplementary_groups(&self) -> usize {
        self.max_groups
    }

    fn set_supplementary_groups(&self, groups: &[Gid]) -> Result<()> {
        self.record(ProcessCall::SetGroups(
            groups.iter().map(|g| g.as_raw()).collect(),
        ));
        if self.fails(FailAt::SetGroups) {
            return Err(StaunchError::Privilege("setgroups: EPERM".to_string()));
        }
        *lock(&self.groups) = groups.to_vec();
        Ok(())
    }

    fn set_umask(&self, mask: Mode) -> Mode {
        self.record(ProcessCall::SetUmask(mask.bits() as u32));
        Mode::from_bits_truncate(0o022)
    }

    fn last_capability(&self) -> CapabilityNumber {
        self.last_cap
    }

    fn drop_bounding_capability(&self, cap: CapabilityNumber) -> Result<()> {
        self.record(ProcessCall::DropBounding(cap.value()));
        if self.fails(FailAt::DropBounding(cap.value())) {
            return Err(StaunchError::BoundingSet {
                cap: cap.value(),
                errno: Errno::EPERM,
            });
        }
        Ok(())
    }

    fn zero_capability_sets(&self) -> Result<()> {
        self.record(ProcessCall::ZeroCapabilities);
        if self.fails(FailAt::ZeroCapabilities) {
            return Err(StaunchError::Privilege("capset: EPERM".to_string()));
        }
        Ok(())
    }

    fn execute(&self, path: &CStr, argv: &[CString], envp: &[CString]) -> Errno {
        let text = |c: &CStr| c.to_string_lossy().into_owned();
        self.record(ProcessCall::Execute {
            path: text(path),
            argv: argv.iter().map(|a| text(a.as_c_str())).collect(),
            envp: envp.iter().map(|e| text(e.as_c_str())).collect(),
        });
        Errno::ENOEXEC
    }
}

/// Identity collaborator fake recording every assignment.
#[derive(Debug, Default)]
pub struct RecordingIdentity {
    assigned: Mutex<Vec<String>>,
    refusal: Option<IdentityCode>,
}

impl RecordingIdentity {
    pub fn refusing_with(code: IdentityCode) -> Self {
        Self {
            assigned: Mutex::new(Vec::new()),
            refusal: Some(code),
        }
    }

    pub fn assigned(&self) -> Vec<String> {
        lock(&self.assigned).clone()
    }
}

impl IdentityService for RecordingIdentity {
    fn assign_identity(&self, identity: &str) -> std::result::Result<(), IdentityCode> {
        lock(&self.assigned).push(identity.to_string());
        match self.refusal {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
