//! The process-wide operations the launch sequence performs, behind one trait
//! so the sequence can be driven against a recording fake in tests.

use super::capabilities::{self, CapabilityNumber};
use super::groups;
use crate::config::types::Result;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::Gid;
use std::ffi::{CStr, CString};

pub trait ProcessControl {
    /// Current supplementary group list.
    fn supplementary_groups(&self) -> Result<Vec<Gid>>;

    /// Platform bound on the supplementary group list.
    fn max_supplementary_groups(&self) -> usize;

    fn set_supplementary_groups(&self, groups: &[Gid]) -> Result<()>;

    /// Install `mask` as the file creation mask, returning the previous one.
    fn set_umask(&self, mask: Mode) -> Mode;

    fn last_capability(&self) -> CapabilityNumber;

    fn drop_bounding_capability(&self, cap: CapabilityNumber) -> Result<()>;

    fn zero_capability_sets(&self) -> Result<()>;

    /// Replace the process image. Only returns on failure.
    fn execute(&self, path: &CStr, argv: &[CString], envp: &[CString]) -> Errno;
}

/// The calling Linux process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxProcess;

impl ProcessControl for LinuxProcess {
    fn supplementary_groups(&self) -> Result<Vec<Gid>> {
        groups::current_groups()
    }

    fn max_supplementary_groups(&self) -> usize {
        groups::max_groups()
    }

    fn set_supplementary_groups(&self, list: &[Gid]) -> Result<()> {
        groups::set_groups(list)
    }

    fn set_umask(&self, mask: Mode) -> Mode {
        nix::sys::stat::umask(mask)
    }

    fn last_capability(&self) -> CapabilityNumber {
        capabilities::last_capability()
    }

    fn drop_bounding_capability(&self, cap: CapabilityNumber) -> Result<()> {
        capabilities::drop_bounding_capability(cap)
    }

    fn zero_capability_sets(&self) -> Result<()> {
        capabilities::zero_capability_sets()
    }

    fn execute(&self, path: &CStr, argv: &[CString], envp: &[CString]) -> Errno {
        match nix::unistd::execve(path, argv, envp) {
            Ok(never) => match never {},
            Err(errno) => errno,
        }
    }
}
