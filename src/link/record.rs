//! Decoded launch metadata carried by a secure link.

use crate::config::types::{Result, StaunchError, MAX_RECORD_GROUPS};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// A strictly positive supplementary group id.
///
/// Zero is reserved (root's group, and the "no more groups" sentinel in the
/// wire format); `gid_t::MAX` is the kernel's "no change" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(libc::gid_t);

impl GroupId {
    pub fn new(gid: libc::gid_t) -> Option<Self> {
        if gid == 0 || gid == libc::gid_t::MAX {
            None
        } else {
            Some(Self(gid))
        }
    }

    pub fn value(self) -> libc::gid_t {
        self.0
    }

    pub fn as_gid(self) -> nix::unistd::Gid {
        nix::unistd::Gid::from_raw(self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Launch metadata: which executable to run, under which identity, with which groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    identity: String,
    target_path: PathBuf,
    groups: Vec<GroupId>,
}

impl LinkRecord {
    /// Build a record, enforcing the field invariants. Duplicate groups collapse,
    /// keeping first-seen order.
    pub fn new(
        identity: impl Into<String>,
        target_path: impl Into<PathBuf>,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> Result<Self> {
        let identity = identity.into();
        let target_path = target_path.into();

        validate_identity(&identity)?;
        validate_target(&target_path)?;

        let mut collapsed: Vec<GroupId> = Vec::new();
        for gid in groups {
            if collapsed.contains(&gid) {
                continue;
            }
            if collapsed.len() == MAX_RECORD_GROUPS {
                return Err(StaunchError::TooManyGroups {
                    count: collapsed.len() + 1,
                    max: MAX_RECORD_GROUPS,
                });
            }
            collapsed.push(gid);
        }

        Ok(Self {
            identity,
            target_path,
            groups: collapsed,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }
}

fn validate_identity(identity: &str) -> Result<()> {
    if identity.bytes().any(|b| b == 0) {
        return Err(StaunchError::Format(format!(
            "identity {:?} contains a NUL byte",
            identity
        )));
    }
    Ok(())
}

fn validate_target(target: &Path) -> Result<()> {
    let bytes = target.as_os_str().as_bytes();
    if bytes.is_empty() {
        return Err(StaunchError::Format("target path is empty".to_string()));
    }
    if bytes.contains(&0) {
        return Err(StaunchError::Format(format!(
            "target path {} contains a NUL byte",
            target.display()
        )));
    }
    if !target.is_absolute() {
        return Err(StaunchError::Format(format!(
            "target path {} is not absolute",
            target.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gid(n: u32) -> GroupId {
        GroupId::new(n).unwrap()
    }

    #[test]
    fn group_id_rejects_reserved_values() {
        assert!(GroupId::new(0).is_none());
        assert!(GroupId::new(libc::gid_t::MAX).is_none());
        assert_eq!(GroupId::new(5).map(GroupId::value), Some(5));
    }

    #[test]
    fn duplicate_groups_collapse_in_first_seen_order() {
        let record =
            LinkRecord::new("app.42", "/usr/bin/true", [gid(30), gid(10), gid(30), gid(20)])
                .unwrap();
        assert_eq!(record.groups(), &[gid(30), gid(10), gid(20)]);
    }

    #[test]
    fn relative_target_is_rejected() {
        assert!(LinkRecord::new("app", "bin/true", []).is_err());
        assert!(LinkRecord::new("app", "", []).is_err());
    }

    #[test]
    fn nul_in_identity_is_rejected() {
        assert!(LinkRecord::new("ap\0p", "/bin/true", []).is_err());
    }

    #[test]
    fn group_count_is_bounded() {
        let groups = (1..=MAX_RECORD_GROUPS as u32 + 1).map(gid);
        let err = LinkRecord::new("app", "/bin/true", groups).unwrap_err();
        assert!(matches!(err, StaunchError::TooManyGroups { .. }));

        let groups = (1..=MAX_RECORD_GROUPS as u32).map(gid);
        assert!(LinkRecord::new("app", "/bin/true", groups).is_ok());
    }
}
