//! Supplementary group list handling.
//!
//! Groups required by a link are only ever added; membership the caller
//! already holds is never removed.

use crate::config::types::{Result, StaunchError};
use crate::link::record::GroupId;
use nix::unistd::Gid;

/// Fallback when sysconf cannot report NGROUPS_MAX.
pub const DEFAULT_MAX_GROUPS: usize = 65536;

/// Outcome of merging required groups into the current list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub groups: Vec<Gid>,
    pub changed: bool,
}

/// Append every group of `required` missing from `current`.
///
/// Required groups are visited from the end of the record's order; the
/// resulting membership does not depend on that order. `changed` is false
/// when nothing had to be added, so the caller can skip setgroups(2).
pub fn reconcile(current: &[Gid], required: &[GroupId], max_groups: usize) -> Result<Reconciliation> {
    let mut groups = current.to_vec();
    let mut changed = false;

    for gid in required.iter().rev().map(|g| g.as_gid()) {
        if groups.contains(&gid) {
            continue;
        }
        if groups.len() >= max_groups {
            return Err(StaunchError::TooManyGroups {
                count: groups.len() + 1,
                max: max_groups,
            });
        }
        groups.push(gid);
        changed = true;
    }

    Ok(Reconciliation { groups, changed })
}

/// Current supplementary groups of the calling process.
pub fn current_groups() -> Result<Vec<Gid>> {
    nix::unistd::getgroups()
        .map_err(|e| StaunchError::Privilege(format!("Failed to read group list: {}", e)))
}

/// Replace the supplementary group list. Requires CAP_SETGID.
pub fn set_groups(groups: &[Gid]) -> Result<()> {
    nix::unistd::setgroups(groups).map_err(|e| {
        StaunchError::Privilege(format!(
            "Failed to set group list ({} groups): {}",
            groups.len(),
            e
        ))
    })?;
    log::info!("Set supplementary groups: {} entries", groups.len());
    Ok(())
}

/// Platform bound on the supplementary group list.
pub fn max_groups() -> usize {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::NGROUPS_MAX) {
        Ok(Some(n)) if n > 0 => n as usize,
        _ => {
            log::debug!("NGROUPS_MAX unavailable, using {}", DEFAULT_MAX_GROUPS);
            DEFAULT_MAX_GROUPS
        }
    }
}
