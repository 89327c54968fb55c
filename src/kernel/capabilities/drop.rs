use super::{query, CapabilityNumber, LINUX_CAPABILITY_VERSION_3, PR_CAPBSET_DROP};
use crate::config::types::{Result, StaunchError};
use nix::errno::Errno;

/// Remove one capability from the bounding set. Requires CAP_SETPCAP.
pub fn drop_bounding_capability(cap: CapabilityNumber) -> Result<()> {
    // SAFETY: prctl(PR_CAPBSET_DROP) takes a capability number and no pointers.
    let rc = unsafe { libc::prctl(PR_CAPBSET_DROP, cap.value() as libc::c_ulong, 0, 0, 0) };
    if rc != 0 {
        return Err(StaunchError::BoundingSet {
            cap: cap.value(),
            errno: Errno::last(),
        });
    }
    Ok(())
}

/// Zero the effective, permitted and inheritable sets via raw capset(2).
///
/// The ambient set is cleared by the kernel as a consequence, since it can
/// never exceed permitted ∩ inheritable.
pub fn zero_capability_sets() -> Result<()> {
    #[repr(C)]
    struct CapUserHeader {
        version: u32,
        pid: i32,
    }

    #[repr(C)]
    struct CapUserData {
        effective: u32,
        permitted: u32,
        inheritable: u32,
    }

    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };

    // Version 3 requires two data entries: caps 0-31 and caps 32-63.
    let data = [
        CapUserData { effective: 0, permitted: 0, inheritable: 0 },
        CapUserData { effective: 0, permitted: 0, inheritable: 0 },
    ];

    // SAFETY: capset(2) with valid header (version 3, pid 0 = current) and
    // two zeroed data entries. Properly initialized structs, valid pointers.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &header as *const CapUserHeader,
            data.as_ptr(),
        )
    };

    if rc != 0 {
        return Err(StaunchError::Privilege(format!(
            "capset failed to zero capability sets: {}",
            Errno::last()
        )));
    }

    verify_capabilities_zeroed()
}

fn verify_capabilities_zeroed() -> Result<()> {
    let status = match query::capability_status() {
        Ok(status) => status,
        Err(e) => {
            log::warn!("Cannot verify capability sets, skipping: {}", e);
            return Ok(());
        }
    };

    let leftovers = query::unzeroed_capability_lines(&status);
    if !leftovers.is_empty() {
        return Err(StaunchError::Privilege(format!(
            "Capabilities still present after capset: {}",
            leftovers.join(", ")
        )));
    }

    log::debug!("Zeroed all capability sets via capset(2)");
    Ok(())
}
