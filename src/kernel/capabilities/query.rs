use super::CapabilityNumber;
use crate::config::types::{Result, StaunchError};
use std::fs;

const CAP_LAST_CAP_PATH: &str = "/proc/sys/kernel/cap_last_cap";
// Per-thread view: capset(2) with pid 0 only affects the calling thread.
const THREAD_STATUS_PATH: &str = "/proc/thread-self/status";

/// Highest capability the running kernel knows, falling back to the build-time value.
pub fn last_capability() -> CapabilityNumber {
    let fallback = CapabilityNumber::last_known();

    let text = match fs::read_to_string(CAP_LAST_CAP_PATH) {
        Ok(text) => text,
        Err(e) => {
            log::debug!("Cannot read {}: {}, assuming {}", CAP_LAST_CAP_PATH, e, fallback.value());
            return fallback;
        }
    };

    match text.trim().parse::<u32>().ok().and_then(CapabilityNumber::new) {
        Some(cap) => cap,
        None => {
            log::warn!(
                "Unusable value {:?} in {}, assuming {}",
                text.trim(),
                CAP_LAST_CAP_PATH,
                fallback.value()
            );
            fallback
        }
    }
}

/// The `Cap*` lines of the calling thread's status file.
pub fn capability_status() -> Result<String> {
    let status = fs::read_to_string(THREAD_STATUS_PATH).map_err(|e| {
        StaunchError::Privilege(format!("Failed to read {}: {}", THREAD_STATUS_PATH, e))
    })?;

    let cap_lines: Vec<&str> = status.lines().filter(|l| l.starts_with("Cap")).collect();
    Ok(cap_lines.join("\n"))
}

/// Lines among CapInh/CapPrm/CapEff whose mask is not all zero.
pub fn unzeroed_capability_lines(status: &str) -> Vec<String> {
    status
        .lines()
        .filter(|line| {
            line.starts_with("CapInh:") || line.starts_with("CapPrm:") || line.starts_with("CapEff:")
        })
        .filter(|line| {
            let mask = line.split_whitespace().nth(1).unwrap_or("");
            mask.is_empty() || mask.chars().any(|c| c != '0')
        })
        .map(|line| line.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_capability_is_in_range() {
        let cap = last_capability();
        assert!(cap.value() <= CapabilityNumber::MAX_CAP);
    }

    #[test]
    fn status_contains_capability_lines() {
        let status = capability_status().unwrap();
        assert!(status.contains("CapEff"));
    }

    #[test]
    fn unzeroed_lines_ignore_bounding_and_ambient() {
        let status = "CapInh:\t0000000000000000\n\
                      CapPrm:\t0000000000000000\n\
                      CapEff:\t0000000000000000\n\
                      CapBnd:\t000001ffffffffff\n\
                      CapAmb:\t0000000000000000";
        assert!(unzeroed_capability_lines(status).is_empty());
    }

    #[test]
    fn unzeroed_lines_report_leftovers() {
        let status = "CapInh:\t0000000000000000\n\
                      CapPrm:\t0000000000000400\n\
                      CapEff:\t0000000000000400";
        let leftovers = unzeroed_capability_lines(status);
        assert_eq!(leftovers.len(), 2);
        assert!(leftovers[0].starts_with("CapPrm"));
    }
}
