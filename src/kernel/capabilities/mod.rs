//! Linux capability primitives used by the privilege drop.
//!
//! Unlike best-effort hardening, every failure here is fatal to the caller.

mod drop;
mod query;

pub use drop::{drop_bounding_capability, zero_capability_sets};
pub use query::{capability_status, last_capability, unzeroed_capability_lines};

/// Capability number newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CapabilityNumber(u32);

impl CapabilityNumber {
    /// Highest number representable by the v3 capset(2) ABI (two 32-bit words).
    pub const MAX_CAP: u32 = 63;

    /// Last capability known when this was built (CAP_CHECKPOINT_RESTORE).
    pub const LAST_KNOWN: u32 = 40;

    pub fn new(cap: u32) -> Option<Self> {
        if cap <= Self::MAX_CAP {
            Some(Self(cap))
        } else {
            None
        }
    }

    pub fn last_known() -> Self {
        Self(Self::LAST_KNOWN)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Every capability from 0 up to and including `self`.
    pub fn through(self) -> impl Iterator<Item = CapabilityNumber> {
        (0..=self.0).map(CapabilityNumber)
    }
}

pub(crate) const PR_CAPBSET_DROP: libc::c_int = 24;
pub(crate) const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_number_validates_range() {
        assert!(CapabilityNumber::new(0).is_some());
        assert!(CapabilityNumber::new(63).is_some());
        assert!(CapabilityNumber::new(64).is_none());
        assert!(CapabilityNumber::new(100).is_none());
    }

    #[test]
    fn capability_number_preserves_value() {
        let cap = CapabilityNumber::new(5).unwrap();
        assert_eq!(cap.value(), 5);
    }

    #[test]
    fn through_is_inclusive() {
        let caps: Vec<u32> = CapabilityNumber::new(3)
            .unwrap()
            .through()
            .map(CapabilityNumber::value)
            .collect();
        assert_eq!(caps, vec![0, 1, 2, 3]);
    }
}
