//! Interface to the external identity / security-label service.
//!
//! staunch never implements labeling itself. The service binds the calling
//! process to the security context of an application identity and reports a
//! service-specific status code on refusal.

/// Status code returned by the identity service on failure.
pub type IdentityCode = i32;

pub trait IdentityService {
    /// Bind the calling process to `identity`. Any error is fatal to the launch.
    fn assign_identity(&self, identity: &str) -> Result<(), IdentityCode>;
}

/// Used when no identity service is installed on the system: accepts every
/// identity and binds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecurityManager;

impl IdentityService for NoSecurityManager {
    fn assign_identity(&self, identity: &str) -> Result<(), IdentityCode> {
        log::debug!("No identity service installed; identity '{}' not bound", identity);
        Ok(())
    }
}
