/// Core types and constants shared by every staunch component
use std::path::PathBuf;
use thiserror::Error;

/// Version tag that opens every link attribute payload.
pub const FORMAT_TAG: &str = "staunch-1.0";

/// Extended attribute holding the payload. Lives in the `security.` namespace
/// so only privileged administrators can write it.
pub const XATTR_NAME: &str = "security.staunch";

/// Maximum count of supplementary groups a record may carry.
pub const MAX_RECORD_GROUPS: usize = 1024;

/// Smallest and largest attribute bound a deployment may configure.
pub const MIN_ATTRIBUTE_SIZE: usize = 8192;
pub const MAX_ATTRIBUTE_SIZE: usize = 16384;

/// Custom error types for staunch
#[derive(Error, Debug)]
pub enum StaunchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Attribute format error: {0}")]
    Format(String),

    #[error("Attribute payload too long: {len} bytes exceeds the {max} byte bound")]
    TooLong { len: usize, max: usize },

    #[error("Too many groups: {count} exceeds the limit of {max}")]
    TooManyGroups { count: usize, max: usize },

    #[error("No staunch attribute on {0}")]
    NotFound(PathBuf),

    #[error("Refusing to overwrite existing {0}")]
    AlreadyExists(PathBuf),

    #[error("{0} is not a symbolic link")]
    NotSymlink(PathBuf),

    #[error("Launcher {0} is not executable")]
    InvalidLauncher(PathBuf),

    #[error("Target {0} is not an existing executable")]
    InvalidTarget(PathBuf),

    #[error("Read-back verification failed: {0}")]
    VerificationFailed(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Failed to drop capability {cap} from the bounding set: {errno}")]
    BoundingSet { cap: u32, errno: nix::errno::Errno },

    #[error("Identity service refused identity '{identity}' (code {code})")]
    Identity { identity: String, code: i32 },

    #[error("Failed to execute {path}: {errno}")]
    Exec {
        path: PathBuf,
        errno: nix::errno::Errno,
    },

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl StaunchError {
    /// Whether the error comes from one of the privilege-drop steps.
    pub fn is_privilege_failure(&self) -> bool {
        matches!(
            self,
            StaunchError::Privilege(_)
                | StaunchError::BoundingSet { .. }
                | StaunchError::Identity { .. }
                | StaunchError::TooManyGroups { .. }
        )
    }
}

/// Result type for staunch operations
pub type Result<T> = std::result::Result<T, StaunchError>;
