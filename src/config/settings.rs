use crate::config::types::{StaunchError, Result, MAX_ATTRIBUTE_SIZE, MIN_ATTRIBUTE_SIZE};
/// Deployment configuration loading from config.json
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// System-wide configuration file. The launcher reads only this path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/staunch/config.json";

/// How the launcher rewrites `argv[0]` before replacing the process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argv0Mode {
    /// Leave `argv[0]` as the caller passed it (the link name).
    #[default]
    Preserve,
    /// Replace with the target's absolute path.
    RealPath,
    /// Replace with the target's final path component.
    BaseName,
}

/// Who performs group and identity assignment before capabilities are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// staunch reconciles groups and calls the identity collaborator itself.
    #[default]
    Collaborator,
    /// A trusted external service already assigned groups and label
    /// atomically; the privilege drop starts at umask tightening.
    External,
}

/// Full config.json structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaunchSettings {
    pub launcher: PathBuf,
    pub max_attribute_size: usize,
    pub check_target_executable: bool,
    pub argv0: Argv0Mode,
    pub identity_mode: IdentityMode,
    pub syslog: bool,
    pub audit_log: Option<PathBuf>,
}

impl Default for StaunchSettings {
    fn default() -> Self {
        Self {
            launcher: PathBuf::from("/usr/bin/stauncher"),
            max_attribute_size: MIN_ATTRIBUTE_SIZE,
            check_target_executable: false,
            argv0: Argv0Mode::Preserve,
            identity_mode: IdentityMode::Collaborator,
            syslog: true,
            audit_log: None,
        }
    }
}

impl StaunchSettings {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StaunchError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let settings: StaunchSettings = serde_json::from_str(&content).map_err(|e| {
            StaunchError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load the system configuration, falling back to defaults when the file is absent.
    pub fn load_system() -> Result<Self> {
        let path = Path::new(SYSTEM_CONFIG_PATH);
        match std::fs::symlink_metadata(path) {
            Ok(_) => Self::load_from_file(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StaunchError::Config(format!(
                "Cannot stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_ATTRIBUTE_SIZE..=MAX_ATTRIBUTE_SIZE).contains(&self.max_attribute_size) {
            return Err(StaunchError::Config(format!(
                "max_attribute_size {} outside {}..={}",
                self.max_attribute_size, MIN_ATTRIBUTE_SIZE, MAX_ATTRIBUTE_SIZE
            )));
        }
        if !self.launcher.is_absolute() {
            return Err(StaunchError::Config(format!(
                "launcher {} must be an absolute path",
                self.launcher.display()
            )));
        }
        Ok(())
    }
}
