/// Security audit trail for link administration and launches.
///
/// Every event is one JSON object carrying a per-process `run_id`, the pid
/// and the link/target/identity it concerns. Events are written to the
/// `staunch::audit` log target and, when an audit file is configured,
/// appended to it as one line each.
use super::logging;
use crate::config::types::{Result, StaunchError};
use crate::link::record::LinkRecord;
use log::Level;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "staunch::audit";

/// Security event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    LinkCreated,
    LinkRejected,
    LinkVerificationFailed,
    LaunchStarted,
    PrivilegeDropFailed,
    ExecFailed,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::LinkCreated => AuditSeverity::Low,
            AuditEventType::LaunchStarted => AuditSeverity::Low,
            AuditEventType::LinkRejected => AuditSeverity::Medium,
            AuditEventType::LinkVerificationFailed => AuditSeverity::High,
            AuditEventType::ExecFailed => AuditSeverity::High,
            AuditEventType::PrivilegeDropFailed => AuditSeverity::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: SystemTime,
    pub details: String,
    pub link: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub identity: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: impl Into<String>) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: SystemTime::now(),
            details: details.into(),
            link: None,
            target: None,
            identity: None,
        }
    }

    pub fn with_link(mut self, link: &Path) -> Self {
        self.link = Some(link.to_path_buf());
        self
    }

    pub fn with_target(mut self, target: &Path) -> Self {
        self.target = Some(target.to_path_buf());
        self
    }

    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = Some(identity.to_string());
        self
    }

    /// Attach the target and identity of `record`.
    pub fn with_record(self, record: &LinkRecord) -> Self {
        self.with_target(record.target_path())
            .with_identity(record.identity())
    }

    pub fn to_json(&self, run_id: &str) -> serde_json::Value {
        serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "link": self.link,
            "target": self.target,
            "identity": self.identity,
            "run_id": run_id,
            "process_id": std::process::id(),
        })
    }
}

/// Append-only audit file.
pub struct AuditFile {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                StaunchError::Config(format!(
                    "Failed to open audit log {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &serde_json::Value) {
        let Ok(mut file) = self.file.lock() else {
            log::error!("Failed to acquire lock on audit file {}", self.path.display());
            return;
        };
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            log::error!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}

static RUN_ID: OnceLock<String> = OnceLock::new();
static AUDIT_FILE: OnceLock<AuditFile> = OnceLock::new();

/// Identifier shared by every event this process emits.
pub fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| Uuid::new_v4().to_string())
}

/// Attach the audit file. Like the logger, this happens once per process.
pub fn init_audit_file(path: &Path) -> Result<()> {
    let file = AuditFile::open(path)?;
    AUDIT_FILE
        .set(file)
        .map_err(|_| StaunchError::Logging("audit file already initialized".to_string()))?;
    log::debug!("Audit events appended to {}", path.display());
    Ok(())
}

/// Emit `event`. Fails when the logger has not been installed yet.
pub fn emit(event: &AuditEvent) -> Result<()> {
    if !logging::is_initialized() {
        return Err(StaunchError::Logging(format!(
            "audit event {:?} emitted before logging init",
            event.event_type
        )));
    }

    let entry = event.to_json(run_id());
    let level = match event.severity {
        AuditSeverity::Critical | AuditSeverity::High => Level::Error,
        AuditSeverity::Medium => Level::Warn,
        AuditSeverity::Low => Level::Info,
    };
    log::log!(target: AUDIT_TARGET, level, "{}", entry);

    if let Some(file) = AUDIT_FILE.get() {
        file.append(&entry);
    }
    Ok(())
}

/// Emit `event`, dropping it when logging is not set up (library use).
pub fn record(event: AuditEvent) {
    let _ = emit(&event);
}

/// Convenience constructors for the events staunch reports
pub mod events {
    use super::*;

    pub fn link_created(link: &Path, launcher: &Path, record: &LinkRecord) {
        super::record(
            AuditEvent::new(
                AuditEventType::LinkCreated,
                format!("Secure link created, pointing to {}", launcher.display()),
            )
            .with_link(link)
            .with_record(record),
        );
    }

    pub fn link_rejected(link: &Path, reason: &StaunchError) {
        super::record(
            AuditEvent::new(
                AuditEventType::LinkRejected,
                format!("Secure link refused: {}", reason),
            )
            .with_link(link),
        );
    }

    pub fn link_verification_failed(link: &Path, record: &LinkRecord, reason: &StaunchError) {
        super::record(
            AuditEvent::new(AuditEventType::LinkVerificationFailed, reason.to_string())
                .with_link(link)
                .with_record(record),
        );
    }

    pub fn launch_started(link: &Path, record: &LinkRecord) {
        super::record(
            AuditEvent::new(AuditEventType::LaunchStarted, "Launching through secure link")
                .with_link(link)
                .with_record(record),
        );
    }

    pub fn privilege_drop_failed(link: &Path, record: &LinkRecord, reason: &StaunchError) {
        super::record(
            AuditEvent::new(
                AuditEventType::PrivilegeDropFailed,
                format!("Launch aborted: {}", reason),
            )
            .with_link(link)
            .with_record(record),
        );
    }

    pub fn exec_failed(link: &Path, record: &LinkRecord, reason: &StaunchError) {
        super::record(
            AuditEvent::new(AuditEventType::ExecFailed, reason.to_string())
                .with_link(link)
                .with_record(record),
        );
    }
}
