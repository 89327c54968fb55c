//! Process-wide logger, installed exactly once at process start.
//!
//! Records go to stderr through `env_logger`. The filter comes from the
//! variable named by [`LogSettings::filter_env`], or is fixed at the default
//! level when none is named. With syslog mirroring enabled, warnings and errors are also sent to the system
//! log under the `LOG_AUTH` facility.

use crate::config::types::{Result, StaunchError};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::ffi::CString;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Identity used for syslog records, normally the binary name.
    pub program: String,
    /// Level used when the filter variable is unset or not consulted.
    pub default_level: LevelFilter,
    /// Environment variable holding an `env_logger` filter. `None` ignores
    /// the environment entirely.
    pub filter_env: Option<String>,
    pub syslog: bool,
}

impl LogSettings {
    pub fn new(program: impl Into<String>, default_level: LevelFilter) -> Self {
        Self {
            program: program.into(),
            default_level,
            filter_env: None,
            syslog: false,
        }
    }

    pub fn with_filter_env(mut self, var: impl Into<String>) -> Self {
        self.filter_env = Some(var.into());
        self
    }

    pub fn with_syslog(mut self, enabled: bool) -> Self {
        self.syslog = enabled;
        self
    }
}

struct StaunchLogger {
    console: env_logger::Logger,
    // openlog(3) keeps the pointer, so the ident lives as long as the logger.
    syslog_ident: Option<CString>,
}

impl Log for StaunchLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);

        if self.syslog_ident.is_some() && record.level() <= Level::Warn {
            send_to_syslog(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

static LOGGER: OnceLock<StaunchLogger> = OnceLock::new();

fn console_logger(settings: &LogSettings) -> env_logger::Logger {
    let mut builder = match &settings.filter_env {
        Some(var) => env_logger::Builder::from_env(
            env_logger::Env::new().filter_or(var.as_str(), settings.default_level.as_str()),
        ),
        None => {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(settings.default_level);
            builder
        }
    };
    builder.format_timestamp(None).build()
}

/// Install the process logger. Calling this a second time is an error.
pub fn init(settings: &LogSettings) -> Result<()> {
    let console = console_logger(settings);
    let max_level = console.filter();

    let syslog_ident = if settings.syslog {
        let ident = CString::new(settings.program.replace('\0', "")).map_err(|e| {
            StaunchError::Logging(format!("Invalid syslog identity: {}", e))
        })?;
        Some(ident)
    } else {
        None
    };

    if LOGGER
        .set(StaunchLogger {
            console,
            syslog_ident,
        })
        .is_err()
    {
        return Err(StaunchError::Logging("logger already initialized".to_string()));
    }
    let logger = LOGGER
        .get()
        .ok_or_else(|| StaunchError::Logging("logger vanished during init".to_string()))?;

    if let Some(ident) = &logger.syslog_ident {
        // SAFETY: ident is stored in a static and never dropped.
        unsafe { libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_AUTH) };
    }

    log::set_logger(logger)
        .map_err(|e| StaunchError::Logging(format!("Failed to install logger: {}", e)))?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

fn send_to_syslog(record: &Record) {
    let priority = match record.level() {
        Level::Error => libc::LOG_ERR,
        _ => libc::LOG_WARNING,
    };
    let text = format!("{}", record.args()).replace('\0', " ");
    let Ok(message) = CString::new(text) else {
        return;
    };
    // SAFETY: constant format string with a single NUL-terminated argument.
    unsafe {
        libc::syslog(
            priority,
            b"%s\0".as_ptr() as *const libc::c_char,
            message.as_ptr(),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        let settings = LogSettings::new("staunch-test", LevelFilter::Warn);
        let _ = init(&settings);
        assert!(is_initialized());

        match init(&settings) {
            Err(StaunchError::Logging(msg)) => assert!(msg.contains("already")),
            other => panic!("expected Logging error, got {:?}", other),
        }
    }

    #[test]
    fn settings_builder() {
        let settings = LogSettings::new("stauncher", LevelFilter::Info).with_syslog(true);
        assert!(settings.syslog);
        assert_eq!(settings.program, "stauncher");
        assert!(settings.filter_env.is_none());
    }

    #[test]
    fn environment_is_ignored_without_filter_variable() {
        std::env::set_var("RUST_LOG", "trace");
        let settings = LogSettings::new("stauncher", LevelFilter::Warn);
        assert_eq!(console_logger(&settings).filter(), LevelFilter::Warn);
    }

    #[test]
    fn named_filter_variable_overrides_default() {
        let var = "STAUNCH_LOG_TEST_FILTER";
        let settings = LogSettings::new("staunch", LevelFilter::Info).with_filter_env(var);
        std::env::remove_var(var);
        assert_eq!(console_logger(&settings).filter(), LevelFilter::Info);

        std::env::set_var(var, "debug");
        assert_eq!(console_logger(&settings).filter(), LevelFilter::Debug);
        std::env::remove_var(var);
    }
}
