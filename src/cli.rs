use crate::admin::{self, LinkAdmin, SetRequest};
use crate::config::settings::StaunchSettings;
use crate::exec::launch::LaunchEngine;
use crate::observability::{audit, logging};
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};

/// Which binary is running. Chosen at build time, never from argv[0].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliMode {
    /// `staunch`: administer links.
    Manage,
    /// `stauncher`: run the target of the link we were invoked through.
    Launch,
}

impl CliMode {
    fn program(self) -> &'static str {
        match self {
            Self::Manage => "staunch",
            Self::Launch => "stauncher",
        }
    }

    /// Variable the log filter is read from. The launcher runs with a
    /// caller-controlled environment and takes none.
    fn filter_env(self) -> Option<&'static str> {
        match self {
            Self::Manage => Some("STAUNCH_LOG"),
            Self::Launch => None,
        }
    }

    fn default_level(self) -> LevelFilter {
        match self {
            Self::Manage => LevelFilter::Info,
            Self::Launch => LevelFilter::Warn,
        }
    }
}

#[derive(Parser)]
#[command(name = "staunch", author, version, about = "Manage secure launch links", long_about = None)]
struct Cli {
    /// Configuration file instead of /etc/staunch/config.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a secure link running TARGET under IDENTITY
    Set {
        /// Replace LINK if it is already a symbolic link
        #[arg(short, long)]
        force: bool,
        /// Supplementary group (name or gid) the target must run with
        #[arg(short = 'g', long = "group", value_name = "GROUP")]
        groups: Vec<String>,
        /// Launcher the link points to
        #[arg(long)]
        launcher: Option<PathBuf>,
        identity: String,
        target: PathBuf,
        link: PathBuf,
    },
    /// Print the record of each link
    Get {
        /// Do not report links that cannot be read
        #[arg(short, long)]
        quiet: bool,
        #[arg(required = true)]
        links: Vec<PathBuf>,
    },
    /// Validate each link; exits non-zero if any is invalid
    Check {
        /// Only report through the exit status
        #[arg(short, long)]
        quiet: bool,
        /// Launcher the links are expected to point to
        #[arg(long)]
        launcher: Option<PathBuf>,
        #[arg(required = true)]
        links: Vec<PathBuf>,
    },
}

pub fn run(mode: CliMode) -> Result<()> {
    match mode {
        CliMode::Manage => run_admin(),
        CliMode::Launch => run_launcher(),
    }
}

fn log_settings(mode: CliMode, settings: &StaunchSettings) -> logging::LogSettings {
    let log = logging::LogSettings::new(mode.program(), mode.default_level())
        .with_syslog(settings.syslog);
    match mode.filter_env() {
        Some(var) => log.with_filter_env(var),
        None => log,
    }
}

fn init_observability(mode: CliMode, settings: &StaunchSettings) -> Result<()> {
    logging::init(&log_settings(mode, settings))?;

    if let Some(path) = &settings.audit_log {
        audit::init_audit_file(path)?;
    }
    Ok(())
}

fn run_admin() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        // Bare `staunch` prints usage and succeeds.
        Cli::command().print_help()?;
        return Ok(());
    };

    let settings = match &cli.config {
        Some(path) => StaunchSettings::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StaunchSettings::load_system().context("loading system configuration")?,
    };
    settings.validate()?;
    init_observability(CliMode::Manage, &settings)?;

    let admin = LinkAdmin::system(&settings);

    match command {
        Commands::Set {
            force,
            groups,
            launcher,
            identity,
            target,
            link,
        } => {
            let admin = match launcher {
                Some(launcher) => admin.with_launcher(launcher),
                None => admin,
            };
            let groups = groups
                .iter()
                .map(|g| admin::resolve_group(g))
                .collect::<crate::config::types::Result<Vec<_>>>()?;

            let request = SetRequest {
                identity,
                target,
                link,
                groups,
                force,
            };
            admin
                .set(&request)
                .with_context(|| format!("can't set {}", request.link.display()))?;
            Ok(())
        }
        Commands::Get { quiet, links } => {
            let mut failed = false;
            for entry in admin.get(&links) {
                match entry.record {
                    Ok(record) => println!("{}", admin::describe(&entry.link, &record)),
                    Err(e) => {
                        failed = true;
                        if !quiet {
                            eprintln!("{}: {}", entry.link.display(), e);
                        }
                    }
                }
            }
            exit_on_failure(failed);
            Ok(())
        }
        Commands::Check {
            quiet,
            launcher,
            links,
        } => {
            let admin = match launcher {
                Some(launcher) => admin.with_launcher(launcher),
                None => admin,
            };
            let report = admin.check(&links);

            if !quiet {
                for entry in &report.entries {
                    println!("{}: {}", entry.link.display(), entry.status);
                }
                if !report.launcher_executable {
                    println!("{}: ERROR(launcher isn't executable)", report.launcher.display());
                }
            }
            exit_on_failure(report.failed());
            Ok(())
        }
    }
}

fn exit_on_failure(failed: bool) {
    if failed {
        std::process::exit(1);
    }
}

/// Launcher entry. Arguments and environment are forwarded, never parsed.
fn run_launcher() -> Result<()> {
    let program = CliMode::Launch.program();

    let settings = match StaunchSettings::load_system().and_then(|s| s.validate().map(|()| s)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = init_observability(CliMode::Launch, &settings) {
        eprintln!("{}: {}", program, e);
        std::process::exit(1);
    }

    let argv: Vec<_> = std::env::args_os().collect();
    let envp: Vec<_> = std::env::vars_os().collect();
    let Some(invoked) = argv.first().cloned() else {
        log::error!("{}: invoked without argv[0]", program);
        std::process::exit(1);
    };

    let engine = LaunchEngine::system(&settings);
    match engine.launch(Path::new(&invoked), argv, envp) {
        Ok(never) => match never {},
        Err(e) if e.is_privilege_failure() => {
            log::error!(
                "{}: privilege drop aborted, target not started: {}",
                Path::new(&invoked).display(),
                e
            );
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("{}: {}", Path::new(&invoked).display(), e);
            std::process::exit(1);
        }
    }
}
