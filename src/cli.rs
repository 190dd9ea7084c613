//! Command-line interface for extsort.
//!
//! This module handles:
//! - Argument parsing
//! - Configuration and logger setup
//! - Running the organizer and mapping its outcome to an exit code
//! - Listening for Ctrl-C so an interrupted run ends cleanly

use crate::config::AppConfig;
use crate::file_organizer::Organizer;
use crate::logging::{LogConfig, Logger, critical};
use crate::output::OutputFormatter;
use clap::Parser;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Extension File Organizer: group files by extension and rename them with a
/// year-month prefix.
#[derive(Debug, Clone, Parser)]
#[command(name = "extsort", version)]
pub struct Args {
    /// Source directory to organize
    #[arg(short, long, value_name = "PATH")]
    pub source: PathBuf,

    /// Also write the log to this file (rotates at 10MB by default)
    #[arg(short, long, value_name = "PATH")]
    pub logfile: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file (defaults to .extsortrc.toml or ~/.config/extsort/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show what would be moved without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Print a per-extension summary when done
    #[arg(long)]
    pub summary: bool,
}

/// How a CLI run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every file was attempted; per-file failures are in the log.
    Completed,
    /// Stopped early through the cancel flag.
    Cancelled,
    /// A fatal error aborted the run.
    Failed,
}

impl Outcome {
    /// `0` for completed and cancelled runs, `1` for fatal errors.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Completed | Outcome::Cancelled => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::FAILURE,
        }
    }
}

/// Runs one organizer pass.
pub fn run(args: &Args, cancel_flag: Arc<AtomicBool>) -> Outcome {
    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // no config means no rotation settings, so log with the defaults
            let fallback = LogConfig {
                verbose: args.verbose,
                logfile: args.logfile.clone(),
                ..LogConfig::default()
            };
            match Logger::new(&fallback) {
                Ok(logger) => logger.in_scope(|| critical(format!("Fatal error: {}", e))),
                Err(log_error) => eprintln!("Error loading configuration: {} ({})", e, log_error),
            }
            return Outcome::Failed;
        }
    };

    let log_config = LogConfig {
        verbose: args.verbose,
        logfile: args.logfile.clone(),
        max_file_bytes: config.logging.max_file_bytes,
        backup_count: config.logging.backup_count,
    };
    let logger = match Logger::new(&log_config) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Outcome::Failed;
        }
    };

    let filters = match config.filters.compile() {
        Ok(filters) => filters,
        Err(e) => {
            logger.in_scope(|| critical(format!("Fatal error: {}", e)));
            return Outcome::Failed;
        }
    };

    let organizer = Organizer::new(&args.source, logger.clone())
        .with_filters(filters)
        .with_dry_run(args.dry_run)
        .with_cancel_flag(cancel_flag);

    match panic::catch_unwind(AssertUnwindSafe(|| organizer.organize())) {
        Ok(Ok(report)) => {
            if report.cancelled {
                logger.in_scope(|| {
                    tracing::info!("Received interrupt, shutting down gracefully...")
                });
            }
            if args.summary {
                OutputFormatter::summary(&report);
            }
            if report.cancelled {
                Outcome::Cancelled
            } else {
                Outcome::Completed
            }
        }
        Ok(Err(e)) => {
            logger.in_scope(|| critical(format!("Fatal error: {}", e)));
            Outcome::Failed
        }
        Err(payload) => {
            logger.in_scope(|| critical(format!("Fatal error: {}", panic_message(&*payload))));
            Outcome::Failed
        }
    }
}

/// Sets `flag` when the process receives Ctrl-C.
///
/// The listener runs on its own thread with a single-threaded runtime, so the
/// organizer itself stays synchronous.
pub fn install_interrupt_handler(flag: Arc<AtomicBool>) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("interrupt-listener".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, Ordering::SeqCst);
                }
            });
        })?;

    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unexpected panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn args_for(source: &Path, config: &Path) -> Args {
        Args::try_parse_from([
            OsStr::new("extsort"),
            OsStr::new("--source"),
            source.as_os_str(),
            OsStr::new("--config"),
            config.as_os_str(),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_short_flags() {
        let args = Args::try_parse_from(["extsort", "-s", "downloads", "-l", "run.log", "-v"]).unwrap();

        assert_eq!(args.source, PathBuf::from("downloads"));
        assert_eq!(args.logfile, Some(PathBuf::from("run.log")));
        assert!(args.verbose);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_long_flags() {
        let args = Args::try_parse_from([
            "extsort",
            "--source",
            "downloads",
            "--dry-run",
            "--summary",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert!(args.dry_run);
        assert!(args.summary);
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(args.logfile, None);
        assert!(!args.verbose);
    }

    #[test]
    fn test_source_is_required() {
        let result = Args::try_parse_from(["extsort", "--verbose"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_version_flag() {
        let err = Args::try_parse_from(["extsort", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_missing_source_exits_with_failure() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let config = temp_dir.path().join("extsort.toml");
        fs::write(&config, "").unwrap();
        let args = args_for(&missing, &config);

        let outcome = run(&args, Arc::new(AtomicBool::new(false)));

        assert_eq!(outcome, Outcome::Failed);
        assert!(!missing.exists());
    }

    #[test]
    fn test_invalid_filter_exits_with_failure() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        let config = temp_dir.path().join("extsort.toml");
        fs::write(&config, "[filters.exclude]\nregex = [\"(\"]\n").unwrap();
        let args = args_for(&source, &config);

        let outcome = run(&args, Arc::new(AtomicBool::new(false)));

        assert_eq!(outcome, Outcome::Failed);
        assert!(source.join("a.txt").exists());
    }

    #[test]
    fn test_invalid_config_is_logged_as_critical() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        let config = temp_dir.path().join("bad.toml");
        fs::write(&config, "[filters\nenable_hidden_files = ").unwrap();
        let logfile = temp_dir.path().join("run.log");
        let args = Args::try_parse_from([
            OsStr::new("extsort"),
            OsStr::new("-s"),
            source.as_os_str(),
            OsStr::new("-c"),
            config.as_os_str(),
            OsStr::new("-l"),
            logfile.as_os_str(),
        ])
        .unwrap();

        let outcome = run(&args, Arc::new(AtomicBool::new(false)));

        assert_eq!(outcome, Outcome::Failed);
        assert!(source.join("a.txt").exists());
        let contents = fs::read_to_string(&logfile).expect("logfile should be written");
        let line = contents
            .lines()
            .find(|line| line.contains("[CRITICAL]"))
            .expect("a critical line");
        assert!(line.contains("Fatal error: "), "{}", line);
    }

    #[test]
    fn test_cancelled_run_exits_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        let config = temp_dir.path().join("extsort.toml");
        fs::write(&config, "").unwrap();
        let args = args_for(&source, &config);

        let outcome = run(&args, Arc::new(AtomicBool::new(true)));

        assert_eq!(outcome, Outcome::Cancelled);
        assert!(source.join("a.txt").exists());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(&*boxed), "owned boom");

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*boxed), "unexpected panic");
    }
}
