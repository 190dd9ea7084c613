//! Log sinks and the logger handle used by organizer runs.
//!
//! A [`Logger`] owns its own `tracing` dispatcher instead of installing a
//! process-wide subscriber. Work executed through [`Logger::in_scope`] logs to
//! that logger's sinks only, so several loggers (one per test, for example)
//! can coexist in one process.
//!
//! Every line has the shape:
//!
//! ```text
//! 2024-03-15 12:00:00,123 [INFO] notes.txt -> txt/2024-03-notes.txt
//! ```

use chrono::Local;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{Dispatch, Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

/// Target for events that should be reported as `CRITICAL`.
pub const FATAL_TARGET: &str = "extsort::fatal";

/// Default size at which the log file is rotated (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated log files kept next to the active one.
pub const DEFAULT_BACKUP_COUNT: usize = 5;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Errors raised while setting up log sinks.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to open log file {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type LogResult<T> = Result<T, LogError>;

/// Sink and verbosity settings for a [`Logger`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Include debug-level events.
    pub verbose: bool,
    /// Duplicate output into this file in addition to stdout.
    pub logfile: Option<PathBuf>,
    /// Rotate the log file once it would grow past this size. `0` disables rotation.
    pub max_file_bytes: u64,
    /// Number of rotated files to keep. `0` disables rotation.
    pub backup_count: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            logfile: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

/// Handle to a configured set of log sinks.
///
/// Cloning is cheap; clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Builds the console logger, plus the rotating file sink when
    /// `config.logfile` is set.
    ///
    /// `RUST_LOG` overrides the level selected by `config.verbose`.
    pub fn new(config: &LogConfig) -> LogResult<Self> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(config.verbose)));

        let file_layer = match &config.logfile {
            Some(path) => {
                let sink = RotatingFile::open(path, config.max_file_bytes, config.backup_count)?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .event_format(LineFormat)
                        .with_writer(sink),
                )
            }
            None => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(LineFormat)
                    .with_writer(io::stdout),
            )
            .with(file_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// Builds a logger writing to a single custom sink, such as a [`LogBuffer`].
    pub fn with_writer<W>(verbose: bool, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        let subscriber = tracing_subscriber::registry().with(level).with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_writer(writer),
        );

        Self {
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Runs `f` with this logger receiving all `tracing` events it emits.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Logs `message` at the `CRITICAL` level.
pub fn critical(message: impl fmt::Display) {
    tracing::error!(target: FATAL_TARGET, "{}", message);
}

/// Formats events as `<timestamp> [<LEVEL>] <message>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} [{}] ",
            Local::now().format(TIMESTAMP_FORMAT),
            level_label(event.metadata())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_label(metadata: &Metadata<'_>) -> &'static str {
    if metadata.target() == FATAL_TARGET {
        return "CRITICAL";
    }
    match *metadata.level() {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Append-only log file rotated by size.
///
/// When a record would push the file past `max_bytes`, the file is renamed to
/// `<name>.1`, older backups shift up by one, and the oldest beyond
/// `backup_count` is discarded. Records are never split across files.
#[derive(Debug)]
pub struct RotatingFile {
    state: Mutex<RotationState>,
}

#[derive(Debug)]
struct RotationState {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backup_count: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backup_count: usize) -> LogResult<Self> {
        let open_failed = |source| LogError::OpenFailed {
            path: path.to_path_buf(),
            source,
        };
        let file = open_append(path).map_err(open_failed)?;
        let written = file.metadata().map_err(open_failed)?.len();

        Ok(Self {
            state: Mutex::new(RotationState {
                path: path.to_path_buf(),
                file,
                written,
                max_bytes,
                backup_count,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RotationState {
    fn write_record(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_rotate(buf.len() as u64) {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn should_rotate(&self, incoming: u64) -> bool {
        self.max_bytes > 0
            && self.backup_count > 0
            && self.written > 0
            && self.written + incoming > self.max_bytes
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = backup_path(&self.path, self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backup_count).rev() {
            let from = backup_path(&self.path, index);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, index + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Path of the `index`-th rotated file, e.g. `run.log.2`.
pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Writer handed out by [`RotatingFile`] for a single record.
pub struct RotatingFileWriter<'a> {
    sink: &'a RotatingFile,
}

impl Write for RotatingFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.lock().write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileWriter { sink: self }
    }
}

/// In-memory log sink, for capturing the output of a run.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

pub struct LogBufferWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(|p| p.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            bytes: Arc::clone(&self.bytes),
        }
    }
}
