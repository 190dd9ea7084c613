//! Extension-based organization of a directory tree.
//!
//! A run has two phases. The snapshot phase walks the source root and records
//! every regular file before anything is touched, so extension folders created
//! during the run are never revisited. The relocation phase then moves each
//! recorded file to `<root>/<extension>/<YYYY-MM>-<name>`, one at a time.
//!
//! A file that cannot be moved is logged and left where it was; the run always
//! continues with the next file.

use crate::config::CompiledFilters;
use crate::error::{OrganizeError, OrganizeResult};
use crate::extension::extension_key_os;
use crate::logging::Logger;
use crate::timestamp::year_month_prefix;
use filetime::FileTime;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

/// A regular file recorded during the snapshot phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path of the file as discovered under the source root.
    pub path: PathBuf,
    /// The file's basename, kept byte-for-byte for the renamed target.
    pub file_name: OsString,
    /// Normalized extension key naming the destination folder.
    pub extension_key: String,
}

/// Where a file is going to be moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub extension_key: String,
    /// `<root>/<extension_key>`
    pub destination_dir: PathBuf,
    /// `<destination_dir>/<YYYY-MM>-<file_name>`
    pub destination: PathBuf,
}

/// A file that was relocated (or would be, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    pub extension_key: String,
}

/// A file that stayed at its original path because its move failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one organizer run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub moved: Vec<MovedFile>,
    pub failed: Vec<FailedFile>,
    /// Files left alone because of filter rules.
    pub skipped: usize,
    /// The run stopped early because cancellation was requested.
    pub cancelled: bool,
    pub dry_run: bool,
}

impl RunReport {
    /// Number of moved files per extension key.
    pub fn counts_by_extension(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for moved in &self.moved {
            *counts.entry(moved.extension_key.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Organizes the files below a source root by extension.
///
/// # Examples
///
/// ```no_run
/// use extsort::file_organizer::Organizer;
/// use extsort::logging::Logger;
///
/// let organizer = Organizer::new("/home/user/Downloads", Logger::disabled());
/// match organizer.organize() {
///     Ok(report) => println!("Moved {} files", report.moved.len()),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
#[derive(Debug)]
pub struct Organizer {
    root: PathBuf,
    logger: Logger,
    filters: CompiledFilters,
    dry_run: bool,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Organizer {
    pub fn new(root: impl Into<PathBuf>, logger: Logger) -> Self {
        Self {
            root: root.into(),
            logger,
            filters: CompiledFilters::default(),
            dry_run: false,
            cancel_flag: None,
        }
    }

    /// Leave files rejected by `filters` untouched.
    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Plan and log moves without touching the filesystem.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stop before the next file once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the organizer.
    ///
    /// Fails only when the source root is missing or not a directory, in which
    /// case nothing on disk is modified. Per-file failures are logged and
    /// collected in the returned report.
    pub fn organize(&self) -> OrganizeResult<RunReport> {
        self.logger.in_scope(|| self.run())
    }

    fn run(&self) -> OrganizeResult<RunReport> {
        if !self.root.is_dir() {
            return Err(OrganizeError::SourceNotFound {
                path: self.root.clone(),
            });
        }

        let mut report = RunReport {
            dry_run: self.dry_run,
            ..RunReport::default()
        };

        let entries = self.snapshot();
        tracing::debug!(
            "Found {} files under {}",
            entries.len(),
            self.root.display()
        );

        let mut planned_targets = HashSet::new();

        for entry in entries {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if !self.filters.should_include(self.relative(&entry.path), &entry.extension_key) {
                tracing::debug!("Skipping {} (excluded by filters)", entry.path.display());
                report.skipped += 1;
                continue;
            }

            let plan = self.plan(&entry);
            let outcome = if self.dry_run {
                self.check_planned(&plan, &mut planned_targets)
            } else {
                self.relocate(&plan)
            };

            match outcome {
                Ok(()) => {
                    if self.dry_run {
                        tracing::info!(
                            "[DRY RUN] Would move {} -> {}",
                            plan.source.display(),
                            plan.destination.display()
                        );
                    } else {
                        tracing::info!(
                            "Moved {} -> {}",
                            plan.source.display(),
                            plan.destination.display()
                        );
                    }
                    report.moved.push(MovedFile {
                        from: plan.source,
                        to: plan.destination,
                        extension_key: plan.extension_key,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to move {}: {}", plan.source.display(), e);
                    report.failed.push(FailedFile {
                        path: plan.source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Records every regular file below the root, sorted by name within each
    /// directory.
    ///
    /// Symlinks are not followed. A symlink pointing at a file is recorded and
    /// later moved as a link; anything else that is not a regular file is
    /// skipped. Unreadable subtrees are logged and skipped.
    pub fn snapshot(&self) -> Vec<FileEntry> {
        let mut entries = Vec::new();

        for item in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !item.path().is_file() {
                if !item.file_type().is_dir() {
                    tracing::debug!("Skipping {} (not a regular file)", item.path().display());
                }
                continue;
            }

            let file_name = item.file_name().to_os_string();
            entries.push(FileEntry {
                extension_key: extension_key_os(&file_name),
                path: item.into_path(),
                file_name,
            });
        }

        entries
    }

    /// Computes the destination of a file, reading its modification time.
    pub fn plan(&self, entry: &FileEntry) -> PlannedMove {
        let prefix = year_month_prefix(&entry.path);
        let destination_dir = self.root.join(&entry.extension_key);
        let destination = destination_dir.join(renamed_file_name(&prefix, &entry.file_name));

        PlannedMove {
            source: entry.path.clone(),
            extension_key: entry.extension_key.clone(),
            destination_dir,
            destination,
        }
    }

    /// Creates the destination folder and moves the file into it.
    fn relocate(&self, plan: &PlannedMove) -> OrganizeResult<()> {
        fs::create_dir_all(&plan.destination_dir).map_err(|e| {
            OrganizeError::DirectoryCreationFailed {
                path: plan.destination_dir.clone(),
                source: e,
            }
        })?;
        tracing::debug!("Ensured folder {}", plan.destination_dir.display());

        move_file(&plan.source, &plan.destination)
    }

    /// Dry-run counterpart of `relocate`: reports the failures a real run
    /// would hit, including a non-directory in place of the extension folder
    /// and two files planned onto the same target.
    fn check_planned(
        &self,
        plan: &PlannedMove,
        planned_targets: &mut HashSet<PathBuf>,
    ) -> OrganizeResult<()> {
        if entry_exists(&plan.destination_dir) && !plan.destination_dir.is_dir() {
            return Err(OrganizeError::DirectoryCreationFailed {
                path: plan.destination_dir.clone(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "File exists"),
            });
        }
        if entry_exists(&plan.destination) || !planned_targets.insert(plan.destination.clone()) {
            return Err(OrganizeError::DestinationExists {
                path: plan.destination.clone(),
            });
        }
        Ok(())
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// `<prefix>-<file_name>`, keeping non UTF-8 names intact.
pub fn renamed_file_name(prefix: &str, file_name: &OsString) -> OsString {
    let mut name = OsString::from(prefix);
    name.push("-");
    name.push(file_name);
    name
}

/// Moves `source` to `destination` without ever overwriting.
///
/// Uses a rename; across filesystems the file is copied into a freshly
/// created target with its permissions and timestamps restored, and the
/// source is removed afterwards. On failure the source stays in place and no
/// partial copy is left behind.
pub fn move_file(source: &Path, destination: &Path) -> OrganizeResult<()> {
    // fs::rename replaces existing files on unix
    if entry_exists(destination) {
        return Err(OrganizeError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }

    let move_failed = |source_error: io::Error| OrganizeError::MoveFailed {
        destination: destination.to_path_buf(),
        source: source_error,
    };

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                "Rename across devices failed for {}, copying instead",
                source.display()
            );
            copy_then_remove(source, destination).map_err(move_failed)
        }
        Err(e) => Err(move_failed(e)),
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    if metadata.file_type().is_symlink() {
        return relink_then_remove(source, destination, &metadata);
    }
    copy_contents(source, destination)?;

    let finished = restore_metadata(destination, &metadata).and_then(|()| fs::remove_file(source));
    if finished.is_err() && entry_exists(source) {
        let _ = fs::remove_file(destination);
    }
    finished
}

/// Recreates the link at `destination` with the same target text, so a
/// moved link stays a link.
fn relink_then_remove(
    source: &Path,
    destination: &Path,
    metadata: &fs::Metadata,
) -> io::Result<()> {
    let target = fs::read_link(source)?;
    create_symlink(&target, destination)?;

    let finished = filetime::set_symlink_file_times(
        destination,
        FileTime::from_last_access_time(metadata),
        FileTime::from_last_modification_time(metadata),
    )
    .and_then(|()| fs::remove_file(source));
    if finished.is_err() && entry_exists(source) {
        let _ = fs::remove_file(destination);
    }
    finished
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported"))
}

/// Copies into a newly created `destination`, removing it again if the copy
/// does not complete.
fn copy_contents(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    if copied.is_err() {
        let _ = fs::remove_file(destination);
    }
    copied
}

fn restore_metadata(destination: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    fs::set_permissions(destination, metadata.permissions())?;
    filetime::set_file_times(
        destination,
        FileTime::from_last_access_time(metadata),
        FileTime::from_last_modification_time(metadata),
    )
}

fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
