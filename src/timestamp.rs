//! Year-month prefixes derived from file modification times.

use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;

/// `strftime` pattern for the filename prefix.
pub const PREFIX_FORMAT: &str = "%Y-%m";

/// Returns the `YYYY-MM` prefix for the file's last modification time,
/// converted to local calendar time.
///
/// If the modification time cannot be read, a warning is logged and the
/// current time is used instead. This function never fails.
pub fn year_month_prefix(path: &Path) -> String {
    let modified = fs::metadata(path).and_then(|meta| meta.modified());

    let instant: DateTime<Local> = match modified {
        Ok(time) => time.into(),
        Err(e) => {
            tracing::warn!("Could not get mtime for {}: {}", path.display(), e);
            Local::now()
        }
    };

    format_prefix(&instant)
}

/// Formats a point in time as a `YYYY-MM` prefix.
pub fn format_prefix(instant: &DateTime<Local>) -> String {
    instant.format(PREFIX_FORMAT).to_string()
}
