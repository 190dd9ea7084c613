//! Extension classification for naming destination folders.
//!
//! A file's folder is named after the text following the last `.` of its
//! basename, lowercased. Leading dots belong to the name, so dotfiles such as
//! `.bashrc` count as having no extension.
//!
//! # Examples
//!
//! ```
//! use extsort::extension::{extension_key, NO_EXTENSION};
//!
//! assert_eq!(extension_key("IMAGE.JPG"), "jpg");
//! assert_eq!(extension_key("archive.tar.gz"), "gz");
//! assert_eq!(extension_key("README"), NO_EXTENSION);
//! ```

use std::ffi::OsStr;

/// Folder name used for files without an extension.
pub const NO_EXTENSION: &str = "no_extension";

/// Returns the normalized extension key for a basename.
pub fn extension_key(file_name: &str) -> String {
    let name = file_name.trim_start_matches('.');
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => NO_EXTENSION.to_string(),
    }
}

/// Same as [`extension_key`] for an `OsStr` basename.
///
/// Non UTF-8 names are converted lossily; only the key is affected, the
/// original name is kept as-is when the file is renamed.
pub fn extension_key_os(file_name: &OsStr) -> String {
    extension_key(&file_name.to_string_lossy())
}
