//! Error types for organizer runs.
//!
//! Only [`OrganizeError::SourceNotFound`] ever aborts a run. Every other
//! variant describes a single file and is recorded in the run report.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while organizing a directory.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The source root is missing or is not a directory.
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Failed to create the extension folder for a file.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The renamed target is already occupied.
    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// The rename (or its copy fallback) failed.
    #[error("Failed to move to {}: {source}", destination.display())]
    MoveFailed {
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for organizer operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;
