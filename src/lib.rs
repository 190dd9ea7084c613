//! extsort - group files by extension and date-stamp their names
//!
//! This library walks a directory tree, moves every regular file into a
//! subfolder of the root named after its lowercased extension, and renames it
//! with a `YYYY-MM-` prefix taken from its last modification time.

pub mod cli;
pub mod config;
pub mod error;
pub mod extension;
pub mod file_organizer;
pub mod logging;
pub mod output;
pub mod timestamp;

pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use error::{OrganizeError, OrganizeResult};
pub use extension::{NO_EXTENSION, extension_key};
pub use file_organizer::{Organizer, RunReport};
pub use logging::{LogBuffer, LogConfig, Logger};
pub use timestamp::year_month_prefix;
