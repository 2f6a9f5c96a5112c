//! Fatal resolution errors.
//!
//! Anything in here aborts the link on the spot. Per-symbol problems such as
//! unresolved or duplicate symbols are not errors in this sense; they are
//! collected in [`Diagnostics`](crate::diag::Diagnostics) and checked once at
//! the end.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("/alternatename: invalid argument: {0}")]
    InvalidAlternateName(String),

    #[error("/alternatename: conflicts: {0}")]
    ConflictingAlternateName(String),

    #[error("/export: invalid argument: {0}")]
    InvalidExport(String),

    #[error("duplicate export ordinal: {0}")]
    DuplicateExportOrdinal(String),

    #[error("too many exported symbols (got {got}, max {max})", max = u16::MAX)]
    TooManyExports { got: u32 },

    #[error("{path}:{line}: {message}")]
    ModuleDefinition {
        path: String,
        line: usize,
        message: String,
    },

    #[error("could not open {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("/includeglob: {0}")]
    InvalidGlob(#[from] glob::PatternError),

    #[error("multiple prevailing definitions of {0}")]
    MultiplePrevailing(String),

    #[error("global resolutions have already been released")]
    ResolutionsReleased,

    #[error("link failed with {0} error(s)")]
    Failed(usize),
}
