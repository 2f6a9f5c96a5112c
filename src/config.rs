//! Configuration module.
//!
//! [`Config`] is the command-line interface of the `uld-resolve` binary,
//! parsed with `clap`. [`ResolveConfig`] is the pre-parsed form consumed by the
//! resolution engine; embedders can build it directly.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::arch::Machine;

/// Resolves the global symbols of a set of COFF objects, archives and import
/// libraries the way a PE/COFF linker does, and reports what each symbol
/// resolved to.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input object files, archives and import libraries, in link order
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Target machine (defaults to the machine of the first object file)
    #[arg(long, value_enum)]
    pub machine: Option<Machine>,

    /// Tolerate unresolved and duplicate symbols
    #[arg(long)]
    pub force: bool,

    /// Replace unresolved symbols with absolute zero and keep going
    #[arg(long)]
    pub force_unresolved: bool,

    /// Keep the first of duplicate definitions and keep going
    #[arg(long)]
    pub force_multiple: bool,

    /// Weak alias of the form FROM=TO
    #[arg(long = "alternatename", value_name = "FROM=TO")]
    pub alternate_names: Vec<String>,

    /// Minimum alignment of a common symbol, as NAME,LOG2
    #[arg(long = "aligncomm", value_name = "NAME,LOG2")]
    pub align_comm: Vec<String>,

    /// Force a symbol to be resolved
    #[arg(long)]
    pub include: Vec<String>,

    /// Force every known symbol matching a glob to be resolved
    #[arg(long = "includeglob", value_name = "GLOB")]
    pub include_glob: Vec<String>,

    /// Export a symbol: NAME[=INTERNAL][,@ORDINAL[,NONAME]][,DATA][,PRIVATE][,CONSTANT]
    #[arg(long)]
    pub export: Vec<String>,

    /// Module-definition (.def) file
    #[arg(long)]
    pub def: Option<PathBuf>,

    /// Entry point symbol
    #[arg(long)]
    pub entry: Option<String>,

    /// Resolve for a DLL rather than an executable
    #[arg(long)]
    pub dll: bool,

    #[arg(long, value_enum)]
    pub subsystem: Option<Subsystem>,

    /// MinGW semantics (auto-import, runtime pseudo relocations)
    #[arg(long)]
    pub mingw: bool,

    /// Disable MinGW automatic data imports
    #[arg(long)]
    pub no_auto_import: bool,

    /// Resolve decorated stdcall references against undecorated definitions
    #[arg(long)]
    pub stdcall_fixup: bool,

    /// Warn about every stdcall fixup
    #[arg(long)]
    pub warn_stdcall_fixup: bool,

    /// Strip stdcall suffixes from exported names
    #[arg(long)]
    pub kill_at: bool,

    /// Warn when an __imp_ reference is satisfied by a local definition
    #[arg(long)]
    pub warn_locally_defined_imported: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

/// Windows subsystem of the image being linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Subsystem {
    Console,
    Windows,
}

/// Everything the resolution engine needs to know from the command line.
#[derive(Debug, Clone, Default)]
pub struct ResolveConfig {
    pub force_unresolved: bool,
    pub force_multiple: bool,
    pub mingw: bool,
    pub auto_import: bool,
    pub stdcall_fixup: bool,
    pub warn_stdcall_fixup: bool,
    pub kill_at: bool,
    pub warn_locally_defined_imported: bool,
    pub dll: bool,
    pub entry: Option<String>,
    pub subsystem: Option<Subsystem>,
    pub alternate_names: Vec<String>,
    pub align_comm: Vec<String>,
    pub includes: Vec<String>,
    pub include_globs: Vec<String>,
    pub exports: Vec<String>,
    pub def_file: Option<PathBuf>,
}

impl From<&Config> for ResolveConfig {
    fn from(config: &Config) -> Self {
        Self {
            force_unresolved: config.force || config.force_unresolved,
            force_multiple: config.force || config.force_multiple,
            mingw: config.mingw,
            auto_import: config.mingw && !config.no_auto_import,
            stdcall_fixup: config.stdcall_fixup,
            warn_stdcall_fixup: config.warn_stdcall_fixup,
            kill_at: config.kill_at,
            warn_locally_defined_imported: config.warn_locally_defined_imported,
            dll: config.dll,
            entry: config.entry.clone(),
            subsystem: config.subsystem,
            alternate_names: config.alternate_names.clone(),
            align_comm: config.align_comm.clone(),
            includes: config.include.clone(),
            include_globs: config.include_glob.clone(),
            exports: config.export.clone(),
            def_file: config.def.clone(),
        }
    }
}
