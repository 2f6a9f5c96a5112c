//! COFF Symbol Resolution Library.
//!
//! This library provides the symbol resolution engine of the `uld-resolve`
//! linker front end. It is organized into several modules:
//! - `config`: CLI configuration and the pre-parsed resolution options.
//! - `arch`: Target capabilities and name decoration rules.
//! - `input`: Parsed input files and the member loader interface.
//! - `coff`: Reading objects, archives and import libraries from disk.
//! - `symbol`: Symbol records and their kinds.
//! - `symtab`: The global symbol table and its merge rules.
//! - `diag`: Deferred diagnostics.
//! - `export`: Export parsing, deduplication and ordinals.
//! - `moddef`: Module-definition files.
//! - `lto`: Global resolutions handed to link-time optimization.
//! - `linker`: The link session orchestrating all of the above.

pub mod arch;
pub mod coff;
pub mod config;
pub mod diag;
pub mod error;
pub mod export;
pub mod input;
pub mod linker;
pub mod lto;
pub mod moddef;
pub mod symbol;
pub mod symtab;
