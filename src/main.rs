//! Entry point for the uld-resolve tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up `tracing`.
//! 2. Map every input into memory and parse its symbol view.
//! 3. Pick the target machine (`--machine` or the first object file).
//! 4. Feed the inputs to a `Linker` in command-line order and finalize.
//! 5. Print diagnostics and a map of what every symbol resolved to.
//!
//! Error handling is done via `anyhow`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use uld_resolve::coff::{self, CoffLoader};
use uld_resolve::config::{Config, ResolveConfig};
use uld_resolve::diag::{Diagnostics, Level};
use uld_resolve::input::ParsedFile;
use uld_resolve::linker::{Linker, Resolution};
use uld_resolve::symbol::SymbolKind;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_diagnostics(diag: &Diagnostics) {
    for d in diag.iter() {
        match d.level {
            Level::Error => eprintln!("uld-resolve: error: {}", d.message),
            Level::Warning => eprintln!("uld-resolve: warning: {}", d.message),
        }
    }
}

fn describe(kind: &SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Undefined(_) => "undefined",
        SymbolKind::LazyArchive { .. } => "lazy (archive)",
        SymbolKind::LazyObject { .. } => "lazy (object)",
        SymbolKind::LazyDll { .. } => "lazy (dll)",
        SymbolKind::DefinedRegular(_) => "regular",
        SymbolKind::DefinedAbsolute { .. } => "absolute",
        SymbolKind::DefinedCommon { .. } => "common",
        SymbolKind::DefinedSynthetic { .. } => "synthetic",
        SymbolKind::DefinedImportData { .. } => "import data",
        SymbolKind::DefinedImportThunk { .. } => "import thunk",
        SymbolKind::DefinedLocalImport { .. } => "local import",
    }
}

fn print_resolution(res: &Resolution) {
    if let Some(entry) = res.entry() {
        println!("entry: {}", res.symbol(entry).name());
    }
    if let Some(subsystem) = res.subsystem() {
        println!("subsystem: {subsystem:?}");
    }
    println!("image base: {:#x}", res.image_base());

    for (_, sym) in res.symbols() {
        if !sym.is_defined() {
            continue;
        }
        let file = match (&sym.kind, sym.file()) {
            (SymbolKind::DefinedSynthetic { chunk }, _) => res.chunk_name(*chunk),
            (_, Some(f)) => res.file(f).name.as_str(),
            (_, None) => "<internal>",
        };
        println!("{:<40} {:<14} {file}", sym.name(), describe(&sym.kind));
    }

    for e in res.exports() {
        let target = if e.forward_to.is_empty() {
            e.symbol_name.as_str()
        } else {
            e.forward_to.as_str()
        };
        println!("export @{:<5} {} -> {target}", e.ordinal, e.export_name);
    }
}

fn run() -> Result<()> {
    let config = Config::parse();
    init_logging(&config.log_level);

    let mut loader = CoffLoader::new();
    let mut inputs = Vec::new();
    for path in &config.inputs {
        let data = coff::map_file(path)?;
        let name = path.display().to_string();
        let parsed = coff::parse_bytes(&name, &data).with_context(|| format!("failed to parse {name}"))?;
        if let ParsedFile::Archive { .. } = parsed {
            loader.add_archive(&name, data);
        }
        inputs.push(parsed);
    }

    let machine = config
        .machine
        .or_else(|| {
            inputs.iter().find_map(|f| match f {
                ParsedFile::Object(obj) => obj.machine,
                _ => None,
            })
        })
        .context("cannot infer the machine type; use --machine")?;

    let mut linker = Linker::new(ResolveConfig::from(&config), machine, loader)?;
    let mut result = Ok(());
    for file in inputs {
        let name = file.name().to_string();
        if let Err(err) = linker.add_file(file) {
            result = Err(err.context(format!("while adding {name}")));
            break;
        }
    }
    if result.is_ok() {
        result = linker.finish();
    }
    print_diagnostics(linker.diagnostics());
    result?;

    print_resolution(&linker.into_resolution());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("uld-resolve: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
