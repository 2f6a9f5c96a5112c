//! Exported symbols.
//!
//! Exports come from three places: `/export:` options embedded in object
//! files, `--export` on the command line, and module-definition files. They
//! are only finalized once resolution is done:
//! 1. Explicit ordinals are checked for collisions.
//! 2. Each export gets the name it is exported under (decoration stripped).
//! 3. Exports are deduplicated by that name and sorted.
//! 4. The remaining ordinals are handed out.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::arch::{arm64ec, x86, Target};
use crate::diag::Diagnostics;
use crate::error::ResolveError;
use crate::symbol::SymbolId;

/// Where an export was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportSource {
    /// A `/export:` directive in an object file.
    #[default]
    Directives,
    /// The command line.
    Export,
    /// A module-definition file.
    ModuleDefinition,
}

impl fmt::Display for ExportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportSource::Directives => "source file (directives)",
            ExportSource::Export => "/export",
            ExportSource::ModuleDefinition => "/def",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Export {
    /// Internal (symbol table) name.
    pub name: String,
    /// Name given after `=`, if the export is renamed.
    pub ext_name: String,
    /// Final name in the export table.
    pub export_name: String,
    /// Overrides the exported name outright (`==name` in .def files).
    pub export_as: String,
    pub import_name: String,
    /// Name of the symbol that actually backs the export after mangling.
    pub symbol_name: String,
    /// `dll.func` for forwarded exports.
    pub forward_to: String,
    /// 0 means "assign one".
    pub ordinal: u16,
    pub noname: bool,
    pub data: bool,
    pub is_private: bool,
    pub constant: bool,
    pub source: ExportSource,
    pub sym: Option<SymbolId>,
}

impl Export {
    pub fn new(name: impl Into<String>, source: ExportSource) -> Self {
        Self {
            name: name.into(),
            source,
            ..Self::default()
        }
    }
}

/// Two requests for the same export are equal if they ask for the same thing,
/// regardless of where they came from.
impl PartialEq for Export {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ext_name == other.ext_name
            && self.forward_to == other.forward_to
            && self.ordinal == other.ordinal
            && self.noname == other.noname
            && self.data == other.data
            && self.is_private == other.is_private
    }
}

/// Parse `name[=internal][,@ordinal[,NONAME]][,DATA][,PRIVATE][,CONSTANT][,EXPORTAS,name]`.
pub fn parse_export_arg(arg: &str, source: ExportSource) -> Result<Export, ResolveError> {
    let invalid = || ResolveError::InvalidExport(arg.to_string());
    let (head, mut rest) = arg.split_once(',').unwrap_or((arg, ""));
    if head.is_empty() {
        return Err(invalid());
    }
    let mut e = Export::new(head, source);
    if let Some((x, y)) = head.split_once('=') {
        if y.contains('.') {
            e.name = x.to_string();
            e.forward_to = y.to_string();
        } else {
            if y.is_empty() {
                return Err(invalid());
            }
            e.ext_name = x.to_string();
            e.name = y.to_string();
        }
    }

    while !rest.is_empty() {
        let (tok, tail) = rest.split_once(',').unwrap_or((rest, ""));
        rest = tail;
        if tok.eq_ignore_ascii_case("noname") {
            if e.ordinal == 0 {
                return Err(invalid());
            }
            e.noname = true;
        } else if tok.eq_ignore_ascii_case("data") {
            e.data = true;
        } else if tok.eq_ignore_ascii_case("constant") {
            e.constant = true;
        } else if tok.eq_ignore_ascii_case("private") {
            e.is_private = true;
        } else if tok.eq_ignore_ascii_case("exportas") {
            if rest.is_empty() || rest.contains(',') {
                return Err(invalid());
            }
            e.export_as = rest.to_string();
            break;
        } else if let Some(ord) = tok.strip_prefix('@') {
            e.ordinal = match ord.parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid()),
                Ok(ord) => ord,
            };
        } else {
            return Err(invalid());
        }
    }
    Ok(e)
}

/// Compute export names, deduplicate and sort.
pub fn fixup_exports(
    mut exports: Vec<Export>,
    target: &Target,
    diag: &mut Diagnostics,
) -> Result<Vec<Export>, ResolveError> {
    let mut ords = BTreeSet::new();
    for e in &exports {
        if e.ordinal != 0 && !ords.insert(e.ordinal) {
            return Err(ResolveError::DuplicateExportOrdinal(e.name.clone()));
        }
    }

    for e in &mut exports {
        e.export_name = export_name(e, target);
    }

    if target.kill_at {
        for e in &mut exports {
            e.name = x86::kill_at(&e.name, true);
            e.export_name = x86::kill_at(&e.export_name, false);
            e.ext_name = x86::kill_at(&e.ext_name, true);
            e.symbol_name = x86::kill_at(&e.symbol_name, true);
        }
    }

    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut unique: Vec<Export> = Vec::with_capacity(exports.len());
    for e in exports {
        let Some(&slot) = seen.get(&e.export_name) else {
            seen.insert(e.export_name.clone(), unique.len());
            unique.push(e);
            continue;
        };
        let existing = &mut unique[slot];
        if e == *existing || e.name != existing.name {
            continue;
        }
        // Directive exports yield silently to anything given explicitly.
        if existing.source == ExportSource::Directives {
            *existing = e;
            continue;
        }
        if existing.source == e.source {
            diag.warn(format!("duplicate {} option: {}", existing.source, e.name));
        } else {
            diag.warn(format!(
                "duplicate export: {} first seen in {}, now in {}",
                e.name, existing.source, e.source
            ));
        }
    }

    unique.sort_by(|a, b| a.export_name.cmp(&b.export_name));
    Ok(unique)
}

fn export_name(e: &Export, target: &Target) -> String {
    if !e.export_as.is_empty() {
        return e.export_as.clone();
    }
    let sym = if !e.forward_to.is_empty() || e.ext_name.is_empty() {
        &e.name
    } else {
        &e.ext_name
    };
    if target.is_i386() {
        if let Some(stripped) = sym.strip_prefix('_') {
            // Fully decorated stdcall names keep their underscore outside MinGW.
            if target.mingw || !sym.contains('@') {
                return stripped.to_string();
            }
        }
    }
    if target.is_ec() && !e.data && !e.constant {
        if let Some(demangled) = arm64ec::demangled_function_name(sym) {
            return demangled;
        }
    }
    sym.clone()
}

/// Give every export without an explicit ordinal the next free one.
pub fn assign_export_ordinals(exports: &mut [Export]) -> Result<(), ResolveError> {
    let max = exports.iter().map(|e| u32::from(e.ordinal)).max().unwrap_or(0);
    let unassigned = exports.iter().filter(|e| e.ordinal == 0).count() as u32;
    let last = max + unassigned;
    if last > u32::from(u16::MAX) {
        return Err(ResolveError::TooManyExports { got: last });
    }
    let mut next = max as u16;
    for e in exports.iter_mut().filter(|e| e.ordinal == 0) {
        next += 1;
        e.ordinal = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Machine;
    use crate::config::ResolveConfig;

    fn export(name: &str, source: ExportSource) -> Export {
        Export::new(name, source)
    }

    #[test]
    fn parses_export_options() {
        let e = parse_export_arg("ext=internal,@5,NONAME,DATA", ExportSource::Export).unwrap();
        assert_eq!(e.ext_name, "ext");
        assert_eq!(e.name, "internal");
        assert_eq!(e.ordinal, 5);
        assert!(e.noname && e.data);

        let e = parse_export_arg("fwd=other.func", ExportSource::Export).unwrap();
        assert_eq!(e.name, "fwd");
        assert_eq!(e.forward_to, "other.func");

        let e = parse_export_arg("foo,EXPORTAS,bar", ExportSource::Export).unwrap();
        assert_eq!(e.export_as, "bar");
    }

    #[test]
    fn rejects_bad_export_options() {
        for arg in ["", ",DATA", "foo,NONAME", "foo,@0", "foo,@70000", "foo,bogus", "a=,DATA"] {
            assert!(
                matches!(
                    parse_export_arg(arg, ExportSource::Export),
                    Err(ResolveError::InvalidExport(_))
                ),
                "{arg} should be rejected"
            );
        }
    }

    #[test]
    fn i386_exports_drop_underscore() {
        let target = Target::plain(Machine::I386);
        let mut diag = Diagnostics::new();
        let exports = vec![
            export("_foo", ExportSource::Export),
            export("_bar@8", ExportSource::Export),
        ];
        let out = fixup_exports(exports, &target, &mut diag).unwrap();
        let names: Vec<_> = out.iter().map(|e| e.export_name.as_str()).collect();
        assert_eq!(names, vec!["_bar@8", "foo"]);
    }

    #[test]
    fn kill_at_strips_stdcall_suffix() {
        let config = ResolveConfig {
            mingw: true,
            kill_at: true,
            ..ResolveConfig::default()
        };
        let target = Target::new(Machine::I386, &config);
        let mut diag = Diagnostics::new();
        let out = fixup_exports(vec![export("_foo@4", ExportSource::Export)], &target, &mut diag).unwrap();
        assert_eq!(out[0].export_name, "foo");
        assert_eq!(out[0].name, "_foo");
    }

    #[test]
    fn duplicates_warn_unless_from_directives() {
        let target = Target::plain(Machine::Amd64);
        let mut diag = Diagnostics::new();
        let mut directive = export("foo", ExportSource::Directives);
        directive.data = true;
        let exports = vec![
            directive,
            export("foo", ExportSource::Export),
            {
                let mut e = export("foo", ExportSource::ModuleDefinition);
                e.is_private = true;
                e
            },
        ];
        let out = fixup_exports(exports, &target, &mut diag).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, ExportSource::Export);
        let warnings: Vec<_> = diag.warnings().map(|d| d.message.clone()).collect();
        assert_eq!(
            warnings,
            vec!["duplicate export: foo first seen in /export, now in /def"]
        );
    }

    #[test]
    fn explicit_ordinals_must_be_unique() {
        let target = Target::plain(Machine::Amd64);
        let mut diag = Diagnostics::new();
        let mut a = export("a", ExportSource::Export);
        a.ordinal = 3;
        let mut b = export("b", ExportSource::Export);
        b.ordinal = 3;
        assert!(matches!(
            fixup_exports(vec![a, b], &target, &mut diag),
            Err(ResolveError::DuplicateExportOrdinal(name)) if name == "b"
        ));
    }

    #[test]
    fn ordinals_fill_above_the_highest_explicit_one() {
        let mut exports = vec![export("a", ExportSource::Export), export("b", ExportSource::Export)];
        exports[1].ordinal = 10;
        assign_export_ordinals(&mut exports).unwrap();
        assert_eq!(exports[0].ordinal, 11);
        assert_eq!(exports[1].ordinal, 10);
    }

    #[test]
    fn ordinal_overflow_is_fatal() {
        let mut exports: Vec<_> = (0..65537)
            .map(|i| export(&format!("f{i}"), ExportSource::Export))
            .collect();
        let err = assign_export_ordinals(&mut exports).unwrap_err();
        assert_eq!(
            err.to_string(),
            "too many exported symbols (got 65537, max 65535)"
        );
    }
}
