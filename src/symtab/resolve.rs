//! Late resolution passes: alternate names, MinGW fallbacks and the final
//! sweep over symbols that are still undefined.

use rustc_hash::{FxHashMap, FxHashSet};

use super::SymbolTable;
use crate::arch::{arm64ec, x86};
use crate::diag::{self, Level, UndefinedAggregator};
use crate::input::InputFile;
use crate::symbol::{FileId, SymbolId, SymbolKind};

impl SymbolTable {
    fn unresolved_level(&self) -> Level {
        if self.config.force_unresolved {
            Level::Warning
        } else {
            Level::Error
        }
    }

    /// Apply `/alternatename` pairs to symbols that are still undefined.
    ///
    /// Returns true if any alias was set. A pair whose target is not defined
    /// yet is skipped; it may succeed on a later call.
    pub fn resolve_alternate_names(&mut self) -> bool {
        let pairs: Vec<(String, String)> = self
            .alternate_names
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        let mut changed = false;
        for (from, to) in pairs {
            let Some(id) = self.find(&from) else {
                continue;
            };
            let Some(u) = self.symbols[id].kind.as_undefined() else {
                continue;
            };
            if let Some(alias) = u.weak_alias {
                // An EC anti-dependency only yields when it points nowhere
                // useful, or when it is the mangled half of a pair.
                if !self.target.is_ec() || !u.is_anti_dep {
                    continue;
                }
                if !self.symbols[alias].is_undefined() && !arm64ec::is_mangled_function_name(&from) {
                    continue;
                }
            }

            let Some(to_id) = self.find(&to) else {
                continue;
            };
            if let Some(to_undef) = self.symbols[to_id].kind.as_undefined() {
                if to_undef.weak_alias.is_none() || to_undef.is_anti_dep {
                    continue;
                }
            }
            if self.symbols[to_id].is_lazy() {
                self.force_lazy(to_id);
            }
            tracing::info!(from = %from, to = %to, "alternate name");
            self.set_weak_alias(id, to_id, false);
            changed = true;
        }
        changed
    }

    /// The defined `__imp_` counterpart of `name`.
    pub fn imp_symbol(&self, name: &str) -> Option<SymbolId> {
        if name.starts_with("__imp_") {
            return None;
        }
        self.find(&format!("__imp_{name}"))
            .filter(|&id| self.symbols[id].is_defined())
    }

    /// Pull in definitions MinGW links are allowed to fall back on: the
    /// undecorated target of a stdcall reference, and the `__imp_` pointer of
    /// an automatically imported variable.
    pub fn load_mingw_symbols(&mut self) {
        let undefs: Vec<SymbolId> = self
            .symbols
            .iter()
            .filter(|(_, s)| s.kind.as_undefined().is_some_and(|u| u.weak_alias.is_none()))
            .map(|(id, _)| id)
            .collect();

        for id in undefs {
            if !self.has_no_alias(id) {
                continue;
            }
            let name = self.symbols[id].name().to_string();

            if self.target.stdcall_fixup {
                let new_name = x86::cdecl_name(&name);
                if let Some(l) = self.find(&new_name).filter(|_| new_name != name) {
                    if self.symbols[l].is_lazy() && !self.symbols[l].pending_archive_load {
                        tracing::debug!(symbol = %new_name, "loading lazy symbol for stdcall fixup");
                        self.force_lazy(l);
                    }
                    if self.symbols[l].is_lazy() || self.symbols[l].is_defined() {
                        let message = format!("Resolving {name} by linking to {new_name}");
                        if self.target.warn_stdcall_fixup {
                            self.diag.warn(message);
                        } else {
                            tracing::info!("{message}");
                        }
                        self.set_weak_alias(id, l, false);
                        continue;
                    }
                }
            }

            if self.target.auto_import {
                if name.starts_with("__imp_") {
                    continue;
                }
                let Some(l) = self.find(&format!("__imp_{name}")) else {
                    continue;
                };
                if self.symbols[l].pending_archive_load || !self.symbols[l].is_lazy() {
                    continue;
                }
                tracing::debug!(symbol = %self.symbols[l].name(), "loading lazy symbol for automatic import");
                self.force_lazy(l);
            }
        }
    }

    /// Redirect a reference to a variable at the import address table entry
    /// of `__imp_<name>`; a later pass turns each such reference into a
    /// runtime pseudo relocation.
    pub fn handle_mingw_automatic_import(&mut self, id: SymbolId, name: &str) -> bool {
        let Some(imp) = self.imp_symbol(name) else {
            return false;
        };
        let kind = self.symbols[imp].kind.clone();
        match &kind {
            SymbolKind::DefinedImportData { dll_name, .. } => {
                tracing::info!(symbol = name, dll = %dll_name, "automatically importing");
            }
            SymbolKind::DefinedRegular(d) => {
                tracing::info!(symbol = name, file = %self.files[d.file].name, "automatically importing");
            }
            _ => {
                let message = format!(
                    "unable to automatically import {name} from {}; unexpected symbol type",
                    self.symbols[imp].name()
                );
                self.diag.warn(message);
                return false;
            }
        }
        let sym = &mut self.symbols[id];
        sym.replace_kind(kind);
        sym.is_runtime_pseudo_reloc = true;
        true
    }

    /// Report undefined symbols before LTO runs, so that errors surface even
    /// when code generation would be expensive. Names that later passes can
    /// still satisfy are left alone.
    pub fn report_unresolvable(&mut self) {
        let mut undefs = FxHashSet::default();
        let ids: Vec<SymbolId> = self.symbols.keys().collect();
        for id in ids {
            let sym = &self.symbols[id];
            let Some(u) = sym.kind.as_undefined() else {
                continue;
            };
            if u.weak_alias.is_some() {
                continue;
            }
            let name = sym.name().to_string();
            if let Some(stripped) = name.strip_prefix("__imp_") {
                if let Some(def) = self.find(stripped).filter(|&d| self.symbols[d].is_defined()) {
                    self.symbols[def].is_used_in_regular_obj = true;
                    continue;
                }
            }
            if name.contains("_PchSym_") {
                continue;
            }
            if self.target.auto_import && self.imp_symbol(&name).is_some() {
                continue;
            }
            undefs.insert(id);
        }
        self.report_problem_symbols(&undefs, None, true);
    }

    /// Final sweep over symbols that are still undefined.
    ///
    /// In order of preference, an undefined symbol becomes: a copy of its weak
    /// alias target, a local import (`__imp_X` with `X` defined), an automatic
    /// import (MinGW), or, with forced unresolved symbols, absolute zero.
    /// Anything that ends up here unresolved is reported.
    pub fn resolve_remaining_undefines(&mut self) {
        let mut undefs = FxHashSet::default();
        let mut local_imports = FxHashMap::default();
        let mut aliases = Vec::new();

        let ids: Vec<SymbolId> = self.symbols.keys().collect();
        for id in ids {
            let sym = &self.symbols[id];
            let Some(u) = sym.kind.as_undefined() else {
                continue;
            };
            if !sym.is_used_in_regular_obj {
                continue;
            }
            if u.weak_alias.is_some() {
                aliases.push(id);
                continue;
            }
            self.resolve_undefined(id, &mut undefs, &mut local_imports);
        }

        // Alias targets may only have been settled by the loop above.
        for id in aliases {
            if self.symbols[id].is_undefined() && !self.resolve_weak_alias(id) {
                self.resolve_undefined(id, &mut undefs, &mut local_imports);
            }
        }

        let warn_local = self.config.warn_locally_defined_imported;
        self.report_problem_symbols(&undefs, warn_local.then_some(&local_imports), false);
    }

    fn resolve_undefined(
        &mut self,
        id: SymbolId,
        undefs: &mut FxHashSet<SymbolId>,
        local_imports: &mut FxHashMap<SymbolId, SymbolId>,
    ) {
        let name = self.symbols[id].name().to_string();

        // MSVC compatibility: `__imp_X` may bind to a local definition of `X`.
        if let Some(imp_name) = name.strip_prefix("__imp_") {
            if let Some(target) = self.find_local_import(imp_name) {
                if self.symbols[target].is_defined() {
                    self.symbols[id].replace_kind(SymbolKind::DefinedLocalImport { target });
                    local_imports.insert(id, target);
                    return;
                }
            }
        }

        // Precompiled header references are diagnosed elsewhere.
        if name.contains("_PchSym_") {
            return;
        }

        if self.target.auto_import && self.handle_mingw_automatic_import(id, &name) {
            return;
        }

        if self.config.force_unresolved {
            self.symbols[id].replace_kind(SymbolKind::DefinedAbsolute { va: 0 });
        }
        undefs.insert(id);
    }

    fn find_local_import(&mut self, imp_name: &str) -> Option<SymbolId> {
        let found = self.find_local_sym(imp_name);
        if found.is_some() || !self.target.is_ec() {
            return found;
        }
        let mangled = arm64ec::mangled_function_name(imp_name);
        if let Some(found) = mangled.and_then(|m| self.find_local_sym(&m)) {
            return Some(found);
        }
        let aux = imp_name.strip_prefix("aux_")?;
        self.find_local_sym(aux).or_else(|| {
            let mangled = arm64ec::mangled_function_name(aux)?;
            self.find_local_sym(&mangled)
        })
    }

    /// Find `name`, settling its weak alias first if it has one.
    fn find_local_sym(&mut self, name: &str) -> Option<SymbolId> {
        let id = self.find(name)?;
        if self.symbols[id].is_undefined() && !self.resolve_weak_alias(id) {
            return None;
        }
        Some(id)
    }

    /// Emit undefined symbol errors for `undefs` and, if given, warnings for
    /// `__imp_` references that were bound to local definitions.
    fn report_problem_symbols(
        &mut self,
        undefs: &FxHashSet<SymbolId>,
        local_imports: Option<&FxHashMap<SymbolId, SymbolId>>,
        need_bitcode: bool,
    ) {
        if undefs.is_empty() && local_imports.map_or(true, |l| l.is_empty()) {
            return;
        }
        let level = self.unresolved_level();

        for root in self.gc_roots.clone() {
            if undefs.contains(&root) {
                let message = format!("<root>: undefined symbol: {}", self.symbols[root].name());
                self.diag.report(level, message);
            }
            if let Some(&imp) = local_imports.and_then(|l| l.get(&root)) {
                let message = format!("<root>: {}", self.local_import_message(imp));
                self.diag.warn(message);
            }
        }

        let mut agg = UndefinedAggregator::new();
        let mut warnings = Vec::new();
        let mut scan = |table: &Self, want: fn(&InputFile) -> bool| {
            for (fid, file) in table.files.iter() {
                if file.lazy || !want(file) {
                    continue;
                }
                for (index, sym) in file.symbols.iter().enumerate() {
                    let Some(sym) = *sym else {
                        continue;
                    };
                    if undefs.contains(&sym) {
                        agg.record(sym, fid, index as u32);
                    }
                    if let Some(&imp) = local_imports.and_then(|l| l.get(&sym)) {
                        warnings.push(format!("{}: {}", file.name, table.local_import_message(imp)));
                    }
                }
            }
        };
        scan(self, InputFile::is_object);
        if need_bitcode {
            scan(self, InputFile::is_bitcode);
        }
        for message in warnings {
            self.diag.warn(message);
        }

        let reports = agg.flush(|file, index, max| self.symbol_locations(file, index, max));
        for (sym, body) in reports {
            let message = self.undefined_symbol_message(sym, &body);
            self.diag.report(level, message);
        }
    }

    fn local_import_message(&self, imp: SymbolId) -> String {
        let sym = &self.symbols[imp];
        let file = sym.file().map_or("<internal>", |f| self.files[f].name.as_str());
        format!(
            "locally defined symbol imported: {} (defined in {file}) [LNK4217]",
            sym.name()
        )
    }

    fn undefined_symbol_message(&self, sym: SymbolId, body: &str) -> String {
        let name = self.symbols[sym].name();
        let mut message = format!("undefined symbol: {name}{body}");
        if let Some(stripped) = name.strip_prefix("__imp_") {
            if let Some(imp) = self.find(stripped).filter(|&i| self.symbols[i].is_lazy()) {
                if let Some(file) = self.symbols[imp].file() {
                    message.push_str(&format!(
                        "\nNOTE: a relevant symbol '{stripped}' is available in {} but cannot be used because it is not an import library.",
                        self.files[file].name
                    ));
                }
            }
        }
        message
    }

    /// Up to `max` reference lines for symbol `index` of `file`, and the total
    /// number of references found.
    fn symbol_locations(&self, fid: FileId, index: u32, max: usize) -> (Vec<String>, usize) {
        let file = &self.files[fid];
        if file.is_bitcode() {
            let mut lines = vec![diag::bitcode_reference(file)];
            lines.truncate(max);
            return (lines, 1);
        }

        let mut lines = Vec::new();
        let mut found = 0;
        for reloc in file.relocs.iter().filter(|r| r.symbol_index == index) {
            found += 1;
            if lines.len() >= max {
                continue;
            }
            if let Some(containing) = self.containing_symbol(fid, reloc.section, reloc.offset) {
                lines.push(diag::object_reference(file, Some(containing)));
            }
        }
        if max == 0 {
            return (Vec::new(), found);
        }
        if found == 0 {
            return (vec![diag::object_reference(file, None)], 1);
        }
        (lines, found)
    }

    /// The global defined in `section` of `fid` closest below `offset`.
    fn containing_symbol(&self, fid: FileId, section: u32, offset: u64) -> Option<&str> {
        self.files[fid]
            .symbols
            .iter()
            .flatten()
            .filter_map(|&id| {
                let d = self.symbols[id].kind.as_regular()?;
                (d.file == fid && d.section == Some(section) && d.value <= offset)
                    .then_some((d.value, id))
            })
            .max_by_key(|&(value, _)| value)
            .map(|(_, id)| self.symbols[id].name())
    }
}

#[cfg(test)]
mod tests {
    use crate::arch::{Machine, Target};
    use crate::config::ResolveConfig;
    use crate::input::{FileKind, InputFile, RelocRef};
    use crate::symbol::{FileId, MemberHandle, SymbolKind};
    use crate::symtab::SymbolTable;

    fn table(machine: Machine, config: ResolveConfig) -> SymbolTable {
        SymbolTable::new(Target::new(machine, &config), config)
    }

    fn object(t: &mut SymbolTable, name: &str) -> FileId {
        t.add_input_file(InputFile::new(name, FileKind::Object))
    }

    fn reference(t: &mut SymbolTable, file: FileId, name: &str) {
        let id = t.add_undefined(name, Some(file), false);
        t.file_mut(file).symbols.push(Some(id));
    }

    #[test]
    fn unresolved_symbol_is_reported_with_references() {
        let mut t = table(Machine::Amd64, ResolveConfig::default());
        let obj = object(&mut t, "main.obj");
        let main = t.add_regular(obj, "main", Some(1), 0, false);
        t.file_mut(obj).symbols.push(Some(main));
        reference(&mut t, obj, "missing");
        t.file_mut(obj).relocs = (0..5)
            .map(|i| RelocRef {
                symbol_index: 1,
                section: 1,
                offset: i * 4,
            })
            .collect();

        t.resolve_remaining_undefines();
        let errors: Vec<_> = t.diagnostics().errors().map(|d| d.message.clone()).collect();
        assert_eq!(
            errors,
            vec![
                "undefined symbol: missing\n\
                 >>> referenced by main.obj:(main)\n\
                 >>> referenced by main.obj:(main)\n\
                 >>> referenced by main.obj:(main)\n\
                 >>> referenced 2 more times"
            ]
        );
    }

    #[test]
    fn root_symbols_get_pseudo_location() {
        let mut t = table(Machine::Amd64, ResolveConfig::default());
        t.add_gc_root("entry", false);
        t.resolve_remaining_undefines();
        let errors: Vec<_> = t.diagnostics().errors().map(|d| d.message.clone()).collect();
        assert_eq!(errors, vec!["<root>: undefined symbol: entry"]);
    }

    #[test]
    fn forced_unresolved_becomes_absolute_zero() {
        let config = ResolveConfig {
            force_unresolved: true,
            ..ResolveConfig::default()
        };
        let mut t = table(Machine::Amd64, config);
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "missing");
        t.resolve_remaining_undefines();
        let id = t.find("missing").unwrap();
        assert_eq!(t.symbol(id).kind, SymbolKind::DefinedAbsolute { va: 0 });
        assert!(!t.diagnostics().has_errors());
        assert_eq!(t.diagnostics().warnings().count(), 1);
    }

    #[test]
    fn imp_reference_binds_to_local_definition() {
        let config = ResolveConfig {
            warn_locally_defined_imported: true,
            ..ResolveConfig::default()
        };
        let mut t = table(Machine::Amd64, config);
        let obj = object(&mut t, "a.obj");
        let foo = t.add_regular(obj, "foo", Some(1), 0, false);
        reference(&mut t, obj, "__imp_foo");
        t.resolve_remaining_undefines();
        let imp = t.find("__imp_foo").unwrap();
        assert_eq!(t.symbol(imp).kind, SymbolKind::DefinedLocalImport { target: foo });
        let warnings: Vec<_> = t.diagnostics().warnings().map(|d| d.message.clone()).collect();
        assert_eq!(
            warnings,
            vec!["a.obj: locally defined symbol imported: foo (defined in a.obj) [LNK4217]"]
        );
    }

    #[test]
    fn pch_symbols_are_never_reported() {
        let mut t = table(Machine::Amd64, ResolveConfig::default());
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "__@@_PchSym_@00@foo");
        t.resolve_remaining_undefines();
        assert!(!t.diagnostics().has_errors());
    }

    #[test]
    fn lazy_plain_symbol_adds_import_hint() {
        let mut t = table(Machine::Amd64, ResolveConfig::default());
        let lib = t.add_input_file(InputFile::new("static.lib", FileKind::Archive));
        t.add_lazy_archive(lib, "foo", MemberHandle(8));
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "__imp_foo");
        t.resolve_remaining_undefines();
        let error = t.diagnostics().errors().next().unwrap().message.clone();
        assert!(error.ends_with(
            "NOTE: a relevant symbol 'foo' is available in static.lib but cannot be used because it is not an import library."
        ));
    }

    #[test]
    fn alternate_names_chain_over_calls() {
        let mut t = table(Machine::Amd64, ResolveConfig::default());
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "a");
        reference(&mut t, obj, "b");
        let c = t.add_regular(obj, "c", Some(1), 0x40, false);
        t.parse_alternate_name("a=b").unwrap();
        t.parse_alternate_name("b=c").unwrap();
        assert!(t.resolve_alternate_names());
        assert!(t.resolve_alternate_names());
        assert!(!t.resolve_alternate_names());
        t.resolve_remaining_undefines();
        for name in ["a", "b"] {
            let id = t.find(name).unwrap();
            assert_eq!(t.symbol(id).kind, t.symbol(c).kind);
        }
        assert!(!t.diagnostics().has_errors());
    }

    #[test]
    fn stdcall_fixup_aliases_decorated_reference() {
        let config = ResolveConfig {
            mingw: true,
            stdcall_fixup: true,
            ..ResolveConfig::default()
        };
        let mut t = table(Machine::I386, config);
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "_foo@4");
        let foo = t.add_regular(obj, "_foo", Some(1), 0, false);
        t.load_mingw_symbols();
        let id = t.find("_foo@4").unwrap();
        assert_eq!(t.defined_weak_alias(id), Some(foo));
    }

    #[test]
    fn auto_import_redirects_to_import_pointer() {
        let config = ResolveConfig {
            mingw: true,
            auto_import: true,
            ..ResolveConfig::default()
        };
        let mut t = table(Machine::Amd64, config);
        let imp_file = t.add_input_file(InputFile::new("libfoo.dll.a(d000.o)", FileKind::Import));
        t.add_import_data("__imp_var", imp_file, "foo.dll");
        let obj = object(&mut t, "a.obj");
        reference(&mut t, obj, "var");
        t.resolve_remaining_undefines();
        let var = t.find("var").unwrap();
        assert!(t.symbol(var).is_runtime_pseudo_reloc);
        assert!(matches!(t.symbol(var).kind, SymbolKind::DefinedImportData { .. }));
        assert!(!t.diagnostics().has_errors());
    }
}
