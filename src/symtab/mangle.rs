//! Name lookups that have to see through decoration: finding the symbol an
//! undecorated name was most likely meant to refer to, and inferring the
//! entry point and subsystem from the user's `main` flavor.

use super::SymbolTable;
use crate::config::Subsystem;
use crate::error::ResolveError;
use crate::symbol::SymbolId;

fn drop_first(s: &str) -> &str {
    let mut chars = s.chars();
    chars.next();
    chars.as_str()
}

impl SymbolTable {
    /// C names are mangled by prepending `_` on i386.
    pub fn mangle(&self, name: &str) -> String {
        self.target.mangle(name).into_owned()
    }

    /// Symbols starting with `prefix`, also allowing either side to have one
    /// extra leading character.
    pub fn get_syms_with_prefix(&self, prefix: &str) -> Vec<SymbolId> {
        let short = drop_first(prefix);
        self.symbols
            .iter()
            .filter(|(_, s)| {
                let name = s.name();
                let tail = drop_first(name);
                name.starts_with(prefix)
                    || name.starts_with(short)
                    || tail.starts_with(prefix)
                    || tail.starts_with(short)
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Find the symbol a plain C name most likely refers to.
    ///
    /// An exact match wins, as does a weak alias that reaches a definition.
    /// Otherwise decorated spellings are searched: C++ functions everywhere,
    /// and stdcall, fastcall and vectorcall names on i386. There is no way
    /// to do this through the hash map, so candidates are collected with one
    /// linear scan.
    pub fn find_mangle(&self, name: &str) -> Option<SymbolId> {
        if let Some(id) = self.find(name) {
            if !self.symbols[id].is_undefined() {
                return Some(id);
            }
            if let Some(alias) = self.defined_weak_alias(id) {
                return Some(alias);
            }
        }

        let syms = self.get_syms_with_prefix(name);
        let find_by_prefix = |prefix: String| {
            syms.iter()
                .copied()
                .find(|&id| self.symbols[id].name().starts_with(&prefix))
        };

        if !self.target.is_i386() {
            return find_by_prefix(format!("?{name}@@Y"));
        }
        let bare = name.strip_prefix('_')?;
        find_by_prefix(format!("{name}@"))
            .or_else(|| find_by_prefix(format!("@{bare}@")))
            .or_else(|| find_by_prefix(format!("{bare}@@")))
            .or_else(|| find_by_prefix(format!("?{bare}@@Y")))
    }

    /// Whether the C name `sym` resolves to something defined or lazy.
    pub fn find_underscore_mangle(&self, sym: &str) -> bool {
        self.find_mangle(&self.mangle(sym))
            .is_some_and(|id| !self.symbols[id].is_undefined())
    }

    /// If `id` is still undefined but a decorated spelling of it exists, make
    /// `id` a weak alias for it and return the decorated name.
    pub fn mangle_maybe(&mut self, id: SymbolId) -> Option<String> {
        if !self.symbols[id].is_undefined() {
            return None;
        }
        let mangled = self.find_mangle(self.symbols[id].name())?;
        let name = self.symbols[mangled].name().to_string();
        tracing::info!(symbol = %self.symbols[id].name(), alias = %name, "aliased to decorated name");
        let target = self.add_undefined(&name, None, false);
        self.set_weak_alias(id, target, false);
        Some(name)
    }

    /// The CRT entry point matching the user's `main` flavor.
    pub fn find_default_entry(&mut self, subsystem: Subsystem) -> String {
        if self.config.mingw {
            return self.mangle(match subsystem {
                Subsystem::Windows => "WinMainCRTStartup",
                Subsystem::Console => "mainCRTStartup",
            });
        }
        let (wide, narrow, wide_entry, entry) = match subsystem {
            Subsystem::Windows => ("wWinMain", "WinMain", "wWinMainCRTStartup", "WinMainCRTStartup"),
            Subsystem::Console => ("wmain", "main", "wmainCRTStartup", "mainCRTStartup"),
        };
        if self.find_underscore_mangle(wide) {
            if !self.find_underscore_mangle(narrow) {
                return self.mangle(wide_entry);
            }
            self.diag.warn(format!("found both {wide} and {narrow}; using latter"));
        }
        self.mangle(entry)
    }

    /// Guess the subsystem from which `main` flavors are defined.
    pub fn infer_subsystem(&mut self) -> Option<Subsystem> {
        if self.config.dll {
            return Some(Subsystem::Windows);
        }
        if self.config.mingw {
            return Some(Subsystem::Console);
        }
        let have_main = self.find_underscore_mangle("main");
        let have_wmain = self.find_underscore_mangle("wmain");
        let have_winmain = self.find_underscore_mangle("WinMain");
        let have_wwinmain = self.find_underscore_mangle("wWinMain");
        if have_main || have_wmain {
            if have_winmain || have_wwinmain {
                self.diag.warn(format!(
                    "found {} and {}; defaulting to /subsystem:console",
                    if have_main { "main" } else { "wmain" },
                    if have_winmain { "WinMain" } else { "wWinMain" },
                ));
            }
            return Some(Subsystem::Console);
        }
        if have_winmain || have_wwinmain {
            return Some(Subsystem::Windows);
        }
        None
    }

    /// Add every known symbol matching `pattern` to the root set.
    pub fn add_undefined_glob(&mut self, pattern: &str) {
        let glob = match glob::Pattern::new(pattern) {
            Ok(glob) => glob,
            Err(err) => {
                self.diag.error(ResolveError::from(err).to_string());
                return;
            }
        };
        let names: Vec<String> = self
            .symbols
            .values()
            .filter(|s| glob.matches(s.name()))
            .map(|s| s.name().to_string())
            .collect();
        for name in names {
            self.add_gc_root(&name, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arch::{Machine, Target};
    use crate::config::{ResolveConfig, Subsystem};
    use crate::input::{FileKind, InputFile};
    use crate::symtab::SymbolTable;

    fn table(machine: Machine) -> SymbolTable {
        SymbolTable::new(Target::plain(machine), ResolveConfig::default())
    }

    fn define(t: &mut SymbolTable, name: &str) {
        let obj = t.add_input_file(InputFile::new("a.obj", FileKind::Object));
        t.add_regular(obj, name, Some(1), 0, false);
    }

    #[test]
    fn finds_cpp_function_by_plain_name() {
        let mut t = table(Machine::Amd64);
        define(&mut t, "?main@@YAHXZ");
        let found = t.find_mangle("main").unwrap();
        assert_eq!(t.symbol(found).name(), "?main@@YAHXZ");
        assert!(t.find_mangle("other").is_none());
    }

    #[test]
    fn finds_i386_decorations() {
        let mut t = table(Machine::I386);
        define(&mut t, "_std@8");
        define(&mut t, "@fast@4");
        define(&mut t, "vec@@16");
        for (plain, decorated) in [("_std", "_std@8"), ("_fast", "@fast@4"), ("_vec", "vec@@16")] {
            let found = t.find_mangle(plain).unwrap();
            assert_eq!(t.symbol(found).name(), decorated);
        }
        assert!(t.find_mangle("nounderscore").is_none());
    }

    #[test]
    fn mangle_maybe_aliases_undefined_name() {
        let mut t = table(Machine::I386);
        define(&mut t, "_entry@4");
        let plain = t.add_undefined("_entry", None, false);
        assert_eq!(t.mangle_maybe(plain).as_deref(), Some("_entry@4"));
        assert!(t.resolve_weak_alias(plain));
        let defined = t.add_absolute("_done", 0);
        assert_eq!(t.mangle_maybe(defined), None);
    }

    #[test]
    fn subsystem_and_entry_follow_main_flavor() {
        let mut t = table(Machine::Amd64);
        assert_eq!(t.infer_subsystem(), None);
        define(&mut t, "wWinMain");
        assert_eq!(t.infer_subsystem(), Some(Subsystem::Windows));
        assert_eq!(t.find_default_entry(Subsystem::Windows), "wWinMainCRTStartup");
        define(&mut t, "main");
        assert_eq!(t.infer_subsystem(), Some(Subsystem::Console));
        assert_eq!(t.diagnostics().warnings().count(), 1);
        assert_eq!(t.find_default_entry(Subsystem::Console), "mainCRTStartup");
    }

    #[test]
    fn default_entry_is_decorated_on_i386() {
        let mut t = table(Machine::I386);
        define(&mut t, "_wmain");
        assert_eq!(t.find_default_entry(Subsystem::Console), "_wmainCRTStartup");
    }

    #[test]
    fn include_glob_roots_matching_symbols() {
        let mut t = table(Machine::Amd64);
        define(&mut t, "init_a");
        define(&mut t, "init_b");
        define(&mut t, "other");
        t.add_undefined_glob("init_*");
        let roots: Vec<_> = t.gc_roots().iter().map(|&id| t.symbol(id).name().to_string()).collect();
        assert_eq!(roots, vec!["init_a", "init_b"]);
        t.add_undefined_glob("oth?r");
        assert_eq!(t.gc_roots().len(), 3);
        t.add_undefined_glob("[");
        assert_eq!(t.diagnostics().error_count(), 1);
        let message = &t.diagnostics().errors().next().unwrap().message;
        assert!(message.starts_with("/includeglob: "), "{message}");
    }
}
