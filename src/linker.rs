//! Link session.
//!
//! This module contains the `Linker` struct which drives symbol resolution
//! for one link:
//! 1. Setup: parses the resolution options and defines linker-provided symbols.
//! 2. Input Loading: registers each parsed file with the symbol table, in
//!    command-line order, and materializes lazily forced files right away.
//! 3. Finalization: roots, weak aliases, MinGW fallbacks, the final undefined
//!    sweep and export finalization.
//!
//! The outcome is a [`Resolution`], a read-only view that later stages can
//! share across threads.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::arch::{arm64ec, x86, Machine, Target};
use crate::config::{ResolveConfig, Subsystem};
use crate::diag::Diagnostics;
use crate::export::{self, Export, ExportSource};
use crate::input::{
    FileKind, ImportFile, ImportType, InputFile, Loader, ObjectFile, ParsedFile, SymbolDef,
};
use crate::lto::{self, GlobalResolutions};
use crate::moddef::{self, ModuleDefinition};
use crate::symbol::{ChunkId, DllSymbolHandle, FileId, MemberHandle, Symbol, SymbolId, SymbolKind};
use crate::symtab::{LoadRequest, SymbolTable};

/// Absolute symbols every image gets, resolved to zero unless an object file
/// provides them.
const GUARD_SYMBOLS: &[&str] = &[
    "__guard_fids_count",
    "__guard_fids_table",
    "__guard_flags",
    "__guard_iat_count",
    "__guard_iat_table",
    "__guard_longjmp_count",
    "__guard_longjmp_table",
    "__guard_eh_cont_count",
    "__guard_eh_cont_table",
];

fn default_image_base(machine: Machine, dll: bool) -> u64 {
    match (machine.wordsize(), dll) {
        (8, true) => 0x1_8000_0000,
        (8, false) => 0x1_4000_0000,
        (_, true) => 0x1000_0000,
        (_, false) => 0x40_0000,
    }
}

pub struct Linker<L: Loader> {
    symtab: SymbolTable,
    loader: L,
    exports: Vec<Export>,
    include_globs: Vec<String>,
    moddef: Option<ModuleDefinition>,
    image_base: u64,
    /// Lazy object files waiting for one of their symbols to be needed.
    lazy_objects: FxHashMap<FileId, ObjectFile>,
    loaded_members: FxHashSet<(FileId, MemberHandle)>,
    loaded_imports: FxHashSet<(FileId, DllSymbolHandle)>,
    entry: Option<SymbolId>,
    subsystem: Option<Subsystem>,
}

impl<L: Loader> Linker<L> {
    pub fn new(config: ResolveConfig, machine: Machine, loader: L) -> Result<Self> {
        let target = Target::new(machine, &config);
        let mut symtab = SymbolTable::new(target, config.clone());

        for arg in &config.alternate_names {
            symtab.parse_alternate_name(arg)?;
        }
        for arg in &config.align_comm {
            symtab.parse_aligncomm(arg);
        }

        let mut exports = Vec::new();
        for arg in &config.exports {
            let mut e = export::parse_export_arg(arg, ExportSource::Export)?;
            if target.is_i386() {
                decorate_export(&mut e, &target);
            }
            exports.push(e);
        }

        let moddef = match &config.def_file {
            Some(path) => {
                let def = moddef::parse_file(path, &target)?;
                exports.extend(def.to_exports());
                Some(def)
            }
            None => None,
        };
        let image_base = moddef
            .as_ref()
            .map(|d| d.image_base)
            .filter(|&base| base != 0)
            .unwrap_or_else(|| default_image_base(machine, config.dll));

        symtab.add_input_file(InputFile::new("<internal>", FileKind::Internal));
        let mut linker_defined = vec![symtab.add_absolute(&target.mangle("__ImageBase"), image_base)];
        for name in GUARD_SYMBOLS {
            linker_defined.push(symtab.add_absolute(&target.mangle(name), 0));
        }
        if target.is_i386() {
            linker_defined.push(symtab.add_absolute("___safe_se_handler_table", 0));
            linker_defined.push(symtab.add_absolute("___safe_se_handler_count", 0));
        }
        if config.mingw {
            for (name, chunk) in [
                ("__RUNTIME_PSEUDO_RELOC_LIST__", "runtime pseudo relocations"),
                ("__RUNTIME_PSEUDO_RELOC_LIST_END__", "runtime pseudo relocations"),
                ("__CTOR_LIST__", "constructors"),
                ("__DTOR_LIST__", "destructors"),
            ] {
                linker_defined.push(symtab.add_synthetic(&target.mangle(name), chunk));
            }
        }
        // Their final values are only known at layout time.
        for id in linker_defined {
            symtab.symbol_mut(id).can_inline = false;
        }

        tracing::info!(machine = ?machine, mingw = config.mingw, image_base = format_args!("{image_base:#x}"), "starting link");

        Ok(Self {
            symtab,
            loader,
            exports,
            include_globs: config.include_globs.clone(),
            moddef,
            image_base,
            lazy_objects: FxHashMap::default(),
            loaded_members: FxHashSet::default(),
            loaded_imports: FxHashSet::default(),
            entry: None,
            subsystem: config.subsystem,
        })
    }

    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    pub fn symtab_mut(&mut self) -> &mut SymbolTable {
        &mut self.symtab
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.symtab.diagnostics()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Add the next command-line input. Any file its symbols force is loaded
    /// before this returns.
    pub fn add_file(&mut self, file: ParsedFile) -> Result<FileId> {
        let id = self.add_parsed(file)?;
        self.drain()?;
        Ok(id)
    }

    fn add_parsed(&mut self, file: ParsedFile) -> Result<FileId> {
        match file {
            ParsedFile::Object(obj) => self.add_object(obj),
            ParsedFile::Archive { name, symbols } => {
                let id = self.symtab.add_input_file(InputFile::new(name, FileKind::Archive));
                for sym in &symbols {
                    self.symtab.add_lazy_archive(id, &sym.name, sym.member);
                }
                Ok(id)
            }
            ParsedFile::Import(imp) => Ok(self.add_import(&imp)),
            ParsedFile::Dll { name, exports } => Ok(self.add_dll(name, exports)),
        }
    }

    fn check_machine(&self, obj: &ObjectFile) -> Result<()> {
        let target = self.symtab.target().machine;
        let Some(machine) = obj.machine else {
            return Ok(());
        };
        let compatible = machine == target
            || matches!(
                (machine, target),
                (Machine::Arm64, Machine::Arm64ec) | (Machine::Amd64, Machine::Arm64ec)
            );
        if !compatible {
            bail!("{}: machine type {machine:?} conflicts with {target:?}", obj.name);
        }
        Ok(())
    }

    fn add_object(&mut self, obj: ObjectFile) -> Result<FileId> {
        self.check_machine(&obj)?;
        let kind = match &obj.bitcode {
            Some(info) => FileKind::Bitcode {
                info: info.clone(),
                symbols: obj.symbols.clone(),
            },
            None => FileKind::Object,
        };
        let mut input = InputFile::new(obj.name.clone(), kind);
        input.lazy = obj.lazy;
        input.relocs = obj.relocs.clone();
        let id = self.symtab.add_input_file(input);

        if obj.lazy {
            tracing::debug!(file = %obj.name, "registering lazy object");
            for sym in obj.symbols.iter().filter(|s| s.def.is_definition()) {
                if !self.symtab.file(id).lazy {
                    break;
                }
                self.symtab.add_lazy_object(id, &sym.name);
            }
            self.lazy_objects.insert(id, obj);
            return Ok(id);
        }
        self.add_object_symbols(id, &obj)?;
        Ok(id)
    }

    fn add_object_symbols(&mut self, id: FileId, obj: &ObjectFile) -> Result<()> {
        tracing::debug!(file = %obj.name, symbols = obj.symbols.len(), "adding object");
        let slots = obj.symbols.iter().map(|s| s.index as usize + 1).max().unwrap_or(0);
        let mut symbols = vec![None; slots];
        let mut weak_aliases = Vec::new();
        let is_bitcode = obj.bitcode.is_some();
        let is_ec = self.symtab.target().is_ec();

        for sym in &obj.symbols {
            let name = sym.name.as_str();
            let sid = match &sym.def {
                SymbolDef::Undefined => self.symtab.add_undefined(name, Some(id), false),
                SymbolDef::WeakExternal { alias, anti_dep } => {
                    // An EC call emits anti-dependency pairs that archives
                    // must still be able to satisfy.
                    let override_lazy = !(is_ec && *anti_dep)
                        || (obj.symbols.iter().any(|s| s.name == *alias && s.def.is_definition())
                            && arm64ec::mangled_function_name(name).as_deref() == Some(alias.as_str()));
                    let sid = self.symtab.add_undefined(name, Some(id), override_lazy);
                    weak_aliases.push((sid, alias.as_str(), *anti_dep));
                    sid
                }
                SymbolDef::Regular { section, value, weak } => {
                    let section = (!is_bitcode).then_some(*section);
                    self.symtab.add_regular(id, name, section, *value, *weak)
                }
                SymbolDef::Comdat { section, value } => {
                    let (sid, prevailed) = self.symtab.add_comdat(id, name, *section, *value);
                    if !prevailed {
                        tracing::trace!(symbol = name, file = %obj.name, "discarding COMDAT copy");
                    }
                    sid
                }
                SymbolDef::Common { size, alignment } => {
                    self.symtab.add_common(id, name, *size, *alignment)
                }
                SymbolDef::Absolute { value } => self.symtab.add_absolute(name, *value),
            };
            if is_bitcode && sym.lto.used {
                self.symtab.add_gc_root(name, false);
            }
            if let Some(slot) = symbols.get_mut(sym.index as usize) {
                *slot = Some(sid);
            }
        }

        for (sid, alias, anti_dep) in weak_aliases {
            if !self.symtab.symbol(sid).is_undefined() {
                continue;
            }
            let target = self.symtab.add_undefined(alias, Some(id), false);
            self.symtab.check_and_set_weak_alias(sid, target, anti_dep, id);
        }

        self.symtab.file_mut(id).symbols = symbols;
        self.apply_directives(id, &obj.directives)
    }

    /// Apply the linker options embedded in an object file.
    fn apply_directives(&mut self, file: FileId, directives: &[String]) -> Result<()> {
        let target = *self.symtab.target();
        for option in directives {
            let Some(body) = option.strip_prefix('/').or_else(|| option.strip_prefix('-')) else {
                tracing::debug!(file = %self.symtab.file(file).name, option = %option, "ignoring directive");
                continue;
            };
            let (name, arg) = body.split_once(':').unwrap_or((body, ""));
            match name.to_ascii_lowercase().as_str() {
                "export" => {
                    let mut e = export::parse_export_arg(arg, ExportSource::Directives)
                        .with_context(|| format!("{}: bad directive", self.symtab.file(file).name))?;
                    if target.is_i386() && target.mingw {
                        decorate_export(&mut e, &target);
                    }
                    self.exports.push(e);
                }
                "alternatename" => self.symtab.parse_alternate_name(arg)?,
                "include" => {
                    self.symtab.add_gc_root(arg, false);
                }
                "includeglob" => self.include_globs.push(arg.to_string()),
                "aligncomm" => self.symtab.parse_aligncomm(arg),
                _ => {
                    tracing::debug!(file = %self.symtab.file(file).name, option = %option, "ignoring directive");
                }
            }
        }
        Ok(())
    }

    fn add_import(&mut self, imp: &ImportFile) -> FileId {
        let id = self.symtab.add_input_file(InputFile::new(imp.name.clone(), FileKind::Import));
        let imp_name = format!("__imp_{}", imp.symbol);
        let Some(imp_sym) = self.symtab.add_import_data(&imp_name, id, &imp.dll) else {
            return id;
        };
        match imp.import_type {
            ImportType::Const => {
                self.symtab.add_import_data(&imp.symbol, id, &imp.dll);
            }
            ImportType::Code => {
                self.symtab.add_import_thunk(&imp.symbol, imp_sym, id);
            }
            ImportType::Data => {}
        }
        id
    }

    fn add_dll(&mut self, name: String, exports: Vec<String>) -> FileId {
        let dll = Path::new(&name)
            .file_name()
            .map_or_else(|| name.clone(), |f| f.to_string_lossy().into_owned());
        let target = *self.symtab.target();
        let id = self.symtab.add_input_file(InputFile::new(
            name,
            FileKind::Dll {
                dll,
                exports: exports.clone(),
            },
        ));
        for (i, export) in exports.iter().enumerate() {
            let handle = DllSymbolHandle(i as u32);
            let sym = target.mangle(export);
            self.symtab.add_lazy_dll(id, &format!("__imp_{sym}"), handle);
            self.symtab.add_lazy_dll(id, &sym, handle);
        }
        id
    }

    /// Materialize everything resolution asked for. Returns true if any file
    /// was loaded.
    fn drain(&mut self) -> Result<bool> {
        let mut loaded = false;
        while let Some(request) = self.symtab.take_pending() {
            match request {
                LoadRequest::ArchiveMember { archive, member } => {
                    if !self.loaded_members.insert((archive, member)) {
                        continue;
                    }
                    let archive_name = self.symtab.file(archive).name.clone();
                    let parsed = self
                        .loader
                        .load_member(&archive_name, member)
                        .with_context(|| format!("could not load member of {archive_name}"))?;
                    tracing::debug!(archive = %archive_name, member = %parsed.name(), "loaded archive member");
                    self.add_parsed(parsed)?;
                }
                LoadRequest::Object(file) => {
                    let Some(obj) = self.lazy_objects.remove(&file) else {
                        continue;
                    };
                    tracing::debug!(file = %obj.name, "loading lazy object");
                    self.add_object_symbols(file, &obj)?;
                }
                LoadRequest::DllImport { file, import } => {
                    if !self.loaded_imports.insert((file, import)) {
                        continue;
                    }
                    let imp = self.dll_import(file, import)?;
                    self.add_import(&imp);
                }
            }
            loaded = true;
        }
        Ok(loaded)
    }

    fn dll_import(&self, file: FileId, import: DllSymbolHandle) -> Result<ImportFile> {
        let input = self.symtab.file(file);
        let FileKind::Dll { dll, exports } = &input.kind else {
            return Err(anyhow!("{}: not a DLL", input.name));
        };
        let export = exports
            .get(import.0 as usize)
            .ok_or_else(|| anyhow!("{}: no export #{}", input.name, import.0))?;
        Ok(ImportFile {
            name: input.name.clone(),
            symbol: self.symtab.target().mangle(export).into_owned(),
            dll: dll.clone(),
            import_type: ImportType::Code,
        })
    }

    fn default_dll_entry(&self) -> String {
        let target = self.symtab.target();
        if target.mingw {
            target.mangle("DllMainCRTStartup").into_owned()
        } else if target.is_i386() {
            "__DllMainCRTStartup@12".to_string()
        } else {
            "_DllMainCRTStartup".to_string()
        }
    }

    /// Run the finalization passes. Per-symbol problems end up in
    /// [`diagnostics`](Self::diagnostics); the link fails if any of them is
    /// an error.
    pub fn finish(&mut self) -> Result<()> {
        let config = self.symtab.config().clone();

        if self.subsystem.is_none() {
            self.subsystem = self.symtab.infer_subsystem();
        }

        let entry = match (&config.entry, config.dll, self.subsystem) {
            (Some(entry), _, _) => Some(self.symtab.mangle(entry)),
            (None, true, _) => Some(self.default_dll_entry()),
            (None, false, Some(subsystem)) => Some(self.symtab.find_default_entry(subsystem)),
            (None, false, None) => None,
        };
        if let Some(entry) = entry {
            tracing::info!(entry = %entry, "entry point");
            self.entry = Some(self.symtab.add_gc_root(&entry, true));
        }

        for name in &config.includes {
            let name = self.symtab.mangle(name);
            self.symtab.add_gc_root(&name, false);
        }
        for pattern in std::mem::take(&mut self.include_globs) {
            self.symtab.add_undefined_glob(&pattern);
        }
        self.drain()?;

        loop {
            if let Some(entry) = self.entry {
                self.symtab.mangle_maybe(entry);
            }
            for i in 0..self.exports.len() {
                if !self.exports[i].forward_to.is_empty() {
                    continue;
                }
                let sym = self.symtab.add_gc_root(&self.exports[i].name, !self.exports[i].data);
                self.exports[i].sym = Some(sym);
                if self.exports[i].source != ExportSource::Directives {
                    if let Some(mangled) = self.symtab.mangle_maybe(sym) {
                        self.exports[i].symbol_name = mangled;
                    }
                }
            }
            // An alias may only become usable once its target got one.
            while self.symtab.resolve_alternate_names() {}
            if self.symtab.find_underscore("_load_config_used").is_some() {
                let name = self.symtab.mangle("_load_config_used");
                self.symtab.add_gc_root(&name, false);
            }
            if config.mingw {
                self.symtab.load_mingw_symbols();
            }
            if !self.drain()? {
                break;
            }
        }

        let has_bitcode = self.symtab.files().any(|(_, f)| f.is_bitcode() && !f.lazy);
        if has_bitcode && !config.force_unresolved {
            self.symtab.report_unresolvable();
            self.symtab.diagnostics().check()?;
        }

        self.symtab.resolve_remaining_undefines();
        self.symtab.diagnostics().check()?;

        for e in &mut self.exports {
            if e.symbol_name.is_empty() {
                e.symbol_name = e.name.clone();
            }
        }
        let target = *self.symtab.target();
        let exports = std::mem::take(&mut self.exports);
        let mut exports = export::fixup_exports(exports, &target, self.symtab.diagnostics_mut())?;
        export::assign_export_ordinals(&mut exports)?;
        self.exports = exports;

        tracing::info!(
            symbols = self.symtab.len(),
            exports = self.exports.len(),
            warnings = self.symtab.diagnostics().warnings().count(),
            "resolution complete"
        );
        Ok(())
    }

    /// Per-name LTO resolutions for every loaded bitcode module.
    pub fn global_resolutions(&self) -> Result<GlobalResolutions> {
        Ok(lto::global_resolutions(&self.symtab)?)
    }

    /// Freeze the session.
    pub fn into_resolution(self) -> Resolution {
        Resolution {
            symtab: self.symtab,
            exports: self.exports,
            entry: self.entry,
            subsystem: self.subsystem,
            moddef: self.moddef,
            image_base: self.image_base,
        }
    }
}

/// Decorate an export's internal and external names with the i386 cdecl
/// underscore unless they already carry a decoration.
fn decorate_export(e: &mut Export, target: &Target) {
    if !x86::is_decorated(&e.name, target.mingw) {
        e.name = format!("_{}", e.name);
    }
    if !e.ext_name.is_empty() && !x86::is_decorated(&e.ext_name, target.mingw) {
        e.ext_name = format!("_{}", e.ext_name);
    }
}

/// The frozen outcome of a link: every symbol's final kind, the export
/// table and the root set. Nothing can be mutated any more, so it may be
/// shared freely between code generation threads.
pub struct Resolution {
    symtab: SymbolTable,
    exports: Vec<Export>,
    entry: Option<SymbolId>,
    subsystem: Option<Subsystem>,
    moddef: Option<ModuleDefinition>,
    image_base: u64,
}

impl Resolution {
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.symtab.find(name)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        self.symtab.symbol(id)
    }

    /// Final kind of `name`, if the link ever saw it.
    pub fn kind(&self, name: &str) -> Option<&SymbolKind> {
        self.find(name).map(|id| &self.symtab.symbol(id).kind)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symtab.symbols()
    }

    pub fn file(&self, id: FileId) -> &InputFile {
        self.symtab.file(id)
    }

    /// Name of the file that defines `name`.
    pub fn defining_file(&self, name: &str) -> Option<&str> {
        let id = self.find(name)?;
        let file = self.symtab.symbol(id).file()?;
        Some(self.symtab.file(file).name.as_str())
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn gc_roots(&self) -> &[SymbolId] {
        self.symtab.gc_roots()
    }

    pub fn entry(&self) -> Option<SymbolId> {
        self.entry
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        self.subsystem
    }

    /// Symbols whose references must be patched at load time.
    pub fn runtime_pseudo_relocs(&self) -> Vec<SymbolId> {
        self.symtab
            .symbols()
            .filter(|(_, s)| s.is_runtime_pseudo_reloc)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn module_definition(&self) -> Option<&ModuleDefinition> {
        self.moddef.as_ref()
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.symtab.diagnostics()
    }

    /// Name of the linker-created chunk a synthetic symbol points at.
    pub fn chunk_name(&self, chunk: ChunkId) -> &str {
        self.symtab.chunk_name(chunk)
    }

    pub fn global_resolutions(&self) -> Result<GlobalResolutions> {
        Ok(lto::global_resolutions(&self.symtab)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryLoader;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn resolution_is_shareable() {
        assert_send_sync::<Resolution>();
    }

    #[test]
    fn image_base_defaults() {
        assert_eq!(default_image_base(Machine::Amd64, false), 0x1_4000_0000);
        assert_eq!(default_image_base(Machine::Arm64, true), 0x1_8000_0000);
        assert_eq!(default_image_base(Machine::I386, false), 0x40_0000);
        assert_eq!(default_image_base(Machine::I386, true), 0x1000_0000);
    }

    #[test]
    fn linker_defines_image_base() {
        let linker = Linker::new(ResolveConfig::default(), Machine::I386, MemoryLoader::new()).unwrap();
        let res = linker.into_resolution();
        assert_eq!(
            res.kind("___ImageBase"),
            Some(&SymbolKind::DefinedAbsolute { va: 0x40_0000 })
        );
        assert!(res.kind("___safe_se_handler_table").is_some());
    }

    #[test]
    fn mingw_defines_pseudo_reloc_list() {
        let config = ResolveConfig {
            mingw: true,
            ..ResolveConfig::default()
        };
        let linker = Linker::new(config, Machine::Amd64, MemoryLoader::new()).unwrap();
        let res = linker.into_resolution();
        assert!(matches!(
            res.kind("__RUNTIME_PSEUDO_RELOC_LIST__"),
            Some(SymbolKind::DefinedSynthetic { .. })
        ));
        assert!(matches!(
            res.kind("__RUNTIME_PSEUDO_RELOC_LIST_END__"),
            Some(SymbolKind::DefinedSynthetic { .. })
        ));
        let Some(SymbolKind::DefinedSynthetic { chunk }) = res.kind("__CTOR_LIST__") else {
            panic!("__CTOR_LIST__ is not synthetic");
        };
        assert_eq!(res.chunk_name(*chunk), "constructors");
    }

    #[test]
    fn linker_defined_symbols_are_not_inlinable() {
        let mut linker = Linker::new(ResolveConfig::default(), Machine::Amd64, MemoryLoader::new()).unwrap();
        linker
            .add_file(ParsedFile::Object(ObjectFile::new("a.obj").define("user", 1, 0)))
            .unwrap();
        let symtab = linker.symtab();
        for name in ["__ImageBase", "__guard_flags"] {
            let id = symtab.find(name).unwrap();
            assert!(!symtab.symbol(id).can_inline, "{name}");
        }
        let user = symtab.find("user").unwrap();
        assert!(symtab.symbol(user).can_inline);
    }

    #[test]
    fn command_line_exports_are_decorated_on_i386() {
        let config = ResolveConfig {
            exports: vec!["foo".to_string(), "_bar@4".to_string()],
            ..ResolveConfig::default()
        };
        let linker = Linker::new(config, Machine::I386, MemoryLoader::new()).unwrap();
        let names: Vec<_> = linker.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["_foo", "_bar@4"]);
    }

    #[test]
    fn machine_mismatch_is_fatal() {
        let mut linker = Linker::new(ResolveConfig::default(), Machine::Amd64, MemoryLoader::new()).unwrap();
        let obj = ObjectFile::new("x86.obj").machine(Machine::I386);
        let err = linker.add_file(ParsedFile::Object(obj)).unwrap_err();
        assert!(err.to_string().contains("conflicts"));
    }
}
