//! The global symbol table.
//!
//! Every file the linker reads registers the global symbols it references or
//! defines here, in command-line order. Each `add_*` entry point follows the
//! same steps:
//! 1. Insert or find the name's slot.
//! 2. Look at the kind that currently occupies the slot.
//! 3. Apply the merge rule for the incoming definition source.
//! 4. Report a duplicate if the rule forbids both definitions.
//!
//! Lazy symbols (archive members, lazy objects, DLL exports) are never loaded
//! from here directly. Forcing one queues a [`LoadRequest`] that the link
//! session drains before it moves on to the next input file.

mod mangle;
mod resolve;

use std::collections::{BTreeMap, VecDeque};

use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;

use crate::arch::{arm64ec, Target};
use crate::config::ResolveConfig;
use crate::diag::{self, Diagnostics, Level};
use crate::error::ResolveError;
use crate::input::{FileKind, InputFile};
use crate::symbol::{
    ChunkId, DefinedRegular, DllSymbolHandle, FileId, MemberHandle, Symbol, SymbolId, SymbolKind,
};

/// A file that resolution needs materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadRequest {
    ArchiveMember { archive: FileId, member: MemberHandle },
    /// A lazy object file that must now be linked in.
    Object(FileId),
    DllImport { file: FileId, import: DllSymbolHandle },
}

pub struct SymbolTable {
    target: Target,
    config: ResolveConfig,
    symbols: PrimaryMap<SymbolId, Symbol>,
    sym_map: FxHashMap<Box<str>, SymbolId>,
    files: PrimaryMap<FileId, InputFile>,
    pending: VecDeque<LoadRequest>,
    alternate_names: BTreeMap<String, String>,
    align_comm: FxHashMap<String, u32>,
    gc_roots: Vec<SymbolId>,
    chunks: PrimaryMap<ChunkId, String>,
    diag: Diagnostics,
}

impl SymbolTable {
    pub fn new(target: Target, config: ResolveConfig) -> Self {
        Self {
            target,
            config,
            symbols: PrimaryMap::new(),
            sym_map: FxHashMap::default(),
            files: PrimaryMap::new(),
            pending: VecDeque::new(),
            alternate_names: BTreeMap::new(),
            align_comm: FxHashMap::default(),
            gc_roots: Vec::new(),
            chunks: PrimaryMap::new(),
            diag: Diagnostics::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    pub fn add_input_file(&mut self, file: InputFile) -> FileId {
        self.files.push(file)
    }

    pub fn file(&self, id: FileId) -> &InputFile {
        &self.files[id]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut InputFile {
        &mut self.files[id]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &InputFile)> {
        self.files.iter()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// All symbols in creation order.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn gc_roots(&self) -> &[SymbolId] {
        &self.gc_roots
    }

    pub fn chunk_name(&self, chunk: ChunkId) -> &str {
        &self.chunks[chunk]
    }

    /// The next file resolution asked for, if any.
    pub fn take_pending(&mut self) -> Option<LoadRequest> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Find or create the slot for `name`. The flag is true if the slot is new.
    pub fn insert(&mut self, name: &str) -> (SymbolId, bool) {
        if let Some(&id) = self.sym_map.get(name) {
            return (id, false);
        }
        let id = self.symbols.push(Symbol::new(name));
        self.sym_map.insert(name.into(), id);
        (id, true)
    }

    /// Like [`insert`](Self::insert), also recording a reference from `file`.
    /// References from anything but a bitcode module mark the symbol as used
    /// in a regular object.
    pub fn insert_from(&mut self, name: &str, file: Option<FileId>) -> (SymbolId, bool) {
        let (id, inserted) = self.insert(name);
        if !file.is_some_and(|f| self.files[f].is_bitcode()) {
            self.symbols[id].is_used_in_regular_obj = true;
        }
        (id, inserted)
    }

    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.sym_map.get(name).copied()
    }

    /// Look up a C name, probing the decorated spelling on i386.
    pub fn find_underscore(&self, name: &str) -> Option<SymbolId> {
        self.find(&self.target.mangle(name))
    }

    /// Ask for the file that defines a lazy symbol to be linked in.
    pub fn force_lazy(&mut self, id: SymbolId) {
        let sym = &mut self.symbols[id];
        if sym.pending_archive_load {
            return;
        }
        sym.pending_archive_load = true;
        let request = match sym.kind {
            SymbolKind::LazyArchive { file, member } => LoadRequest::ArchiveMember {
                archive: file,
                member,
            },
            SymbolKind::LazyObject { file } => {
                if !self.files[file].lazy {
                    return;
                }
                self.files[file].lazy = false;
                LoadRequest::Object(file)
            }
            SymbolKind::LazyDll { file, import } => LoadRequest::DllImport { file, import },
            _ => return,
        };
        tracing::debug!(symbol = %self.symbols[id].name(), ?request, "forcing lazy symbol");
        self.pending.push_back(request);
    }

    /// Register a reference to `name`. A lazy definition is forced unless
    /// `override_lazy` asks for the slot to become undefined instead.
    pub fn add_undefined(&mut self, name: &str, file: Option<FileId>, override_lazy: bool) -> SymbolId {
        let (id, inserted) = self.insert_from(name, file);
        if inserted {
            return id;
        }
        if self.symbols[id].is_lazy() {
            if override_lazy {
                self.symbols[id].replace_kind(SymbolKind::default());
            } else {
                self.force_lazy(id);
            }
        }
        id
    }

    /// Make `name` part of the root set.
    ///
    /// With `alias_ec` on ARM64EC, the mangled and demangled spellings of a
    /// function are bound together by an anti-dependency alias.
    pub fn add_gc_root(&mut self, name: &str, alias_ec: bool) -> SymbolId {
        let id = self.add_undefined(name, None, false);
        if !self.symbols[id].is_gc_root {
            self.symbols[id].is_gc_root = true;
            self.gc_roots.push(id);
        }

        if alias_ec && self.target.is_ec() {
            if let Some(mangled) = arm64ec::mangled_function_name(name) {
                if self.has_no_alias(id) {
                    let t = self.add_undefined(&mangled, None, false);
                    self.set_weak_alias(id, t, true);
                }
            } else if let Some(demangled) = arm64ec::demangled_function_name(name) {
                let us = self.add_undefined(&demangled, None, false);
                if self.has_no_alias(us) {
                    self.set_weak_alias(us, id, true);
                }
            }
        }
        id
    }

    fn has_no_alias(&self, id: SymbolId) -> bool {
        self.symbols[id]
            .kind
            .as_undefined()
            .is_some_and(|u| u.weak_alias.is_none())
    }

    /// Point an undefined symbol at its fallback. No-op on anything else.
    pub fn set_weak_alias(&mut self, id: SymbolId, target: SymbolId, anti_dep: bool) {
        if let Some(u) = self.symbols[id].kind.as_undefined_mut() {
            u.weak_alias = Some(target);
            u.is_anti_dep = anti_dep;
        }
    }

    /// Apply the weak alias an object file declares for `id`.
    ///
    /// An anti-dependency never displaces an existing alias, but a real weak
    /// alias replaces an anti-dependency. Two different real aliases are a
    /// duplicate, except in MinGW mode where the first one is kept.
    pub fn check_and_set_weak_alias(&mut self, id: SymbolId, target: SymbolId, anti_dep: bool, file: FileId) {
        let Some(u) = self.symbols[id].kind.as_undefined() else {
            return;
        };
        let conflicting = u.weak_alias.is_some_and(|a| a != target);
        let existing_anti_dep = u.is_anti_dep;
        if conflicting {
            if anti_dep {
                return;
            }
            if !existing_anti_dep {
                if !self.config.mingw {
                    self.report_duplicate(id, Some(file));
                }
                return;
            }
        }
        self.set_weak_alias(id, target, anti_dep);
    }

    /// Whether an ARM64EC lazy definition of `name` from `file` may enter the
    /// table, given what is known about its mangled/demangled pair.
    ///
    /// The first archive to provide either spelling of a function wins, so
    /// both spellings always come from the same library.
    fn check_lazy_ec_pair(&self, name: &str, file: FileId) -> bool {
        if name.starts_with("__imp_") {
            return true;
        }
        let Some(pair) = arm64ec::paired_name(name) else {
            return true;
        };
        let Some(id) = self.find(&pair) else {
            return true;
        };
        let sym = &self.symbols[id];
        if sym.pending_archive_load {
            return false;
        }
        match &sym.kind {
            SymbolKind::Undefined(u) => u.weak_alias.is_none() || u.is_anti_dep,
            SymbolKind::LazyArchive { file: f, .. } | SymbolKind::LazyObject { file: f } => *f == file,
            _ => false,
        }
    }

    /// Whether a lazy definition arriving for `id` should load its file now.
    fn wants_lazy_load(&self, id: SymbolId) -> bool {
        let sym = &self.symbols[id];
        let Some(u) = sym.kind.as_undefined() else {
            return false;
        };
        let ec_alias = u.weak_alias.is_some() && u.is_anti_dep && self.target.is_ec();
        !(u.weak_alias.is_some() && !ec_alias) && !sym.pending_archive_load
    }

    pub fn add_lazy_archive(&mut self, archive: FileId, name: &str, member: MemberHandle) {
        if self.target.is_ec() && !self.check_lazy_ec_pair(name, archive) {
            return;
        }
        let (id, inserted) = self.insert(name);
        if inserted {
            self.symbols[id].replace_kind(SymbolKind::LazyArchive { file: archive, member });
            return;
        }
        if !self.wants_lazy_load(id) {
            return;
        }
        self.symbols[id].pending_archive_load = true;
        tracing::debug!(symbol = name, archive = %self.files[archive].name, "loading member for existing reference");
        self.pending.push_back(LoadRequest::ArchiveMember { archive, member });
    }

    pub fn add_lazy_object(&mut self, file: FileId, name: &str) {
        if self.target.is_ec() && !self.check_lazy_ec_pair(name, file) {
            return;
        }
        let (id, inserted) = self.insert_from(name, Some(file));
        if inserted {
            self.symbols[id].replace_kind(SymbolKind::LazyObject { file });
            return;
        }
        if !self.wants_lazy_load(id) {
            return;
        }
        self.symbols[id].pending_archive_load = true;
        self.files[file].lazy = false;
        self.pending.push_back(LoadRequest::Object(file));
    }

    pub fn add_lazy_dll(&mut self, file: FileId, name: &str, import: DllSymbolHandle) {
        let (id, inserted) = self.insert(name);
        if inserted {
            self.symbols[id].replace_kind(SymbolKind::LazyDll { file, import });
            return;
        }
        if !self.wants_lazy_load(id) {
            return;
        }
        self.symbols[id].pending_archive_load = true;
        self.pending.push_back(LoadRequest::DllImport { file, import });
    }

    pub fn add_absolute(&mut self, name: &str, va: u64) -> SymbolId {
        let (id, _) = self.insert_from(name, None);
        let duplicate = match &self.symbols[id].kind {
            k if !k.is_defined() => None,
            SymbolKind::DefinedAbsolute { va: existing } => Some(*existing != va),
            k => Some(!k.is_defined_in_object()),
        };
        match duplicate {
            None => self.symbols[id].replace_kind(SymbolKind::DefinedAbsolute { va }),
            Some(true) => self.report_duplicate(id, None),
            Some(false) => {}
        }
        id
    }

    /// Define `name` as the start of a linker-created chunk.
    pub fn add_synthetic(&mut self, name: &str, chunk: &str) -> SymbolId {
        let (id, _) = self.insert_from(name, None);
        let kind = &self.symbols[id].kind;
        if !kind.is_defined() {
            let chunk = self.chunks.push(chunk.to_string());
            self.symbols[id].replace_kind(SymbolKind::DefinedSynthetic { chunk });
        } else if !kind.is_defined_in_object() {
            self.report_duplicate(id, None);
        }
        id
    }

    pub fn add_regular(
        &mut self,
        file: FileId,
        name: &str,
        section: Option<u32>,
        value: u64,
        is_weak: bool,
    ) -> SymbolId {
        let (id, _) = self.insert_from(name, Some(file));
        let sym = &self.symbols[id];
        if sym.kind.as_regular().is_none() || sym.is_weak() {
            self.symbols[id].replace_kind(SymbolKind::DefinedRegular(DefinedRegular {
                file,
                is_comdat: false,
                is_external: true,
                section,
                value,
                is_weak,
            }));
        } else if !is_weak {
            self.report_duplicate(id, Some(file));
        }
        id
    }

    /// Define a COMDAT leader. The flag is true if this definition prevailed;
    /// otherwise the caller should discard its section.
    pub fn add_comdat(&mut self, file: FileId, name: &str, section: u32, value: u64) -> (SymbolId, bool) {
        let (id, _) = self.insert_from(name, Some(file));
        match self.symbols[id].kind.as_regular() {
            None => {
                self.symbols[id].replace_kind(SymbolKind::DefinedRegular(DefinedRegular {
                    file,
                    is_comdat: true,
                    is_external: true,
                    section: Some(section),
                    value,
                    is_weak: false,
                }));
                (id, true)
            }
            Some(existing) => {
                if !existing.is_comdat {
                    self.report_duplicate(id, Some(file));
                }
                (id, false)
            }
        }
    }

    /// Define a common symbol. The largest size wins; alignment is the
    /// largest one requested by any definition or `/aligncomm`.
    pub fn add_common(&mut self, file: FileId, name: &str, size: u64, alignment: u32) -> SymbolId {
        let (id, _) = self.insert_from(name, Some(file));
        let alignment = alignment.max(self.align_comm.get(name).copied().unwrap_or(0));
        let current = match &self.symbols[id].kind {
            SymbolKind::DefinedCommon {
                size, alignment, ..
            } => Some((*size, *alignment)),
            k if k.is_defined_in_object() => return id,
            _ => None,
        };
        let sym = &mut self.symbols[id];
        match current {
            None => sym.replace_kind(SymbolKind::DefinedCommon { file, size, alignment }),
            Some((existing, existing_align)) => {
                let alignment = alignment.max(existing_align);
                if size > existing {
                    sym.replace_kind(SymbolKind::DefinedCommon { file, size, alignment });
                } else if let SymbolKind::DefinedCommon { alignment: a, .. } = &mut sym.kind {
                    *a = alignment;
                }
            }
        }
        id
    }

    /// Define the `__imp_` pointer of an import. Returns `None` on a duplicate.
    pub fn add_import_data(&mut self, name: &str, file: FileId, dll_name: &str) -> Option<SymbolId> {
        let (id, _) = self.insert_from(name, None);
        if self.symbols[id].is_defined() {
            self.report_duplicate(id, Some(file));
            return None;
        }
        self.symbols[id].replace_kind(SymbolKind::DefinedImportData {
            file,
            dll_name: dll_name.to_string(),
        });
        Some(id)
    }

    /// Define the jump thunk of a code import. Returns `None` on a duplicate.
    pub fn add_import_thunk(&mut self, name: &str, import: SymbolId, file: FileId) -> Option<SymbolId> {
        let (id, _) = self.insert_from(name, None);
        if self.symbols[id].is_defined() {
            self.report_duplicate(id, Some(file));
            return None;
        }
        self.symbols[id].replace_kind(SymbolKind::DefinedImportThunk { file, import });
        Some(id)
    }

    /// Record a duplicate definition of `existing` coming from `new_file`.
    pub fn report_duplicate(&mut self, existing: SymbolId, new_file: Option<FileId>) {
        let level = if self.config.force_multiple {
            Level::Warning
        } else {
            Level::Error
        };
        let sym = &self.symbols[existing];
        let mut message = format!("duplicate symbol: {}", sym.name());
        message.push_str(&diag::defined_at(sym.file().map(|f| &self.files[f])));
        message.push_str(&diag::defined_at(new_file.map(|f| &self.files[f])));
        self.diag.report(level, message);
    }

    /// The defined symbol reached by following `id`'s weak alias chain.
    ///
    /// Anti-dependency aliases are never followed past their first hop.
    pub fn defined_weak_alias(&self, id: SymbolId) -> Option<SymbolId> {
        let mut seen = Vec::new();
        let mut next = self.symbols[id].kind.as_undefined()?.weak_alias;
        while let Some(a) = next {
            let sym = &self.symbols[a];
            if sym.is_defined() {
                return Some(a);
            }
            let u = sym.kind.as_undefined()?;
            if u.is_anti_dep || seen.contains(&a) {
                return None;
            }
            seen.push(a);
            next = u.weak_alias;
        }
        None
    }

    /// Turn an undefined symbol into a copy of its defined weak alias target.
    pub fn resolve_weak_alias(&mut self, id: SymbolId) -> bool {
        let Some(target) = self.defined_weak_alias(id) else {
            return false;
        };
        let kind = self.symbols[target].kind.clone();
        tracing::debug!(symbol = %self.symbols[id].name(), target = %self.symbols[target].name(), "resolved weak alias");
        self.symbols[id].replace_kind(kind);
        true
    }

    /// Parse `FROM=TO` (`/alternatename`).
    pub fn parse_alternate_name(&mut self, arg: &str) -> Result<(), ResolveError> {
        let (from, to) = arg.split_once('=').unwrap_or((arg, ""));
        if from.is_empty() || to.is_empty() {
            return Err(ResolveError::InvalidAlternateName(arg.to_string()));
        }
        match self.alternate_names.get(from) {
            Some(existing) if existing != to => {
                Err(ResolveError::ConflictingAlternateName(arg.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                self.alternate_names.insert(from.to_string(), to.to_string());
                Ok(())
            }
        }
    }

    /// Parse `NAME,LOG2` (`/aligncomm`). Bad arguments are reported, not fatal.
    pub fn parse_aligncomm(&mut self, arg: &str) {
        let parsed = arg.split_once(',').and_then(|(name, align)| {
            if name.is_empty() {
                return None;
            }
            Some((name, 1u32.checked_shl(parse_integer(align)?)?))
        });
        match parsed {
            Some((name, align)) => {
                let entry = self.align_comm.entry(name.to_string()).or_insert(0);
                *entry = (*entry).max(align);
            }
            None => self.diag.error(format!("/aligncomm: invalid argument: {arg}")),
        }
    }

    pub(crate) fn is_bitcode(&self, file: FileId) -> bool {
        matches!(self.files[file].kind, FileKind::Bitcode { .. })
    }
}

/// Parse an integer whose radix follows from its prefix: `0x` is hex, `0b`
/// binary, `0o` or a bare leading zero octal, anything else decimal.
fn parse_integer(s: &str) -> Option<u32> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (bin, 2)
    } else if let Some(oct) = s.strip_prefix("0o") {
        (oct, 8)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}
