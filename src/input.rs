//! Input files as the resolver sees them.
//!
//! Reading object files is not the resolver's business: a loader (see
//! [`coff`](crate::coff) for the on-disk one) turns each input into a
//! [`ParsedFile`], a flat list of symbols in file order plus the relocations
//! needed to point at references in diagnostics. Archive members are only
//! parsed when resolution asks for them through [`Loader::load_member`].

use anyhow::{anyhow, Result};
use rustc_hash::FxHashMap;

use crate::arch::Machine;
use crate::symbol::{MemberHandle, SymbolId};

/// How an object file symbol participates in resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolDef {
    Undefined,
    /// Undefined with a fallback (`IMAGE_SYM_CLASS_WEAK_EXTERNAL`).
    WeakExternal { alias: String, anti_dep: bool },
    Regular { section: u32, value: u64, weak: bool },
    Comdat { section: u32, value: u64 },
    Common { size: u64, alignment: u32 },
    Absolute { value: u64 },
}

impl SymbolDef {
    pub fn is_definition(&self) -> bool {
        !matches!(self, SymbolDef::Undefined | SymbolDef::WeakExternal { .. })
    }
}

/// Attributes of a bitcode symbol that only matter to LTO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LtoAttrs {
    pub ir_name: String,
    pub unnamed_addr: bool,
    /// Referenced from `llvm.used` or `llvm.compiler.used`.
    pub used: bool,
    pub export_dynamic: bool,
}

/// A global symbol of an object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSymbol {
    /// Index in the file's symbol table; relocations refer to symbols by it.
    pub index: u32,
    pub name: String,
    pub def: SymbolDef,
    pub lto: LtoAttrs,
}

/// A relocation that targets a symbol, kept to locate references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocRef {
    pub symbol_index: u32,
    pub section: u32,
    pub offset: u64,
}

/// Extra information carried by LTO modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitcodeInfo {
    /// Name of the source file the module was compiled from.
    pub source_name: String,
    /// The module has a ThinLTO summary.
    pub in_summary: bool,
}

/// A COFF object or bitcode module.
#[derive(Debug, Clone, Default)]
pub struct ObjectFile {
    pub name: String,
    /// Only linked in if one of its definitions is needed.
    pub lazy: bool,
    pub machine: Option<Machine>,
    pub bitcode: Option<BitcodeInfo>,
    pub symbols: Vec<InputSymbol>,
    pub relocs: Vec<RelocRef>,
    /// Linker options embedded in the file (`.drectve`).
    pub directives: Vec<String>,
}

impl ObjectFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bitcode(name: impl Into<String>, info: BitcodeInfo) -> Self {
        Self {
            name: name.into(),
            bitcode: Some(info),
            ..Self::default()
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn machine(mut self, machine: Machine) -> Self {
        self.machine = Some(machine);
        self
    }

    pub fn directive(mut self, option: &str) -> Self {
        self.directives.push(option.to_string());
        self
    }

    /// Append a symbol at the next index.
    pub fn symbol(mut self, name: &str, def: SymbolDef) -> Self {
        let index = self.symbols.last().map_or(0, |s| s.index + 1);
        self.symbols.push(InputSymbol {
            index,
            name: name.to_string(),
            def,
            lto: LtoAttrs::default(),
        });
        self
    }

    pub fn undefined(self, name: &str) -> Self {
        self.symbol(name, SymbolDef::Undefined)
    }

    pub fn define(self, name: &str, section: u32, value: u64) -> Self {
        self.symbol(
            name,
            SymbolDef::Regular {
                section,
                value,
                weak: false,
            },
        )
    }

    /// A relocation in `section` at `offset` against the symbol named `name`.
    pub fn reloc(mut self, name: &str, section: u32, offset: u64) -> Self {
        if let Some(sym) = self.symbols.iter().find(|s| s.name == name) {
            let symbol_index = sym.index;
            self.relocs.push(RelocRef {
                symbol_index,
                section,
                offset,
            });
        }
        self
    }
}

/// One entry of an archive's symbol index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSymbol {
    pub name: String,
    pub member: MemberHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Code,
    Data,
    Const,
}

/// A short-form import library member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub name: String,
    pub symbol: String,
    pub dll: String,
    pub import_type: ImportType,
}

/// A parsed input file.
#[derive(Debug, Clone)]
pub enum ParsedFile {
    Object(ObjectFile),
    Archive {
        name: String,
        symbols: Vec<ArchiveSymbol>,
    },
    Import(ImportFile),
    /// A DLL linked directly; every export can be imported on demand.
    Dll {
        name: String,
        exports: Vec<String>,
    },
}

impl ParsedFile {
    pub fn name(&self) -> &str {
        match self {
            ParsedFile::Object(obj) => &obj.name,
            ParsedFile::Archive { name, .. } | ParsedFile::Dll { name, .. } => name,
            ParsedFile::Import(imp) => &imp.name,
        }
    }
}

/// What kind of file a registered input is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Object,
    Bitcode {
        info: BitcodeInfo,
        symbols: Vec<InputSymbol>,
    },
    Archive,
    Import,
    Dll {
        dll: String,
        exports: Vec<String>,
    },
    /// Definitions made by the linker itself.
    Internal,
}

/// A file registered with the symbol table.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub kind: FileKind,
    /// Still waiting for one of its symbols to be needed.
    pub lazy: bool,
    /// Global symbol of the file at each symbol table index.
    pub symbols: Vec<Option<SymbolId>>,
    pub relocs: Vec<RelocRef>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            lazy: false,
            symbols: Vec::new(),
            relocs: Vec::new(),
        }
    }

    pub fn is_bitcode(&self) -> bool {
        matches!(self.kind, FileKind::Bitcode { .. })
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, FileKind::Object)
    }
}

/// Materializes archive members on demand.
pub trait Loader {
    /// Parse the member of `archive` identified by `member`.
    fn load_member(&mut self, archive: &str, member: MemberHandle) -> Result<ParsedFile>;
}

/// A [`Loader`] serving pre-parsed archive members from memory.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    members: FxHashMap<(String, MemberHandle), ParsedFile>,
    loads: Vec<(String, MemberHandle)>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file` available as `member` of `archive`.
    pub fn add_member(&mut self, archive: &str, member: MemberHandle, file: ParsedFile) {
        self.members.insert((archive.to_string(), member), file);
    }

    /// Every member load so far, in order.
    pub fn loads(&self) -> &[(String, MemberHandle)] {
        &self.loads
    }

    pub fn load_count(&self, archive: &str, member: MemberHandle) -> usize {
        self.loads
            .iter()
            .filter(|(a, m)| a == archive && *m == member)
            .count()
    }
}

impl Loader for MemoryLoader {
    fn load_member(&mut self, archive: &str, member: MemberHandle) -> Result<ParsedFile> {
        let file = self
            .members
            .get(&(archive.to_string(), member))
            .cloned()
            .ok_or_else(|| anyhow!("{archive}: no member at offset {}", member.0))?;
        self.loads.push((archive.to_string(), member));
        Ok(file)
    }
}

impl<L: Loader + ?Sized> Loader for &mut L {
    fn load_member(&mut self, archive: &str, member: MemberHandle) -> Result<ParsedFile> {
        (**self).load_member(archive, member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_numbers_symbols_in_order() {
        let obj = ObjectFile::new("a.obj")
            .undefined("foo")
            .define("main", 1, 0)
            .reloc("foo", 1, 4);
        assert_eq!(obj.symbols[0].index, 0);
        assert_eq!(obj.symbols[1].index, 1);
        assert_eq!(
            obj.relocs,
            vec![RelocRef {
                symbol_index: 0,
                section: 1,
                offset: 4
            }]
        );
    }

    #[test]
    fn memory_loader_counts_loads() {
        let mut loader = MemoryLoader::new();
        loader.add_member("lib.a", MemberHandle(8), ParsedFile::Object(ObjectFile::new("m.o")));
        assert!(loader.load_member("lib.a", MemberHandle(8)).is_ok());
        assert!(loader.load_member("lib.a", MemberHandle(9)).is_err());
        assert_eq!(loader.load_count("lib.a", MemberHandle(8)), 1);
    }
}
