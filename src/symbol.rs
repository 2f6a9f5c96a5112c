//! Symbol records.
//!
//! Every global name seen during a link owns exactly one [`Symbol`] slot in the
//! symbol table's arena. The slot is addressed by a [`SymbolId`] handle that
//! stays valid for the whole link, so other components can hold on to it while
//! the slot's [`SymbolKind`] is replaced as more information arrives.

use cranelift_entity::entity_impl;

/// Handle to a symbol slot in the symbol table arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);
entity_impl!(SymbolId, "sym");

/// Handle to an input file registered with the symbol table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);
entity_impl!(FileId, "file");

/// Handle to a linker-synthesized chunk backing a [`SymbolKind::DefinedSynthetic`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u32);
entity_impl!(ChunkId, "chunk");

/// Opaque handle a loader uses to find an archive member again.
///
/// For on-disk archives this is the member's header offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberHandle(pub u64);

/// Index of an exported name inside a DLL input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DllSymbolHandle(pub u32);

/// A reference with no definition yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Undefined {
    /// Symbol this name falls back to if it is never defined.
    pub weak_alias: Option<SymbolId>,
    /// The alias is an ARM64EC anti-dependency and never pulls in a definition.
    pub is_anti_dep: bool,
}

/// A definition backed by a section of an object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedRegular {
    pub file: FileId,
    pub is_comdat: bool,
    pub is_external: bool,
    /// Section number in the owning file, if the definition has one.
    pub section: Option<u32>,
    /// Offset of the symbol within its section.
    pub value: u64,
    pub is_weak: bool,
}

/// The kind of a symbol slot.
///
/// Exactly one variant occupies a slot at a time. Transitions move toward "more
/// defined": `Undefined < Lazy* < Defined*` (see [`SymbolKind::rank`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Undefined(Undefined),
    /// Defined by an archive member that has not been loaded.
    LazyArchive { file: FileId, member: MemberHandle },
    /// Defined by an object file that is linked only on demand.
    LazyObject { file: FileId },
    /// Exported by a DLL that can be imported on demand.
    LazyDll { file: FileId, import: DllSymbolHandle },
    DefinedRegular(DefinedRegular),
    DefinedAbsolute { va: u64 },
    DefinedCommon { file: FileId, size: u64, alignment: u32 },
    DefinedSynthetic { chunk: ChunkId },
    /// The `__imp_` pointer of an import library entry.
    DefinedImportData { file: FileId, dll_name: String },
    /// The jump thunk generated for a code import; `import` is its `__imp_` symbol.
    DefinedImportThunk { file: FileId, import: SymbolId },
    /// An `__imp_` reference satisfied by a local definition.
    DefinedLocalImport { target: SymbolId },
}

impl Default for SymbolKind {
    fn default() -> Self {
        SymbolKind::Undefined(Undefined::default())
    }
}

impl SymbolKind {
    /// Position in the `Undefined < Lazy < Defined` order.
    pub fn rank(&self) -> u8 {
        if self.is_undefined() {
            0
        } else if self.is_lazy() {
            1
        } else {
            2
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, SymbolKind::Undefined(_))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(
            self,
            SymbolKind::LazyArchive { .. } | SymbolKind::LazyObject { .. } | SymbolKind::LazyDll { .. }
        )
    }

    pub fn is_defined(&self) -> bool {
        !self.is_undefined() && !self.is_lazy()
    }

    /// Regular and common definitions, i.e. the ones that come from object files.
    pub fn is_defined_in_object(&self) -> bool {
        matches!(self, SymbolKind::DefinedRegular(_) | SymbolKind::DefinedCommon { .. })
    }

    pub fn as_undefined(&self) -> Option<&Undefined> {
        match self {
            SymbolKind::Undefined(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_undefined_mut(&mut self) -> Option<&mut Undefined> {
        match self {
            SymbolKind::Undefined(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_regular(&self) -> Option<&DefinedRegular> {
        match self {
            SymbolKind::DefinedRegular(d) => Some(d),
            _ => None,
        }
    }

    /// The file this kind was produced by, if any.
    pub fn file(&self) -> Option<FileId> {
        match self {
            SymbolKind::LazyArchive { file, .. }
            | SymbolKind::LazyObject { file }
            | SymbolKind::LazyDll { file, .. }
            | SymbolKind::DefinedCommon { file, .. }
            | SymbolKind::DefinedImportData { file, .. }
            | SymbolKind::DefinedImportThunk { file, .. } => Some(*file),
            SymbolKind::DefinedRegular(d) => Some(d.file),
            SymbolKind::Undefined(_)
            | SymbolKind::DefinedAbsolute { .. }
            | SymbolKind::DefinedSynthetic { .. }
            | SymbolKind::DefinedLocalImport { .. } => None,
        }
    }
}

/// A global name and everything resolution knows about it.
///
/// The flags live outside [`SymbolKind`] so they survive kind replacement.
#[derive(Debug, Clone)]
pub struct Symbol {
    name: Box<str>,
    pub kind: SymbolKind,
    /// Referenced from a file that is not a bitcode module.
    pub is_used_in_regular_obj: bool,
    /// A load of the file defining this symbol has been requested.
    pub pending_archive_load: bool,
    pub is_gc_root: bool,
    /// References must go through a runtime pseudo relocation (MinGW auto-import).
    pub is_runtime_pseudo_reloc: bool,
    /// Cleared for symbols the linker defines itself; LTO must treat them as
    /// redefined and never inline them.
    pub can_inline: bool,
}

impl Symbol {
    /// A fresh slot. It starts as a plain [`Undefined`] so that no caller can
    /// ever observe a slot without a kind.
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::default(),
            is_used_in_regular_obj: false,
            pending_archive_load: false,
            is_gc_root: false,
            is_runtime_pseudo_reloc: false,
            can_inline: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the kind in place, keeping the name and flags.
    pub fn replace_kind(&mut self, kind: SymbolKind) {
        tracing::trace!(symbol = %self.name, from = self.kind.rank(), to = kind.rank(), "replace kind");
        self.kind = kind;
    }

    pub fn is_weak(&self) -> bool {
        matches!(&self.kind, SymbolKind::DefinedRegular(d) if d.is_weak)
    }

    pub fn is_lazy(&self) -> bool {
        self.kind.is_lazy()
    }

    pub fn is_defined(&self) -> bool {
        self.kind.is_defined()
    }

    pub fn is_undefined(&self) -> bool {
        self.kind.is_undefined()
    }

    pub fn file(&self) -> Option<FileId> {
        self.kind.file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn kinds_are_ranked_undefined_lazy_defined() {
        let file = FileId::new(0);
        assert_eq!(SymbolKind::default().rank(), 0);
        assert_eq!(SymbolKind::LazyObject { file }.rank(), 1);
        assert_eq!(SymbolKind::DefinedAbsolute { va: 0 }.rank(), 2);
        assert_eq!(
            SymbolKind::DefinedCommon { file, size: 4, alignment: 4 }.rank(),
            2
        );
    }

    #[test]
    fn replacing_kind_keeps_flags() {
        let mut sym = Symbol::new("foo");
        sym.is_used_in_regular_obj = true;
        sym.is_gc_root = true;
        sym.replace_kind(SymbolKind::DefinedAbsolute { va: 16 });
        assert_eq!(sym.name(), "foo");
        assert!(sym.is_used_in_regular_obj);
        assert!(sym.is_gc_root);
        assert!(sym.is_defined());
    }

    #[test]
    fn only_regular_definitions_are_weak() {
        let mut sym = Symbol::new("w");
        sym.replace_kind(SymbolKind::DefinedRegular(DefinedRegular {
            file: FileId::new(1),
            is_comdat: false,
            is_external: true,
            section: Some(1),
            value: 0,
            is_weak: true,
        }));
        assert!(sym.is_weak());
        sym.replace_kind(SymbolKind::DefinedAbsolute { va: 0 });
        assert!(!sym.is_weak());
    }
}
