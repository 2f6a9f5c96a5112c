//! Resolution state handed to link-time optimization.
//!
//! Bitcode modules take part in symbol resolution like any object file, but
//! the code generator also needs to know, per symbol name and across every
//! module, which copy prevails and whether the symbol is visible outside the
//! LTO unit. [`GlobalResolutions`] accumulates that one module at a time.
//! The table only lives until cross-module importing starts; after
//! [`GlobalResolutions::release`] any further use is an error.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::error::ResolveError;
use crate::input::{FileKind, InputSymbol, SymbolDef};
use crate::symbol::FileId;
use crate::symtab::SymbolTable;

/// Which partition referenced a symbol first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Partition {
    /// Not referenced yet.
    #[default]
    Unknown,
    /// Referenced from outside LTO or from more than one partition.
    External,
    /// Partition 0 is the regular LTO module; ThinLTO modules count from 1.
    Module(u32),
}

/// Per-name resolution across all modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalResolution {
    /// IR name of the prevailing copy, or of the first copy seen.
    pub ir_name: String,
    /// Every copy is `unnamed_addr`.
    pub unnamed_addr: bool,
    pub prevailing: bool,
    pub visible_outside_summary: bool,
    pub export_dynamic: bool,
    pub partition: Partition,
}

impl Default for GlobalResolution {
    fn default() -> Self {
        Self {
            ir_name: String::new(),
            unnamed_addr: true,
            prevailing: false,
            visible_outside_summary: false,
            export_dynamic: false,
            partition: Partition::Unknown,
        }
    }
}

/// What the linker decided about one symbol of one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolResolution {
    /// This module's copy is the one that survives.
    pub prevailing: bool,
    pub final_definition_in_linkage_unit: bool,
    pub visible_to_regular_obj: bool,
    /// The linker redefines the symbol, so it must not be inlined.
    pub linker_redefined: bool,
    pub export_dynamic: bool,
}

/// Merged size and alignment of a common symbol across modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommonResolution {
    pub size: u64,
    pub alignment: u32,
    pub prevailing: bool,
}

#[derive(Debug, Default)]
pub struct GlobalResolutions {
    table: Option<FxHashMap<String, GlobalResolution>>,
    commons: BTreeMap<String, CommonResolution>,
}

impl GlobalResolutions {
    pub fn new() -> Self {
        Self {
            table: Some(FxHashMap::default()),
            commons: BTreeMap::new(),
        }
    }

    /// Merge one module's symbols. `resolutions` runs parallel to `symbols`.
    pub fn add_module(
        &mut self,
        symbols: &[InputSymbol],
        resolutions: &[SymbolResolution],
        partition: u32,
        in_summary: bool,
    ) -> Result<(), ResolveError> {
        let table = self.table.as_mut().ok_or(ResolveError::ResolutionsReleased)?;
        for (sym, res) in symbols.iter().zip(resolutions) {
            let global = table.entry(sym.name.clone()).or_default();
            global.unnamed_addr &= sym.lto.unnamed_addr;
            if res.prevailing {
                if global.prevailing {
                    return Err(ResolveError::MultiplePrevailing(sym.name.clone()));
                }
                global.prevailing = true;
                global.ir_name = sym.lto.ir_name.clone();
            } else if !global.prevailing && global.ir_name.is_empty() {
                global.ir_name = sym.lto.ir_name.clone();
            }

            // Two spellings of one symbol cannot be told apart by GUID.
            if global.ir_name != sym.lto.ir_name {
                global.partition = Partition::External;
                global.visible_outside_summary = true;
            }

            let other_partition = !(matches!(global.partition, Partition::Unknown)
                || matches!(global.partition, Partition::Module(p) if p == partition));
            global.partition = if res.linker_redefined
                || res.visible_to_regular_obj
                || sym.lto.used
                || other_partition
            {
                Partition::External
            } else {
                Partition::Module(partition)
            };

            global.visible_outside_summary |= res.visible_to_regular_obj || sym.lto.used || !in_summary;
            global.export_dynamic |= res.export_dynamic;

            if let SymbolDef::Common { size, alignment } = sym.def {
                let common = self.commons.entry(sym.name.clone()).or_default();
                common.size = common.size.max(size);
                common.alignment = common.alignment.max(alignment);
                common.prevailing |= res.prevailing;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<&GlobalResolution>, ResolveError> {
        let table = self.table.as_ref().ok_or(ResolveError::ResolutionsReleased)?;
        Ok(table.get(name))
    }

    pub fn common(&self, name: &str) -> Option<&CommonResolution> {
        self.commons.get(name)
    }

    /// Drop the per-name table once importing begins.
    pub fn release(&mut self) {
        tracing::debug!("releasing global resolutions");
        self.table = None;
    }

    pub fn is_released(&self) -> bool {
        self.table.is_none()
    }
}

/// The linker's decision for each symbol of bitcode module `file`.
pub fn symbol_resolutions(table: &SymbolTable, file: FileId) -> Vec<SymbolResolution> {
    let input = table.file(file);
    let FileKind::Bitcode { symbols, .. } = &input.kind else {
        return Vec::new();
    };
    symbols
        .iter()
        .map(|sym| {
            let Some(id) = table.find(&sym.name) else {
                return SymbolResolution::default();
            };
            let s = table.symbol(id);
            let prevailing = sym.def.is_definition() && s.file() == Some(file);
            SymbolResolution {
                prevailing,
                final_definition_in_linkage_unit: prevailing,
                visible_to_regular_obj: s.is_used_in_regular_obj,
                linker_redefined: !s.can_inline,
                export_dynamic: false,
            }
        })
        .collect()
}

/// Build the global resolution table for every loaded bitcode module, in
/// load order.
pub fn global_resolutions(table: &SymbolTable) -> Result<GlobalResolutions, ResolveError> {
    let mut global = GlobalResolutions::new();
    let mut thin_modules = 0;
    for (id, file) in table.files() {
        let FileKind::Bitcode { info, symbols } = &file.kind else {
            continue;
        };
        if file.lazy {
            continue;
        }
        let partition = if info.in_summary {
            thin_modules += 1;
            thin_modules
        } else {
            0
        };
        let resolutions = symbol_resolutions(table, id);
        global.add_module(symbols, &resolutions, partition, info.in_summary)?;
    }
    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LtoAttrs;

    fn sym(name: &str, def: SymbolDef) -> InputSymbol {
        InputSymbol {
            index: 0,
            name: name.to_string(),
            def,
            lto: LtoAttrs {
                ir_name: name.to_string(),
                unnamed_addr: true,
                ..LtoAttrs::default()
            },
        }
    }

    fn def(name: &str) -> InputSymbol {
        sym(
            name,
            SymbolDef::Regular {
                section: 1,
                value: 0,
                weak: false,
            },
        )
    }

    fn prevailing() -> SymbolResolution {
        SymbolResolution {
            prevailing: true,
            ..SymbolResolution::default()
        }
    }

    #[test]
    fn second_prevailing_copy_is_rejected() {
        let mut g = GlobalResolutions::new();
        g.add_module(&[def("f")], &[prevailing()], 0, false).unwrap();
        let err = g.add_module(&[def("f")], &[prevailing()], 1, true).unwrap_err();
        assert!(matches!(err, ResolveError::MultiplePrevailing(name) if name == "f"));
    }

    #[test]
    fn partitions_track_first_reference() {
        let mut g = GlobalResolutions::new();
        g.add_module(&[def("f")], &[prevailing()], 1, true).unwrap();
        let f = g.get("f").unwrap().unwrap();
        assert_eq!(f.partition, Partition::Module(1));
        assert!(!f.visible_outside_summary);

        g.add_module(&[sym("f", SymbolDef::Undefined)], &[SymbolResolution::default()], 2, true)
            .unwrap();
        assert_eq!(g.get("f").unwrap().unwrap().partition, Partition::External);
    }

    #[test]
    fn regular_object_visibility_is_external() {
        let mut g = GlobalResolutions::new();
        let res = SymbolResolution {
            visible_to_regular_obj: true,
            ..prevailing()
        };
        g.add_module(&[def("g")], &[res], 0, false).unwrap();
        let gr = g.get("g").unwrap().unwrap();
        assert_eq!(gr.partition, Partition::External);
        assert!(gr.visible_outside_summary);
        assert!(gr.prevailing);
    }

    #[test]
    fn unnamed_addr_requires_every_copy() {
        let mut g = GlobalResolutions::new();
        let mut named = def("h");
        named.lto.unnamed_addr = false;
        g.add_module(&[def("h")], &[prevailing()], 0, false).unwrap();
        assert!(g.get("h").unwrap().unwrap().unnamed_addr);
        g.add_module(&[named], &[SymbolResolution::default()], 0, false).unwrap();
        assert!(!g.get("h").unwrap().unwrap().unnamed_addr);
    }

    #[test]
    fn commons_merge_to_maximum() {
        let mut g = GlobalResolutions::new();
        g.add_module(
            &[sym("c", SymbolDef::Common { size: 8, alignment: 16 })],
            &[SymbolResolution::default()],
            0,
            false,
        )
        .unwrap();
        g.add_module(
            &[sym("c", SymbolDef::Common { size: 32, alignment: 4 })],
            &[prevailing()],
            0,
            false,
        )
        .unwrap();
        assert_eq!(
            g.common("c"),
            Some(&CommonResolution {
                size: 32,
                alignment: 16,
                prevailing: true
            })
        );
    }

    #[test]
    fn released_table_cannot_be_used() {
        let mut g = GlobalResolutions::new();
        g.release();
        assert!(g.is_released());
        assert!(matches!(g.get("f"), Err(ResolveError::ResolutionsReleased)));
        assert!(matches!(
            g.add_module(&[], &[], 0, false),
            Err(ResolveError::ResolutionsReleased)
        ));
    }
}
