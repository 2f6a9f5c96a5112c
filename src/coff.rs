//! Reading link inputs from disk.
//!
//! Files are identified by their magic: `!<arch>\n` archives, short import
//! members (`00 00 ff ff`), `MZ` images linked directly as DLLs, and anything
//! else as a COFF object. Only the global symbol view is extracted; section
//! contents never matter to resolution apart from `.drectve`.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use memmap2::Mmap;
use object::pe;
use object::read::archive::{ArchiveFile, ArchiveOffset};
use object::read::coff::{self, CoffFile, CoffHeader, ImageSymbol};
use object::{LittleEndian as LE, Object};
use rustc_hash::FxHashMap;

use crate::arch::Machine;
use crate::input::{
    ArchiveSymbol, ImportFile, ImportType, InputSymbol, Loader, LtoAttrs, ObjectFile, ParsedFile,
    RelocRef, SymbolDef,
};
use crate::symbol::MemberHandle;

const ARCHIVE_MAGIC: &[u8] = b"!<arch>\n";
const IMPORT_MAGIC: &[u8] = &[0, 0, 0xff, 0xff];
const BITCODE_MAGIC: &[u8] = b"BC\xc0\xde";

/// `IMAGE_WEAK_EXTERN_ANTI_DEPENDENCY`: an ARM64EC alias that is never
/// followed further than one hop.
const WEAK_EXTERN_ANTI_DEPENDENCY: u32 = 4;

/// Commons are aligned to their size rounded up to a power of two, capped
/// at this.
const MAX_COMMON_ALIGNMENT: u64 = 32;

fn common_alignment(size: u64) -> u32 {
    size.next_power_of_two().min(MAX_COMMON_ALIGNMENT) as u32
}

pub fn machine_from_coff(machine: u16) -> Option<Machine> {
    match machine {
        pe::IMAGE_FILE_MACHINE_I386 => Some(Machine::I386),
        pe::IMAGE_FILE_MACHINE_AMD64 => Some(Machine::Amd64),
        pe::IMAGE_FILE_MACHINE_ARM64 => Some(Machine::Arm64),
        pe::IMAGE_FILE_MACHINE_ARM64EC | pe::IMAGE_FILE_MACHINE_ARM64X => Some(Machine::Arm64ec),
        _ => None,
    }
}

/// Parse one input file. `name` is what diagnostics call it.
pub fn parse_bytes(name: &str, data: &[u8]) -> Result<ParsedFile> {
    if data.starts_with(ARCHIVE_MAGIC) {
        return parse_archive_index(name, data);
    }
    if data.starts_with(IMPORT_MAGIC) {
        return parse_import(name, data).map(ParsedFile::Import);
    }
    if data.starts_with(BITCODE_MAGIC) {
        bail!("{name}: bitcode files cannot be read from disk");
    }
    if data.starts_with(b"MZ") {
        return parse_dll(name, data);
    }
    parse_object(name, data).map(ParsedFile::Object)
}

fn parse_archive_index(name: &str, data: &[u8]) -> Result<ParsedFile> {
    let archive = ArchiveFile::parse(data).with_context(|| format!("{name}: malformed archive"))?;
    let mut symbols = Vec::new();
    if let Some(iter) = archive.symbols()? {
        for sym in iter {
            let sym = sym?;
            symbols.push(ArchiveSymbol {
                name: String::from_utf8_lossy(sym.name()).into_owned(),
                member: MemberHandle(sym.offset().0),
            });
        }
    } else {
        tracing::warn!(archive = name, "archive has no symbol index");
    }
    Ok(ParsedFile::Archive {
        name: name.to_string(),
        symbols,
    })
}

fn parse_import(name: &str, data: &[u8]) -> Result<ImportFile> {
    let file = coff::ImportFile::parse(data).with_context(|| format!("{name}: malformed import member"))?;
    let import_type = match file.import_type() {
        coff::ImportType::Code => ImportType::Code,
        coff::ImportType::Data => ImportType::Data,
        coff::ImportType::Const => ImportType::Const,
    };
    Ok(ImportFile {
        name: name.to_string(),
        symbol: String::from_utf8_lossy(file.symbol()).into_owned(),
        dll: String::from_utf8_lossy(file.dll()).into_owned(),
        import_type,
    })
}

fn parse_dll(name: &str, data: &[u8]) -> Result<ParsedFile> {
    let file = object::File::parse(data).with_context(|| format!("{name}: malformed image"))?;
    let exports = file
        .exports()?
        .iter()
        .map(|e| String::from_utf8_lossy(e.name()).into_owned())
        .collect();
    Ok(ParsedFile::Dll {
        name: name.to_string(),
        exports,
    })
}

/// Extract the global symbols, symbol relocations and directives of a COFF
/// object.
pub fn parse_object(name: &str, data: &[u8]) -> Result<ObjectFile> {
    let file: CoffFile = CoffFile::parse(data).with_context(|| format!("{name}: malformed object file"))?;
    let header = file.coff_header();
    let sections = file.coff_section_table();
    let symtab = file.coff_symbol_table();
    let strings = symtab.strings();

    let mut obj = ObjectFile::new(name);
    obj.machine = machine_from_coff(header.machine());

    for (index, section) in sections.iter().enumerate() {
        let section_number = index as u32 + 1;
        let section_name = section.name(strings)?;
        if section_name == b".drectve" {
            let bytes = section
                .coff_data(data)
                .map_err(|()| anyhow!("{name}: .drectve extends past end of file"))?;
            obj.directives
                .extend(split_directives(&String::from_utf8_lossy(bytes)));
            continue;
        }
        for reloc in section.coff_relocations(data)? {
            obj.relocs.push(RelocRef {
                symbol_index: reloc.symbol_table_index.get(LE),
                section: section_number,
                offset: u64::from(reloc.virtual_address.get(LE)),
            });
        }
    }

    for (index, sym) in symtab.iter() {
        if !is_external(sym.storage_class()) {
            continue;
        }
        let sym_name = String::from_utf8_lossy(sym.name(strings)?).into_owned();
        let section_number = sym.section_number();
        let def = if sym.storage_class() == pe::IMAGE_SYM_CLASS_WEAK_EXTERNAL {
            let aux = symtab
                .aux_weak_external(index)
                .with_context(|| format!("{name}: weak external {sym_name} has no aux record"))?;
            let alias = symtab.symbol(aux.default_symbol())?;
            SymbolDef::WeakExternal {
                alias: String::from_utf8_lossy(alias.name(strings)?).into_owned(),
                anti_dep: aux.weak_search_type.get(LE) == WEAK_EXTERN_ANTI_DEPENDENCY,
            }
        } else if section_number == pe::IMAGE_SYM_UNDEFINED {
            match u64::from(sym.value()) {
                0 => SymbolDef::Undefined,
                size => SymbolDef::Common {
                    size,
                    alignment: common_alignment(size),
                },
            }
        } else if section_number == pe::IMAGE_SYM_ABSOLUTE {
            SymbolDef::Absolute {
                value: u64::from(sym.value()),
            }
        } else if section_number > 0 {
            let section = section_number as u32;
            let value = u64::from(sym.value());
            let characteristics = sections
                .iter()
                .nth(section as usize - 1)
                .map_or(0, |s| s.characteristics.get(LE));
            if characteristics & pe::IMAGE_SCN_LNK_COMDAT != 0 {
                SymbolDef::Comdat { section, value }
            } else {
                SymbolDef::Regular {
                    section,
                    value,
                    weak: false,
                }
            }
        } else {
            // Debug symbols.
            continue;
        };
        obj.symbols.push(InputSymbol {
            index: index.0 as u32,
            name: sym_name,
            def,
            lto: LtoAttrs::default(),
        });
    }
    Ok(obj)
}

fn is_external(class: u8) -> bool {
    class == pe::IMAGE_SYM_CLASS_EXTERNAL || class == pe::IMAGE_SYM_CLASS_WEAK_EXTERNAL
}

/// Split a `.drectve` payload into options, honoring double quotes. Leading
/// `/` or `-` is kept so callers can tell options apart from stray words.
pub fn split_directives(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_word = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    out.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\0' => {}
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        out.push(current);
    }
    out
}

/// A [`Loader`] over memory-mapped archives.
#[derive(Default)]
pub struct CoffLoader {
    archives: FxHashMap<String, Mmap>,
}

impl CoffLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the archive mapped in `data` available under `name`.
    pub fn add_archive(&mut self, name: &str, data: Mmap) {
        self.archives.insert(name.to_string(), data);
    }
}

impl Loader for CoffLoader {
    fn load_member(&mut self, archive: &str, member: MemberHandle) -> Result<ParsedFile> {
        let data = self
            .archives
            .get(archive)
            .ok_or_else(|| anyhow!("{archive}: archive was not opened"))?;
        let file = ArchiveFile::parse(&**data)?;
        let m = file
            .member(ArchiveOffset(member.0))
            .with_context(|| format!("{archive}: no member at offset {}", member.0))?;
        let member_name = format!("{archive}({})", String::from_utf8_lossy(m.name()));
        let bytes = m.data(&**data)?;
        tracing::debug!(member = %member_name, "loading archive member");
        let parsed = parse_bytes(&member_name, bytes)?;
        if let ParsedFile::Archive { .. } = parsed {
            bail!("{member_name}: nested archives are not supported");
        }
        Ok(parsed)
    }
}

/// Memory-map `path`.
pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    // SAFETY: inputs are not expected to change while the link runs.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_split_on_whitespace_and_quotes() {
        assert_eq!(
            split_directives("  /EXPORT:foo  /alternatename:a=b\0\0"),
            vec!["/EXPORT:foo", "/alternatename:a=b"]
        );
        assert_eq!(
            split_directives("/include:\"with space\" -aligncomm:x,4"),
            vec!["/include:with space", "-aligncomm:x,4"]
        );
        assert!(split_directives("   ").is_empty());
    }

    #[test]
    fn machine_codes() {
        assert_eq!(machine_from_coff(pe::IMAGE_FILE_MACHINE_I386), Some(Machine::I386));
        assert_eq!(machine_from_coff(pe::IMAGE_FILE_MACHINE_ARM64EC), Some(Machine::Arm64ec));
        assert_eq!(machine_from_coff(0x1234), None);
    }

    #[test]
    fn bitcode_is_rejected() {
        let err = parse_bytes("a.bc", b"BC\xc0\xde\x00\x00").unwrap_err();
        assert!(err.to_string().contains("bitcode"));
    }

    #[test]
    fn common_alignment_follows_size() {
        assert_eq!(common_alignment(1), 1);
        assert_eq!(common_alignment(8), 8);
        assert_eq!(common_alignment(12), 16);
        assert_eq!(common_alignment(4096), 32);
    }

    fn push_symbol(data: &mut Vec<u8>, name: &[u8], value: u32, section: i16, class: u8, aux: u8) {
        let mut raw = [0u8; 8];
        raw[..name.len()].copy_from_slice(name);
        data.extend_from_slice(&raw);
        data.extend_from_slice(&value.to_le_bytes());
        data.extend_from_slice(&section.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.push(class);
        data.push(aux);
    }

    /// A minimal AMD64 object: one section, a defined `main`, an undefined
    /// `puts`, a weak external `w` defaulting to `main` and two commons.
    fn tiny_object() -> Vec<u8> {
        let mut data = Vec::new();
        let sym_count = 6u32;
        let section_offset = 20;
        let symtab_offset = section_offset + 40;
        // File header.
        data.extend_from_slice(&pe::IMAGE_FILE_MACHINE_AMD64.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(symtab_offset as u32).to_le_bytes());
        data.extend_from_slice(&sym_count.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        // Section header: .text, no data, no relocations.
        data.extend_from_slice(b".text\0\0\0");
        data.extend_from_slice(&[0u8; 28]);
        data.extend_from_slice(&pe::IMAGE_SCN_CNT_CODE.to_le_bytes());
        push_symbol(&mut data, b"main", 0, 1, pe::IMAGE_SYM_CLASS_EXTERNAL, 0);
        push_symbol(&mut data, b"puts", 0, 0, pe::IMAGE_SYM_CLASS_EXTERNAL, 0);
        push_symbol(&mut data, b"w", 0, 0, pe::IMAGE_SYM_CLASS_WEAK_EXTERNAL, 1);
        // Aux weak external: tag index 0, search type 3 (alias).
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 10]);
        push_symbol(&mut data, b"buf", 64, 0, pe::IMAGE_SYM_CLASS_EXTERNAL, 0);
        push_symbol(&mut data, b"flag", 6, 0, pe::IMAGE_SYM_CLASS_EXTERNAL, 0);
        // Empty string table.
        data.extend_from_slice(&4u32.to_le_bytes());
        data
    }

    #[test]
    fn reads_global_symbols() {
        let obj = parse_object("tiny.obj", &tiny_object()).unwrap();
        assert_eq!(obj.machine, Some(Machine::Amd64));
        let defs: Vec<_> = obj.symbols.iter().map(|s| (s.index, s.name.as_str(), s.def.clone())).collect();
        assert_eq!(
            defs,
            vec![
                (0, "main", SymbolDef::Regular { section: 1, value: 0, weak: false }),
                (1, "puts", SymbolDef::Undefined),
                (
                    2,
                    "w",
                    SymbolDef::WeakExternal {
                        alias: "main".to_string(),
                        anti_dep: false
                    }
                ),
                (4, "buf", SymbolDef::Common { size: 64, alignment: 32 }),
                (5, "flag", SymbolDef::Common { size: 6, alignment: 8 }),
            ]
        );
    }
}
