//! Target abstraction.
//!
//! Resolution differs per target only in a handful of places: i386 decorates C
//! names with a leading underscore and has stdcall/fastcall suffixes, MinGW
//! links may import data automatically, and ARM64EC has paired mangled and
//! demangled function names. [`Target`] captures those capabilities once so
//! the symbol table can consult flags instead of re-deriving them.

use std::borrow::Cow;

use clap::ValueEnum;

use crate::config::ResolveConfig;

pub mod arm64ec;
pub mod x86;

/// Machine types the resolver knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Machine {
    I386,
    Amd64,
    Arm64,
    Arm64ec,
}

impl Machine {
    /// Pointer size in bytes.
    pub fn wordsize(self) -> u64 {
        match self {
            Machine::I386 => 4,
            Machine::Amd64 | Machine::Arm64 | Machine::Arm64ec => 8,
        }
    }
}

/// Target capabilities, fixed for the lifetime of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub machine: Machine,
    pub mingw: bool,
    pub auto_import: bool,
    pub stdcall_fixup: bool,
    pub warn_stdcall_fixup: bool,
    pub kill_at: bool,
}

impl Target {
    pub fn new(machine: Machine, config: &ResolveConfig) -> Self {
        Self {
            machine,
            mingw: config.mingw,
            auto_import: config.auto_import,
            // Only meaningful where names are decorated.
            stdcall_fixup: config.stdcall_fixup && machine == Machine::I386,
            warn_stdcall_fixup: config.warn_stdcall_fixup,
            kill_at: config.kill_at && machine == Machine::I386,
        }
    }

    /// Plain target with every optional behavior off.
    pub fn plain(machine: Machine) -> Self {
        Self::new(machine, &ResolveConfig::default())
    }

    pub fn is_i386(&self) -> bool {
        self.machine == Machine::I386
    }

    pub fn is_ec(&self) -> bool {
        self.machine == Machine::Arm64ec
    }

    /// C names get a leading underscore on i386.
    pub fn mangle<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.is_i386() {
            Cow::Owned(format!("_{name}"))
        } else {
            Cow::Borrowed(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_i386_prefixes_underscore() {
        assert_eq!(Target::plain(Machine::I386).mangle("main"), "_main");
        assert_eq!(Target::plain(Machine::Amd64).mangle("main"), "main");
    }

    #[test]
    fn decoration_fixups_are_i386_only() {
        let config = ResolveConfig {
            stdcall_fixup: true,
            kill_at: true,
            ..ResolveConfig::default()
        };
        let x86 = Target::new(Machine::I386, &config);
        assert!(x86.stdcall_fixup && x86.kill_at);
        let x64 = Target::new(Machine::Amd64, &config);
        assert!(!x64.stdcall_fixup && !x64.kill_at);
    }
}
