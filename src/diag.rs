//! Deferred link diagnostics.
//!
//! Unresolved and duplicate symbols do not abort resolution. They are
//! collected here and the link fails at a single checkpoint,
//! [`Diagnostics::check`], so one run reports every problem at once.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::ResolveError;
use crate::input::{FileKind, InputFile};
use crate::symbol::{FileId, SymbolId};

/// Maximum number of reference locations shown per undefined symbol.
pub const MAX_UNDEF_REFERENCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Warning => f.write_str("warning"),
            Level::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

/// Everything reported during a link, in report order.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Warning => tracing::debug!(%message, "warning reported"),
            Level::Error => tracing::debug!(%message, "error reported"),
        }
        self.entries.push(Diagnostic { level, message });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(Level::Error, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.report(Level::Warning, message);
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.level == Level::Error).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Warning)
    }

    /// Fail if any error has been reported.
    pub fn check(&self) -> Result<(), ResolveError> {
        match self.error_count() {
            0 => Ok(()),
            n => Err(ResolveError::Failed(n)),
        }
    }
}

/// All references to one undefined symbol, as `(file, symbol index)` pairs.
#[derive(Debug, Clone)]
pub struct UndefinedDiag {
    pub sym: SymbolId,
    pub files: Vec<(FileId, u32)>,
}

/// Groups unresolved references by symbol, keeping first-seen order.
#[derive(Debug, Default)]
pub struct UndefinedAggregator {
    diags: Vec<UndefinedDiag>,
    first: FxHashMap<SymbolId, usize>,
}

impl UndefinedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sym: SymbolId, file: FileId, index: u32) {
        match self.first.get(&sym) {
            Some(&slot) => self.diags[slot].files.push((file, index)),
            None => {
                self.first.insert(sym, self.diags.len());
                self.diags.push(UndefinedDiag {
                    sym,
                    files: vec![(file, index)],
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// Render the reference list of every recorded symbol.
    ///
    /// `locate(file, index, max)` returns at most `max` location lines for
    /// one file together with the total number of locations it found.
    pub fn flush<F>(self, mut locate: F) -> Vec<(SymbolId, String)>
    where
        F: FnMut(FileId, u32, usize) -> (Vec<String>, usize),
    {
        let mut out = Vec::with_capacity(self.diags.len());
        for diag in self.diags {
            let mut body = String::new();
            let mut displayed = 0;
            let mut total = 0;
            for (file, index) in diag.files {
                let (lines, found) = locate(file, index, MAX_UNDEF_REFERENCES - displayed);
                total += found;
                displayed += lines.len();
                for line in lines {
                    body.push_str(&line);
                }
            }
            if displayed < total {
                body.push_str(&format!("\n>>> referenced {} more times", total - displayed));
            }
            out.push((diag.sym, body));
        }
        out
    }
}

/// Reference line for a bitcode module, which has no relocations to point at.
pub fn bitcode_reference(file: &InputFile) -> String {
    let mut res = String::from("\n>>> referenced by ");
    if let FileKind::Bitcode { info, .. } = &file.kind {
        if !info.source_name.is_empty() {
            res.push_str(&info.source_name);
            res.push_str("\n>>>               ");
        }
    }
    res.push_str(&file.name);
    res
}

/// Reference line for a relocation inside `containing`, if known.
pub fn object_reference(file: &InputFile, containing: Option<&str>) -> String {
    match containing {
        Some(sym) => format!("\n>>> referenced by {}:({sym})", file.name),
        None => format!("\n>>> referenced by {}", file.name),
    }
}

/// The "defined at" line of a duplicate symbol report.
pub fn defined_at(file: Option<&InputFile>) -> String {
    let Some(file) = file else {
        return String::new();
    };
    let mut res = String::from("\n>>> defined at ");
    if let FileKind::Bitcode { info, .. } = &file.kind {
        if !info.source_name.is_empty() {
            res.push_str(&info.source_name);
            res.push_str("\n>>>            ");
        }
    }
    res.push_str(&file.name);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::BitcodeInfo;
    use cranelift_entity::EntityRef;

    #[test]
    fn check_counts_errors_only() {
        let mut diag = Diagnostics::new();
        diag.warn("just a warning");
        assert!(diag.check().is_ok());
        diag.error("first");
        diag.error("second");
        match diag.check() {
            Err(ResolveError::Failed(n)) => assert_eq!(n, 2),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(diag.warnings().count(), 1);
    }

    #[test]
    fn references_are_capped_and_counted() {
        let sym = SymbolId::new(0);
        let mut agg = UndefinedAggregator::new();
        for i in 0..5 {
            agg.record(sym, FileId::new(i), 0);
        }
        let reports = agg.flush(|file, _, max| {
            let lines = if max > 0 {
                vec![format!("\n>>> referenced by f{}", file.index())]
            } else {
                Vec::new()
            };
            (lines, 1)
        });
        assert_eq!(reports.len(), 1);
        let body = &reports[0].1;
        assert_eq!(body.matches(">>> referenced by").count(), 3);
        assert!(body.ends_with("\n>>> referenced 2 more times"));
    }

    #[test]
    fn records_group_by_symbol_in_first_seen_order() {
        let (a, b) = (SymbolId::new(1), SymbolId::new(0));
        let mut agg = UndefinedAggregator::new();
        agg.record(a, FileId::new(0), 3);
        agg.record(b, FileId::new(0), 4);
        agg.record(a, FileId::new(1), 7);
        let order: Vec<_> = agg.flush(|_, _, _| (Vec::new(), 0)).into_iter().map(|r| r.0).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn bitcode_locations_mention_source() {
        let file = InputFile::new(
            "foo.bc",
            FileKind::Bitcode {
                info: BitcodeInfo {
                    source_name: "foo.c".into(),
                    in_summary: false,
                },
                symbols: Vec::new(),
            },
        );
        assert_eq!(
            bitcode_reference(&file),
            "\n>>> referenced by foo.c\n>>>               foo.bc"
        );
        assert_eq!(defined_at(Some(&file)), "\n>>> defined at foo.c\n>>>            foo.bc");
        assert_eq!(defined_at(None), "");
    }
}
