//! Module-definition (`.def`) files.
//!
//! Only the directives that matter to symbol resolution and image settings
//! are understood: `LIBRARY`/`NAME` (with `BASE=`), `EXPORTS`, `HEAPSIZE`,
//! `STACKSIZE` and `VERSION`. Anything after `;` on a line is a comment.

use std::path::Path;

use crate::arch::{x86, Target};
use crate::error::ResolveError;
use crate::export::{Export, ExportSource};

/// One entry of an `EXPORTS` block, before it becomes an [`Export`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortExport {
    pub name: String,
    pub ext_name: String,
    pub export_as: String,
    pub import_name: String,
    pub ordinal: u16,
    pub noname: bool,
    pub data: bool,
    pub private: bool,
    pub constant: bool,
}

/// Image settings and exports read from a module-definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDefinition {
    pub output_file: String,
    pub import_name: String,
    pub image_base: u64,
    pub stack_reserve: u64,
    pub stack_commit: u64,
    pub heap_reserve: u64,
    pub heap_commit: u64,
    pub major_image_version: u32,
    pub minor_image_version: u32,
    pub exports: Vec<ShortExport>,
}

impl ModuleDefinition {
    /// Convert the `EXPORTS` entries. `name=other.func` is a forwarder to
    /// another DLL rather than a rename.
    pub fn to_exports(&self) -> Vec<Export> {
        self.exports
            .iter()
            .map(|e1| {
                let mut e2 = Export::new("", ExportSource::ModuleDefinition);
                if !e1.ext_name.is_empty() && e1.ext_name != e1.name && e1.name.contains('.') {
                    e2.name = e1.ext_name.clone();
                    e2.forward_to = e1.name.clone();
                } else {
                    e2.name = e1.name.clone();
                    e2.ext_name = e1.ext_name.clone();
                }
                e2.export_as = e1.export_as.clone();
                e2.import_name = e1.import_name.clone();
                e2.ordinal = e1.ordinal;
                e2.noname = e1.noname;
                e2.data = e1.data;
                e2.is_private = e1.private;
                e2.constant = e1.constant;
                e2
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Eof,
    Identifier,
    Comma,
    Equal,
    EqualEqual,
    KwBase,
    KwConstant,
    KwData,
    KwExports,
    KwExportAs,
    KwHeapsize,
    KwLibrary,
    KwName,
    KwNoname,
    KwPrivate,
    KwStacksize,
    KwVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: Kind,
    value: String,
    line: usize,
}

struct Lexer<'a> {
    buf: &'a str,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(buf: &'a str) -> Self {
        Self { buf, line: 1 }
    }

    fn skip_blank(&mut self) {
        loop {
            let trimmed = self.buf.trim_start_matches(|c: char| c.is_whitespace() && c != '\n');
            if let Some(rest) = trimmed.strip_prefix('\n') {
                self.line += 1;
                self.buf = rest;
            } else if trimmed.starts_with(';') {
                let end = trimmed.find('\n').unwrap_or(trimmed.len());
                self.buf = &trimmed[end..];
            } else {
                self.buf = trimmed;
                return;
            }
        }
    }

    fn lex(&mut self) -> Token {
        self.skip_blank();
        let line = self.line;
        let token = |kind, value: &str| Token {
            kind,
            value: value.to_string(),
            line,
        };
        let Some(c) = self.buf.chars().next() else {
            return token(Kind::Eof, "");
        };
        match c {
            '=' => {
                if let Some(rest) = self.buf.strip_prefix("==") {
                    self.buf = rest;
                    return token(Kind::EqualEqual, "==");
                }
                self.buf = &self.buf[1..];
                token(Kind::Equal, "=")
            }
            ',' => {
                self.buf = &self.buf[1..];
                token(Kind::Comma, ",")
            }
            '"' => {
                let rest = &self.buf[1..];
                let end = rest.find('"').unwrap_or(rest.len());
                let value = &rest[..end];
                self.buf = rest.get(end + 1..).unwrap_or("");
                token(Kind::Identifier, value)
            }
            _ => {
                let end = self
                    .buf
                    .find(|c: char| "=,;\r\n \t\x0b".contains(c))
                    .unwrap_or(self.buf.len());
                let word = &self.buf[..end];
                self.buf = &self.buf[end..];
                let kind = match word {
                    "BASE" => Kind::KwBase,
                    "CONSTANT" => Kind::KwConstant,
                    "DATA" => Kind::KwData,
                    "EXPORTS" => Kind::KwExports,
                    "EXPORTAS" => Kind::KwExportAs,
                    "HEAPSIZE" => Kind::KwHeapsize,
                    "LIBRARY" => Kind::KwLibrary,
                    "NAME" => Kind::KwName,
                    "NONAME" => Kind::KwNoname,
                    "PRIVATE" => Kind::KwPrivate,
                    "STACKSIZE" => Kind::KwStacksize,
                    "VERSION" => Kind::KwVersion,
                    _ => Kind::Identifier,
                };
                token(kind, word)
            }
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    path: String,
    tok: Token,
    stack: Vec<Token>,
    add_underscores: bool,
    mingw: bool,
    info: ModuleDefinition,
}

impl<'a> Parser<'a> {
    fn read(&mut self) {
        self.tok = match self.stack.pop() {
            Some(tok) => tok,
            None => self.lexer.lex(),
        };
    }

    fn unget(&mut self) {
        self.stack.push(self.tok.clone());
    }

    fn error(&self, message: impl Into<String>) -> ResolveError {
        ResolveError::ModuleDefinition {
            path: self.path.clone(),
            line: self.tok.line,
            message: message.into(),
        }
    }

    fn parse(mut self) -> Result<ModuleDefinition, ResolveError> {
        loop {
            self.read();
            match self.tok.kind {
                Kind::Eof => return Ok(self.info),
                Kind::KwExports => loop {
                    self.read();
                    if self.tok.kind != Kind::Identifier {
                        self.unget();
                        break;
                    }
                    self.parse_export()?;
                },
                Kind::KwHeapsize => {
                    let (reserve, commit) = self.parse_numbers()?;
                    self.info.heap_reserve = reserve;
                    self.info.heap_commit = commit;
                }
                Kind::KwStacksize => {
                    let (reserve, commit) = self.parse_numbers()?;
                    self.info.stack_reserve = reserve;
                    self.info.stack_commit = commit;
                }
                Kind::KwLibrary | Kind::KwName => {
                    let is_dll = self.tok.kind == Kind::KwLibrary;
                    let (name, base) = self.parse_name()?;
                    self.info.image_base = base;
                    if self.info.output_file.is_empty() {
                        self.info.output_file = name.clone();
                        if Path::new(&name).extension().is_none() {
                            self.info.output_file.push_str(if is_dll { ".dll" } else { ".exe" });
                        }
                    }
                    self.info.import_name = name;
                }
                Kind::KwVersion => {
                    let (major, minor) = self.parse_version()?;
                    self.info.major_image_version = major;
                    self.info.minor_image_version = minor;
                }
                _ => return Err(self.error(format!("unknown directive: {}", self.tok.value))),
            }
        }
    }

    fn parse_export(&mut self) -> Result<(), ResolveError> {
        let mut e = ShortExport {
            name: self.tok.value.clone(),
            ..ShortExport::default()
        };
        self.read();
        if self.tok.kind == Kind::Equal {
            self.read();
            if self.tok.kind != Kind::Identifier {
                return Err(self.error(format!("identifier expected, but got {}", self.tok.value)));
            }
            e.ext_name = std::mem::take(&mut e.name);
            e.name = self.tok.value.clone();
        } else {
            self.unget();
        }

        if self.add_underscores {
            // Forward targets and already decorated names are left alone.
            if !x86::is_decorated(&e.name, self.mingw) && (e.ext_name.is_empty() || !e.name.contains('.')) {
                e.name.insert(0, '_');
            }
            if !e.ext_name.is_empty() && !x86::is_decorated(&e.ext_name, self.mingw) {
                e.ext_name.insert(0, '_');
            }
        }

        loop {
            self.read();
            if self.tok.kind == Kind::Identifier && self.tok.value.starts_with('@') {
                if self.tok.value == "@" {
                    // "foo @ 10"
                    self.read();
                    e.ordinal = self.tok.value.parse().unwrap_or(0);
                } else if let Ok(ord) = self.tok.value[1..].parse::<u16>() {
                    e.ordinal = ord;
                } else {
                    // A fastcall name starting the next export.
                    self.unget();
                    self.info.exports.push(e);
                    return Ok(());
                }
                self.read();
                if self.tok.kind == Kind::KwNoname {
                    e.noname = true;
                } else {
                    self.unget();
                }
                continue;
            }
            match self.tok.kind {
                Kind::KwData => e.data = true,
                Kind::KwConstant => e.constant = true,
                Kind::KwPrivate => e.private = true,
                Kind::EqualEqual => {
                    self.read();
                    e.export_as = self.tok.value.clone();
                }
                Kind::KwExportAs => {
                    self.read();
                    if self.tok.kind == Kind::Eof {
                        return Err(self.error("unexpected end of file, EXPORTAS identifier expected"));
                    }
                    e.export_as = self.tok.value.clone();
                }
                _ => {
                    self.unget();
                    self.info.exports.push(e);
                    return Ok(());
                }
            }
        }
    }

    fn parse_int<T: std::str::FromStr>(&self) -> Result<T, ResolveError> {
        if self.tok.kind != Kind::Identifier {
            return Err(self.error("integer expected"));
        }
        self.tok.value.parse().map_err(|_| self.error("integer expected"))
    }

    /// `reserve[,commit]`
    fn parse_numbers(&mut self) -> Result<(u64, u64), ResolveError> {
        self.read();
        let reserve = self.parse_int()?;
        self.read();
        if self.tok.kind != Kind::Comma {
            self.unget();
            return Ok((reserve, 0));
        }
        self.read();
        Ok((reserve, self.parse_int()?))
    }

    /// `[name] [BASE=address]`
    fn parse_name(&mut self) -> Result<(String, u64), ResolveError> {
        self.read();
        if self.tok.kind != Kind::Identifier {
            self.unget();
            return Ok((String::new(), 0));
        }
        let name = self.tok.value.clone();
        self.read();
        if self.tok.kind != Kind::KwBase {
            self.unget();
            return Ok((name, 0));
        }
        self.read();
        if self.tok.kind != Kind::Equal {
            return Err(self.error("'=' expected"));
        }
        self.read();
        Ok((name, self.parse_int()?))
    }

    /// `major[.minor]`
    fn parse_version(&mut self) -> Result<(u32, u32), ResolveError> {
        self.read();
        if self.tok.kind != Kind::Identifier {
            return Err(self.error(format!("identifier expected, but got {}", self.tok.value)));
        }
        let value = self.tok.value.as_str();
        let (major, minor) = value.split_once('.').unwrap_or((value, "0"));
        let major = major.parse().map_err(|_| self.error("integer expected"))?;
        let minor = minor.parse().map_err(|_| self.error("integer expected"))?;
        Ok((major, minor))
    }
}

/// Parse the text of a module-definition file. `path` is only used in errors.
pub fn parse(text: &str, path: &str, target: &Target) -> Result<ModuleDefinition, ResolveError> {
    let parser = Parser {
        lexer: Lexer::new(text),
        path: path.to_string(),
        tok: Token {
            kind: Kind::Eof,
            value: String::new(),
            line: 1,
        },
        stack: Vec::new(),
        add_underscores: target.is_i386(),
        mingw: target.mingw,
        info: ModuleDefinition::default(),
    };
    parser.parse()
}

/// Read and parse a module-definition file.
pub fn parse_file(path: &Path, target: &Target) -> Result<ModuleDefinition, ResolveError> {
    let bytes = std::fs::read(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    parse(&text, &path.display().to_string(), target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Machine;

    fn amd64() -> Target {
        Target::plain(Machine::Amd64)
    }

    #[test]
    fn parses_library_and_settings() {
        let text = "; comment\nLIBRARY foo BASE=268435456\nHEAPSIZE 4096,1024\nSTACKSIZE 65536\nVERSION 2.5\n";
        let def = parse(text, "foo.def", &amd64()).unwrap();
        assert_eq!(def.output_file, "foo.dll");
        assert_eq!(def.import_name, "foo");
        assert_eq!(def.image_base, 0x1000_0000);
        assert_eq!((def.heap_reserve, def.heap_commit), (4096, 1024));
        assert_eq!((def.stack_reserve, def.stack_commit), (65536, 0));
        assert_eq!((def.major_image_version, def.minor_image_version), (2, 5));
    }

    #[test]
    fn parses_export_entries() {
        let text = "NAME app.exe\nEXPORTS\n  foo @3 NONAME\n  bar=impl DATA\n  \"quoted\" PRIVATE\n  fwd=other.func\n  old ==new\n";
        let def = parse(text, "app.def", &amd64()).unwrap();
        assert_eq!(def.output_file, "app.exe");
        let e = &def.exports;
        assert_eq!(e.len(), 5);
        assert_eq!((e[0].name.as_str(), e[0].ordinal, e[0].noname), ("foo", 3, true));
        assert_eq!((e[1].ext_name.as_str(), e[1].name.as_str(), e[1].data), ("bar", "impl", true));
        assert!(e[2].private);
        assert_eq!(e[4].export_as, "new");

        let exports = def.to_exports();
        assert_eq!(exports[3].name, "fwd");
        assert_eq!(exports[3].forward_to, "other.func");
        assert!(exports.iter().all(|e| e.source == ExportSource::ModuleDefinition));
    }

    #[test]
    fn fastcall_name_after_export_starts_new_entry() {
        let def = parse("EXPORTS\nfoo\n@fast@8\n", "x.def", &amd64()).unwrap();
        let names: Vec<_> = def.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "@fast@8"]);
    }

    #[test]
    fn i386_names_get_underscore() {
        let target = Target::plain(Machine::I386);
        let def = parse("EXPORTS\nfoo\nbar@4\n?cpp@@YAXXZ\nalias=target\n", "x.def", &target).unwrap();
        let names: Vec<_> = def.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["_foo", "bar@4", "?cpp@@YAXXZ", "_target"]);
        assert_eq!(def.exports[3].ext_name, "_alias");
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse("LIBRARY foo\nBOGUS\n", "bad.def", &amd64()).unwrap_err();
        assert_eq!(err.to_string(), "bad.def:2: unknown directive: BOGUS");
        let err = parse("HEAPSIZE x\n", "bad.def", &amd64()).unwrap_err();
        assert_eq!(err.to_string(), "bad.def:1: integer expected");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = parse_file(Path::new("/nonexistent/x.def"), &amd64()).unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
    }
}
