//! i386 name decoration.
//!
//! cdecl names carry a leading `_`, stdcall names additionally carry an
//! `@<argbytes>` suffix, fastcall names look like `@name@<argbytes>` and
//! vectorcall names like `name@@<argbytes>`.

/// Drop the first character of `s` if it is one of `chars`.
pub fn ltrim1<'a>(s: &'a str, chars: &str) -> &'a str {
    match s.chars().next() {
        Some(c) if chars.contains(c) => &s[c.len_utf8()..],
        _ => s,
    }
}

/// The cdecl spelling of a possibly stdcall/fastcall/vectorcall decorated name.
///
/// `_foo@4`, `@foo@4` and `foo@@8` all become `_foo`.
pub fn cdecl_name(name: &str) -> String {
    let base = ltrim1(name, "_@");
    let base = match base.find('@') {
        Some(at) => &base[..at],
        None => base,
    };
    format!("_{base}")
}

/// Strip stdcall/fastcall suffixes (MinGW `--kill-at`).
///
/// With `prefix`, the result is given a leading underscore unless it already
/// has one; fastcall's leading `@` is always dropped.
pub fn kill_at(sym: &str, prefix: bool) -> String {
    if sym.is_empty() {
        return String::new();
    }
    let sym = match sym.get(1..).and_then(|rest| rest.find('@')) {
        Some(at) => &sym[..at + 1],
        None => sym,
    };
    if let Some(fastcall) = sym.strip_prefix('@') {
        return if prefix {
            format!("_{fastcall}")
        } else {
            fastcall.to_string()
        };
    }
    if prefix && !sym.starts_with('_') {
        return format!("_{sym}");
    }
    sym.to_string()
}

/// Whether a name in a module-definition file is already decorated and must
/// not receive an extra underscore.
pub fn is_decorated(sym: &str, mingw: bool) -> bool {
    sym.starts_with('@')
        || sym.contains("@@")
        || sym.starts_with('?')
        || (!mingw && sym.contains('@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorated_names_reduce_to_cdecl() {
        assert_eq!(cdecl_name("_foo@4"), "_foo");
        assert_eq!(cdecl_name("@foo@8"), "_foo");
        assert_eq!(cdecl_name("foo@@12"), "_foo");
        assert_eq!(cdecl_name("_bar"), "_bar");
    }

    #[test]
    fn kill_at_strips_suffixes() {
        assert_eq!(kill_at("_foo@4", true), "_foo");
        assert_eq!(kill_at("_foo@4", false), "_foo");
        assert_eq!(kill_at("foo@4", true), "_foo");
        assert_eq!(kill_at("@fast@8", true), "_fast");
        assert_eq!(kill_at("@fast@8", false), "fast");
        assert_eq!(kill_at("plain", false), "plain");
        assert_eq!(kill_at("", true), "");
    }

    #[test]
    fn decoration_depends_on_mode() {
        assert!(is_decorated("@fast@8", true));
        assert!(is_decorated("?cpp@@YAXXZ", true));
        assert!(is_decorated("foo@4", false));
        assert!(!is_decorated("foo@4", true));
        assert!(!is_decorated("foo", false));
    }
}
