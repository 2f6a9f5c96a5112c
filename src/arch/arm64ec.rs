//! ARM64EC function name pairing.
//!
//! An ARM64EC function is known under two names: the demangled (x64
//! compatible) name and a mangled one. C names are mangled by prefixing `#`;
//! MSVC C++ names get a `$$h` tag after the qualified name.

/// The mangled form of a demangled function name, or `None` if `name` is
/// already mangled.
pub fn mangled_function_name(name: &str) -> Option<String> {
    if !name.starts_with('?') {
        if name.starts_with('#') {
            return None;
        }
        return Some(format!("#{name}"));
    }
    if name.contains("$$h") {
        return None;
    }
    let insert_at = name.find("@@")? + 2;
    Some(format!("{}$$h{}", &name[..insert_at], &name[insert_at..]))
}

/// The demangled form of a mangled function name, or `None` if `name` is not
/// a mangled function name.
pub fn demangled_function_name(name: &str) -> Option<String> {
    if let Some(rest) = name.strip_prefix('#') {
        return Some(rest.to_string());
    }
    if !name.starts_with('?') {
        return None;
    }
    let (head, tail) = name.split_once("$$h")?;
    if tail.is_empty() {
        return None;
    }
    Some(format!("{head}{tail}"))
}

pub fn is_mangled_function_name(name: &str) -> bool {
    name.starts_with('#') || (name.starts_with('?') && name.contains("$$h"))
}

/// The other half of a mangled/demangled pair.
pub fn paired_name(name: &str) -> Option<String> {
    mangled_function_name(name).or_else(|| demangled_function_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_names_pair_with_hash_prefix() {
        assert_eq!(mangled_function_name("foo").as_deref(), Some("#foo"));
        assert_eq!(mangled_function_name("#foo"), None);
        assert_eq!(demangled_function_name("#foo").as_deref(), Some("foo"));
        assert_eq!(demangled_function_name("foo"), None);
    }

    #[test]
    fn cpp_names_pair_with_tag() {
        assert_eq!(
            mangled_function_name("?f@@YAXXZ").as_deref(),
            Some("?f@@$$hYAXXZ")
        );
        assert_eq!(
            demangled_function_name("?f@@$$hYAXXZ").as_deref(),
            Some("?f@@YAXXZ")
        );
        assert!(is_mangled_function_name("?f@@$$hYAXXZ"));
        assert!(!is_mangled_function_name("?f@@YAXXZ"));
    }

    #[test]
    fn pairing_is_symmetric() {
        assert_eq!(paired_name("#foo").as_deref(), Some("foo"));
        assert_eq!(paired_name("foo").as_deref(), Some("#foo"));
    }
}
