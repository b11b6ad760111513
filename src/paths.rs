//! Module-path and import-path grammar checks.
//!
//! These mirror the rules the upstream proxy enforces: paths are
//! slash-separated, elements are non-empty, never `.` or `..`, never end
//! in a dot, and contain no characters that are unsafe in file names.
//! A module path additionally requires a domain-like first element.

use crate::error::{Error, ErrorKind};

/// Characters that may never appear in a path element.
const BAD_ELEMENT_CHARS: &[char] = &['\\', ':', '*', '<', '>', '?', '`', '\'', '"', '|'];

fn check_element(el: &str, path: &str) -> crate::Result<()> {
    if el.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed path {path:?}: empty path element"),
        ));
    }
    if el == "." || el == ".." {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed path {path:?}: relative path element {el:?}"),
        ));
    }
    if el.ends_with('.') {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed path {path:?}: trailing dot in path element {el:?}"),
        ));
    }
    for c in el.chars() {
        if c.is_control() || c == ' ' || BAD_ELEMENT_CHARS.contains(&c) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("malformed path {path:?}: invalid char {c:?}"),
            ));
        }
    }
    Ok(())
}

/// Check that `path` is a valid import path.
///
/// Import paths are what package directories resolve to; they share the
/// element grammar with module paths but have no domain requirement.
pub fn check_import_path(path: &str) -> crate::Result<()> {
    if path.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgument, "malformed path: empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed path {path:?}: leading or trailing slash"),
        ));
    }
    for el in path.split('/') {
        check_element(el, path)?;
    }
    Ok(())
}

/// Check that `path` is a valid module path.
///
/// On top of the import-path grammar, the first element must look like a
/// host name: it contains a dot and no uppercase letters. The reserved
/// standard-library identifier is accepted as-is.
pub fn check_module_path(path: &str) -> crate::Result<()> {
    if path == crate::stdlib::MODULE_PATH {
        return Ok(());
    }
    check_import_path(path)?;
    let first = path.split('/').next().unwrap_or_default();
    if !first.contains('.') || first.ends_with('.') {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed module path {path:?}: missing dot in first path element"),
        ));
    }
    if first.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("malformed module path {path:?}: invalid char in first path element"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_import_paths() {
        for p in [
            "github.com/module",
            "github.com/module/bar/foo",
            "my.module/foo",
            "std",
            "builtin",
            "github.com/UserName/Repo",
            "gopkg.in/yaml.v2",
        ] {
            assert!(check_import_path(p).is_ok(), "expected {p:?} to be valid");
        }
    }

    #[test]
    fn test_invalid_import_paths() {
        for p in [
            "",
            "/leading",
            "trailing/",
            "a//b",
            "a/./b",
            "a/../b",
            "a/b./c",
            "a/has space",
            "a/has\"quote",
            "a/has|pipe",
        ] {
            assert!(check_import_path(p).is_err(), "expected {p:?} to be invalid");
        }
    }

    #[test]
    fn test_module_path_requires_domainish_first_element() {
        assert!(check_module_path("github.com/module").is_ok());
        assert!(check_module_path("my.module/foo").is_ok());
        assert!(check_module_path("nodot/foo").is_err());
        assert!(check_module_path("Github.com/module").is_err());
    }

    #[test]
    fn test_std_is_a_valid_module_path() {
        assert!(check_module_path("std").is_ok());
    }

    #[test]
    fn test_errors_carry_invalid_argument_kind() {
        let err = check_import_path("a//b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
