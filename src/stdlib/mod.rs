//! The synthetic standard-library module source.
//!
//! The standard library is served from an embedded source snapshot
//! rather than the proxy: version labels resolve against a fixed
//! release table, and the content zip is built in memory with the same
//! `<module>@<version>/` layout the proxy uses. The snapshot includes
//! the `builtin` package so its special documentation rules stay
//! exercisable end to end.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::archive::module_version_dir;
use crate::error::{Error, ErrorKind};

/// The reserved module path of the standard library.
pub const MODULE_PATH: &str = "std";

/// Known releases of the snapshot, newest last, with commit times.
const RELEASES: &[(&str, &str)] = &[
    ("v1.14.6", "2020-07-16T17:23:13Z"),
    ("v1.15.2", "2020-09-09T18:22:52Z"),
];

/// Files in the snapshot, relative to the repository root.
const FILES: &[(&str, &str)] = &[
    ("LICENSE", LICENSE),
    ("README.md", README),
    ("builtin/builtin.go", BUILTIN_GO),
    ("errors/errors.go", ERRORS_GO),
];

/// Resolve a requested version to a release in the snapshot table.
///
/// `latest` and `master` resolve to the newest release; `goX.Y[.Z]`
/// tags are accepted as aliases for their `vX.Y.Z` form.
pub fn resolve_version(requested: &str) -> crate::Result<String> {
    if requested == crate::version::LATEST || requested == crate::version::MASTER {
        let (newest, _) = RELEASES.last().ok_or_else(|| {
            Error::new(ErrorKind::Internal, "stdlib::resolve_version: empty release table")
        })?;
        return Ok((*newest).to_string());
    }
    let canonical = match requested.strip_prefix("go") {
        Some(tag) => {
            // go1.15 means v1.15.0.
            let mut parts = tag.split('.').count();
            let mut v = format!("v{tag}");
            while parts < 3 {
                v.push_str(".0");
                parts += 1;
            }
            v
        }
        None => requested.to_string(),
    };
    if RELEASES.iter().any(|(v, _)| *v == canonical) {
        Ok(canonical)
    } else {
        Err(Error::new(
            ErrorKind::NotFound,
            format!("stdlib::resolve_version({requested:?}): unknown version"),
        ))
    }
}

/// Resolved version and zip size for a requested standard-library
/// version, without handing the archive out yet.
pub fn zip_info(requested: &str) -> crate::Result<(String, u64)> {
    let resolved = resolve_version(requested)?;
    let bytes = build_zip(&resolved)?;
    Ok((resolved, bytes.len() as u64))
}

/// The content zip and commit time for a resolved version.
pub fn zip(resolved: &str) -> crate::Result<(Vec<u8>, DateTime<Utc>)> {
    let commit_time = RELEASES
        .iter()
        .find(|(v, _)| *v == resolved)
        .map(|(_, t)| t)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("stdlib::zip({resolved:?}): unknown version"),
            )
        })?;
    let commit_time = DateTime::parse_from_rfc3339(commit_time)
        .map_err(|e| Error::with_source(ErrorKind::Internal, format!("stdlib::zip({resolved:?})"), e))?
        .with_timezone(&Utc);
    Ok((build_zip(resolved)?, commit_time))
}

fn build_zip(resolved: &str) -> crate::Result<Vec<u8>> {
    let prefix = module_version_dir(MODULE_PATH, resolved);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents) in FILES {
        writer
            .start_file(format!("{prefix}/{path}"), SimpleFileOptions::default())
            .and_then(|()| writer.write_all(contents.as_bytes()).map_err(Into::into))
            .map_err(|e| Error::with_source(ErrorKind::Internal, format!("stdlib::build_zip({resolved:?})"), e))?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| Error::with_source(ErrorKind::Internal, format!("stdlib::build_zip({resolved:?})"), e))?;
    Ok(cursor.into_inner())
}

const LICENSE: &str = "Copyright (c) 2009 The Go Authors. All rights reserved.

Redistribution and use in source and binary forms, with or without
modification, are permitted provided that the following conditions are
met:

   * Redistributions of source code must retain the above copyright
notice, this list of conditions and the following disclaimer.
   * Neither the name of Google Inc. nor the names of its
contributors may be used to endorse or promote products derived from
this software without specific prior written permission.
";

const README: &str = "# The Go Programming Language

Go is an open source programming language that makes it easy to build
simple, reliable, and efficient software.
";

const BUILTIN_GO: &str = r#"// Package builtin provides documentation for Go's predeclared identifiers.
// The items documented here are not actually in package builtin
// but their descriptions here allow godoc to present documentation
// for the language's special identifiers.
package builtin

// bool is the set of boolean values, true and false.
type bool bool

// true and false are the two untyped boolean values.
const (
	true  = 0 == 0
	false = 0 != 0
)

// int is a signed integer type that is at least 32 bits in size.
type int int

// Type is here for the purposes of documentation only.
type Type int

// len returns the length of v, according to its type.
func len(v Type) int

// cap returns the capacity of v, according to its type.
func cap(v Type) int

// make allocates and initializes an object of type slice, map, or chan.
func make(t Type, size ...int) Type

// new allocates memory and returns a pointer to it.
func new(t Type) *Type
"#;

const ERRORS_GO: &str = r#"// Package errors implements functions to manipulate errors.
package errors

// New returns an error that formats as the given text.
func New(text string) error {
	return &errorString{text}
}

// errorString is a trivial implementation of error.
type errorString struct {
	s string
}

func (e *errorString) Error() string {
	return e.s
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ModuleArchive;

    #[test]
    fn test_resolve_latest_and_master() {
        assert_eq!(resolve_version("latest").unwrap(), "v1.15.2");
        assert_eq!(resolve_version("master").unwrap(), "v1.15.2");
    }

    #[test]
    fn test_resolve_go_tags() {
        assert_eq!(resolve_version("go1.14.6").unwrap(), "v1.14.6");
        assert!(resolve_version("go1.13").is_err());
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let err = resolve_version("v9.9.9").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_zip_layout() {
        let (bytes, commit_time) = zip("v1.15.2").unwrap();
        assert_eq!(commit_time.to_rfc3339(), "2020-09-09T18:22:52+00:00");
        let archive = ModuleArchive::new(bytes).unwrap();
        assert!(archive.contains("std@v1.15.2/builtin/builtin.go"));
        assert!(archive.contains("std@v1.15.2/LICENSE"));
        assert!(archive
            .entries()
            .iter()
            .all(|e| e.name.starts_with("std@v1.15.2/")));
    }

    #[test]
    fn test_zip_info_sizes_match() {
        let (resolved, size) = zip_info("latest").unwrap();
        let (bytes, _) = zip(&resolved).unwrap();
        assert_eq!(size, bytes.len() as u64);
    }
}
