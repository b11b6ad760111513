//! License detection and redistributability policy.
//!
//! The detector walks a module zip for license-candidate files,
//! classifies each by matching normalized text against known license
//! signatures, and answers the two questions the site cares about: may
//! the module root be redistributed, and which licenses govern a given
//! directory. A directory is governed by the union of the licenses in
//! that directory and every ancestor up to the module root.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::{module_version_dir, ModuleArchive};
use crate::config::Limits;

const LOG_TARGET: &str = "  licenses";

/// License types whose terms permit redistribution on the site.
pub const REDISTRIBUTABLE_TYPES: &[&str] = &[
    "Apache-2.0",
    "BSD-2-Clause",
    "BSD-3-Clause",
    "CC0-1.0",
    "ISC",
    "MIT",
    "MPL-2.0",
    "Unlicense",
    "Zlib",
];

/// Classification assigned when no signature matches.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Identity of a detected license file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseMetadata {
    /// Detected license types, e.g. `["MIT"]`. Never empty.
    pub types: Vec<String>,
    /// Path of the license file relative to the module root.
    pub file_path: String,
}

/// A detected license file with its full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub metadata: LicenseMetadata,
    pub contents: String,
}

impl License {
    /// Whether every detected type is on the allow-list.
    #[must_use]
    pub fn is_redistributable(&self) -> bool {
        !self.metadata.types.is_empty()
            && self
                .metadata
                .types
                .iter()
                .all(|t| REDISTRIBUTABLE_TYPES.contains(&t.as_str()))
    }

    /// Directory of the license file, `"."` for the module root.
    #[must_use]
    pub fn dir(&self) -> &str {
        match self.metadata.file_path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        }
    }
}

/// Scans a module zip for licenses and answers policy queries.
#[derive(Debug)]
pub struct Detector {
    licenses: Vec<License>,
    /// Directory path → indices into `licenses`, sorted for determinism.
    by_dir: BTreeMap<String, Vec<usize>>,
}

impl Detector {
    /// Walk the archive for license files and classify each one.
    ///
    /// Unreadable or oversized candidates are logged and skipped; a
    /// missing license is a policy outcome, not an error.
    #[must_use]
    pub fn new(module_path: &str, version: &str, archive: &mut ModuleArchive, limits: &Limits) -> Self {
        let prefix = module_version_dir(module_path, version) + "/";
        let mut candidates = Vec::new();
        for entry in archive.entries() {
            if entry.is_dir || !entry.name.starts_with(&prefix) {
                continue;
            }
            let inner = &entry.name[prefix.len()..];
            let base = inner.rsplit('/').next().unwrap_or(inner);
            if !is_license_file_name(base) {
                continue;
            }
            if entry.uncompressed_size > limits.max_file_size {
                log::warn!(target: LOG_TARGET,
                    "skipping license candidate {:?}: size {} exceeds limit {}",
                    entry.name, entry.uncompressed_size, limits.max_file_size);
                continue;
            }
            candidates.push((entry.index(), inner.to_string()));
        }

        let mut licenses = Vec::new();
        let mut by_dir: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, file_path) in candidates {
            let bytes = match archive.read(index, limits.max_file_size) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "skipping license candidate {file_path:?}: {e}");
                    continue;
                }
            };
            let contents = String::from_utf8_lossy(&bytes).into_owned();
            let types = classify(&contents);
            log::debug!(target: LOG_TARGET, "classified {file_path:?} as {types:?}");
            let license = License {
                metadata: LicenseMetadata { types, file_path },
                contents,
            };
            by_dir.entry(license.dir().to_string()).or_default().push(licenses.len());
            licenses.push(license);
        }
        Self { licenses, by_dir }
    }

    /// Every license found anywhere in the module.
    #[must_use]
    pub fn all_licenses(&self) -> &[License] {
        &self.licenses
    }

    /// Whether the licenses applicable at the module root are all
    /// redistributable. No license at the root means no.
    #[must_use]
    pub fn module_is_redistributable(&self) -> bool {
        let (redistributable, applicable) = self.package_info(".");
        redistributable && !applicable.is_empty()
    }

    /// The redistributability verdict and applicable licenses for a
    /// directory inside the module (`"."` for the root).
    ///
    /// Applicable means: in this directory or any ancestor up to the
    /// root. Redistributable means: that set is non-empty and every
    /// member permits redistribution.
    #[must_use]
    pub fn package_info(&self, inner_path: &str) -> (bool, Vec<&License>) {
        let mut applicable = Vec::new();
        for (dir, indices) in &self.by_dir {
            if governs(dir, inner_path) {
                applicable.extend(indices.iter().map(|&i| &self.licenses[i]));
            }
        }
        let redistributable = !applicable.is_empty() && applicable.iter().all(|l| l.is_redistributable());
        (redistributable, applicable)
    }
}

/// Whether a license in `dir` governs `inner_path`.
fn governs(dir: &str, inner_path: &str) -> bool {
    dir == "."
        || dir == inner_path
        || (inner_path.len() > dir.len() && inner_path.starts_with(dir) && inner_path.as_bytes()[dir.len()] == b'/')
}

/// Whether `base` is a file name that commonly holds a license.
#[must_use]
pub fn is_license_file_name(base: &str) -> bool {
    let lowered = base.to_ascii_lowercase();
    let stem = lowered
        .strip_suffix(".md")
        .or_else(|| lowered.strip_suffix(".txt"))
        .or_else(|| lowered.strip_suffix(".markdown"))
        .unwrap_or(&lowered);
    matches!(stem, "license" | "licence" | "copying" | "unlicense")
}

/// Normalized-signature classification of a license text.
///
/// Returns every matching type; `UNKNOWN` when nothing matches. The
/// signatures are distinctive phrases, checked against a lowercased,
/// whitespace-collapsed copy of the text.
#[must_use]
pub fn classify(contents: &str) -> Vec<String> {
    let normalized = normalize(contents);
    let mut types = Vec::new();

    // Copyleft families first; their preambles quote permissive phrases.
    if normalized.contains("gnu affero general public license") {
        types.push("AGPL-3.0".to_string());
    } else if normalized.contains("gnu lesser general public license") {
        types.push("LGPL-3.0".to_string());
    } else if normalized.contains("gnu general public license") {
        types.push("GPL-3.0".to_string());
    }

    if normalized.contains("apache license") && normalized.contains("version 2.0") {
        types.push("Apache-2.0".to_string());
    }
    if normalized.contains("permission is hereby granted, free of charge") && normalized.contains("without restriction") {
        types.push("MIT".to_string());
    }
    if normalized.contains("redistribution and use in source and binary forms") {
        if normalized.contains("neither the name") {
            types.push("BSD-3-Clause".to_string());
        } else {
            types.push("BSD-2-Clause".to_string());
        }
    }
    if normalized.contains("permission to use, copy, modify, and/or distribute this software") {
        types.push("ISC".to_string());
    }
    if normalized.contains("mozilla public license") && normalized.contains("2.0") {
        types.push("MPL-2.0".to_string());
    }
    if normalized.contains("this is free and unencumbered software released into the public domain") {
        types.push("Unlicense".to_string());
    }
    if normalized.contains("cc0 1.0") || normalized.contains("creative commons zero") {
        types.push("CC0-1.0".to_string());
    }
    if normalized.contains("this software is provided 'as-is'") && normalized.contains("zlib") {
        types.push("Zlib".to_string());
    }

    if types.is_empty() {
        types.push(UNKNOWN_TYPE.to_string());
    }
    types
}

fn normalize(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut last_was_space = false;
    for c in contents.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.extend(c.to_lowercase());
            last_was_space = false;
        }
    }
    out
}
