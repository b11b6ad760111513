//! Read-limited access to a module content zip.
//!
//! The proxy protocol lays a module's files out under a single
//! `<module>@<version>/` directory inside the zip. This wrapper exposes
//! the entry table up front (phase 1 of package extraction looks at
//! metadata only) and enforces a byte limit on every content read.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{Error, ErrorKind};

/// Metadata for one zip entry, available without reading contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub uncompressed_size: u64,
    pub is_dir: bool,
    index: usize,
}

impl ArchiveEntry {
    /// Index used to read this entry's contents back.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

/// A module content zip held in memory.
#[derive(Debug)]
pub struct ModuleArchive {
    zip: ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<ArchiveEntry>,
}

impl ModuleArchive {
    /// Open a zip from its raw bytes.
    ///
    /// A byte stream that is not a zip is a `BadModule`: the proxy
    /// protocol admits no other container format.
    pub fn new(bytes: Vec<u8>) -> crate::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::with_source(ErrorKind::BadModule, "ModuleArchive::new", e))?;
        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let file = zip
                .by_index_raw(index)
                .map_err(|e| Error::with_source(ErrorKind::BadModule, "ModuleArchive::new", e))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                uncompressed_size: file.size(),
                is_dir: file.is_dir(),
                index,
            });
        }
        Ok(Self { zip, entries })
    }

    /// The entry table, in archive order.
    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Whether the archive contains a non-directory entry with `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| !e.is_dir && e.name == name)
    }

    /// Decompress one entry, reading at most `limit` bytes.
    ///
    /// Callers check `uncompressed_size` against their limit first; the
    /// cap here keeps a lying zip header from blowing the budget anyway.
    pub fn read(&mut self, index: usize, limit: u64) -> crate::Result<Vec<u8>> {
        let file = self
            .zip
            .by_index(index)
            .map_err(|e| Error::with_source(ErrorKind::BadModule, format!("readZipEntry({index})"), e))?;
        let name = file.name().to_string();
        let mut contents = Vec::new();
        file.take(limit)
            .read_to_end(&mut contents)
            .map_err(|e| Error::with_source(ErrorKind::BadModule, format!("readZipEntry({name:?})"), e))?;
        Ok(contents)
    }
}

/// The content subdirectory for a module version: `<module>@<version>`.
#[must_use]
pub fn module_version_dir(module_path: &str, version: &str) -> String {
    format!("{module_path}@{version}")
}
