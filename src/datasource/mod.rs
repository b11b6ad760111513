//! The database contract consumed by the ingestion core.
//!
//! The persistent store itself lives outside this crate; the core only
//! needs the five operations below. [`InMemoryDataSource`] backs tests
//! and the CLI, and doubles as the reference semantics for the
//! contract: version-map rows upsert by `(module path, requested
//! version)` and are observed in commit order.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, ErrorKind};
use crate::model::{Module, VersionMap};

const LOG_TARGET: &str = "datasource";

/// Operations the ingestion core performs against the database.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Persist a complete module with its units, packages, and licenses.
    async fn insert_module(&self, module: &Module) -> crate::Result<()>;

    /// Atomically set the status for the entry's `(module path,
    /// requested version)` pair.
    async fn upsert_version_map(&self, entry: &VersionMap) -> crate::Result<()>;

    /// Read the current status for a pair, if any was recorded.
    async fn get_version_map(&self, module_path: &str, requested_version: &str) -> crate::Result<Option<VersionMap>>;

    /// Whether the path falls under an excluded prefix.
    async fn is_excluded(&self, path: &str) -> crate::Result<bool>;

    /// Record an excluded prefix. Testing and admin tooling only.
    async fn insert_excluded_prefix(&self, prefix: &str, user: &str, reason: &str) -> crate::Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    modules: Vec<Module>,
    version_maps: Vec<VersionMap>,
    excluded_prefixes: Vec<ExcludedPrefix>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExcludedPrefix {
    prefix: String,
    user: String,
    reason: String,
}

/// An in-memory [`DataSource`].
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    tables: RwLock<Tables>,
}

impl InMemoryDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The modules inserted so far, in insertion order.
    pub async fn modules(&self) -> Vec<Module> {
        self.tables.read().await.modules.clone()
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn insert_module(&self, module: &Module) -> crate::Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .modules
            .retain(|m| !(m.module_info.module_path == module.module_info.module_path
                && m.module_info.version == module.module_info.version));
        tables.modules.push(module.clone());
        Ok(())
    }

    async fn upsert_version_map(&self, entry: &VersionMap) -> crate::Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .version_maps
            .retain(|vm| !(vm.module_path == entry.module_path && vm.requested_version == entry.requested_version));
        tables.version_maps.push(entry.clone());
        Ok(())
    }

    async fn get_version_map(&self, module_path: &str, requested_version: &str) -> crate::Result<Option<VersionMap>> {
        let tables = self.tables.read().await;
        Ok(tables
            .version_maps
            .iter()
            .find(|vm| vm.module_path == module_path && vm.requested_version == requested_version)
            .cloned())
    }

    async fn is_excluded(&self, path: &str) -> crate::Result<bool> {
        let tables = self.tables.read().await;
        for excluded in &tables.excluded_prefixes {
            if path.starts_with(&excluded.prefix) {
                log::info!(target: LOG_TARGET, "path {:?} matched excluded prefix {:?}", path, excluded.prefix);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_excluded_prefix(&self, prefix: &str, user: &str, reason: &str) -> crate::Result<()> {
        if prefix.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "InsertExcludedPrefix: empty prefix",
            ));
        }
        let mut tables = self.tables.write().await;
        tables.excluded_prefixes.push(ExcludedPrefix {
            prefix: prefix.to_string(),
            user: user.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_map(module_path: &str, status: u16) -> VersionMap {
        VersionMap {
            module_path: module_path.to_string(),
            requested_version: "latest".to_string(),
            resolved_version: Some("v1.5.2".to_string()),
            status,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_version_map_upsert_replaces() {
        let ds = InMemoryDataSource::new();
        ds.upsert_version_map(&version_map("github.com/module", 500)).await.unwrap();
        ds.upsert_version_map(&version_map("github.com/module", 200)).await.unwrap();

        let vm = ds.get_version_map("github.com/module", "latest").await.unwrap().unwrap();
        assert_eq!(vm.status, 200);
    }

    #[tokio::test]
    async fn test_version_map_keyed_by_requested_version() {
        let ds = InMemoryDataSource::new();
        ds.upsert_version_map(&version_map("github.com/module", 200)).await.unwrap();

        assert!(ds.get_version_map("github.com/module", "v1.5.2").await.unwrap().is_none());
        assert!(ds.get_version_map("github.com/other", "latest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_excluded_prefix_matching() {
        let ds = InMemoryDataSource::new();
        ds.insert_excluded_prefix("github.com/bad", "admin", "spam").await.unwrap();

        assert!(ds.is_excluded("github.com/bad").await.unwrap());
        assert!(ds.is_excluded("github.com/bad/sub/pkg").await.unwrap());
        assert!(!ds.is_excluded("github.com/module").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_excluded_prefix_rejected() {
        let ds = InMemoryDataSource::new();
        let err = ds.insert_excluded_prefix("", "admin", "oops").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
