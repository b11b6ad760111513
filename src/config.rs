//! Configuration recognised by the ingestion core.
//!
//! Everything here is injected: the pipeline threads a [`Limits`] value
//! through instead of consulting globals, so tests can tighten a bound
//! without touching process state.

use core::time::Duration;
use url::Url;

/// Default upstream module proxy.
pub const DEFAULT_PROXY_URL: &str = "https://proxy.golang.org";

/// Bounded resources enforced during an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest uncompressed size of any single file read from a zip.
    pub max_file_size: u64,

    /// Largest module zip the preflight will accept.
    pub max_zip_size: u64,

    /// Largest number of package directories in one module.
    pub max_packages_per_module: usize,

    /// Largest number of imports a single package may declare.
    pub max_imports_per_package: usize,

    /// Byte budget for one package's rendered documentation HTML.
    pub max_documentation_html: usize,

    /// Largest number of candidate module paths tried per request.
    pub max_paths_to_fetch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 30 * 1024 * 1024,
            max_zip_size: 500 * 1024 * 1024,
            max_packages_per_module: 10_000,
            max_imports_per_package: 10_000,
            max_documentation_html: 20 * 1024 * 1024,
            max_paths_to_fetch: 7,
        }
    }
}

/// Configuration for the ingestion core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream module proxy.
    pub proxy_url: Url,

    /// Base URL used to construct source links, if any.
    pub source_url: Option<Url>,

    /// Timeout applied to each individual upstream call.
    pub source_timeout: Duration,

    /// Overall deadline for one on-demand fetch-and-poll.
    pub fetch_timeout: Duration,

    /// How often the coordinator re-reads the version map while waiting.
    pub poll_interval: Duration,

    /// Bounded resources.
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_url: Url::parse(DEFAULT_PROXY_URL).expect("default proxy URL is valid"),
            source_url: None,
            source_timeout: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(100),
            poll_interval: Duration::from_millis(250),
            limits: Limits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_file_size, 30 * 1024 * 1024);
        assert_eq!(limits.max_paths_to_fetch, 7);
        assert!(limits.max_zip_size > limits.max_file_size);
    }

    #[test]
    fn test_default_config_points_at_public_proxy() {
        let config = Config::default();
        assert_eq!(config.proxy_url.as_str(), "https://proxy.golang.org/");
        assert!(config.source_url.is_none());
    }
}
