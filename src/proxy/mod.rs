//! Client for the upstream module proxy.
//!
//! Speaks the standard module-proxy layout: `GET <base>/<escaped
//! module>/@v/<version>.info`, `.mod`, and `.zip`, `@latest` for the
//! latest-version label, `@v/list` for tagged versions, and a `HEAD` on
//! the `.zip` URL to learn the archive size without downloading it.
//! Upper-case letters in module paths are `!`-escaped per the protocol.

use core::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, ErrorKind};

const LOG_TARGET: &str = "     proxy";

/// Resolution of a version label by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    /// The concrete, canonical version.
    #[serde(rename = "Version")]
    pub version: String,

    /// Commit time of that version.
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

/// A module proxy client.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a client for the proxy at `base_url`. Every request is
    /// bounded by `timeout`.
    pub fn new(base_url: &Url, timeout: Duration) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("modsite/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::ProxyError, "proxy::Client::new", e))?;
        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Resolve `requested` for `module_path` via `.info` (or `@latest`).
    pub async fn info(&self, module_path: &str, requested: &str) -> crate::Result<VersionInfo> {
        let url = if requested == crate::version::LATEST {
            format!("{}/{}/@latest", self.base_url, escape_path(module_path)?)
        } else {
            self.versioned_url(module_path, requested, "info")?
        };
        let resp = self.get(&url, module_path).await?;
        resp.json::<VersionInfo>()
            .await
            .map_err(|e| classify_transport_error(e, format!("GetInfo({module_path:?}, {requested:?})")))
    }

    /// The tagged versions of a module, one per line, unordered.
    pub async fn list(&self, module_path: &str) -> crate::Result<Vec<String>> {
        let url = format!("{}/{}/@v/list", self.base_url, escape_path(module_path)?);
        let resp = self.get(&url, module_path).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| classify_transport_error(e, format!("List({module_path:?})")))?;
        Ok(body.lines().filter(|l| !l.is_empty()).map(ToString::to_string).collect())
    }

    /// The raw `go.mod` for a resolved version.
    pub async fn mod_file(&self, module_path: &str, resolved: &str) -> crate::Result<Vec<u8>> {
        let url = self.versioned_url(module_path, resolved, "mod")?;
        let resp = self.get(&url, module_path).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, format!("GetMod({module_path:?}, {resolved:?})")))?;
        Ok(bytes.to_vec())
    }

    /// Download the content zip for a resolved version.
    ///
    /// Refuses bodies larger than `max_zip_size`; the preflight HEAD
    /// should already have rejected these.
    pub async fn zip(&self, module_path: &str, resolved: &str, max_zip_size: u64) -> crate::Result<Vec<u8>> {
        let url = self.versioned_url(module_path, resolved, "zip")?;
        let resp = self.get(&url, module_path).await?;
        if let Some(length) = resp.content_length() {
            if length > max_zip_size {
                return Err(Error::new(
                    ErrorKind::BadModule,
                    format!("GetZip({module_path:?}, {resolved:?}): zip size {length} exceeds limit {max_zip_size}"),
                ));
            }
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, format!("GetZip({module_path:?}, {resolved:?})")))?;
        if bytes.len() as u64 > max_zip_size {
            return Err(Error::new(
                ErrorKind::BadModule,
                format!(
                    "GetZip({module_path:?}, {resolved:?}): zip size {} exceeds limit {max_zip_size}",
                    bytes.len()
                ),
            ));
        }
        Ok(bytes.to_vec())
    }

    /// Size of the content zip, from a HEAD request.
    pub async fn zip_size(&self, module_path: &str, resolved: &str) -> crate::Result<u64> {
        let url = self.versioned_url(module_path, resolved, "zip")?;
        log::debug!(target: LOG_TARGET, "HEAD {url}");
        let resp = self
            .http
            .head(&url)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, format!("GetZipSize({module_path:?}, {resolved:?})")))?;
        let resp = classify_response(resp, module_path)?;
        resp.content_length().ok_or_else(|| {
            Error::new(
                ErrorKind::ProxyError,
                format!("GetZipSize({module_path:?}, {resolved:?}): no content length"),
            )
        })
    }

    fn versioned_url(&self, module_path: &str, version: &str, suffix: &str) -> crate::Result<String> {
        Ok(format!(
            "{}/{}/@v/{}.{suffix}",
            self.base_url,
            escape_path(module_path)?,
            escape_version(version)
        ))
    }

    async fn get(&self, url: &str, module_path: &str) -> crate::Result<reqwest::Response> {
        log::debug!(target: LOG_TARGET, "GET {url}");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, format!("GET {url}")))?;
        classify_response(resp, module_path)
    }
}

/// Map an HTTP response to the taxonomy: 404/410 mean the module or
/// version does not exist, anything else non-2xx is a proxy error.
fn classify_response(resp: reqwest::Response, module_path: &str) -> crate::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    log::debug!(target: LOG_TARGET, "HTTP {status} for {module_path}");
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("module {module_path:?}: proxy returned {status}"),
        ));
    }
    Err(Error::new(
        ErrorKind::ProxyError,
        format!("module {module_path:?}: proxy returned {status}"),
    ))
}

fn classify_transport_error(e: reqwest::Error, context: String) -> Error {
    if e.is_timeout() {
        Error::with_source(ErrorKind::ProxyTimedOut, context, e)
    } else {
        Error::with_source(ErrorKind::ProxyError, context, e)
    }
}

/// Escape a module path for use in a proxy URL: every upper-case letter
/// is replaced by `!` and its lower-case form.
pub fn escape_path(module_path: &str) -> crate::Result<String> {
    crate::paths::check_import_path(module_path)?;
    Ok(escape_version(module_path))
}

/// Escape a version string the same way (versions share the rule).
#[must_use]
pub fn escape_version(version: &str) -> String {
    let mut out = String::with_capacity(version.len());
    for c in version.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("github.com/Azure/azure-sdk").unwrap(), "github.com/!azure/azure-sdk");
        assert_eq!(escape_path("github.com/module").unwrap(), "github.com/module");
        assert!(escape_path("bad//path").is_err());
    }

    #[test]
    fn test_escape_version() {
        assert_eq!(escape_version("v1.5.2"), "v1.5.2");
        assert_eq!(escape_version("v1.0.0-Beta"), "v1.0.0-!beta");
    }

    async fn client(server: &MockServer) -> Client {
        let base = Url::parse(&server.uri()).unwrap();
        Client::new(&base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/module/@v/v1.5.2.info"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"Version":"v1.5.2","Time":"2019-01-30T00:00:00Z"}"#),
            )
            .mount(&server)
            .await;

        let info = client(&server).await.info("github.com/module", "v1.5.2").await.unwrap();
        assert_eq!(info.version, "v1.5.2");
        assert_eq!(info.time.to_rfc3339(), "2019-01-30T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_info_latest_uses_latest_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/module/@latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"Version":"v1.6.0","Time":"2020-03-01T12:00:00Z"}"#),
            )
            .mount(&server)
            .await;

        let info = client(&server).await.info("github.com/module", "latest").await.unwrap();
        assert_eq!(info.version, "v1.6.0");
    }

    #[tokio::test]
    async fn test_info_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).await.info("github.com/nonexistent", "latest").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_info_server_error_is_proxy_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server).await.info("github.com/module", "latest").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProxyError);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_proxy_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let c = Client::new(&base, Duration::from_millis(50)).unwrap();
        let err = c.info("github.com/module", "latest").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProxyTimedOut);
    }

    #[tokio::test]
    async fn test_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/module/@v/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v1.0.0\nv1.5.2\n"))
            .mount(&server)
            .await;

        let versions = client(&server).await.list("github.com/module").await.unwrap();
        assert_eq!(versions, ["v1.0.0", "v1.5.2"]);
    }

    #[tokio::test]
    async fn test_mod_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/module/@v/v1.5.2.mod"))
            .respond_with(ResponseTemplate::new(200).set_body_string("module github.com/module\n"))
            .mount(&server)
            .await;

        let bytes = client(&server).await.mod_file("github.com/module", "v1.5.2").await.unwrap();
        assert_eq!(bytes, b"module github.com/module\n");
    }

    #[tokio::test]
    async fn test_zip_size_uses_head() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/github.com/module/@v/v1.5.2.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
            .mount(&server)
            .await;

        let size = client(&server).await.zip_size("github.com/module", "v1.5.2").await.unwrap();
        assert_eq!(size, 1024);
    }

    #[tokio::test]
    async fn test_zip_enforces_max_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/module/@v/v1.5.2.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .zip("github.com/module", "v1.5.2", 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadModule);
    }

    #[tokio::test]
    async fn test_escaped_path_in_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/!azure/sdk/@v/v1.0.0.mod"))
            .respond_with(ResponseTemplate::new(200).set_body_string("module github.com/Azure/sdk\n"))
            .mount(&server)
            .await;

        let bytes = client(&server).await.mod_file("github.com/Azure/sdk", "v1.0.0").await.unwrap();
        assert!(bytes.starts_with(b"module"));
    }
}
