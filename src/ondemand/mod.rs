//! The on-demand fetch-and-poll coordinator.
//!
//! Request handlers call [`fetch_and_poll`] when a path has no
//! ingested data yet: it computes the plausible module paths for the
//! request, kicks off one ingestion per candidate, and polls the
//! version map until a terminal row appears, collapsing site-internal
//! statuses to standard HTTP codes before returning.

use std::sync::Arc;

use tokio::time::{sleep, timeout};

use crate::config::Config;
use crate::datasource::DataSource;
use crate::error::{Error, ErrorKind, STATUS_OK};
use crate::fetch::{fetch_module, get_module_info};
use crate::model::VersionMap;
use crate::proxy;
use crate::version;

const LOG_TARGET: &str = "  ondemand";

/// Hosts whose repositories are always three path segments deep; a
/// request under one of them has exactly one candidate module path.
const VCS_HOSTS_WITH_THREE_ELEMENT_REPO_NAME: &[&str] = &["bitbucket.org", "github.com", "gitlab.com"];

/// HTTP status returned when no candidate reached a terminal status
/// before the caller's deadline.
pub const STATUS_REQUEST_TIMEOUT: u16 = 408;

/// The ordered, de-duplicated sequence of plausible module paths for a
/// user-facing full path: the path itself, then each parent, longest
/// first, clamped to the `max` most specific entries.
pub fn candidate_module_paths(full_path: &str, max: usize) -> crate::Result<Vec<String>> {
    crate::paths::check_import_path(full_path)?;
    let parts: Vec<&str> = full_path.split('/').collect();
    if let Some(host) = parts.first() {
        if VCS_HOSTS_WITH_THREE_ELEMENT_REPO_NAME.contains(host) {
            if parts.len() < 3 {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("invalid path {full_path:?}: {host} requires owner and repository"),
                ));
            }
            return Ok(vec![parts[..3].join("/")]);
        }
    }
    let mut candidates: Vec<String> = Vec::with_capacity(parts.len());
    for end in (1..=parts.len()).rev() {
        let candidate = parts[..end].join("/");
        if candidates.last() != Some(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates.truncate(max);
    Ok(candidates)
}

/// Trigger ingestion for a full path and wait for a terminal status.
///
/// Returns the user-facing HTTP status and a response message. Site
/// internal statuses never escape: OK-with-warnings becomes 200, and
/// bad or alternative modules become 404.
pub async fn fetch_and_poll(
    ds: Arc<dyn DataSource>,
    proxy_client: Arc<proxy::Client>,
    config: &Config,
    module_path: &str,
    full_path: &str,
    requested_version: &str,
) -> (u16, String) {
    if !version::is_supported(requested_version) {
        return (
            ErrorKind::InvalidArgument.status(),
            format!("{requested_version:?} is not a valid version"),
        );
    }

    // A terminal row for the exact coordinate short-circuits the fetch.
    match ds.get_version_map(module_path, requested_version).await {
        Ok(Some(entry)) => return respond(&entry, full_path),
        Ok(None) => {}
        Err(e) => {
            log::error!(target: LOG_TARGET, "GetVersionMap({module_path:?}, {requested_version:?}): {e}");
        }
    }

    let candidates = match candidate_module_paths(full_path, config.limits.max_paths_to_fetch) {
        Ok(candidates) => candidates,
        Err(e) => return (e.status(), e.to_string()),
    };
    log::info!(target: LOG_TARGET,
        "fetching {} candidate module paths for {full_path}@{requested_version}", candidates.len());

    for candidate in &candidates {
        let ds = Arc::clone(&ds);
        let proxy_client = Arc::clone(&proxy_client);
        let config = config.clone();
        let candidate = candidate.clone();
        let requested_version = requested_version.to_string();
        tokio::spawn(async move {
            fetch_and_update_state(ds, proxy_client, &config, &candidate, &requested_version).await;
        });
    }

    let polled = timeout(
        config.fetch_timeout,
        poll_candidates(ds, &candidates, requested_version, config),
    )
    .await;
    match polled {
        Ok((status, message)) => (status, message),
        Err(_) => (
            STATUS_REQUEST_TIMEOUT,
            format!("fetch of {full_path}@{requested_version} did not complete in time"),
        ),
    }
}

/// Run one ingestion and record its terminal status in the version map.
pub async fn fetch_and_update_state(
    ds: Arc<dyn DataSource>,
    proxy_client: Arc<proxy::Client>,
    config: &Config,
    module_path: &str,
    requested_version: &str,
) -> u16 {
    let excluded = match ds.is_excluded(module_path).await {
        Ok(excluded) => excluded,
        Err(e) => {
            log::error!(target: LOG_TARGET, "IsExcluded({module_path:?}): {e}");
            false
        }
    };
    if excluded {
        let status = ErrorKind::Excluded.status();
        record(
            &*ds,
            &VersionMap {
                module_path: module_path.to_string(),
                requested_version: requested_version.to_string(),
                resolved_version: None,
                status,
                error: Some("path matches an excluded prefix".to_string()),
            },
        )
        .await;
        return status;
    }

    let mi = get_module_info(&proxy_client, module_path, requested_version, &config.limits).await;
    let resolved_version = if mi.resolved_version.is_empty() {
        None
    } else {
        Some(mi.resolved_version.clone())
    };
    let fr = fetch_module(mi, &proxy_client, config).await;

    if let Some(module) = &fr.module {
        if fr.error.is_none() {
            if let Err(e) = ds.insert_module(module).await {
                log::error!(target: LOG_TARGET, "InsertModule({module_path:?}): {e}");
                let status = e.status();
                record(
                    &*ds,
                    &VersionMap {
                        module_path: module_path.to_string(),
                        requested_version: requested_version.to_string(),
                        resolved_version,
                        status,
                        error: Some(e.to_string()),
                    },
                )
                .await;
                return status;
            }
        }
    }

    record(
        &*ds,
        &VersionMap {
            module_path: module_path.to_string(),
            requested_version: requested_version.to_string(),
            resolved_version: fr.resolved_version.clone().or(resolved_version),
            status: fr.status,
            error: fr.error.as_ref().map(ToString::to_string),
        },
    )
    .await;
    fr.status
}

async fn record(ds: &dyn DataSource, entry: &VersionMap) {
    log::info!(target: LOG_TARGET,
        "recording status {} for {}@{}", entry.status, entry.module_path, entry.requested_version);
    if let Err(e) = ds.upsert_version_map(entry).await {
        log::error!(target: LOG_TARGET,
            "UpsertVersionMap({:?}, {:?}): {e}", entry.module_path, entry.requested_version);
    }
}

/// Poll the version map until a candidate succeeds or all candidates
/// reach a terminal status. Candidates are examined longest-first, so
/// the most specific result wins deterministically.
async fn poll_candidates(
    ds: Arc<dyn DataSource>,
    candidates: &[String],
    requested_version: &str,
    config: &Config,
) -> (u16, String) {
    loop {
        let mut entries = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match ds.get_version_map(candidate, requested_version).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    log::error!(target: LOG_TARGET, "GetVersionMap({candidate:?}): {e}");
                    entries.push(None);
                }
            }
        }
        for (candidate, entry) in candidates.iter().zip(&entries) {
            if let Some(entry) = entry {
                if entry.status == STATUS_OK || entry.status == ErrorKind::HasIncompletePackages.status() {
                    return respond(entry, candidate);
                }
            }
        }
        if entries.iter().all(Option::is_some) {
            // Everything terminal and nothing OK: report the most
            // specific candidate's outcome.
            let entry = entries[0].as_ref().expect("checked above");
            return respond(entry, &candidates[0]);
        }
        sleep(config.poll_interval).await;
    }
}

/// Map a version-map row to the user-facing status and message.
fn respond(entry: &VersionMap, path: &str) -> (u16, String) {
    let status = collapse_status(entry.status);
    let message = match status {
        STATUS_OK => format!("fetched {path}@{}", entry.resolved_version.as_deref().unwrap_or("?")),
        404 => format!("{path:?} could not be found"),
        408 => format!("fetching {path:?} timed out"),
        400 => entry.error.clone().unwrap_or_else(|| format!("bad request for {path:?}")),
        _ => format!("error fetching {path:?}"),
    };
    (status, message)
}

/// Collapse a persisted status to one a user may see: OK-with-warnings
/// reads as success; bad, alternative, and excluded modules read as
/// not found.
#[must_use]
pub fn collapse_status(status: u16) -> u16 {
    match status {
        s if s == STATUS_OK => STATUS_OK,
        s if s == ErrorKind::HasIncompletePackages.status() => STATUS_OK,
        s if s == ErrorKind::BadModule.status()
            || s == ErrorKind::AlternativeModule.status()
            || s == ErrorKind::Excluded.status()
            || s == ErrorKind::NotFound.status() =>
        {
            404
        }
        s if s == ErrorKind::InvalidArgument.status() => 400,
        s if s == ErrorKind::ProxyTimedOut.status() => STATUS_REQUEST_TIMEOUT,
        _ => 500,
    }
}
