//! The requested-version grammar.
//!
//! A request names either a concrete semantic version (`v1.5.2`), one of
//! the labels `latest` or `master`, or a pseudo-version produced by the
//! proxy for untagged commits. Labels are resolved to concrete versions
//! by the proxy (or the standard-library source) during preflight.

use semver::Version;

/// The label resolved to the most recent release.
pub const LATEST: &str = "latest";

/// The label resolved to the tip of the default branch.
pub const MASTER: &str = "master";

/// Parse a Go-style version string (`v` prefix required) into a semver.
#[must_use]
pub fn parse(version: &str) -> Option<Version> {
    let rest = version.strip_prefix('v')?;
    Version::parse(rest).ok()
}

/// Whether `version` is a canonical semantic version string.
#[must_use]
pub fn is_canonical(version: &str) -> bool {
    parse(version).is_some()
}

/// Whether `requested` is syntactically acceptable for a fetch.
///
/// The coordinator rejects everything else with a 400 before any
/// upstream call is made.
#[must_use]
pub fn is_supported(requested: &str) -> bool {
    requested == LATEST || requested == MASTER || is_canonical(requested)
}
