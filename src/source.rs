//! Links from documentation back to upstream source.
//!
//! Built without contacting anything: well-known forges have predictable
//! browse URLs, and a configured source base covers everything else.

use serde::{Deserialize, Serialize};
use url::Url;

/// Where a module's source can be browsed, and at which ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    repo_url: String,
    commit_ref: String,
    /// URL templates, with `{path}`/`{line}` placeholders.
    file_template: String,
    line_template: String,
}

impl SourceInfo {
    /// URL of a file inside the module, relative to the module root.
    #[must_use]
    pub fn file_url(&self, path: &str) -> String {
        self.file_template
            .replace("{repo}", &self.repo_url)
            .replace("{ref}", &self.commit_ref)
            .replace("{path}", path)
    }

    /// URL of a specific line of a file inside the module.
    #[must_use]
    pub fn line_url(&self, path: &str, line: u32) -> String {
        self.line_template
            .replace("{repo}", &self.repo_url)
            .replace("{ref}", &self.commit_ref)
            .replace("{path}", path)
            .replace("{line}", &line.to_string())
    }

    /// The repository browse URL.
    #[must_use]
    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }
}

/// Derive source info for a module version, if its hosting is known.
///
/// `base` overrides forge detection: links become
/// `<base>/<module>@<version>/<path>`, which matches sites that mirror
/// module contents directly.
#[must_use]
pub fn module_info(base: Option<&Url>, module_path: &str, version: &str) -> Option<SourceInfo> {
    if let Some(base) = base {
        let repo = format!("{}{}@{}", base, module_path, version);
        return Some(SourceInfo {
            repo_url: repo,
            commit_ref: version.to_string(),
            file_template: "{repo}/{path}".to_string(),
            line_template: "{repo}/{path}#L{line}".to_string(),
        });
    }
    let mut parts = module_path.splitn(4, '/');
    let host = parts.next()?;
    let owner = parts.next()?;
    let repo_name = parts.next()?;
    match host {
        "github.com" | "gitea.com" => Some(SourceInfo {
            repo_url: format!("https://{host}/{owner}/{repo_name}"),
            commit_ref: version.to_string(),
            file_template: "{repo}/blob/{ref}/{path}".to_string(),
            line_template: "{repo}/blob/{ref}/{path}#L{line}".to_string(),
        }),
        "gitlab.com" => Some(SourceInfo {
            repo_url: format!("https://{host}/{owner}/{repo_name}"),
            commit_ref: version.to_string(),
            file_template: "{repo}/-/blob/{ref}/{path}".to_string(),
            line_template: "{repo}/-/blob/{ref}/{path}#L{line}".to_string(),
        }),
        "bitbucket.org" => Some(SourceInfo {
            repo_url: format!("https://{host}/{owner}/{repo_name}"),
            commit_ref: version.to_string(),
            file_template: "{repo}/src/{ref}/{path}".to_string(),
            line_template: "{repo}/src/{ref}/{path}#lines-{line}".to_string(),
        }),
        _ => None,
    }
}
