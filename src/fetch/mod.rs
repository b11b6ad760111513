//! The fetch-and-process pipeline.
//!
//! Given a module coordinate, resolve it upstream, download the content
//! zip, and produce the indexable [`Module`] plus one
//! [`PackageVersionState`] per package directory considered. Failures
//! inside a single package are recovered and recorded; module-wide
//! failures surface as the fetch result's error.

mod packages;
mod units;

pub use packages::extract_packages;
pub use units::module_units;

use chrono::{DateTime, Utc};

use crate::archive::{module_version_dir, ModuleArchive};
use crate::config::{Config, Limits};
use crate::error::{Error, ErrorKind, ResultExt, STATUS_OK};
use crate::licenses::Detector;
use crate::model::{Module, ModuleInfo, PackageVersionState, Readme};
use crate::proxy;
use crate::source;
use crate::stdlib;

const LOG_TARGET: &str = "     fetch";

/// Preliminary information about a module, from the proxy's `.info`
/// endpoint and a HEAD on its `.zip` (or the standard-library source).
///
/// Carries its own error instead of failing, so callers can persist a
/// version-map row for the failed preflight too.
#[derive(Debug)]
pub struct ResolvedModuleInfo {
    pub module_path: String,
    pub requested_version: String,
    /// Concrete semantic version; empty when the preflight failed.
    pub resolved_version: String,
    pub commit_time: Option<DateTime<Utc>>,
    pub zip_size: u64,
    pub error: Option<Error>,
}

/// Resolve a module coordinate without downloading its contents.
pub async fn get_module_info(
    proxy_client: &proxy::Client,
    module_path: &str,
    requested_version: &str,
    limits: &Limits,
) -> ResolvedModuleInfo {
    let mut mi = ResolvedModuleInfo {
        module_path: module_path.to_string(),
        requested_version: requested_version.to_string(),
        resolved_version: String::new(),
        commit_time: None,
        zip_size: 0,
        error: None,
    };
    let context = || format!("GetModuleInfo({module_path:?}, {requested_version:?})");

    if module_path == stdlib::MODULE_PATH {
        match stdlib::zip_info(requested_version) {
            Ok((resolved, zip_size)) => {
                mi.resolved_version = resolved;
                mi.zip_size = zip_size;
                // Commit time is stamped when the archive is built.
            }
            Err(e) => mi.error = Some(e.context(context())),
        }
        return mi;
    }

    let info = match proxy_client.info(module_path, requested_version).await {
        Ok(info) => info,
        Err(e) => {
            mi.error = Some(e.context(context()));
            return mi;
        }
    };
    let zip_size = match proxy_client.zip_size(module_path, &info.version).await {
        Ok(size) => size,
        Err(e) => {
            mi.error = Some(e.context(context()));
            return mi;
        }
    };
    if zip_size > limits.max_zip_size {
        mi.error = Some(Error::new(
            ErrorKind::BadModule,
            format!("{}: zip size {zip_size} exceeds limit {}", context(), limits.max_zip_size),
        ));
        return mi;
    }
    mi.resolved_version = info.version;
    mi.commit_time = Some(info.time);
    mi.zip_size = zip_size;
    mi
}

/// Outcome of one ingestion attempt.
///
/// Even when `error` is set the result may carry useful information,
/// like the go.mod path of an alternative module.
#[derive(Debug)]
pub struct FetchResult {
    pub module_path: String,
    pub requested_version: String,
    pub resolved_version: Option<String>,
    pub go_mod_path: Option<String>,
    pub status: u16,
    pub error: Option<Error>,
    pub module: Option<Module>,
    pub package_version_states: Vec<PackageVersionState>,
}

/// Download and process the module described by `mi`.
pub async fn fetch_module(mi: ResolvedModuleInfo, proxy_client: &proxy::Client, config: &Config) -> FetchResult {
    let mut fr = FetchResult {
        module_path: mi.module_path.clone(),
        requested_version: mi.requested_version.clone(),
        resolved_version: None,
        go_mod_path: None,
        status: 0,
        error: None,
        module: None,
        package_version_states: Vec::new(),
    };
    let context = format!("FetchModule({:?}, {:?})", mi.module_path, mi.requested_version);
    let module_path = mi.module_path.clone();
    let requested_version = mi.requested_version.clone();

    match run_fetch(&mut fr, mi, proxy_client, config).await {
        Ok(()) => {
            let incomplete = fr.package_version_states.iter().any(|s| s.status != STATUS_OK);
            fr.status = if incomplete {
                ErrorKind::HasIncompletePackages.status()
            } else {
                STATUS_OK
            };
        }
        Err(e) => {
            let e = e.context(context);
            fr.status = e.status();
            fr.error = Some(e);
        }
    }
    log::debug!(target: LOG_TARGET,
        "memory after fetch of {module_path}@{requested_version}: {}M", alloc_meg());
    fr
}

async fn run_fetch(
    fr: &mut FetchResult,
    mi: ResolvedModuleInfo,
    proxy_client: &proxy::Client,
    config: &Config,
) -> crate::Result<()> {
    if let Some(e) = mi.error {
        return Err(e);
    }
    fr.resolved_version = Some(mi.resolved_version.clone());
    let is_std = mi.module_path == stdlib::MODULE_PATH;

    let (zip_bytes, commit_time) = if is_std {
        let (bytes, commit_time) = stdlib::zip(&mi.resolved_version)?;
        fr.go_mod_path = Some(stdlib::MODULE_PATH.to_string());
        (bytes, Some(commit_time))
    } else {
        let go_mod = proxy_client
            .mod_file(&mi.module_path, &mi.resolved_version)
            .await
            .with_context(|| format!("GetMod({:?}, {:?})", mi.module_path, mi.resolved_version))?;
        let Some(go_mod_path) = go_mod_module_path(&go_mod) else {
            return Err(Error::new(ErrorKind::BadModule, "go.mod has no module path"));
        };
        fr.go_mod_path = Some(go_mod_path.clone());
        if go_mod_path != mi.module_path {
            // The zip's go.mod declares another module; never insert it.
            return Err(Error::new(
                ErrorKind::AlternativeModule,
                format!("module path={}, go.mod path={go_mod_path}", mi.module_path),
            ));
        }
        let bytes = proxy_client
            .zip(&mi.module_path, &mi.resolved_version, config.limits.max_zip_size)
            .await
            .with_context(|| format!("GetZip({:?}, {:?})", mi.module_path, mi.resolved_version))?;
        (bytes, mi.commit_time)
    };

    let mut archive = ModuleArchive::new(zip_bytes)?;
    let (mut module, package_version_states) = process_zip(
        &mi.module_path,
        &mi.resolved_version,
        commit_time,
        &mut archive,
        config,
    )?;
    if is_std {
        // The standard library declares itself a module by convention.
        module.module_info.has_go_mod = true;
    }
    fr.module = Some(module);
    fr.package_version_states = package_version_states;
    Ok(())
}

/// Extract everything the site stores from a module content zip.
pub fn process_zip(
    module_path: &str,
    resolved_version: &str,
    commit_time: Option<DateTime<Utc>>,
    archive: &mut ModuleArchive,
    config: &Config,
) -> crate::Result<(Module, Vec<PackageVersionState>)> {
    let context = || format!("processZip({module_path:?}, {resolved_version:?})");
    let limits = &config.limits;

    let source_info = source::module_info(config.source_url.as_ref(), module_path, resolved_version);
    if source_info.is_none() {
        log::info!(target: LOG_TARGET, "no source info for {module_path}@{resolved_version}");
    }

    let readmes = extract_readmes(module_path, resolved_version, archive, limits).with_context(context)?;
    let detector = Detector::new(module_path, resolved_version, archive, limits);
    let (packages, package_version_states) = extract_packages(
        module_path,
        resolved_version,
        archive,
        Some(&detector),
        source_info.as_ref(),
        limits,
    )
    .with_context(context)?;

    let has_go_mod = archive.contains(&format!(
        "{}/go.mod",
        module_version_dir(module_path, resolved_version)
    ));

    let root_readme = readmes.iter().find(|r| readme_dir(&r.filepath) == ".");
    let module = Module {
        module_info: ModuleInfo {
            module_path: module_path.to_string(),
            version: resolved_version.to_string(),
            commit_time,
            is_redistributable: detector.module_is_redistributable(),
            has_go_mod,
            source_info,
        },
        readme_file_path: root_readme.map(|r| r.filepath.clone()),
        readme_contents: root_readme.map(|r| r.contents.clone()),
        units: module_units(module_path, resolved_version, &packages, &readmes, &detector),
        packages,
        licenses: detector.all_licenses().to_vec(),
    };
    Ok((module, package_version_states))
}

/// All README-like files in the zip, paths relative to the module root.
pub fn extract_readmes(
    module_path: &str,
    resolved_version: &str,
    archive: &mut ModuleArchive,
    limits: &Limits,
) -> crate::Result<Vec<Readme>> {
    let prefix = module_version_dir(module_path, resolved_version) + "/";
    let mut candidates = Vec::new();
    for entry in archive.entries() {
        if entry.is_dir || !is_readme(&entry.name) {
            continue;
        }
        if entry.uncompressed_size > limits.max_file_size {
            return Err(Error::new(
                ErrorKind::BadModule,
                format!(
                    "extractReadmes: file size {} exceeds max limit {}",
                    entry.uncompressed_size, limits.max_file_size
                ),
            ));
        }
        candidates.push((entry.index(), entry.name.clone()));
    }
    let mut readmes = Vec::new();
    for (index, name) in candidates {
        let contents = archive.read(index, limits.max_file_size)?;
        readmes.push(Readme {
            filepath: name.strip_prefix(&prefix).unwrap_or(&name).to_string(),
            contents: String::from_utf8_lossy(&contents).into_owned(),
        });
    }
    Ok(readmes)
}

/// Whether the base name of `file`, with or without its extension, is
/// `README` (case-insensitive). `README.go` and `README.vendor` do not
/// count.
#[must_use]
pub fn is_readme(file: &str) -> bool {
    let base = file.rsplit('/').next().unwrap_or(file);
    let (stem, ext) = match base.rfind('.') {
        Some(i) => (&base[..i], &base[i..]),
        None => (base, ""),
    };
    if ext.eq_ignore_ascii_case(".go") || ext.eq_ignore_ascii_case(".vendor") {
        return false;
    }
    stem.eq_ignore_ascii_case("README")
}

fn readme_dir(filepath: &str) -> &str {
    match filepath.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => ".",
    }
}

/// The module path declared by a `go.mod` file, if any.
#[must_use]
pub fn go_mod_module_path(go_mod: &[u8]) -> Option<String> {
    let text = core::str::from_utf8(go_mod).ok()?;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("module") {
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let path = rest.trim().trim_matches('"');
            if path.is_empty() {
                return None;
            }
            return Some(path.to_string());
        }
    }
    None
}

/// Resident memory of this process in mebibytes, for the post-fetch log
/// line. Best effort; 0 when the platform will not say.
fn alloc_meg() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = sysinfo::System::new();
    if !sys.refresh_process(pid) {
        return 0;
    }
    sys.process(pid).map_or(0, |p| p.memory() / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::module_zip;

    #[test]
    fn test_is_readme() {
        assert!(is_readme("README"));
        assert!(is_readme("README.md"));
        assert!(is_readme("readme.markdown"));
        assert!(is_readme("sub/dir/ReadMe.rst"));
        assert!(!is_readme("README.go"));
        assert!(!is_readme("README.vendor"));
        assert!(!is_readme("NOTREADME.md"));
        assert!(!is_readme("readme2.md"));
    }

    #[test]
    fn test_go_mod_module_path() {
        assert_eq!(
            go_mod_module_path(b"module github.com/module\n\ngo 1.14\n").as_deref(),
            Some("github.com/module")
        );
        assert_eq!(
            go_mod_module_path(b"// comment\nmodule \"my.module/foo\"\n").as_deref(),
            Some("my.module/foo")
        );
        assert_eq!(go_mod_module_path(b"go 1.14\n"), None);
        assert_eq!(go_mod_module_path(b"modulegithub.com/x\n"), None);
    }

    #[test]
    fn test_extract_readmes_strips_prefix() {
        let bytes = module_zip(
            "github.com/module",
            "v1.5.2",
            &[("README.md", "This is a readme"), ("docs/README.txt", "docs"), ("foo.go", "package foo\n")],
        );
        let mut archive = ModuleArchive::new(bytes).unwrap();
        let readmes = extract_readmes("github.com/module", "v1.5.2", &mut archive, &Limits::default()).unwrap();
        assert_eq!(readmes.len(), 2);
        assert_eq!(readmes[0].filepath, "README.md");
        assert_eq!(readmes[0].contents, "This is a readme");
        assert_eq!(readmes[1].filepath, "docs/README.txt");
    }

    #[test]
    fn test_extract_readmes_enforces_file_size() {
        let big = "x".repeat(64);
        let bytes = module_zip("github.com/module", "v1.5.2", &[("README.md", &big)]);
        let mut archive = ModuleArchive::new(bytes).unwrap();
        let limits = Limits {
            max_file_size: 32,
            ..Limits::default()
        };
        let err = extract_readmes("github.com/module", "v1.5.2", &mut archive, &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadModule);
    }
}
