//! Two-phase package extraction from a module zip.
//!
//! Phase 1 walks entry metadata only: it groups `.go` files by
//! directory, applies the go-tool ignore rules, validates import paths,
//! and enforces the file-size and package-count bounds. Phase 2 reads
//! file contents, applies build constraints, parses, and renders
//! documentation. A directory that cannot be processed is recorded in
//! its `PackageVersionState` and never fails its siblings.

use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::archive::{module_version_dir, ModuleArchive};
use crate::config::Limits;
use crate::error::{Error, ErrorKind, STATUS_OK};
use crate::gosrc::{self, GoFile, Mode, RenderOptions, BUILD_ENVS, DOC_TOO_LARGE_REPLACEMENT};
use crate::licenses::Detector;
use crate::model::{v1_path, Package, PackageVersionState};
use crate::source::SourceInfo;
use crate::stdlib;

const LOG_TARGET: &str = "     fetch";

/// Extract the packages of a module, with one `PackageVersionState` per
/// directory considered.
///
/// Internal panics in the extraction code are converted to errors with
/// a captured backtrace; an ingestion never takes the process down.
pub fn extract_packages(
    module_path: &str,
    resolved_version: &str,
    archive: &mut ModuleArchive,
    detector: Option<&Detector>,
    source_info: Option<&SourceInfo>,
    limits: &Limits,
) -> crate::Result<(Vec<Package>, Vec<PackageVersionState>)> {
    let result = catch_unwind(AssertUnwindSafe(|| {
        extract_packages_inner(module_path, resolved_version, archive, detector, source_info, limits)
    }));
    match result {
        Ok(r) => r,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            let backtrace = std::backtrace::Backtrace::force_capture();
            Err(Error::new(
                ErrorKind::Internal,
                format!("internal panic: {msg}\n\n{backtrace}"),
            ))
        }
    }
}

fn extract_packages_inner(
    module_path: &str,
    resolved_version: &str,
    archive: &mut ModuleArchive,
    detector: Option<&Detector>,
    source_info: Option<&SourceInfo>,
    limits: &Limits,
) -> crate::Result<(Vec<Package>, Vec<PackageVersionState>)> {
    let module_prefix = module_version_dir(module_path, resolved_version) + "/";

    // Phase 1: metadata only. dirs maps a directory (module-root
    // relative) to its .go files; incomplete_dirs are directories we
    // already know cannot be processed.
    let mut dirs: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();
    let mut incomplete_dirs: HashSet<String> = HashSet::new();
    let mut package_version_states: Vec<PackageVersionState> = Vec::new();

    let entries: Vec<_> = archive.entries().to_vec();
    for entry in &entries {
        if entry.is_dir {
            // Proxies may serve directory entries; they are harmless.
            continue;
        }
        let Some(rest) = entry.name.strip_prefix(&module_prefix) else {
            return Err(Error::new(
                ErrorKind::BadModule,
                format!(
                    "expected file to have prefix {module_prefix:?}; got = {:?}",
                    entry.name
                ),
            ));
        };
        let inner_path = dir_of(rest);
        if incomplete_dirs.contains(inner_path) {
            continue;
        }
        let import_path = inner_import_path(module_path, inner_path);
        if ignored_by_go_tool(&import_path) || is_vendored(&import_path) {
            continue;
        }
        if !entry.name.ends_with(".go") {
            continue;
        }
        // A directory that is not a valid import path may still hold a
        // runnable main package; the site has no way to serve it.
        if let Err(e) = crate::paths::check_import_path(&import_path) {
            incomplete_dirs.insert(inner_path.to_string());
            package_version_states.push(PackageVersionState {
                module_path: module_path.to_string(),
                package_path: import_path,
                version: resolved_version.to_string(),
                status: ErrorKind::PackageBadImportPath.status(),
                error: Some(e.to_string()),
            });
            continue;
        }
        if entry.uncompressed_size > limits.max_file_size {
            incomplete_dirs.insert(inner_path.to_string());
            package_version_states.push(PackageVersionState {
                module_path: module_path.to_string(),
                package_path: import_path,
                version: resolved_version.to_string(),
                status: ErrorKind::PackageMaxFileSizeLimitExceeded.status(),
                error: Some(format!(
                    "unable to process {:?}: file size {} exceeds max limit {}",
                    entry.name, entry.uncompressed_size, limits.max_file_size
                )),
            });
            continue;
        }
        let file_name = rest.rsplit('/').next().unwrap_or(rest).to_string();
        dirs.entry(inner_path.to_string()).or_default().push((file_name, entry.index()));
        if dirs.len() > limits.max_packages_per_module {
            return Err(Error::new(
                ErrorKind::BadModule,
                format!(
                    "{} packages found in {module_path:?}; exceeds limit {}",
                    dirs.len(),
                    limits.max_packages_per_module
                ),
            ));
        }
    }

    // Phase 2: read and process contents, one directory at a time.
    let mut packages = Vec::new();
    for (inner_path, go_files) in &dirs {
        if incomplete_dirs.contains(inner_path) {
            log::info!(target: LOG_TARGET, "skipping {inner_path:?} because it is incomplete");
            continue;
        }
        let mut files = Vec::with_capacity(go_files.len());
        for (name, index) in go_files {
            files.push((name.clone(), archive.read(*index, limits.max_file_size)?));
        }

        let mut status = STATUS_OK;
        let mut error = None;
        let mut package_path = inner_import_path(module_path, inner_path);
        match load_package(&files, inner_path, module_path, source_info, limits) {
            Ok(Some(loaded)) => {
                let mut package = loaded.package;
                if loaded.doc_too_large {
                    status = ErrorKind::PackageDocumentationHtmlTooLarge.status();
                    error = Some("rendered documentation HTML is too large".to_string());
                }
                if let Some(detector) = detector {
                    let (is_redistributable, applicable) = detector.package_info(inner_path);
                    package.is_redistributable = is_redistributable;
                    package.licenses = applicable.iter().map(|l| l.metadata.clone()).collect();
                }
                package_path = package.path.clone();
                packages.push(package);
            }
            Ok(None) => {
                // There were .go files, but no build context matched.
                incomplete_dirs.insert(inner_path.clone());
                status = ErrorKind::PackageBuildContextNotSupported.status();
                error = Some("no supported build context matches this package".to_string());
            }
            Err(e) if e.kind() == ErrorKind::PackageInvalidContents => {
                incomplete_dirs.insert(inner_path.clone());
                status = e.status();
                error = Some(e.to_string());
            }
            Err(e) => {
                return Err(e.context(format!("unexpected error loading package {inner_path:?}")));
            }
        }
        package_version_states.push(PackageVersionState {
            module_path: module_path.to_string(),
            package_path,
            version: resolved_version.to_string(),
            status,
            error,
        });
    }

    if packages.is_empty() {
        return Err(Error::new(ErrorKind::BadModule, "module contains 0 packages"));
    }
    Ok((packages, package_version_states))
}

struct LoadedPackage {
    package: Package,
    doc_too_large: bool,
}

/// Try the fixed build environments in order; the first that yields a
/// package wins. `Ok(None)` means no environment matched any file.
fn load_package(
    files: &[(String, Vec<u8>)],
    inner_path: &str,
    module_path: &str,
    source_info: Option<&SourceInfo>,
    limits: &Limits,
) -> crate::Result<Option<LoadedPackage>> {
    for env in BUILD_ENVS {
        let loaded = load_package_with_build_context(*env, files, inner_path, module_path, source_info, limits)?;
        if loaded.is_some() {
            return Ok(loaded);
        }
    }
    Ok(None)
}

/// Load the package for one `(GOOS, GOARCH)` pair.
///
/// Returns `Ok(None)` when no non-test file survives the build
/// constraints; an error of kind `PackageInvalidContents` when the
/// files do not form a valid package.
fn load_package_with_build_context(
    env: gosrc::BuildContext,
    files: &[(String, Vec<u8>)],
    inner_path: &str,
    module_path: &str,
    source_info: Option<&SourceInfo>,
    limits: &Limits,
) -> crate::Result<Option<LoadedPackage>> {
    let context = || format!("loadPackageWithBuildContext({:?}, {:?}, {inner_path:?})", env.goos, env.goarch);

    // Apply build constraints, then parse what survives.
    let mut parsed: Vec<GoFile> = Vec::new();
    let mut package_name: Option<(String, String)> = None; // (name, file)
    for (name, bytes) in files {
        let Ok(content) = core::str::from_utf8(bytes) else {
            return Err(Error::new(
                ErrorKind::PackageInvalidContents,
                format!("{}: {name:?} is not valid UTF-8", context()),
            ));
        };
        let matched = gosrc::match_file(env, name, content)
            .map_err(|e| Error::with_source(ErrorKind::PackageInvalidContents, context(), e))?;
        if !matched {
            continue;
        }
        let file = gosrc::parse_file(name, content)
            .map_err(|e| Error::with_source(ErrorKind::PackageInvalidContents, context(), e))?;
        if !file.is_test {
            match &package_name {
                None => package_name = Some((file.package_name.clone(), name.clone())),
                Some((existing, first_file)) if *existing != file.package_name => {
                    return Err(Error::new(
                        ErrorKind::PackageInvalidContents,
                        format!(
                            "multiple packages in directory {inner_path:?}: {existing} ({first_file}) and {} ({name})",
                            file.package_name
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        parsed.push(file);
    }
    let Some((package_name, _)) = package_name else {
        // No non-test files matched this build context.
        return Ok(None);
    };

    // The standard library's builtin package documents all globals and
    // reads better without type association.
    let is_builtin = module_path == stdlib::MODULE_PATH && inner_path == "builtin";
    let mode = Mode { all_decls: is_builtin };

    let import_path = inner_import_path(module_path, inner_path);
    let mut doc = gosrc::new_from_files(&parsed, &import_path, mode);
    if is_builtin {
        doc.unassociate();
    }

    if doc.imports.len() > limits.max_imports_per_package {
        return Err(Error::new(
            ErrorKind::Internal,
            format!(
                "{} imports found in package {import_path:?}; exceeds limit {}",
                doc.imports.len(),
                limits.max_imports_per_package
            ),
        ));
    }

    let file_link = |name: &str| {
        source_info.map_or_else(String::new, |si| si.file_url(&join_inner(inner_path, name)))
    };
    let source_link = |name: &str, line: u32| {
        if line == 0 {
            return String::new();
        }
        source_info.map_or_else(String::new, |si| si.line_url(&join_inner(inner_path, name), line))
    };
    let options = RenderOptions {
        file_link: &file_link,
        source_link: &source_link,
        limit: limits.max_documentation_html,
    };
    let mut doc_too_large = false;
    let documentation_html = match gosrc::render(&doc, &options) {
        Ok(html) => html,
        Err(e) if e.kind() == ErrorKind::PackageDocumentationHtmlTooLarge => {
            doc_too_large = true;
            DOC_TOO_LARGE_REPLACEMENT.to_string()
        }
        Err(e) => return Err(e.context(context())),
    };

    // Standard-library import paths omit the module path.
    let final_path = if module_path == stdlib::MODULE_PATH {
        inner_path.to_string()
    } else {
        import_path
    };
    let package = Package {
        v1_path: v1_path(&final_path, module_path),
        path: final_path,
        name: package_name,
        synopsis: doc.synopsis(),
        imports: doc.imports.clone(),
        documentation_html,
        goos: env.goos.to_string(),
        goarch: env.goarch.to_string(),
        is_redistributable: false,
        licenses: Vec::new(),
    };
    Ok(Some(LoadedPackage { package, doc_too_large }))
}

/// Directory of a module-root-relative file path, `"."` at the root.
fn dir_of(rest: &str) -> &str {
    match rest.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => ".",
    }
}

/// The import path of a directory inside the module.
fn inner_import_path(module_path: &str, inner_path: &str) -> String {
    if inner_path == "." {
        module_path.to_string()
    } else {
        format!("{module_path}/{inner_path}")
    }
}

/// Join a directory inside the module with a file name.
fn join_inner(inner_path: &str, name: &str) -> String {
    if inner_path == "." {
        name.to_string()
    } else {
        format!("{inner_path}/{name}")
    }
}

/// Whether the go tool would ignore this import path: any element that
/// begins with `.` or `_`, or is named `testdata`.
#[must_use]
pub fn ignored_by_go_tool(import_path: &str) -> bool {
    import_path
        .split('/')
        .any(|el| el.starts_with('.') || el.starts_with('_') || el == "testdata")
}

/// Whether the import path lies inside a vendor directory.
#[must_use]
pub fn is_vendored(import_path: &str) -> bool {
    import_path.starts_with("vendor/") || import_path.contains("/vendor/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::module_zip;

    const MODULE: &str = "github.com/module";
    const VERSION: &str = "v1.5.2";

    fn extract(files: &[(&str, &str)], limits: &Limits) -> crate::Result<(Vec<Package>, Vec<PackageVersionState>)> {
        let bytes = module_zip(MODULE, VERSION, files);
        let mut archive = ModuleArchive::new(bytes).unwrap();
        extract_packages(MODULE, VERSION, &mut archive, None, None, limits)
    }

    #[test]
    fn test_minimal_module() {
        let (packages, states) = extract(
            &[("bar/foo/foo.go", "// Package foo\npackage foo\n\nconst Foo = 42\n")],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        let package = &packages[0];
        assert_eq!(package.path, "github.com/module/bar/foo");
        assert_eq!(package.name, "foo");
        assert_eq!(package.goos, "linux");
        assert_eq!(package.goarch, "amd64");
        assert!(package.documentation_html.contains("const Foo = 42"));
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, STATUS_OK);
        assert!(states[0].error.is_none());
    }

    #[test]
    fn test_ignored_directories() {
        let err = extract(
            &[
                ("_private/a.go", "package a\n"),
                (".hidden/b.go", "package b\n"),
                ("testdata/c.go", "package c\n"),
                ("vendor/dep/d.go", "package d\n"),
            ],
            &Limits::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadModule, "only ignored dirs leaves 0 packages");
    }

    #[test]
    fn test_wrong_prefix_is_bad_module() {
        let bytes = module_zip("github.com/other", VERSION, &[("foo.go", "package foo\n")]);
        let mut archive = ModuleArchive::new(bytes).unwrap();
        let err = extract_packages(MODULE, VERSION, &mut archive, None, None, &Limits::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadModule);
    }

    #[test]
    fn test_oversized_file_marks_directory_incomplete() {
        let big_body = format!("package big\n\n// filler\nvar Filler = {:?}\n", "y".repeat(256));
        let (packages, states) = extract(
            &[("ok/ok.go", "package ok\n"), ("big/big.go", &big_body)],
            &Limits {
                max_file_size: 128,
                ..Limits::default()
            },
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "ok");
        let big = states.iter().find(|s| s.package_path.ends_with("/big")).unwrap();
        assert_eq!(big.status, ErrorKind::PackageMaxFileSizeLimitExceeded.status());
        assert!(big.error.is_some());
    }

    #[test]
    fn test_file_size_boundary() {
        let src = "package p\n// pad pad pad\n";
        let limits = Limits {
            max_file_size: src.len() as u64,
            ..Limits::default()
        };
        let (packages, _) = extract(&[("p/p.go", src)], &limits).unwrap();
        assert_eq!(packages.len(), 1, "a file exactly at the limit succeeds");

        let over = format!("{src}/");
        let result = extract(&[("p/p.go", &over)], &limits);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::BadModule, "one byte over leaves 0 packages");
    }

    #[test]
    fn test_package_cap() {
        let limits = Limits {
            max_packages_per_module: 2,
            ..Limits::default()
        };
        let (packages, _) = extract(&[("a/a.go", "package a\n"), ("b/b.go", "package b\n")], &limits).unwrap();
        assert_eq!(packages.len(), 2, "exactly at the cap succeeds");

        let err = extract(
            &[("a/a.go", "package a\n"), ("b/b.go", "package b\n"), ("c/c.go", "package c\n")],
            &limits,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadModule, "one over the cap is a bad module");
    }

    #[test]
    fn test_multiple_package_clauses() {
        let (packages, states) = extract(
            &[
                ("bad/one.go", "package one\n"),
                ("bad/two.go", "package two\n"),
                ("ok/ok.go", "package ok\n"),
            ],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        let bad = states.iter().find(|s| s.package_path.ends_with("/bad")).unwrap();
        assert_eq!(bad.status, ErrorKind::PackageInvalidContents.status());
        assert!(bad.error.as_deref().unwrap().contains("multiple packages"));
    }

    #[test]
    fn test_unparseable_file() {
        let (packages, states) = extract(
            &[("bad/bad.go", "package bad\n\nfunc Broken( {\n"), ("ok/ok.go", "package ok\n")],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        let bad = states.iter().find(|s| s.package_path.ends_with("/bad")).unwrap();
        assert_eq!(bad.status, ErrorKind::PackageInvalidContents.status());
    }

    #[test]
    fn test_unsupported_build_context() {
        let (packages, states) = extract(
            &[
                ("exotic/exotic_plan9.go", "package exotic\n"),
                ("ok/ok.go", "package ok\n"),
            ],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        let exotic = states.iter().find(|s| s.package_path.ends_with("/exotic")).unwrap();
        assert_eq!(exotic.status, ErrorKind::PackageBuildContextNotSupported.status());
    }

    #[test]
    fn test_build_context_order_prefers_linux() {
        let (packages, _) = extract(
            &[
                ("multi/a_linux.go", "package multi\n\nconst OnLinux = 1\n"),
                ("multi/a_windows.go", "package multi\n\nconst OnWindows = 1\n"),
            ],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages[0].goos, "linux");
        assert!(packages[0].documentation_html.contains("OnLinux"));
        assert!(!packages[0].documentation_html.contains("OnWindows"));
    }

    #[test]
    fn test_windows_only_package() {
        let (packages, _) = extract(
            &[("win/win.go", "//go:build windows\n\npackage win\n")],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages[0].goos, "windows");
        assert_eq!(packages[0].goarch, "amd64");
    }

    #[test]
    fn test_test_files_do_not_vote_on_package_name() {
        let (packages, states) = extract(
            &[
                ("p/p.go", "package p\n"),
                ("p/p_test.go", "package p_test\n"),
            ],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "p");
        assert_eq!(states[0].status, STATUS_OK);
    }

    #[test]
    fn test_bad_import_path() {
        let (packages, states) = extract(
            &[("has space/x.go", "package x\n"), ("ok/ok.go", "package ok\n")],
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(packages.len(), 1);
        let bad = states
            .iter()
            .find(|s| s.status == ErrorKind::PackageBadImportPath.status())
            .unwrap();
        assert!(bad.error.is_some());
    }

    #[test]
    fn test_doc_too_large_still_emits_package() {
        let limits = Limits {
            max_documentation_html: 200,
            ..Limits::default()
        };
        let long_doc = format!("// Package p.\n//\n// {}\npackage p\n\nconst A = 1\n", "words ".repeat(100));
        let (packages, states) = extract(&[("p/p.go", &long_doc)], &limits).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].documentation_html, DOC_TOO_LARGE_REPLACEMENT);
        assert_eq!(states[0].status, ErrorKind::PackageDocumentationHtmlTooLarge.status());
    }

    #[test]
    fn test_import_cap_aborts_module() {
        let limits = Limits {
            max_imports_per_package: 1,
            ..Limits::default()
        };
        let err = extract(
            &[("p/p.go", "package p\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n")],
            &limits,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_vendored_and_ignored_helpers() {
        assert!(is_vendored("vendor/foo"));
        assert!(is_vendored("github.com/m/vendor/foo"));
        assert!(!is_vendored("github.com/m/vendored"));
        assert!(ignored_by_go_tool("github.com/m/_private/x"));
        assert!(ignored_by_go_tool("github.com/m/testdata"));
        assert!(!ignored_by_go_tool("github.com/m/test"));
    }

    #[test]
    fn test_root_package() {
        let (packages, _) = extract(&[("root.go", "package root\n")], &Limits::default()).unwrap();
        assert_eq!(packages[0].path, "github.com/module");
        assert_eq!(packages[0].name, "root");
    }
}
