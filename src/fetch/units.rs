//! Unit-tree construction.
//!
//! One unit per directory from the module root down to every package
//! directory: package units carry documentation and imports,
//! intermediate directories get empty units, and the module root also
//! carries the readme and the full license texts. A package that sits
//! at the module root is merged onto the root unit.

use std::collections::BTreeMap;

use crate::licenses::Detector;
use crate::model::{Documentation, Package, Readme, Unit, UnitMeta};
use crate::stdlib;

/// Build the unit tree for a module.
#[must_use]
pub fn module_units(
    module_path: &str,
    version: &str,
    packages: &[Package],
    readmes: &[Readme],
    detector: &Detector,
) -> Vec<Unit> {
    let mut units: BTreeMap<String, Unit> = BTreeMap::new();

    // The module root always has a unit, carrying the license texts.
    let (root_redistributable, root_licenses) = detector.package_info(".");
    units.insert(
        module_path.to_string(),
        Unit {
            meta: UnitMeta {
                path: module_path.to_string(),
                module_path: module_path.to_string(),
                version: version.to_string(),
                name: String::new(),
                is_redistributable: root_redistributable,
            },
            readme: readmes
                .iter()
                .find(|r| !r.filepath.contains('/'))
                .cloned(),
            documentation: None,
            imports: Vec::new(),
            licenses: root_licenses.iter().map(|l| l.metadata.clone()).collect(),
            license_contents: detector.all_licenses().to_vec(),
        },
    );

    for package in packages {
        let documentation = Some(Documentation {
            synopsis: package.synopsis.clone(),
            html: package.documentation_html.clone(),
            goos: package.goos.clone(),
            goarch: package.goarch.clone(),
        });
        if package.path == module_path {
            // Merge a root package onto the root unit.
            let root = units.get_mut(module_path).expect("root unit exists");
            root.meta.name = package.name.clone();
            root.meta.is_redistributable = package.is_redistributable;
            root.documentation = documentation;
            root.imports = package.imports.clone();
            continue;
        }
        units.insert(
            package.path.clone(),
            Unit {
                meta: UnitMeta {
                    path: package.path.clone(),
                    module_path: module_path.to_string(),
                    version: version.to_string(),
                    name: package.name.clone(),
                    is_redistributable: package.is_redistributable,
                },
                readme: None,
                documentation,
                imports: package.imports.clone(),
                licenses: package.licenses.clone(),
                license_contents: Vec::new(),
            },
        );

        // Fill in every ancestor directory up to the module root.
        let mut path = package.path.as_str();
        while let Some(parent) = parent_unit_path(path, module_path) {
            path = parent;
            if units.contains_key(parent) {
                continue;
            }
            let inner = parent
                .strip_prefix(module_path)
                .map_or(parent, |rest| rest.trim_start_matches('/'));
            let (is_redistributable, applicable) = detector.package_info(inner);
            units.insert(
                parent.to_string(),
                Unit {
                    meta: UnitMeta {
                        path: parent.to_string(),
                        module_path: module_path.to_string(),
                        version: version.to_string(),
                        name: String::new(),
                        is_redistributable,
                    },
                    readme: None,
                    documentation: None,
                    imports: Vec::new(),
                    licenses: applicable.iter().map(|l| l.metadata.clone()).collect(),
                    license_contents: Vec::new(),
                },
            );
        }
    }

    units.into_values().collect()
}

/// The parent unit path of `path`, or `None` at the module root (for
/// the standard library, at single-element paths).
fn parent_unit_path<'a>(path: &'a str, module_path: &str) -> Option<&'a str> {
    if path == module_path {
        return None;
    }
    let (parent, _) = path.rsplit_once('/')?;
    if module_path == stdlib::MODULE_PATH {
        return Some(parent);
    }
    if parent.len() < module_path.len() {
        return None;
    }
    Some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::module_zip;
    use crate::archive::ModuleArchive;
    use crate::config::Limits;
    use crate::model::v1_path;

    const MODULE: &str = "github.com/module";
    const VERSION: &str = "v1.5.2";

    fn package(suffix: &str, name: &str) -> Package {
        let path = if suffix.is_empty() {
            MODULE.to_string()
        } else {
            format!("{MODULE}/{suffix}")
        };
        Package {
            v1_path: v1_path(&path, MODULE),
            path,
            name: name.to_string(),
            synopsis: format!("Package {name}."),
            imports: vec!["fmt".to_string()],
            documentation_html: "<p>doc</p>".to_string(),
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            is_redistributable: true,
            licenses: Vec::new(),
        }
    }

    fn empty_detector() -> Detector {
        let bytes = module_zip(MODULE, VERSION, &[("x.txt", "x")]);
        let mut archive = ModuleArchive::new(bytes).unwrap();
        Detector::new(MODULE, VERSION, &mut archive, &Limits::default())
    }

    fn unit_paths(units: &[Unit]) -> Vec<&str> {
        units.iter().map(|u| u.meta.path.as_str()).collect()
    }

    #[test]
    fn test_ancestors_are_filled_in() {
        let detector = empty_detector();
        let units = module_units(MODULE, VERSION, &[package("bar/foo", "foo")], &[], &detector);
        assert_eq!(
            unit_paths(&units),
            ["github.com/module", "github.com/module/bar", "github.com/module/bar/foo"]
        );
        let bar = units.iter().find(|u| u.meta.path.ends_with("/bar")).unwrap();
        assert!(bar.documentation.is_none());
        assert!(bar.meta.name.is_empty());
        let foo = units.iter().find(|u| u.meta.path.ends_with("/foo")).unwrap();
        assert_eq!(foo.meta.name, "foo");
        assert!(foo.documentation.is_some());
    }

    #[test]
    fn test_root_package_merges_onto_root_unit() {
        let detector = empty_detector();
        let units = module_units(MODULE, VERSION, &[package("", "module")], &[], &detector);
        assert_eq!(unit_paths(&units), [MODULE]);
        let root = &units[0];
        assert_eq!(root.meta.name, "module");
        assert!(root.documentation.is_some());
        assert_eq!(root.imports, ["fmt"]);
    }

    #[test]
    fn test_root_readme_is_attached() {
        let detector = empty_detector();
        let readmes = vec![
            Readme {
                filepath: "docs/README.md".to_string(),
                contents: "nested".to_string(),
            },
            Readme {
                filepath: "README.md".to_string(),
                contents: "This is a readme".to_string(),
            },
        ];
        let units = module_units(MODULE, VERSION, &[package("p", "p")], &readmes, &detector);
        let root = units.iter().find(|u| u.meta.path == MODULE).unwrap();
        assert_eq!(root.readme.as_ref().unwrap().filepath, "README.md");
    }

    #[test]
    fn test_module_root_always_has_a_unit() {
        let detector = empty_detector();
        let units = module_units(MODULE, VERSION, &[], &[], &detector);
        assert_eq!(unit_paths(&units), [MODULE]);
    }

    #[test]
    fn test_std_units_stop_at_single_elements() {
        let bytes = module_zip("std", "v1.15.2", &[("x.txt", "x")]);
        let mut archive = ModuleArchive::new(bytes).unwrap();
        let detector = Detector::new("std", "v1.15.2", &mut archive, &Limits::default());
        let packages = vec![Package {
            path: "errors/internal".to_string(),
            v1_path: "errors/internal".to_string(),
            name: "internal".to_string(),
            synopsis: String::new(),
            imports: Vec::new(),
            documentation_html: String::new(),
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            is_redistributable: true,
            licenses: Vec::new(),
        }];
        let units = module_units("std", "v1.15.2", &packages, &[], &detector);
        assert_eq!(unit_paths(&units), ["errors", "errors/internal", "std"]);
    }
}
