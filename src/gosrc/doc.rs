//! Documentation extraction from parsed files.
//!
//! Mirrors the classic godoc model: a package's documentation is its
//! package doc plus grouped constants, variables, types, and functions,
//! with values and factory functions associated to the type they serve.

use std::collections::BTreeMap;

use super::ast::{is_exported, Decl, DeclKind, GoFile};

/// Extraction mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    /// Keep unexported declarations too.
    pub all_decls: bool,
}

/// A documented const or var declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDoc {
    pub names: Vec<String>,
    pub doc: Option<String>,
    pub text: String,
    pub file: String,
    pub line: u32,
}

/// A documented function or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDoc {
    pub name: String,
    pub recv: Option<String>,
    pub doc: Option<String>,
    pub text: String,
    pub file: String,
    pub line: u32,
}

/// A documented type with its associated declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDoc {
    pub name: String,
    pub doc: Option<String>,
    pub text: String,
    pub file: String,
    pub line: u32,
    pub consts: Vec<ValueDoc>,
    pub vars: Vec<ValueDoc>,
    /// Factory functions whose first result is this type.
    pub funcs: Vec<FuncDoc>,
    pub methods: Vec<FuncDoc>,
}

/// The documentation for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDoc {
    pub name: String,
    pub import_path: String,
    pub doc: String,
    pub imports: Vec<String>,
    pub consts: Vec<ValueDoc>,
    pub vars: Vec<ValueDoc>,
    pub types: Vec<TypeDoc>,
    pub funcs: Vec<FuncDoc>,
    /// Names of the files that contributed declarations.
    pub file_names: Vec<String>,
}

/// Build package documentation from parsed files.
///
/// Test files participate in the pool — their declarations and imports
/// are collected like any other file's — but they contribute no
/// package name, no package doc, and are not listed as source files.
#[must_use]
pub fn new_from_files(files: &[GoFile], import_path: &str, mode: Mode) -> PackageDoc {
    let mut doc = PackageDoc {
        import_path: import_path.to_string(),
        ..PackageDoc::default()
    };

    let mut imports = Vec::new();
    let mut types: BTreeMap<String, TypeDoc> = BTreeMap::new();
    let mut loose_consts = Vec::new();
    let mut loose_vars = Vec::new();
    let mut loose_funcs = Vec::new();
    let mut methods = Vec::new();

    for file in files {
        if !file.is_test {
            doc.name = file.package_name.clone();
            doc.file_names.push(file.name.clone());
            if let Some(package_doc) = &file.package_doc {
                if !doc.doc.is_empty() {
                    doc.doc.push('\n');
                }
                doc.doc.push_str(package_doc);
            }
        }
        imports.extend(file.imports.iter().cloned());

        for decl in &file.decls {
            if !mode.all_decls && !decl.has_exported_name() {
                continue;
            }
            match &decl.kind {
                DeclKind::Const { specs } => {
                    loose_consts.push(value_doc(decl, specs, file, mode));
                }
                DeclKind::Var { specs } => {
                    loose_vars.push(value_doc(decl, specs, file, mode));
                }
                DeclKind::Type { name } => {
                    types.insert(
                        name.clone(),
                        TypeDoc {
                            name: name.clone(),
                            doc: decl.doc.clone(),
                            text: decl.text.clone(),
                            file: file.name.clone(),
                            line: decl.line,
                            consts: Vec::new(),
                            vars: Vec::new(),
                            funcs: Vec::new(),
                            methods: Vec::new(),
                        },
                    );
                }
                DeclKind::Func(sig) => {
                    let func = FuncDoc {
                        name: sig.name.clone(),
                        recv: sig.recv.clone(),
                        doc: decl.doc.clone(),
                        text: decl.text.clone(),
                        file: file.name.clone(),
                        line: decl.line,
                    };
                    if sig.recv.is_some() {
                        methods.push(func);
                    } else {
                        loose_funcs.push((sig.result.clone(), func));
                    }
                }
            }
        }
    }

    // Associate methods with their receiver types.
    for method in methods {
        let recv = method.recv.clone().unwrap_or_default();
        if let Some(t) = types.get_mut(&recv) {
            t.methods.push(method);
        }
        // Methods on types declared elsewhere are dropped, as godoc does.
    }

    // Associate factory functions with the type they return.
    for (result, func) in loose_funcs {
        let target = result.as_deref().and_then(|r| {
            // Only associate with documented (visible) types.
            types.get_mut(r)
        });
        match target {
            Some(t) => t.funcs.push(func),
            None => doc.funcs.push(func),
        }
    }

    // Associate typed consts and vars with their type.
    for (type_name, value) in loose_consts {
        match type_name.as_deref().and_then(|t| types.get_mut(t)) {
            Some(t) => t.consts.push(value),
            None => doc.consts.push(value),
        }
    }
    for (type_name, value) in loose_vars {
        match type_name.as_deref().and_then(|t| types.get_mut(t)) {
            Some(t) => t.vars.push(value),
            None => doc.vars.push(value),
        }
    }

    doc.types = types.into_values().collect();
    for t in &mut doc.types {
        t.funcs.sort_by(|a, b| a.name.cmp(&b.name));
        t.methods.sort_by(|a, b| a.name.cmp(&b.name));
    }
    doc.funcs.sort_by(|a, b| a.name.cmp(&b.name));

    imports.sort();
    imports.dedup();
    doc.imports = imports;
    doc
}

fn value_doc(decl: &Decl, specs: &[super::ast::ValueSpec], file: &GoFile, mode: Mode) -> (Option<String>, ValueDoc) {
    let mut names = Vec::new();
    for spec in specs {
        for name in &spec.names {
            if mode.all_decls || is_exported(name) {
                names.push(name.clone());
            }
        }
    }
    // The declaration's association type is the first spec's.
    let type_name = specs.iter().find_map(|s| s.type_name.clone());
    let value = ValueDoc {
        names,
        doc: decl.doc.clone(),
        text: decl.text.clone(),
        file: file.name.clone(),
        line: decl.line,
    };
    (type_name, value)
}

impl PackageDoc {
    /// Undo type association: hoist every type's consts, vars, and
    /// factory functions to package level and sort the functions by
    /// name for stable output. Used for the standard library's builtin
    /// package, where association is not helpful.
    pub fn unassociate(&mut self) {
        for t in &mut self.types {
            self.consts.append(&mut t.consts);
            self.vars.append(&mut t.vars);
            self.funcs.append(&mut t.funcs);
        }
        self.funcs.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// First sentence of the package doc, whitespace collapsed.
    #[must_use]
    pub fn synopsis(&self) -> String {
        synopsis(&self.doc)
    }
}

/// First sentence of `doc`: up to the first period followed by
/// whitespace (or the end), with runs of whitespace collapsed.
#[must_use]
pub fn synopsis(doc: &str) -> String {
    let mut out = String::new();
    let mut chars = doc.chars().peekable();
    let mut last_was_space = false;
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if !out.is_empty() && !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        out.push(c);
        if c == '.' && chars.peek().map_or(true, |n| n.is_whitespace()) {
            break;
        }
    }
    out.trim_end().to_string()
}
