//! The top-level shape of a parsed Go source file.
//!
//! Documentation rendering only needs declarations, their doc comments,
//! and enough type information to associate values and factory functions
//! with the types they belong to. Function bodies and expression detail
//! are deliberately not represented.

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoFile {
    /// Base file name, e.g. `foo.go`.
    pub name: String,
    pub package_name: String,
    /// Doc comment attached to the package clause, if any.
    pub package_doc: Option<String>,
    /// Import paths declared by the file, unquoted.
    pub imports: Vec<String>,
    pub decls: Vec<Decl>,
    /// Whether the file name ends in `_test.go`.
    pub is_test: bool,
}

/// One top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub kind: DeclKind,
    /// Doc comment text, comment markers stripped.
    pub doc: Option<String>,
    /// 1-based line the declaration starts on.
    pub line: u32,
    /// Source text of the declaration. For functions this is the
    /// signature only; bodies are never captured.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Const { specs: Vec<ValueSpec> },
    Var { specs: Vec<ValueSpec> },
    Type { name: String },
    Func(FuncSig),
}

/// One `name[, name] [type] [= values]` line of a const or var block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpec {
    pub names: Vec<String>,
    /// Unqualified local type name, when the spec has one and it is a
    /// plain (possibly pointered) identifier. Used for association.
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSig {
    pub name: String,
    /// Base type of the receiver, for methods.
    pub recv: Option<String>,
    /// Unqualified local type name of the first result, when it is a
    /// plain (possibly pointered) identifier. Used to detect factories.
    pub result: Option<String>,
}

/// Whether a Go identifier is exported.
#[must_use]
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

impl Decl {
    /// Whether the declaration introduces at least one exported name.
    #[must_use]
    pub fn has_exported_name(&self) -> bool {
        match &self.kind {
            DeclKind::Const { specs } | DeclKind::Var { specs } => {
                specs.iter().any(|s| s.names.iter().any(|n| is_exported(n)))
            }
            DeclKind::Type { name } => is_exported(name),
            DeclKind::Func(sig) => is_exported(&sig.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Foo"));
        assert!(is_exported("Ω"));
        assert!(!is_exported("foo"));
        assert!(!is_exported("_Foo"));
        assert!(!is_exported(""));
    }
}
