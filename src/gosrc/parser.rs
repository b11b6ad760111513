//! Top-level parser for Go source files.
//!
//! Parses exactly the structure documentation needs: the package clause
//! and its doc comment, imports, and top-level declarations with their
//! doc comments. Function bodies, composite values, and type bodies are
//! consumed by bracket matching and kept only as source text.

use super::ast::{Decl, DeclKind, FuncSig, GoFile, ValueSpec};
use super::scanner::{Comment, ParseError, Scanner};

/// Parse one source file.
pub fn parse_file(name: &str, src: &str) -> Result<GoFile, ParseError> {
    Parser {
        s: Scanner::new(src),
        pending: Vec::new(),
    }
    .file(name)
}

struct Parser<'a> {
    s: Scanner<'a>,
    pending: Vec<Comment>,
}

impl<'a> Parser<'a> {
    fn file(mut self, name: &str) -> Result<GoFile, ParseError> {
        self.collect_comments()?;
        let package_line = self.s.line();
        match self.s.read_ident() {
            Some("package") => {}
            _ => return Err(ParseError::new("expected package clause", self.s.line())),
        }
        self.s.skip_inline_space();
        let package_name = self
            .s
            .read_ident()
            .ok_or_else(|| ParseError::new("expected package name", self.s.line()))?
            .to_string();
        let package_doc = self.take_doc(package_line);

        let mut file = GoFile {
            name: name.to_string(),
            package_name,
            package_doc,
            imports: Vec::new(),
            decls: Vec::new(),
            is_test: name.ends_with("_test.go"),
        };

        loop {
            self.collect_comments()?;
            if self.s.at_eof() {
                break;
            }
            if self.s.peek() == Some(';') {
                self.s.bump();
                continue;
            }
            let decl_start = self.s.pos();
            let decl_line = self.s.line();
            let keyword = self
                .s
                .read_ident()
                .ok_or_else(|| ParseError::new("expected declaration", self.s.line()))?;
            let doc = self.take_doc(decl_line);
            match keyword {
                "import" => self.import_decl(&mut file)?,
                "const" | "var" => {
                    let specs = self.value_decl()?;
                    let text = self.s.slice(decl_start, self.s.pos()).trim_end().to_string();
                    let kind = if keyword == "const" {
                        DeclKind::Const { specs }
                    } else {
                        DeclKind::Var { specs }
                    };
                    file.decls.push(Decl {
                        kind,
                        doc,
                        line: decl_line,
                        text,
                    });
                }
                "type" => self.type_decl(&mut file, doc, decl_start, decl_line)?,
                "func" => {
                    let (sig, text) = self.func_decl(decl_start)?;
                    file.decls.push(Decl {
                        kind: DeclKind::Func(sig),
                        doc,
                        line: decl_line,
                        text,
                    });
                }
                other => {
                    return Err(ParseError::new(
                        format!("unexpected top-level token {other:?}"),
                        decl_line,
                    ));
                }
            }
        }
        Ok(file)
    }

    /// Gather consecutive comments ahead of the cursor into the pending
    /// group; a blank line starts a new group.
    fn collect_comments(&mut self) -> Result<(), ParseError> {
        loop {
            self.s.skip_space();
            let Some(comment) = self.s.next_comment()? else {
                return Ok(());
            };
            let adjacent = self
                .pending
                .last()
                .is_some_and(|last| comment.start_line == last.end_line + 1);
            if !adjacent {
                self.pending.clear();
            }
            self.pending.push(comment);
        }
    }

    /// Take the pending comment group as a doc comment, if it ends on
    /// the line directly above `decl_line`. Directives never contribute.
    fn take_doc(&mut self, decl_line: u32) -> Option<String> {
        let attached = self
            .pending
            .last()
            .is_some_and(|last| last.end_line + 1 == decl_line);
        let doc = if attached {
            let text: Vec<&str> = self
                .pending
                .iter()
                .filter(|c| !c.is_directive())
                .map(|c| c.text.as_str())
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        } else {
            None
        };
        self.pending.clear();
        doc
    }

    fn import_decl(&mut self, file: &mut GoFile) -> Result<(), ParseError> {
        self.s.skip_inline_space();
        if self.s.peek() == Some('(') {
            self.s.bump();
            loop {
                self.collect_comments()?;
                self.pending.clear();
                if self.s.peek() == Some(')') {
                    self.s.bump();
                    return Ok(());
                }
                if self.s.at_eof() {
                    return Err(ParseError::new("unterminated import block", self.s.line()));
                }
                self.import_spec(file)?;
            }
        }
        self.import_spec(file)
    }

    fn import_spec(&mut self, file: &mut GoFile) -> Result<(), ParseError> {
        // Optional alias: an identifier, `.`, or `_`.
        if matches!(self.s.peek(), Some('.')) {
            self.s.bump();
            self.s.skip_inline_space();
        } else if self.s.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            self.s.read_ident();
            self.s.skip_inline_space();
        }
        let path = self.s.read_string()?;
        file.imports.push(path.to_string());
        Ok(())
    }

    /// Parse the specs of a `const` or `var` declaration.
    fn value_decl(&mut self) -> Result<Vec<ValueSpec>, ParseError> {
        self.s.skip_inline_space();
        if self.s.peek() == Some('(') {
            self.s.bump();
            let mut specs = Vec::new();
            loop {
                self.collect_comments()?;
                self.pending.clear();
                if self.s.peek() == Some(')') {
                    self.s.bump();
                    return Ok(specs);
                }
                if self.s.at_eof() {
                    return Err(ParseError::new("unterminated declaration block", self.s.line()));
                }
                if self.s.peek() == Some(';') {
                    self.s.bump();
                    continue;
                }
                specs.push(self.value_spec()?);
            }
        }
        Ok(vec![self.value_spec()?])
    }

    /// One `name[, name] [type] [= values]` spec.
    fn value_spec(&mut self) -> Result<ValueSpec, ParseError> {
        let mut names = Vec::new();
        loop {
            let name = self
                .s
                .read_ident()
                .ok_or_else(|| ParseError::new("expected identifier in declaration", self.s.line()))?;
            names.push(name.to_string());
            self.s.skip_inline_space();
            if self.s.peek() == Some(',') {
                self.s.bump();
                self.s.skip_space();
            } else {
                break;
            }
        }

        let mut type_name = None;
        match self.s.peek() {
            Some('=') | Some('\n') | Some(';') | Some(')') | None => {}
            _ => {
                let type_text = self.s.skip_to_line_end(&['='])?;
                type_name = base_type_name(type_text);
            }
        }
        if self.s.peek() == Some('=') {
            self.s.bump();
            self.s.skip_to_line_end(&[])?;
        }
        Ok(ValueSpec { names, type_name })
    }

    fn type_decl(
        &mut self,
        file: &mut GoFile,
        doc: Option<String>,
        decl_start: usize,
        decl_line: u32,
    ) -> Result<(), ParseError> {
        self.s.skip_inline_space();
        if self.s.peek() == Some('(') {
            self.s.bump();
            loop {
                self.collect_comments()?;
                let spec_line = self.s.line();
                if self.s.peek() == Some(')') {
                    self.s.bump();
                    self.pending.clear();
                    return Ok(());
                }
                if self.s.at_eof() {
                    return Err(ParseError::new("unterminated type block", self.s.line()));
                }
                if self.s.peek() == Some(';') {
                    self.s.bump();
                    continue;
                }
                let spec_start = self.s.pos();
                let name = self
                    .s
                    .read_ident()
                    .ok_or_else(|| ParseError::new("expected type name", self.s.line()))?
                    .to_string();
                let spec_doc = self.take_doc(spec_line);
                self.s.skip_to_line_end(&[])?;
                let text = format!("type {}", self.s.slice(spec_start, self.s.pos()).trim_end());
                file.decls.push(Decl {
                    kind: DeclKind::Type { name },
                    doc: spec_doc,
                    line: spec_line,
                    text,
                });
            }
        }
        let name = self
            .s
            .read_ident()
            .ok_or_else(|| ParseError::new("expected type name", self.s.line()))?
            .to_string();
        self.s.skip_to_line_end(&[])?;
        let text = self.s.slice(decl_start, self.s.pos()).trim_end().to_string();
        file.decls.push(Decl {
            kind: DeclKind::Type { name },
            doc,
            line: decl_line,
            text,
        });
        Ok(())
    }

    fn func_decl(&mut self, decl_start: usize) -> Result<(FuncSig, String), ParseError> {
        self.s.skip_inline_space();

        let mut recv = None;
        if self.s.peek() == Some('(') {
            let recv_start = self.s.pos();
            self.s.skip_balanced('(', ')')?;
            recv = receiver_base_type(self.s.slice(recv_start, self.s.pos()));
        }

        self.s.skip_inline_space();
        let name = self
            .s
            .read_ident()
            .ok_or_else(|| ParseError::new("expected function name", self.s.line()))?
            .to_string();

        self.s.skip_inline_space();
        if self.s.peek() == Some('[') {
            self.s.skip_balanced('[', ']')?;
            self.s.skip_inline_space();
        }
        if self.s.peek() != Some('(') {
            return Err(ParseError::new("expected parameter list", self.s.line()));
        }
        self.s.skip_balanced('(', ')')?;

        self.s.skip_inline_space();
        let mut result = None;
        match self.s.peek() {
            Some('(') => {
                let results_start = self.s.pos();
                self.s.skip_balanced('(', ')')?;
                let inner = self.s.slice(results_start, self.s.pos());
                let inner = inner.trim_start_matches('(').trim_end_matches(')');
                let first = split_top_level_comma(inner).next().unwrap_or("");
                result = base_type_name(first);
            }
            Some('{') | Some('\n') | Some(';') | None => {}
            _ => {
                let type_text = self.s.skip_to_line_end(&['{'])?;
                result = base_type_name(type_text);
            }
        }

        let sig_end = self.s.pos();
        self.s.skip_inline_space();
        if self.s.peek() == Some('{') {
            self.s.skip_balanced('{', '}')?;
        }
        let text = self.s.slice(decl_start, sig_end).trim_end().to_string();
        Ok((FuncSig { name, recv, result }, text))
    }
}

/// The unqualified local identifier a type expression names, if it is a
/// plain (possibly pointered, possibly named-result) identifier.
fn base_type_name(text: &str) -> Option<String> {
    let mut token = text.trim().split_whitespace().last()?;
    token = token.trim_start_matches('*');
    if let Some(open) = token.find('[') {
        token = &token[..open];
    }
    if token.is_empty() || token.contains('.') {
        return None;
    }
    let mut chars = token.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    if chars.all(|c| c.is_alphanumeric() || c == '_') {
        Some(token.to_string())
    } else {
        None
    }
}

/// The base type of a receiver list like `(s *Server)`.
fn receiver_base_type(text: &str) -> Option<String> {
    base_type_name(text.trim().trim_start_matches('(').trim_end_matches(')'))
}

/// Split on commas that are not nested inside brackets.
fn split_top_level_comma(text: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_package() {
        let file = parse_file("foo.go", "// Package foo does foo things.\npackage foo\n").unwrap();
        assert_eq!(file.package_name, "foo");
        assert_eq!(file.package_doc.as_deref(), Some("Package foo does foo things."));
        assert!(!file.is_test);
    }

    #[test]
    fn test_doc_requires_adjacency() {
        let file = parse_file("foo.go", "// Stray comment.\n\npackage foo\n").unwrap();
        assert!(file.package_doc.is_none());
    }

    #[test]
    fn test_imports() {
        let src = "package foo\n\nimport (\n\t\"fmt\"\n\tliblog \"log\"\n\t_ \"net/http/pprof\"\n)\n\nimport \"strings\"\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.imports, ["fmt", "log", "net/http/pprof", "strings"]);
    }

    #[test]
    fn test_const_decl() {
        let src = "package foo\n\n// Foo is the answer.\nconst Foo = 42\n\nconst (\n\tA, B = 1, 2\n\tC Weight = 3\n)\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.decls.len(), 2);
        let DeclKind::Const { specs } = &file.decls[0].kind else {
            panic!("expected const")
        };
        assert_eq!(specs[0].names, ["Foo"]);
        assert_eq!(file.decls[0].doc.as_deref(), Some("Foo is the answer."));

        let DeclKind::Const { specs } = &file.decls[1].kind else {
            panic!("expected const")
        };
        assert_eq!(specs[0].names, ["A", "B"]);
        assert_eq!(specs[1].type_name.as_deref(), Some("Weight"));
    }

    #[test]
    fn test_var_with_composite_value() {
        let src = "package foo\n\nvar registry = map[string][]int{\n\t\"a\": {1, 2},\n}\n\nvar Count int\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.decls.len(), 2);
        let DeclKind::Var { specs } = &file.decls[1].kind else {
            panic!("expected var")
        };
        assert_eq!(specs[0].names, ["Count"]);
        assert_eq!(specs[0].type_name.as_deref(), Some("int"));
    }

    #[test]
    fn test_comment_inside_composite_value() {
        let src = "package foo\n\nvar registry = map[string]int{\n\t\"a\": 1, // count\n}\n\nconst After = 2\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.decls.len(), 2);
        assert!(file.decls[0].text.contains("// count"));
        let DeclKind::Const { specs } = &file.decls[1].kind else {
            panic!("expected const")
        };
        assert_eq!(specs[0].names, ["After"]);
    }

    #[test]
    fn test_type_decl_struct() {
        let src = "package foo\n\n// Server serves.\ntype Server struct {\n\taddr string\n}\n";
        let file = parse_file("foo.go", src).unwrap();
        let DeclKind::Type { name } = &file.decls[0].kind else {
            panic!("expected type")
        };
        assert_eq!(name, "Server");
        assert!(file.decls[0].text.contains("addr string"));
    }

    #[test]
    fn test_func_and_method() {
        let src = "package foo\n\n// NewServer returns a Server.\nfunc NewServer(addr string) *Server {\n\treturn &Server{addr}\n}\n\nfunc (s *Server) Addr() string { return s.addr }\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.decls.len(), 2);
        let DeclKind::Func(sig) = &file.decls[0].kind else {
            panic!("expected func")
        };
        assert_eq!(sig.name, "NewServer");
        assert_eq!(sig.result.as_deref(), Some("Server"));
        assert!(sig.recv.is_none());
        assert!(!file.decls[0].text.contains("return"), "bodies are not captured");

        let DeclKind::Func(sig) = &file.decls[1].kind else {
            panic!("expected func")
        };
        assert_eq!(sig.recv.as_deref(), Some("Server"));
        assert_eq!(sig.name, "Addr");
    }

    #[test]
    fn test_func_multiple_results() {
        let src = "package foo\n\nfunc Open(name string) (*File, error) { return nil, nil }\n";
        let file = parse_file("foo.go", src).unwrap();
        let DeclKind::Func(sig) = &file.decls[0].kind else {
            panic!("expected func")
        };
        assert_eq!(sig.result.as_deref(), Some("File"));
    }

    #[test]
    fn test_test_file_flag() {
        let file = parse_file("foo_test.go", "package foo\n").unwrap();
        assert!(file.is_test);
    }

    #[test]
    fn test_parse_error_on_garbage() {
        assert!(parse_file("foo.go", "pakage foo\n").is_err());
        assert!(parse_file("foo.go", "package foo\n\nfunc broken( {\n").is_err());
        assert!(parse_file("foo.go", "package foo\n\nwhatever\n").is_err());
    }

    #[test]
    fn test_line_numbers() {
        let src = "package foo\n\nconst A = 1\n\nfunc F() {}\n";
        let file = parse_file("foo.go", src).unwrap();
        assert_eq!(file.decls[0].line, 3);
        assert_eq!(file.decls[1].line, 5);
    }
}
