//! Documentation HTML rendering.
//!
//! Produces the per-package documentation fragment the site stores:
//! package doc paragraphs, then constants, variables, functions, and
//! types with their associated declarations. Output size is capped; a
//! document that would exceed the cap is reported as too large and the
//! caller substitutes a sentinel.

use core::fmt::Write;

use super::doc::{FuncDoc, PackageDoc, TypeDoc, ValueDoc};
use crate::error::{Error, ErrorKind};

/// The sentinel stored when rendered documentation exceeds the budget.
pub const DOC_TOO_LARGE_REPLACEMENT: &str = "<p>Documentation is too large to display.</p>";

/// Callbacks and bounds for one render.
pub struct RenderOptions<'a> {
    /// URL for a file of the package, or empty when unknown.
    pub file_link: &'a dyn Fn(&str) -> String,
    /// URL for a line of a file of the package, or empty when unknown.
    pub source_link: &'a dyn Fn(&str, u32) -> String,
    /// Hard cap on the rendered byte size.
    pub limit: usize,
}

/// Render documentation HTML for a package.
///
/// Returns an error of kind `PackageDocumentationHtmlTooLarge` when the
/// output would exceed `options.limit`.
pub fn render(doc: &PackageDoc, options: &RenderOptions<'_>) -> crate::Result<String> {
    let mut r = Renderer {
        out: String::new(),
        limit: options.limit,
        options,
    };
    r.package(doc)?;
    Ok(r.out)
}

struct Renderer<'a, 'b> {
    out: String,
    limit: usize,
    options: &'b RenderOptions<'a>,
}

impl Renderer<'_, '_> {
    fn package(&mut self, doc: &PackageDoc) -> crate::Result<()> {
        self.push(&format!(
            "<div class=\"Documentation\">\n<h2 id=\"pkg-overview\">package {}</h2>\n",
            html_escape(&doc.name)
        ))?;
        self.doc_paragraphs(&doc.doc)?;

        if !doc.consts.is_empty() {
            self.push("<h3 id=\"pkg-constants\">Constants</h3>\n")?;
            for value in &doc.consts {
                self.value(value)?;
            }
        }
        if !doc.vars.is_empty() {
            self.push("<h3 id=\"pkg-variables\">Variables</h3>\n")?;
            for value in &doc.vars {
                self.value(value)?;
            }
        }
        if !doc.funcs.is_empty() {
            self.push("<h3 id=\"pkg-functions\">Functions</h3>\n")?;
            for func in &doc.funcs {
                self.func(func)?;
            }
        }
        if !doc.types.is_empty() {
            self.push("<h3 id=\"pkg-types\">Types</h3>\n")?;
            for t in &doc.types {
                self.type_doc(t)?;
            }
        }

        if !doc.file_names.is_empty() {
            self.push("<h3 id=\"pkg-files\">Source Files</h3>\n<ul class=\"Documentation-files\">\n")?;
            for name in &doc.file_names {
                let href = (self.options.file_link)(name);
                if href.is_empty() {
                    self.push(&format!("<li>{}</li>\n", html_escape(name)))?;
                } else {
                    self.push(&format!(
                        "<li><a href=\"{}\">{}</a></li>\n",
                        html_escape(&href),
                        html_escape(name)
                    ))?;
                }
            }
            self.push("</ul>\n")?;
        }
        self.push("</div>\n")
    }

    fn value(&mut self, value: &ValueDoc) -> crate::Result<()> {
        self.decl_block(&value.text, &value.file, value.line)?;
        if let Some(doc) = &value.doc {
            self.doc_paragraphs(doc)?;
        }
        Ok(())
    }

    fn func(&mut self, func: &FuncDoc) -> crate::Result<()> {
        let id = match &func.recv {
            Some(recv) => format!("{recv}.{}", func.name),
            None => func.name.clone(),
        };
        self.push(&format!(
            "<h4 id=\"{}\">{} {}</h4>\n",
            html_escape(&id),
            if func.recv.is_some() { "method" } else { "func" },
            html_escape(&func.name)
        ))?;
        self.decl_block(&func.text, &func.file, func.line)?;
        if let Some(doc) = &func.doc {
            self.doc_paragraphs(doc)?;
        }
        Ok(())
    }

    fn type_doc(&mut self, t: &TypeDoc) -> crate::Result<()> {
        self.push(&format!("<h4 id=\"{0}\">type {0}</h4>\n", html_escape(&t.name)))?;
        self.decl_block(&t.text, &t.file, t.line)?;
        if let Some(doc) = &t.doc {
            self.doc_paragraphs(doc)?;
        }
        for value in t.consts.iter().chain(&t.vars) {
            self.value(value)?;
        }
        for func in t.funcs.iter().chain(&t.methods) {
            self.func(func)?;
        }
        Ok(())
    }

    /// A declaration's source text, linked to its upstream position.
    fn decl_block(&mut self, text: &str, file: &str, line: u32) -> crate::Result<()> {
        let href = (self.options.source_link)(file, line);
        if href.is_empty() {
            self.push(&format!("<pre>{}</pre>\n", html_escape(text)))?;
        } else {
            self.push(&format!(
                "<pre><a class=\"Documentation-source\" href=\"{}\">❖</a> {}</pre>\n",
                html_escape(&href),
                html_escape(text)
            ))?;
        }
        Ok(())
    }

    /// Doc comment text as paragraphs, split on blank lines.
    fn doc_paragraphs(&mut self, doc: &str) -> crate::Result<()> {
        for paragraph in doc.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Indented comment lines are preformatted blocks in godoc.
            if trimmed.lines().all(|l| l.starts_with('\t') || l.starts_with("    ")) {
                self.push(&format!("<pre>{}</pre>\n", html_escape(trimmed)))?;
            } else {
                self.push(&format!("<p>{}</p>\n", html_escape(trimmed)))?;
            }
        }
        Ok(())
    }

    fn push(&mut self, fragment: &str) -> crate::Result<()> {
        if self.out.len() + fragment.len() > self.limit {
            return Err(Error::new(
                ErrorKind::PackageDocumentationHtmlTooLarge,
                format!("render: documentation exceeds {} bytes", self.limit),
            ));
        }
        self.out
            .write_str(fragment)
            .map_err(|e| Error::with_source(ErrorKind::Internal, "render", e))
    }
}

fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}
