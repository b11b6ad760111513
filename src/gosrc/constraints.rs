//! Build-constraint evaluation.
//!
//! Decides whether a `.go` file participates in a build for a given
//! `(GOOS, GOARCH)` pair, using the filename suffix rules and the
//! constraint comments in the file header (`//go:build` expressions and
//! legacy `// +build` lines). Everything operates on in-memory bytes;
//! nothing here touches a filesystem.

use super::scanner::ParseError;

/// A `(GOOS, GOARCH)` pair plus the implied tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: &'static str,
    pub goarch: &'static str,
}

/// The fixed, ordered list of build environments tried per package.
pub const BUILD_ENVS: &[BuildContext] = &[
    BuildContext { goos: "linux", goarch: "amd64" },
    BuildContext { goos: "windows", goarch: "amd64" },
    BuildContext { goos: "darwin", goarch: "amd64" },
    BuildContext { goos: "js", goarch: "wasm" },
    BuildContext { goos: "linux", goarch: "js" },
];

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "illumos", "ios", "js", "linux", "netbsd",
    "openbsd", "plan9", "solaris", "wasip1", "windows",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "arm", "arm64", "js", "loong64", "mips", "mips64", "mips64le", "mipsle",
    "ppc64", "ppc64le", "riscv64", "s390x", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "illumos", "ios", "linux", "netbsd",
    "openbsd", "solaris",
];

/// Newest release tag the evaluator satisfies (`go1` .. `go1.N`).
const MAX_RELEASE_MINOR: u32 = 99;

impl BuildContext {
    /// Whether a single constraint tag holds in this context.
    #[must_use]
    pub fn satisfies_tag(&self, tag: &str) -> bool {
        if tag == self.goos || tag == self.goarch || tag == "gc" || tag == "cgo" {
            return true;
        }
        if tag == "unix" {
            return UNIX_OS.contains(&self.goos);
        }
        if tag == "go1" {
            return true;
        }
        if let Some(minor) = tag.strip_prefix("go1.") {
            return minor.parse::<u32>().is_ok_and(|m| m <= MAX_RELEASE_MINOR);
        }
        false
    }

    /// Whether `name` (a bare file name) is allowed by the `_GOOS`,
    /// `_GOARCH`, and `_GOOS_GOARCH` filename rules. A `_test` suffix is
    /// stripped before the check, mirroring the go tool.
    #[must_use]
    pub fn matches_file_name(&self, name: &str) -> bool {
        let Some(stem) = name.strip_suffix(".go") else {
            return false;
        };
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 2 {
            return true;
        }
        let last = parts[parts.len() - 1];
        if KNOWN_ARCH.contains(&last) {
            if last != self.goarch {
                return false;
            }
            if parts.len() >= 3 {
                let prev = parts[parts.len() - 2];
                if KNOWN_OS.contains(&prev) && prev != self.goos {
                    return false;
                }
            }
            return true;
        }
        if KNOWN_OS.contains(&last) {
            return last == self.goos;
        }
        true
    }
}

/// Whether `content` participates in a build for `ctx`.
///
/// Applies the filename rule first, then the constraint comments in the
/// file header. A malformed `//go:build` expression is a parse failure,
/// surfaced as invalid package contents by the caller.
pub fn match_file(ctx: BuildContext, name: &str, content: &str) -> Result<bool, ParseError> {
    if !ctx.matches_file_name(name) {
        return Ok(false);
    }
    match header_constraint(content)? {
        Some(expr) => Ok(eval(&expr, ctx)),
        None => Ok(true),
    }
}

/// A parsed build-constraint expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

fn eval(expr: &Expr, ctx: BuildContext) -> bool {
    match expr {
        Expr::Tag(tag) => ctx.satisfies_tag(tag),
        Expr::Not(e) => !eval(e, ctx),
        Expr::And(a, b) => eval(a, ctx) && eval(b, ctx),
        Expr::Or(a, b) => eval(a, ctx) || eval(b, ctx),
    }
}

/// Extract the constraint governing a file, scanning comment lines up
/// to the package clause. A `//go:build` line wins over `// +build`.
fn header_constraint(content: &str) -> Result<Option<Expr>, ParseError> {
    let mut plus_build: Option<Expr> = None;
    let mut in_block_comment = false;
    for (i, raw) in content.lines().enumerate() {
        let line_no = u32::try_from(i).unwrap_or(u32::MAX).saturating_add(1);
        let line = raw.trim();
        if in_block_comment {
            if line.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if line.starts_with("/*") && !line.contains("*/") {
            in_block_comment = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("//go:build") {
            let rest = rest.trim();
            return parse_build_expr(rest, line_no).map(Some);
        }
        if let Some(rest) = line.strip_prefix("//") {
            let rest = rest.trim();
            if let Some(tags) = rest.strip_prefix("+build") {
                let expr = parse_plus_build(tags.trim());
                plus_build = match (plus_build, expr) {
                    (Some(acc), Some(e)) => Some(Expr::And(Box::new(acc), Box::new(e))),
                    (acc, e) => acc.or(e),
                };
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        // First non-comment line; constraints must appear before it.
        break;
    }
    Ok(plus_build)
}

/// Parse a `//go:build` expression: `!`, `&&`, `||`, parentheses, tags.
fn parse_build_expr(text: &str, line: u32) -> Result<Expr, ParseError> {
    let tokens = tokenize_build_expr(text, line)?;
    let mut p = ExprParser { tokens, pos: 0, line };
    let expr = p.or_expr()?;
    if p.pos != p.tokens.len() {
        return Err(ParseError::new("trailing tokens in build expression", line));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    AndAnd,
    OrOr,
    LParen,
    RParen,
}

fn tokenize_build_expr(text: &str, line: u32) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '!' => tokens.push(Token::Not),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push(Token::AndAnd),
                _ => return Err(ParseError::new("malformed && in build expression", line)),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push(Token::OrOr),
                _ => return Err(ParseError::new("malformed || in build expression", line)),
            },
            _ if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '.' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Tag(text[i..end].to_string()));
            }
            _ => return Err(ParseError::new(format!("invalid char {c:?} in build expression"), line)),
        }
    }
    if tokens.is_empty() {
        return Err(ParseError::new("empty build expression", line));
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    line: u32,
}

impl ExprParser {
    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.tokens.get(self.pos) == Some(&Token::OrOr) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary_expr()?;
        while self.tokens.get(self.pos) == Some(&Token::AndAnd) {
            self.pos += 1;
            let right = self.unary_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.tokens.get(self.pos) {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary_expr()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                if self.tokens.get(self.pos) != Some(&Token::RParen) {
                    return Err(ParseError::new("missing ) in build expression", self.line));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Tag(tag)) => {
                let tag = tag.clone();
                self.pos += 1;
                Ok(Expr::Tag(tag))
            }
            _ => Err(ParseError::new("unexpected end of build expression", self.line)),
        }
    }
}

/// Parse one legacy `// +build` line: space-separated options are OR'd,
/// comma-separated terms are AND'd, `!` negates. Unparsable lines are
/// ignored, as the go tool ignores them.
fn parse_plus_build(text: &str) -> Option<Expr> {
    let mut or: Option<Expr> = None;
    for option in text.split_whitespace() {
        let mut and: Option<Expr> = None;
        for term in option.split(',') {
            let (negate, tag) = match term.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, term),
            };
            if tag.is_empty() {
                continue;
            }
            let mut e = Expr::Tag(tag.to_string());
            if negate {
                e = Expr::Not(Box::new(e));
            }
            and = Some(match and {
                Some(acc) => Expr::And(Box::new(acc), Box::new(e)),
                None => e,
            });
        }
        if let Some(e) = and {
            or = Some(match or {
                Some(acc) => Expr::Or(Box::new(acc), Box::new(e)),
                None => e,
            });
        }
    }
    or
}
