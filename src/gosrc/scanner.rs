//! A cursor over Go source text.
//!
//! The scanner understands exactly as much Go lexical structure as the
//! top-level parser needs: comments, the three string-literal forms,
//! identifiers, and bracket balancing that is not fooled by brackets
//! inside literals or comments.

use thiserror::Error;

/// A lexical-level failure; surfaces as invalid package contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {msg}")]
pub struct ParseError {
    pub msg: String,
    pub line: u32,
}

impl ParseError {
    #[must_use]
    pub fn new(msg: impl Into<String>, line: u32) -> Self {
        Self { msg: msg.into(), line }
    }
}

/// A single `//` or `/* */` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Comment text with markers stripped (one leading space trimmed).
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Comment {
    /// Whether this is a `//go:` style directive rather than prose.
    #[must_use]
    pub fn is_directive(&self) -> bool {
        self.text.starts_with("go:") || self.text.starts_with("+build")
    }
}

#[derive(Debug)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    #[must_use]
    pub const fn pos(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.src[from..to]
    }

    #[must_use]
    pub fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    #[must_use]
    pub fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip spaces, tabs, and carriage returns; stop at a newline.
    pub fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
    }

    /// Skip all whitespace including newlines. Returns how many
    /// newlines were crossed (used for doc-comment adjacency).
    pub fn skip_space(&mut self) -> u32 {
        let mut newlines = 0;
        while let Some(c) = self.peek() {
            if c == '\n' {
                newlines += 1;
                self.bump();
            } else if c == ' ' || c == '\t' || c == '\r' {
                self.bump();
            } else {
                break;
            }
        }
        newlines
    }

    /// Consume a comment if the cursor sits on one.
    pub fn next_comment(&mut self) -> Result<Option<Comment>, ParseError> {
        match (self.peek(), self.peek2()) {
            (Some('/'), Some('/')) => {
                let start_line = self.line;
                self.pos += 2;
                let text_start = self.pos;
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                let text = self.src[text_start..self.pos].strip_prefix(' ').map_or_else(
                    || self.src[text_start..self.pos].to_string(),
                    ToString::to_string,
                );
                Ok(Some(Comment {
                    text,
                    start_line,
                    end_line: start_line,
                }))
            }
            (Some('/'), Some('*')) => {
                let start_line = self.line;
                self.pos += 2;
                let text_start = self.pos;
                loop {
                    if self.at_eof() {
                        return Err(ParseError::new("unterminated block comment", start_line));
                    }
                    if self.src[self.pos..].starts_with("*/") {
                        break;
                    }
                    self.bump();
                }
                let text = self.src[text_start..self.pos].trim().to_string();
                let end_line = self.line;
                self.pos += 2;
                Ok(Some(Comment {
                    text,
                    start_line,
                    end_line,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Read a Go identifier, or `None` if the cursor is not on one.
    pub fn read_ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let first = self.peek()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        Some(&self.src[start..self.pos])
    }

    /// Consume a string, raw string, or rune literal the cursor sits on.
    /// Returns the unquoted contents for interpreted and raw strings.
    pub fn read_string(&mut self) -> Result<&'a str, ParseError> {
        let quote = self.peek().ok_or_else(|| ParseError::new("expected string literal", self.line))?;
        let start_line = self.line;
        match quote {
            '"' | '\'' => {
                self.bump();
                let text_start = self.pos;
                loop {
                    match self.peek() {
                        None | Some('\n') => {
                            return Err(ParseError::new("unterminated string literal", start_line));
                        }
                        Some('\\') => {
                            self.bump();
                            self.bump();
                        }
                        Some(c) if c == quote => {
                            let text = &self.src[text_start..self.pos];
                            self.bump();
                            return Ok(text);
                        }
                        Some(_) => {
                            self.bump();
                        }
                    }
                }
            }
            '`' => {
                self.bump();
                let text_start = self.pos;
                loop {
                    match self.peek() {
                        None => return Err(ParseError::new("unterminated raw string literal", start_line)),
                        Some('`') => {
                            let text = &self.src[text_start..self.pos];
                            self.bump();
                            return Ok(text);
                        }
                        Some(_) => {
                            self.bump();
                        }
                    }
                }
            }
            _ => Err(ParseError::new("expected string literal", start_line)),
        }
    }

    /// With the cursor on `open`, consume through the matching `close`,
    /// skipping literals and comments along the way.
    pub fn skip_balanced(&mut self, open: char, close: char) -> Result<(), ParseError> {
        let start_line = self.line;
        if self.peek() != Some(open) {
            return Err(ParseError::new(format!("expected {open:?}"), self.line));
        }
        let mut depth = 0u32;
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' | '`' => {
                    self.read_string()?;
                }
                '/' if matches!(self.peek2(), Some('/' | '*')) => {
                    self.next_comment()?;
                }
                _ => {
                    if c == open {
                        depth += 1;
                    } else if c == close {
                        depth -= 1;
                        if depth == 0 {
                            self.bump();
                            return Ok(());
                        }
                    }
                    self.bump();
                }
            }
        }
        Err(ParseError::new(format!("unbalanced {open:?}"), start_line))
    }

    /// Consume to the end of the current declaration or spec: a newline
    /// or `;` at zero bracket depth, or EOF. The cursor is left on the
    /// terminator. Returns the consumed source slice.
    pub fn skip_to_line_end(&mut self, stop_at: &[char]) -> Result<&'a str, ParseError> {
        let start = self.pos;
        let mut depth = 0u32;
        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' | '`' => {
                    self.read_string()?;
                }
                '/' if matches!(self.peek2(), Some('/' | '*')) => {
                    // At depth 0 a line comment ends the line it is on;
                    // nested ones are just consumed.
                    if depth == 0 && self.peek2() == Some('/') {
                        break;
                    }
                    self.next_comment()?;
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    self.bump();
                }
                ')' | ']' | '}' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.bump();
                }
                _ if depth == 0 && (c == '\n' || c == ';' || stop_at.contains(&c)) => break,
                _ => {
                    self.bump();
                }
            }
        }
        Ok(&self.src[start..self.pos])
    }
}
