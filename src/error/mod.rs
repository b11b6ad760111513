//! The error taxonomy shared by the ingestion pipeline.
//!
//! Every failure the core can record is one of a closed set of kinds,
//! each with an HTTP-like status code that is persisted in the version
//! map. Wrapping an error with more context never changes its kind, so
//! `Error::kind` and `ErrorKind::status` are stable at every layer.

use core::fmt::{Display, Formatter, Result as FmtResult};
use std::error::Error as StdError;

/// The closed set of failure kinds the site persists and acts on.
///
/// Codes in the 2xx/4xx private ranges (290, 490, 491) and the 6xx
/// per-package range are site-internal; the on-demand coordinator
/// collapses them to standard HTTP codes before anything reaches a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// The module or version does not exist upstream.
    #[error("not found")]
    NotFound,

    /// The request itself is malformed (e.g. an unparseable version).
    #[error("invalid argument")]
    InvalidArgument,

    /// The path matches an excluded prefix; ingestion was skipped.
    #[error("excluded")]
    Excluded,

    /// The deadline elapsed while talking to the proxy.
    #[error("proxy timed out")]
    ProxyTimedOut,

    /// The proxy failed in a way that is not a 404 or a timeout.
    #[error("proxy error")]
    ProxyError,

    /// The module cannot be processed: malformed zip, no packages,
    /// missing go.mod path, or too many packages.
    #[error("bad module")]
    BadModule,

    /// The zip's go.mod declares a different module path than the one
    /// fetched. Persisted so future requests short-circuit.
    #[error("alternative module")]
    AlternativeModule,

    /// The module was ingested but at least one package was not.
    #[error("has incomplete packages")]
    HasIncompletePackages,

    /// A package directory does not form a valid import path.
    #[error("package has a bad import path")]
    PackageBadImportPath,

    /// A package's files do not make up a valid package (parse errors,
    /// multiple package clauses).
    #[error("package has invalid contents")]
    PackageInvalidContents,

    /// The package's rendered documentation exceeded the size budget;
    /// the sentinel replacement was stored instead.
    #[error("package documentation HTML is too large")]
    PackageDocumentationHtmlTooLarge,

    /// No configured build environment matched any of the package's files.
    #[error("package build context is not supported")]
    PackageBuildContextNotSupported,

    /// A source file in the package exceeds the per-file size limit.
    #[error("package file exceeds the size limit")]
    PackageMaxFileSizeLimitExceeded,

    /// An internal invariant failed; carries a backtrace in the context.
    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    /// The status code persisted in the version map for this kind.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::HasIncompletePackages => 290,
            Self::InvalidArgument => 400,
            Self::Excluded => 403,
            Self::NotFound => 404,
            Self::ProxyTimedOut => 408,
            Self::BadModule => 490,
            Self::AlternativeModule => 491,
            Self::ProxyError | Self::Internal => 500,
            Self::PackageBadImportPath => 600,
            Self::PackageInvalidContents => 601,
            Self::PackageDocumentationHtmlTooLarge => 602,
            Self::PackageBuildContextNotSupported => 603,
            Self::PackageMaxFileSizeLimitExceeded => 604,
        }
    }
}

/// The status recorded for a fully successful ingestion.
pub const STATUS_OK: u16 = 200;

/// An error with a kind, a context chain, and an optional cause.
///
/// Context is added with [`Error::context`] or
/// [`ResultExt::with_context`]; each layer prepends its operation name
/// and key arguments, so the rendered message reads outermost-first.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    context: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    /// Create an error of the given kind with an initial context string.
    #[must_use]
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    /// Create an error of the given kind wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Prepend a context identifier, preserving the kind and the cause.
    #[must_use]
    pub fn context(mut self, context: impl AsRef<str>) -> Self {
        self.context = format!("{}: {}", context.as_ref(), self.context);
        self
    }

    /// The kind assigned when the error was created.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The status code persisted for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Whether this error has the given kind, at any wrapping depth.
    #[must_use]
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.context.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.context, self.kind)?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn StdError + 'static))
    }
}

/// Context-wrapping for `Result<T, Error>` in return-then-wrap style:
/// every fallible call site wraps once at its own boundary.
pub trait ResultExt<T> {
    /// Prepend a lazily-built context identifier to the error, if any.
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> crate::Result<T>;
}

impl<T> ResultExt<T> for crate::Result<T> {
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> crate::Result<T> {
        self.map_err(|e| e.context(f().into()))
    }
}
