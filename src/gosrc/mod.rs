//! Go source analysis for documentation rendering.
//!
//! A deliberately small reimplementation of the toolchain pieces the
//! pipeline needs: match a file against a build context, parse its
//! top-level declarations, build the documentation model, and render
//! HTML. The stages are [`match_file`], [`parse_file`],
//! [`new_from_files`], and [`render`]; nothing here reads a filesystem.

pub mod ast;
pub mod constraints;
pub mod doc;
pub mod parser;
pub mod render;
pub mod scanner;

pub use ast::GoFile;
pub use constraints::{match_file, BuildContext, BUILD_ENVS};
pub use doc::{new_from_files, synopsis, Mode, PackageDoc};
pub use parser::parse_file;
pub use render::{render, RenderOptions, DOC_TOO_LARGE_REPLACEMENT};
pub use scanner::ParseError;
