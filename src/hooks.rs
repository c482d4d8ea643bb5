// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Injected hooks for the peripheral concerns this crate deliberately
//! excludes: parsing the string literal argument to `eval`, and compiling a
//! literal regular expression into matcher code.

use thiserror::Error as ThisError;

use crate::ast;
use crate::types::FuncIdx;

#[derive(Debug, ThisError)]
#[error("source parse failed: {0}")]
pub struct SourceParseError(pub String);

#[derive(Debug, ThisError)]
#[error("regex compile failed: {0}")]
pub struct RegexCompileError(pub String);

/// Parses the string literal argument to an `eval` call into a `Program`
/// this crate can then lower like any other function body.
///
/// A caller not supporting `eval` at all can supply an implementation that
/// always errors; `eval` of a non-literal argument is a [`crate::error::TodoError`]
/// regardless of whether a parser is installed.
pub trait SourceParser {
    fn parse(&self, source: &str) -> Result<ast::Program, SourceParseError>;
}

/// Compiles a literal regular expression (tag, pattern, flags) into a
/// matcher function, returning the index of a freshly emitted function that
/// matches the pattern against a string pointer/length pair.
pub trait RegexCompiler {
    fn compile(&mut self, pattern: &str, flags: &str) -> Result<FuncIdx, RegexCompileError>;
}
