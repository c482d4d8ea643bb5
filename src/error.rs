// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Error strata: [`TodoError`] for constructs this compiler will never lower,
//! [`CompileError`] for conditions that abort a compilation outright, and the
//! unifying [`Error`] returned by [`crate::compile`].
//!
//! A third error stratum — the compile-time-semantic-error-as-runtime-throw
//! (`ReferenceError`, `TypeError`, `SyntaxError`, `RangeError`) — is not a
//! Rust error at all. It is lowered directly into emitted instructions (see
//! [`crate::lower::expr`]) rather than surfaced here.

use thiserror::Error as ThisError;

/// Source-position context carried alongside a diagnostic when the
/// originating ESTree node supplied a span.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

/// A construct this compiler deliberately does not support. Raising this
/// halts compilation; there is no recovery path.
#[derive(Debug, ThisError)]
#[error("unsupported: {message}")]
pub struct TodoError {
    pub message: String,
    pub span: Option<Span>,
}

impl TodoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), span: None }
    }

    pub fn at(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span: Some(span) }
    }
}

/// A condition that aborts compilation outright, distinct from a construct
/// this compiler will never support (see [`TodoError`]).
#[derive(Debug, ThisError)]
pub enum CompileError {
    #[error("malformed AST: {0}")]
    MalformedAst(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("source parser failed: {0}")]
    SourceParse(#[from] crate::hooks::SourceParseError),

    #[error("regex compiler failed: {0}")]
    RegexCompile(#[from] crate::hooks::RegexCompileError),
}

/// The top-level error type returned by [`crate::compile`], unifying both
/// error strata that abort compilation.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Todo(#[from] TodoError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

pub type Result<T> = core::result::Result<T, Error>;
