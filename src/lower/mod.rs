// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tree-directed lowering of the object-hacked AST into typed WASM
//! instructions: expression lowering ([`expr`]), statement lowering
//! ([`stmt`]), and the stack-balance analysis ([`leftover`]) that decides
//! implicit returns and redundant drops.

pub mod asm;
pub mod expr;
pub mod leftover;
pub mod stmt;

use crate::compilation::Compilation;
use crate::error::Result;
use crate::hooks::{RegexCompiler, SourceParser};
use crate::scope::Scope;

/// The kind of structured control construct at one level of the depth
/// stack, consulted by `break`/`continue` to compute a branch depth (§4.6,
/// §4.10).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DepthKind {
    If,
    While,
    For,
    ForOf,
    Block,
    Try,
    Catch,
}

/// Everything a lowering function needs beyond the AST node itself: the
/// shared compilation registers, the enclosing function's scope, the
/// control-flow depth stack, and the optional injected hooks for `eval` and
/// literal regexes.
pub struct LowerCtx<'a> {
    pub compilation: &'a mut Compilation,
    pub scope: &'a mut Scope,
    pub depth: &'a mut Vec<DepthKind>,
    pub source_parser: Option<&'a dyn SourceParser>,
    pub regex_compiler: Option<&'a mut dyn RegexCompiler>,
}

impl<'a> LowerCtx<'a> {
    /// Depth (number of labels) between the innermost position and the
    /// nearest enclosing loop, for `break`/`continue` branch targets.
    /// `continue` targets one level shallower than `break`, per §4.6.
    pub fn nearest_loop_depth(&self) -> Option<u32> {
        self.depth
            .iter()
            .rev()
            .position(|kind| matches!(kind, DepthKind::While | DepthKind::For | DepthKind::ForOf))
            .map(|rev_idx| rev_idx as u32)
    }
}

/// Implements [`leftover::CalleeArity`] by consulting the compilation's
/// function table (falling back to an unknown/self-recursive callee
/// conservatively contributing one result and zero params, since its own
/// signature is still being assembled).
pub struct CompilationArity<'a>(pub &'a Compilation);

impl leftover::CalleeArity for CompilationArity<'_> {
    fn arity(&self, target: crate::types::CallTarget) -> (u32, u32) {
        match target {
            crate::types::CallTarget::SelfRecursive => (0, 2),
            crate::types::CallTarget::Func(idx) => self
                .0
                .funcs
                .iter()
                .find(|f| f.index == idx.index())
                .map(|f| (f.params.len() as u32, f.returns.len() as u32))
                .unwrap_or((0, 2)),
        }
    }
}

pub(crate) type LowerResult<T> = Result<T>;
