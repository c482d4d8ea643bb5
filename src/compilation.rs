// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! [`Compilation`]: the single value threading every mutable register —
//! function table, global scope, page map, data list, exception list, tag
//! list — through the lowering passes.
//!
//! Two compilations never share state; a `Compilation` is fully consumed via
//! [`Compilation::into_module`] rather than reset in place, so tests get a
//! clean slate by constructing a fresh value rather than calling a reset
//! routine (§9, "Ambient process-wide state").

use crate::builtins::BuiltinRegistry;
use crate::config::Config;
use crate::data::DataEmitter;
use crate::module::{CompiledModule, ExceptionRecord, Function, Tag};
use crate::page::PageAllocator;
use crate::scope::GlobalScope;
use crate::types::TagIdx;

pub struct Compilation {
    pub config: Config,
    pub globals: GlobalScope,
    pub pages: PageAllocator,
    pub data: DataEmitter,
    pub builtins: BuiltinRegistry,
    pub funcs: Vec<Function>,
    pub exceptions: Vec<ExceptionRecord>,
    pub tags: Vec<Tag>,
}

impl Compilation {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            globals: GlobalScope::new(),
            pages: PageAllocator::new(),
            data: DataEmitter::new(),
            builtins: BuiltinRegistry::new(),
            funcs: Vec::new(),
            exceptions: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Looks up the shared user-throw tag, allocating it on first use.
    pub fn ensure_throw_tag(&mut self) -> TagIdx {
        if let Some(idx) =
            self.tags.iter().position(|t| t.params == [crate::types::ValType::I32])
        {
            return TagIdx::new(idx as u32);
        }
        self.tags.push(Tag { params: vec![crate::types::ValType::I32] });
        TagIdx::new((self.tags.len() - 1) as u32)
    }

    /// Records a fresh entry in the append-only exception list, returning
    /// its index.
    pub fn push_exception(&mut self, record: ExceptionRecord) -> u32 {
        self.exceptions.push(record);
        (self.exceptions.len() - 1) as u32
    }

    pub fn into_module(self) -> CompiledModule {
        CompiledModule {
            funcs: self.funcs,
            globals: self
                .globals
                .iter()
                .map(|(name, binding)| crate::module::Global {
                    name: name.clone(),
                    valtype: binding.valtype,
                    mutable: true,
                })
                .collect(),
            tags: self.tags,
            exceptions: self.exceptions,
            pages: self.pages.into_map(),
            data: self.data.into_segments(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_compilation_starts_with_no_functions() {
        let compilation = Compilation::new(Config::default());
        assert!(compilation.funcs.is_empty());
    }

    #[test]
    fn throw_tag_is_memoized() {
        let mut compilation = Compilation::new(Config::default());
        let first = compilation.ensure_throw_tag();
        let second = compilation.ensure_throw_tag();
        assert_eq!(first, second);
        assert_eq!(compilation.tags.len(), 1);
    }
}
