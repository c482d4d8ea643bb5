// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The compiled output of a lowering pass: a [`CompiledModule`] value handed
//! to an external serializer. This crate never produces `.wasm` bytes
//! itself.

use std::collections::HashMap;

use crate::types::{PageIdx, TypeTag, ValType};

/// A compiled function record.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    /// Flattened parameter valtypes: payload then type-tag pair, per
    /// user-declared parameter. Asm-intrinsic helper functions may carry an
    /// unpaired list instead.
    pub params: Vec<ValType>,
    /// Locals declared beyond the parameters, in slot order.
    pub locals: Vec<ValType>,
    pub returns: Vec<ValType>,
    /// The function's statically-known result type tag, when its body's
    /// return sites agree on one. `None` for a function whose return sites
    /// disagree or whose result type is only known at runtime, in which
    /// case a caller must read the tag half of the returned pair instead of
    /// assuming a fixed type.
    pub return_type: Option<TypeTag>,
    pub wasm: Vec<crate::types::Instr>,
    /// Index assigned in emission order, after the imported functions.
    pub index: u32,
    pub export: bool,
    /// True for built-in/prototype-method helper functions synthesized by
    /// the driver rather than lowered from user source.
    pub internal: bool,
    /// Set when the body contains, or calls something that contains, a
    /// throw site.
    pub throws: bool,
}

/// A compiled global record.
#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    pub valtype: ValType,
    pub mutable: bool,
}

/// An append-only exception descriptor, indexed by the integer pushed at a
/// `throw` site.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ExceptionRecord {
    pub constructor: Option<String>,
    pub message: Option<String>,
}

/// One WASM exception tag. This crate only ever needs a single tag, carrying
/// one `i32` parameter (the exception-table index), for all user throws.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub params: Vec<ValType>,
}

/// One accumulated `{offset, bytes}` data-section entry.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// Flags describing the shape of the page-allocation map, consulted by later
/// emission decisions (e.g. whether the string fast-path code is reachable
/// at all).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct PageFlags {
    pub has_array: bool,
    pub has_string: bool,
}

/// The page-allocation map: symbolic reason (`"array:<name>"`,
/// `"string:<name>"`, `"asm intrinsic"`) to allocated page index, plus the
/// derived [`PageFlags`].
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PageMap {
    pub reasons: HashMap<String, PageIdx>,
    pub flags: PageFlags,
}

/// The structured intermediate representation produced by a compilation,
/// ready for an external serializer to render as a binary WASM module.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CompiledModule {
    pub funcs: Vec<Function>,
    pub globals: Vec<Global>,
    pub tags: Vec<Tag>,
    pub exceptions: Vec<ExceptionRecord>,
    pub pages: PageMap,
    pub data: Vec<DataSegment>,
}

