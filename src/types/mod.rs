// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Core WebAssembly and value-model type definitions shared by every
//! lowering pass: the module value type, the dynamic type-tag enumeration,
//! and the index newtypes used to thread references to functions, globals,
//! tags, and labels through a [`crate::module::CompiledModule`].

mod instr;
pub use instr::*;

use num_enum::TryFromPrimitive;

// Defines a public newtype without public mutable access to the underlying
// integer, along with Deref/From convenience impls.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $type($underlying);

        impl $type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }

            pub fn index(self) -> $underlying {
                self.0
            }
        }

        impl ::core::ops::Deref for $type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$underlying> for $type {
            fn from(value: $underlying) -> Self {
                Self(value)
            }
        }
    };
}

newtype!(
    /// Index of a function in the emission-order function table (assigned
    /// after the imported functions).
    pub struct FuncIdx(u32);
);

newtype!(
    /// Index of a global in the module's global table.
    pub struct GlobalIdx(u32);
);

newtype!(
    /// Index of an exception tag in the module's tag table.
    pub struct TagIdx(u32);
);

newtype!(
    /// Index into a function's locals (payload slots and type-tag slots are
    /// both addressed this way; see the slot-pairing invariant in
    /// [`crate::scope`]).
    pub struct LocalIdx(u32);
);

newtype!(
    /// Index referencing an entry in the type section (only used for
    /// `call_indirect`, which this subset never actually lowers to, but
    /// carried since it's part of the shared instruction shape).
    pub struct TypeIdx(u32);
);

newtype!(
    /// Index referencing a structured control instruction inside an
    /// instruction sequence, i.e. a branch depth.
    pub struct LabelIdx(u32);
);

newtype!(
    /// Index of an allocated memory page (see [`crate::page::PageAllocator`]).
    pub struct PageIdx(u32);
);

newtype!(
    /// Index into the append-only exception-descriptor list
    /// (see [`crate::module::ExceptionRecord`]).
    pub struct ExceptionIdx(u32);
);

/// The module-wide primitive representation of numeric payloads. Chosen once
/// per compilation via [`crate::config::Config::valtype`] and threaded
/// through the rest of the pass by the driver (§4.1, §4.12).
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
}

impl ValType {
    /// Byte width of a value of this type in linear memory/a WASM local.
    pub fn size_bytes(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }
}

impl Default for ValType {
    fn default() -> Self {
        ValType::F64
    }
}

/// The dynamic type tag carried alongside every runtime value's payload.
///
/// Values below `0x10` are language-visible through `typeof`; values at and
/// above `0x10` are internal bookkeeping tags with no source-level spelling.
/// New tags must be added to the same partition to keep `typeof` lowering
/// (see [`crate::lower::expr`]) coherent — see the design note on "Type tags
/// as an open enum".
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum TypeTag {
    Number = 0x00,
    Boolean = 0x01,
    String = 0x02,
    Undefined = 0x03,
    Object = 0x04,
    Function = 0x05,
    Symbol = 0x06,
    BigInt = 0x07,

    /// Internal: a heap-allocated array.
    Array = 0x10,
    /// Internal: a compiled regular expression.
    Regexp = 0x11,
}

impl TypeTag {
    /// Display name as returned by `typeof`. `null` (tag `Object`, payload
    /// `NULL`) is handled by the caller since it shares a tag with ordinary
    /// objects.
    pub fn display_name(self) -> &'static str {
        match self {
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::String => "string",
            TypeTag::Undefined => "undefined",
            TypeTag::Object | TypeTag::Array | TypeTag::Regexp => "object",
            TypeTag::Function => "function",
            TypeTag::Symbol => "symbol",
            TypeTag::BigInt => "bigint",
        }
    }

    /// Whether this type is always truthy regardless of payload (arrays) —
    /// see the *truthy* predicate in §4.5.
    pub fn always_truthy(self) -> bool {
        matches!(self, TypeTag::Array | TypeTag::Function | TypeTag::Regexp)
    }
}

/// The distinguished payload value representing `null` (type tag `Object`).
pub const NULL_PAYLOAD: f64 = 0.0;

/// The distinguished payload value representing `undefined` (type tag
/// `Undefined`).
pub const UNDEFINED_PAYLOAD: f64 = 0.0;
