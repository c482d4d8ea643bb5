// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Byte-level encoding primitives: LEB128 integers, IEEE-754 floats, and the
//! length-prefixed byte-vector convention WASM uses throughout its binary
//! format.
//!
//! This module is the mirror image of a decoder's LEB128 reader: where a
//! decoder pulls bytes off a stream and reconstructs an integer, we start
//! with the integer and push bytes onto a growing `Vec<u8>`.

/// Appends the unsigned LEB128 encoding of `value` to `out`.
pub fn write_unsigned_leb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Appends the signed LEB128 encoding of `value` to `out`.
pub fn write_signed_leb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Appends the little-endian IEEE-754 encoding of a 32-bit float.
pub fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Appends the little-endian IEEE-754 encoding of a 64-bit float.
pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Prepends a `u32` LEB128 length to `bytes` and appends both to `out` — the
/// `vec(byte)` convention used for names, expressions, and data segments.
pub fn write_byte_vec(out: &mut Vec<u8>, bytes: &[u8]) {
    write_unsigned_leb128(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

use crate::types::{Opcode, ValType};

/// The generic-opcode table (`add`, `sub`, `mul`, `eq`, `eqz`, `lt`, `load`,
/// `store`, and the i32 conversion pair) resolved once from the module
/// valtype at driver start (§4.1, §4.12) and threaded through the rest of a
/// compilation. Never re-resolved per node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpcodeTable {
    pub valtype: ValType,
    pub add: Opcode,
    pub sub: Opcode,
    pub mul: Opcode,
    pub div: Opcode,
    pub eq: Opcode,
    pub ne: Opcode,
    pub lt: Opcode,
    pub gt: Opcode,
    pub le: Opcode,
    pub ge: Opcode,
    pub eqz: Opcode,
    pub load: Opcode,
    pub store: Opcode,
    /// Converts a value of `valtype` to `i32` (truncation for floats, wrap
    /// for `i64`; identity for `i32`, handled by the caller).
    pub i32_to: Option<Opcode>,
    /// Converts an `i32` back to `valtype`.
    pub i32_from: Option<Opcode>,
}

impl OpcodeTable {
    pub fn resolve(valtype: ValType) -> Self {
        match valtype {
            ValType::I32 => Self {
                valtype,
                add: Opcode::I32Add,
                sub: Opcode::I32Sub,
                mul: Opcode::I32Mul,
                div: Opcode::I32DivS,
                eq: Opcode::I32Eq,
                ne: Opcode::I32Ne,
                lt: Opcode::I32LtS,
                gt: Opcode::I32GtS,
                le: Opcode::I32LeS,
                ge: Opcode::I32GeS,
                eqz: Opcode::I32Eqz,
                load: Opcode::I32Load,
                store: Opcode::I32Store,
                i32_to: None,
                i32_from: None,
            },
            ValType::I64 => Self {
                valtype,
                add: Opcode::I64Add,
                sub: Opcode::I64Sub,
                mul: Opcode::I64Mul,
                div: Opcode::I64DivS,
                eq: Opcode::I64Eq,
                ne: Opcode::I64Ne,
                lt: Opcode::I64LtS,
                gt: Opcode::I64GtS,
                le: Opcode::I64LeS,
                ge: Opcode::I64GeS,
                eqz: Opcode::I64Eqz,
                load: Opcode::I64Load,
                store: Opcode::I64Store,
                i32_to: Some(Opcode::I32WrapI64),
                i32_from: Some(Opcode::I64ExtendI32S),
            },
            ValType::F32 => Self {
                valtype,
                add: Opcode::F32Add,
                sub: Opcode::F32Sub,
                mul: Opcode::F32Mul,
                div: Opcode::F32Div,
                eq: Opcode::F32Eq,
                ne: Opcode::F32Ne,
                lt: Opcode::F32Lt,
                gt: Opcode::F32Gt,
                le: Opcode::F32Le,
                ge: Opcode::F32Ge,
                eqz: Opcode::I32Eqz,
                load: Opcode::F32Load,
                store: Opcode::F32Store,
                i32_to: Some(Opcode::I32TruncF32S),
                i32_from: Some(Opcode::F32ConvertI32S),
            },
            ValType::F64 => Self {
                valtype,
                add: Opcode::F64Add,
                sub: Opcode::F64Sub,
                mul: Opcode::F64Mul,
                div: Opcode::F64Div,
                eq: Opcode::F64Eq,
                ne: Opcode::F64Ne,
                lt: Opcode::F64Lt,
                gt: Opcode::F64Gt,
                le: Opcode::F64Le,
                ge: Opcode::F64Ge,
                eqz: Opcode::I32Eqz,
                load: Opcode::F64Load,
                store: Opcode::F64Store,
                i32_to: Some(Opcode::I32TruncF64S),
                i32_from: Some(Opcode::F64ConvertI32S),
            },
        }
    }
}

#[cfg(test)]
mod opcode_table_tests {
    use super::*;

    #[test]
    fn f64_table_uses_f64_opcodes() {
        let table = OpcodeTable::resolve(ValType::F64);
        assert_eq!(table.add, Opcode::F64Add);
        assert_eq!(table.i32_to, Some(Opcode::I32TruncF64S));
    }

    #[test]
    fn i32_table_needs_no_conversion() {
        let table = OpcodeTable::resolve(ValType::I32);
        assert_eq!(table.i32_to, None);
        assert_eq!(table.i32_from, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_leb128_small() {
        let mut out = Vec::new();
        write_unsigned_leb128(&mut out, 0);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn unsigned_leb128_multibyte() {
        let mut out = Vec::new();
        write_unsigned_leb128(&mut out, 624_485);
        assert_eq!(out, vec![0xe5, 0x8e, 0x26]);
    }

    #[test]
    fn signed_leb128_negative() {
        let mut out = Vec::new();
        write_signed_leb128(&mut out, -624_485);
        assert_eq!(out, vec![0x9b, 0xf1, 0x59]);
    }

    #[test]
    fn signed_leb128_small_negative() {
        let mut out = Vec::new();
        write_signed_leb128(&mut out, -1);
        assert_eq!(out, vec![0x7f]);
    }

    #[test]
    fn byte_vec_prefixes_length() {
        let mut out = Vec::new();
        write_byte_vec(&mut out, b"hi");
        assert_eq!(out, vec![0x02, b'h', b'i']);
    }
}
