// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly instruction opcodes and the typed operand shapes this crate
//! emits them with.
//!
//! Unlike a decoder, which must recover operands from a byte stream, the
//! lowering passes in this crate construct [`Instr`] values directly and hand
//! them to [`crate::encode`] for LEB128/IEEE-754 rendering only once a
//! function body is complete.

use num_enum::TryFromPrimitive;

use super::{FuncIdx, GlobalIdx, LabelIdx, LocalIdx, TagIdx, TypeIdx, ValType};

/// WebAssembly instruction opcode (control, parametric, variable, memory,
/// numeric, plus the exception-handling proposal's `try`/`catch`/`throw`
/// family and the bulk-memory prefix this crate actually emits through).
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum Opcode {
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,

    // Exception-handling proposal.
    Try = 0x06,
    Catch = 0x07,
    Throw = 0x08,
    Rethrow = 0x09,

    End = 0x0b,
    Br = 0x0c,
    BrIf = 0x0d,
    BrTable = 0x0e,
    Return = 0x0f,
    Call = 0x10,
    CallIndirect = 0x11,

    Delegate = 0x18,
    CatchAll = 0x19,

    Drop = 0x1a,
    Select = 0x1b,

    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,

    I32Load = 0x28,
    I64Load = 0x29,
    F32Load = 0x2a,
    F64Load = 0x2b,
    I32Load8S = 0x2c,
    I32Load8U = 0x2d,
    I32Load16S = 0x2e,
    I32Load16U = 0x2f,
    I64Load8S = 0x30,
    I64Load8U = 0x31,
    I64Load16S = 0x32,
    I64Load16U = 0x33,
    I64Load32S = 0x34,
    I64Load32U = 0x35,
    I32Store = 0x36,
    I64Store = 0x37,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3a,
    I32Store16 = 0x3b,
    I64Store8 = 0x3c,
    I64Store16 = 0x3d,
    I64Store32 = 0x3e,
    MemorySize = 0x3f,
    MemoryGrow = 0x40,

    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4a,
    I32GtU = 0x4b,
    I32LeS = 0x4c,
    I32LeU = 0x4d,
    I32GeS = 0x4e,
    I32GeU = 0x4f,
    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5a,
    F32Eq = 0x5b,
    F32Ne = 0x5c,
    F32Lt = 0x5d,
    F32Gt = 0x5e,
    F32Le = 0x5f,
    F32Ge = 0x60,
    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,
    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6a,
    I32Sub = 0x6b,
    I32Mul = 0x6c,
    I32DivS = 0x6d,
    I32DivU = 0x6e,
    I32RemS = 0x6f,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,
    I64Clz = 0x79,
    I64Ctz = 0x7a,
    I64Popcnt = 0x7b,
    I64Add = 0x7c,
    I64Sub = 0x7d,
    I64Mul = 0x7e,
    I64DivS = 0x7f,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8a,
    F32Abs = 0x8b,
    F32Neg = 0x8c,
    F32Ceil = 0x8d,
    F32Floor = 0x8e,
    F32Trunc = 0x8f,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F32Min = 0x96,
    F32Max = 0x97,
    F32Copysign = 0x98,
    F64Abs = 0x99,
    F64Neg = 0x9a,
    F64Ceil = 0x9b,
    F64Floor = 0x9c,
    F64Trunc = 0x9d,
    F64Nearest = 0x9e,
    F64Sqrt = 0x9f,
    F64Add = 0xa0,
    F64Sub = 0xa1,
    F64Mul = 0xa2,
    F64Div = 0xa3,
    F64Min = 0xa4,
    F64Max = 0xa5,
    F64Copysign = 0xa6,
    I32WrapI64 = 0xa7,
    I32TruncF32S = 0xa8,
    I32TruncF32U = 0xa9,
    I32TruncF64S = 0xaa,
    I32TruncF64U = 0xab,
    I64ExtendI32S = 0xac,
    I64ExtendI32U = 0xad,
    I64TruncF32S = 0xae,
    I64TruncF32U = 0xaf,
    I64TruncF64S = 0xb0,
    I64TruncF64U = 0xb1,
    F32ConvertI32S = 0xb2,
    F32ConvertI32U = 0xb3,
    F32ConvertI64S = 0xb4,
    F32ConvertI64U = 0xb5,
    F32DemoteF64 = 0xb6,
    F64ConvertI32S = 0xb7,
    F64ConvertI32U = 0xb8,
    F64ConvertI64S = 0xb9,
    F64ConvertI64U = 0xba,
    F64PromoteF32 = 0xbb,
    I32ReinterpretF32 = 0xbc,
    I64ReinterpretF64 = 0xbd,
    F32ReinterpretI32 = 0xbe,
    F64ReinterpretI64 = 0xbf,
    I32Extend8S = 0xc0,
    I32Extend16S = 0xc1,
    I64Extend8S = 0xc2,
    I64Extend16S = 0xc3,
    I64Extend32S = 0xc4,

    /// Prefix for the bulk memory/table instruction family.
    BulkPrefix = 0xfc,
}

/// Bulk memory/table instruction opcodes (0xfc prefix). This crate only
/// lowers to `MemoryCopy` (string concatenation) and `MemoryFill`/`DataDrop`
/// (array/string teardown); the rest are carried for completeness of the
/// shared opcode table.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum BulkOpcode {
    MemoryInit = 8,
    DataDrop = 9,
    MemoryCopy = 10,
    MemoryFill = 11,
}

/// Memory access operands for load and store instructions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemArg {
    /// Static offset added to the dynamic address.
    pub offset: u32,
    /// Alignment hint (log2 of the alignment requirement).
    pub align: u32,
}

impl MemArg {
    /// A natural-alignment memarg at the given offset for a value of `size`
    /// bytes (1, 2, 4, or 8).
    pub fn natural(offset: u32, size: u32) -> Self {
        let align = match size {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            _ => unreachable!("unsupported access size {size}"),
        };
        Self { offset, align }
    }
}

/// Block-result arity for `block`/`loop`/`if`/`try`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockType {
    /// Block produces no results.
    Empty,
    /// Block produces a single result of the given value type.
    Result(ValType),
}

/// The callee of a `call` instruction. Ordinary calls resolve to a concrete
/// [`FuncIdx`] immediately; a function's calls to itself cannot, since the
/// function's own index is not yet known while its body is still being
/// lowered. [`CallTarget::SelfRecursive`] defers that resolution to a patch
/// pass run once the function's index is assigned (§4.7, §4.10) — the typed
/// equivalent of the sentinel integer `-1` some implementations use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallTarget {
    Func(FuncIdx),
    SelfRecursive,
}

/// Operands for the `br_table` instruction.
#[derive(Clone, Debug)]
pub struct BrTableOperands {
    /// Labels to branch to, indexed by the scrutinee.
    pub labels: Vec<LabelIdx>,
    /// Default label used when the scrutinee is out of range.
    pub default: LabelIdx,
}

/// A marker carried alongside certain instructions so that a downstream pass
/// can recognize and prune string-path-only code when the module valtype is
/// not string-capable (see `-aot-well-formed-string-approximation`, §6 of
/// the design doc).
///
/// This is the typed equivalent of the textual `string_only|{start|end}`
/// annotation: rather than concatenating a marker onto an opcode mnemonic,
/// the flag rides along with the instruction itself and a pass can match on
/// it exhaustively.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstrFlag {
    /// Marks the first instruction of a run that only matters for the
    /// string-typed path of a polymorphic operation.
    StringOnlyStart,
    /// Marks the instruction one past the end of such a run.
    StringOnlyEnd,
}

/// A single typed instruction as produced by the lowering passes.
///
/// Encoding to the wire format (LEB128 integers, IEEE-754 doubles, vector
/// length prefixes) happens once, in [`crate::encode`], when a function's
/// instruction buffer is rendered — lowering code never touches bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    Try(BlockType),
    Catch(TagIdx),
    CatchAll,
    Throw(TagIdx),
    Delegate(LabelIdx),
    End,
    Br(LabelIdx),
    BrIf(LabelIdx),
    BrTable(BrTableOperands),
    Return,
    Call(CallTarget),
    CallIndirect { table: u32, ty: TypeIdx },
    Drop,
    Select,
    LocalGet(LocalIdx),
    LocalSet(LocalIdx),
    LocalTee(LocalIdx),
    GlobalGet(GlobalIdx),
    GlobalSet(GlobalIdx),
    Load { op: Opcode, arg: MemArg },
    Store { op: Opcode, arg: MemArg },
    MemorySize,
    MemoryGrow,
    MemoryCopy,
    MemoryFill,
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    /// Any opcode that takes no immediate operand at all (comparisons,
    /// arithmetic, conversions).
    Bare(Opcode),
    /// An instruction annotated with a [`InstrFlag`] for a later pruning pass.
    Flagged(Box<Instr>, InstrFlag),
}

impl Instr {
    /// Wraps this instruction with a string-only-run marker.
    pub fn string_only(self, flag: InstrFlag) -> Instr {
        Instr::Flagged(Box::new(self), flag)
    }
}

/// Resolves every [`CallTarget::SelfRecursive`] call site in `instrs` to
/// `func_idx`. Run once, after a function's own index has been assigned
/// (§4.7's "patch" state, §4.10). Leaves every other instruction untouched.
pub fn patch_self_calls(instrs: &mut [Instr], func_idx: FuncIdx) {
    for instr in instrs {
        match instr {
            Instr::Call(target @ CallTarget::SelfRecursive) => {
                *target = CallTarget::Func(func_idx);
            }
            Instr::Flagged(inner, _) => {
                patch_self_calls(std::slice::from_mut(inner.as_mut()), func_idx)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_self_calls_resolves_only_self_recursive_targets() {
        let mut instrs = vec![
            Instr::Call(CallTarget::SelfRecursive),
            Instr::Call(CallTarget::Func(FuncIdx::new(7))),
        ];
        patch_self_calls(&mut instrs, FuncIdx::new(3));
        assert_eq!(instrs[0], Instr::Call(CallTarget::Func(FuncIdx::new(3))));
        assert_eq!(instrs[1], Instr::Call(CallTarget::Func(FuncIdx::new(7))));
    }
}
