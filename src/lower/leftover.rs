// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! `countLeftover`: a linear approximation of stack balance at depth 0,
//! used to decide whether a function body needs an implicit `undefined`
//! return appended, and whether an expression statement's result needs a
//! trailing `drop`.
//!
//! This is not a full type checker (§9, "Stack-balance heuristic") — it is a
//! one-pass integer count adequate for the well-formed instruction sequences
//! this crate itself emits.

use crate::types::{CallTarget, Instr};

/// A callee's parameter/result counts, consulted when a `call` instruction
/// is encountered (the net stack effect of a call is `results - params`).
pub trait CalleeArity {
    fn arity(&self, target: CallTarget) -> (u32, u32);
}

/// Counts the net number of values left on the stack at depth 0 after
/// executing `instrs` in order. Resets to zero whenever a `return` is seen,
/// since control does not fall through past it.
pub fn count_leftover(instrs: &[Instr], callees: &dyn CalleeArity) -> i64 {
    let mut count: i64 = 0;
    for instr in instrs {
        apply(instr, callees, &mut count);
    }
    count
}

fn apply(instr: &Instr, callees: &dyn CalleeArity, count: &mut i64) {
    match instr {
        Instr::I32Const(_)
        | Instr::I64Const(_)
        | Instr::F32Const(_)
        | Instr::F64Const(_)
        | Instr::LocalGet(_)
        | Instr::GlobalGet(_)
        | Instr::Load { .. }
        | Instr::MemorySize => *count += 1,

        Instr::LocalSet(_) | Instr::GlobalSet(_) => *count -= 1,
        Instr::Store { .. } => *count -= 2,
        Instr::MemoryCopy => *count -= 3,
        Instr::MemoryFill => *count -= 3,
        Instr::Drop => *count -= 1,
        Instr::LocalTee(_) => {}

        Instr::Throw(_) => *count = 0,
        Instr::Return => *count = 0,

        Instr::Call(target) => {
            let (params, results) = callees.arity(*target);
            *count += results as i64 - params as i64;
        }

        Instr::Bare(op) => {
            use crate::types::Opcode;
            match op {
                Opcode::I32Eqz
                | Opcode::I64Eqz
                | Opcode::I32Clz
                | Opcode::I32Ctz
                | Opcode::I32Popcnt
                | Opcode::I64Clz
                | Opcode::I64Ctz
                | Opcode::I64Popcnt
                | Opcode::F32Abs
                | Opcode::F32Neg
                | Opcode::F32Ceil
                | Opcode::F32Floor
                | Opcode::F32Trunc
                | Opcode::F32Nearest
                | Opcode::F32Sqrt
                | Opcode::F64Abs
                | Opcode::F64Neg
                | Opcode::F64Ceil
                | Opcode::F64Floor
                | Opcode::F64Trunc
                | Opcode::F64Nearest
                | Opcode::F64Sqrt
                | Opcode::I32WrapI64
                | Opcode::I32TruncF32S
                | Opcode::I32TruncF32U
                | Opcode::I32TruncF64S
                | Opcode::I32TruncF64U
                | Opcode::I64ExtendI32S
                | Opcode::I64ExtendI32U
                | Opcode::I64TruncF32S
                | Opcode::I64TruncF32U
                | Opcode::I64TruncF64S
                | Opcode::I64TruncF64U
                | Opcode::F32ConvertI32S
                | Opcode::F32ConvertI32U
                | Opcode::F32ConvertI64S
                | Opcode::F32ConvertI64U
                | Opcode::F32DemoteF64
                | Opcode::F64ConvertI32S
                | Opcode::F64ConvertI32U
                | Opcode::F64ConvertI64S
                | Opcode::F64ConvertI64U
                | Opcode::F64PromoteF32
                | Opcode::I32ReinterpretF32
                | Opcode::I64ReinterpretF64
                | Opcode::F32ReinterpretI32
                | Opcode::F64ReinterpretI64
                | Opcode::I32Extend8S
                | Opcode::I32Extend16S
                | Opcode::I64Extend8S
                | Opcode::I64Extend16S
                | Opcode::I64Extend32S => {
                    // Unary: net zero.
                }
                Opcode::Nop | Opcode::Unreachable | Opcode::End | Opcode::Else => {}
                _ => {
                    // Binary arithmetic/comparison: consumes two, produces one.
                    *count -= 1;
                }
            }
        }

        Instr::Flagged(inner, _) => apply(inner, callees, count),

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Opcode;

    struct NoCalls;
    impl CalleeArity for NoCalls {
        fn arity(&self, _target: CallTarget) -> (u32, u32) {
            (0, 0)
        }
    }

    #[test]
    fn balanced_binary_expression_leaves_one_value() {
        let instrs = vec![Instr::F64Const(1.0), Instr::F64Const(2.0), Instr::Bare(Opcode::F64Add)];
        assert_eq!(count_leftover(&instrs, &NoCalls), 1);
    }

    #[test]
    fn drop_consumes_the_leftover_value() {
        let instrs = vec![Instr::F64Const(1.0), Instr::Drop];
        assert_eq!(count_leftover(&instrs, &NoCalls), 0);
    }

    #[test]
    fn return_resets_the_count() {
        let instrs = vec![Instr::F64Const(1.0), Instr::I32Const(0), Instr::Return];
        assert_eq!(count_leftover(&instrs, &NoCalls), 0);
    }

    #[test]
    fn a_payload_tag_pair_leaves_exactly_two_values() {
        // What lower_expr actually emits for a numeric literal: payload then
        // type tag, per the invariant in §3/§8 (countLeftover(wasm) ∈ {0, 2}
        // for any expression result).
        let instrs = vec![Instr::F64Const(1.0), Instr::I32Const(0)];
        assert_eq!(count_leftover(&instrs, &NoCalls), 2);
    }
}
