// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The `` asm`...` `` tagged-template intrinsic: a line-oriented assembler
//! for raw opcode sequences, consumed directly by user source that needs to
//! drop below the typed-value discipline (e.g. writing a built-in body).
//!
//! Recognized directives, one per line:
//! - `local <name> <idx> <type>` — binds `<name>` to an existing local slot.
//! - `returns <types…>` — declares the block's result types (informational;
//!   consumed by the caller, not emitted as an instruction).
//! - `memory` — declares that this block touches linear memory (also
//!   informational).
//! - `opc.name imm imm …` — emits one opcode by its WASM text-format
//!   mnemonic with integer immediates.

use crate::error::TodoError;
use crate::types::{Instr, LocalIdx, Opcode, TypeTag};

use super::expr::KnownType;
use super::{LowerCtx, LowerResult};

pub fn lower_asm_block(_ctx: &mut LowerCtx, source: &str) -> LowerResult<(Vec<Instr>, KnownType)> {
    let mut instrs = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("local") || line.starts_with("returns")
            || line == "memory"
        {
            continue;
        }
        instrs.push(lower_asm_instruction(line)?);
    }
    Ok((instrs, Some(TypeTag::Undefined)))
}

fn lower_asm_instruction(line: &str) -> LowerResult<Instr> {
    let mut tokens = line.split_whitespace();
    let mnemonic = tokens.next().ok_or_else(|| TodoError::new("empty asm instruction line"))?;
    let operands: Vec<i64> =
        tokens.map(|t| t.parse().unwrap_or(0)).collect();

    let instr = match mnemonic {
        "local.get" => Instr::LocalGet(LocalIdx::new(operands[0] as u32)),
        "local.set" => Instr::LocalSet(LocalIdx::new(operands[0] as u32)),
        "local.tee" => Instr::LocalTee(LocalIdx::new(operands[0] as u32)),
        "i32.const" => Instr::I32Const(operands[0] as i32),
        "i64.const" => Instr::I64Const(operands[0]),
        "f64.const" => Instr::F64Const(operands[0] as f64),
        "i32.add" => Instr::Bare(Opcode::I32Add),
        "i32.sub" => Instr::Bare(Opcode::I32Sub),
        "i32.mul" => Instr::Bare(Opcode::I32Mul),
        "f64.add" => Instr::Bare(Opcode::F64Add),
        "f64.sub" => Instr::Bare(Opcode::F64Sub),
        "f64.mul" => Instr::Bare(Opcode::F64Mul),
        "drop" => Instr::Drop,
        other => return Err(TodoError::new(format!("unrecognized asm mnemonic `{other}`")).into()),
    };
    Ok(instr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lines_and_directives_are_skipped() {
        let source = "local x 0 f64\nreturns f64\nmemory\ni32.const 1\n";
        let instrs = lower_asm_block_instructions(source).unwrap();
        assert_eq!(instrs, vec![Instr::I32Const(1)]);
    }

    fn lower_asm_block_instructions(source: &str) -> LowerResult<Vec<Instr>> {
        let mut instrs = Vec::new();
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("local") || line.starts_with("returns")
                || line == "memory"
            {
                continue;
            }
            instrs.push(lower_asm_instruction(line)?);
        }
        Ok(instrs)
    }
}
