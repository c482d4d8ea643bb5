// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Post-compilation invariant checking: the quantified invariants a finished
//! [`crate::module::CompiledModule`] must satisfy (§8). This crate does not
//! execute WASM, so these assertions are the primary way its output is
//! tested for correctness beyond shape-matching fixtures.

use std::collections::HashSet;

use crate::module::CompiledModule;
use crate::types::{CallTarget, Instr};

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum InvariantViolation {
    #[error("page reason `{0}` is not unique")]
    DuplicatePageReason(String),
    #[error("function `{0}` has an unresolved self-recursive call site")]
    UnresolvedSelfCall(String),
    #[error("function `{0}` ends without a return instruction")]
    MissingTrailingReturn(String),
    #[error("function `{0}` declares {1} result(s), not a (payload, tag) pair")]
    MismatchedReturnArity(String, usize),
}

/// Checks every quantified invariant in §8 against a finished module,
/// returning every violation found (rather than stopping at the first).
pub fn check(module: &CompiledModule) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    check_page_uniqueness(module, &mut violations);
    for func in &module.funcs {
        check_self_call_patching(func, &mut violations);
        check_trailing_return(func, &mut violations);
        check_return_arity(func, &mut violations);
    }
    violations
}

/// Every runtime value is a *(payload, type-tag)* pair (§3): a function's
/// declared result list must therefore always have exactly two entries.
fn check_return_arity(func: &crate::module::Function, violations: &mut Vec<InvariantViolation>) {
    if func.returns.len() != 2 {
        violations.push(InvariantViolation::MismatchedReturnArity(func.name.clone(), func.returns.len()));
    }
}

fn check_page_uniqueness(module: &CompiledModule, violations: &mut Vec<InvariantViolation>) {
    let mut seen_indices = HashSet::new();
    for (reason, idx) in &module.pages.reasons {
        if !seen_indices.insert(*idx) {
            violations.push(InvariantViolation::DuplicatePageReason(reason.clone()));
        }
    }
}

fn check_self_call_patching(
    func: &crate::module::Function,
    violations: &mut Vec<InvariantViolation>,
) {
    fn contains_unresolved(instrs: &[Instr]) -> bool {
        instrs.iter().any(|instr| match instr {
            Instr::Call(CallTarget::SelfRecursive) => true,
            Instr::Flagged(inner, _) => contains_unresolved(std::slice::from_ref(inner.as_ref())),
            _ => false,
        })
    }
    if contains_unresolved(&func.wasm) {
        violations.push(InvariantViolation::UnresolvedSelfCall(func.name.clone()));
    }
}

fn check_trailing_return(func: &crate::module::Function, violations: &mut Vec<InvariantViolation>) {
    if func.internal {
        return;
    }
    match func.wasm.last() {
        Some(Instr::Return) => {}
        _ => violations.push(InvariantViolation::MissingTrailingReturn(func.name.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Function;
    use crate::types::ValType;

    fn sample_function(wasm: Vec<Instr>) -> Function {
        Function {
            name: "f".to_string(),
            params: vec![],
            locals: vec![],
            returns: vec![ValType::F64, ValType::I32],
            return_type: None,
            wasm,
            index: 0,
            export: false,
            internal: false,
            throws: false,
        }
    }

    #[test]
    fn flags_unresolved_self_call() {
        let module = CompiledModule {
            funcs: vec![sample_function(vec![Instr::Call(CallTarget::SelfRecursive), Instr::Return])],
            ..CompiledModule::default()
        };
        let violations = check(&module);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::UnresolvedSelfCall(_))));
    }

    #[test]
    fn flags_missing_trailing_return() {
        let module = CompiledModule {
            funcs: vec![sample_function(vec![Instr::F64Const(0.0)])],
            ..CompiledModule::default()
        };
        let violations = check(&module);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::MissingTrailingReturn(_))));
    }

    #[test]
    fn flags_a_function_not_returning_a_payload_tag_pair() {
        let mut func = sample_function(vec![Instr::F64Const(0.0), Instr::Return]);
        func.returns = vec![ValType::F64];
        let module = CompiledModule { funcs: vec![func], ..CompiledModule::default() };
        let violations = check(&module);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::MismatchedReturnArity(_, 1))));
    }

    #[test]
    fn clean_module_has_no_violations() {
        let module = CompiledModule {
            funcs: vec![sample_function(vec![
                Instr::F64Const(0.0),
                Instr::I32Const(0),
                Instr::Return,
            ])],
            ..CompiledModule::default()
        };
        assert!(check(&module).is_empty());
    }
}
