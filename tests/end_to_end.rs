// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! End-to-end scenarios asserted against the shape of a [`CompiledModule`]
//! rather than by executing WASM, since this crate never runs the modules
//! it produces.

use wasmgen::config::Config;
use wasmgen::lower::leftover::{count_leftover, CalleeArity};
use wasmgen::module::CompiledModule;
use wasmgen::types::{CallTarget, Instr};
use wasmgen::{ast::Program, compile};

fn compile_source(json: &str) -> CompiledModule {
    let program: Program = serde_json::from_str(json).expect("valid ESTree JSON fixture");
    compile(&program, Config::default(), None, None).expect("fixture compiles")
}

/// Looks up callee arity against a compiled module's own function table, the
/// same way [`wasmgen::lower::CompilationArity`] does against a live
/// [`wasmgen::compilation::Compilation`].
struct ModuleArity<'a>(&'a CompiledModule);

impl CalleeArity for ModuleArity<'_> {
    fn arity(&self, target: CallTarget) -> (u32, u32) {
        match target {
            CallTarget::SelfRecursive => (0, 2),
            CallTarget::Func(idx) => self
                .0
                .funcs
                .iter()
                .find(|f| f.index == idx.index())
                .map(|f| (f.params.len() as u32, f.returns.len() as u32))
                .unwrap_or((0, 2)),
        }
    }
}

/// Asserts `countLeftover` over `body` (a function's `wasm` with its trailing
/// `return` stripped) lands on 0 or 2, per §8's stack-balance invariant.
fn assert_leftover_in_pair_invariant(module: &CompiledModule, func_name: &str) {
    let f = module.funcs.iter().find(|f| f.name == func_name).expect("function is compiled");
    let body = match f.wasm.split_last() {
        Some((Instr::Return, rest)) => rest,
        _ => &f.wasm,
    };
    let leftover = count_leftover(body, &ModuleArity(module));
    assert!(leftover == 0 || leftover == 2, "{func_name}: countLeftover = {leftover}, expected 0 or 2");
}

#[test]
fn exported_add_function() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [{
                "type": "ExportNamedDeclaration",
                "declaration": {
                    "type": "FunctionDeclaration",
                    "id": { "type": "Identifier", "name": "add" },
                    "params": [
                        { "type": "Identifier", "name": "a" },
                        { "type": "Identifier", "name": "b" }
                    ],
                    "body": {
                        "type": "BlockStatement",
                        "body": [{
                            "type": "ReturnStatement",
                            "argument": {
                                "type": "BinaryExpression",
                                "operator": "+",
                                "left": { "type": "Identifier", "name": "a" },
                                "right": { "type": "Identifier", "name": "b" }
                            }
                        }]
                    }
                }
            }]
        }"#,
    );
    let add = module.funcs.iter().find(|f| f.name == "add").expect("add is compiled");
    assert!(add.export);
    assert!(add.wasm.iter().any(|i| matches!(i, Instr::Bare(wasmgen::types::Opcode::F64Add))));
    assert_eq!(add.wasm.last(), Some(&Instr::Return));
    // Every function declares a (payload, tag) result pair (§3, §8), and the
    // return site pushes both halves before `return` — not just the payload.
    assert_eq!(add.returns.len(), 2);
    assert!(matches!(add.wasm[add.wasm.len() - 2], Instr::I32Const(_)), "tag must be pushed right before return");
    assert_eq!(add.return_type, Some(wasmgen::types::TypeTag::Number));
    assert_leftover_in_pair_invariant(&module, "add");
}

#[test]
fn string_compound_assign_allocates_a_page_and_length_reads_it() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "s" },
                    "init": { "type": "Literal", "value": "ab" }
                }]},
                { "type": "ExpressionStatement", "expression": {
                    "type": "AssignmentExpression",
                    "operator": "+=",
                    "left": { "type": "Identifier", "name": "s" },
                    "right": { "type": "Literal", "value": "cd" }
                }},
                { "type": "ExpressionStatement", "expression": {
                    "type": "MemberExpression",
                    "object": { "type": "Identifier", "name": "s" },
                    "property": { "type": "Identifier", "name": "length" },
                    "computed": false
                }}
            ]
        }"#,
    );
    assert!(module.pages.reasons.keys().any(|k| k.starts_with("string:")));
}

#[test]
fn array_literal_written_to_data_section_and_for_of_sums_it() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "a" },
                    "init": { "type": "ArrayExpression", "elements": [
                        { "type": "Literal", "value": 1.0 },
                        { "type": "Literal", "value": 2.0 },
                        { "type": "Literal", "value": 3.0 }
                    ]}
                }]},
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "n" },
                    "init": { "type": "Literal", "value": 0.0 }
                }]},
                { "type": "ForOfStatement",
                  "left": { "type": "VariableDeclaration", "kind": "const", "declarations": [{
                      "type": "VariableDeclarator",
                      "id": { "type": "Identifier", "name": "x" },
                      "init": null
                  }]},
                  "right": { "type": "Identifier", "name": "a" },
                  "body": { "type": "ExpressionStatement", "expression": {
                      "type": "AssignmentExpression",
                      "operator": "+=",
                      "left": { "type": "Identifier", "name": "n" },
                      "right": { "type": "Identifier", "name": "x" }
                  }}
                }
            ]
        }"#,
    );
    assert!(!module.data.is_empty(), "literal array content should land in the data section");
    let main = module.funcs.iter().find(|f| f.name == "main").unwrap();
    assert!(main.wasm.iter().any(|i| matches!(i, Instr::Loop(_))));
    assert_leftover_in_pair_invariant(&module, "main");
}

#[test]
fn try_catch_records_one_exception_and_lowers_to_try_catch_all() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [{
                "type": "TryStatement",
                "block": { "type": "BlockStatement", "body": [{
                    "type": "ThrowStatement",
                    "argument": {
                        "type": "NewExpression",
                        "callee": { "type": "Identifier", "name": "TypeError" },
                        "arguments": [{ "type": "Literal", "value": "x" }]
                    }
                }]},
                "handler": {
                    "param": null,
                    "body": { "type": "BlockStatement", "body": [{
                        "type": "ExpressionStatement",
                        "expression": { "type": "Literal", "value": 42.0 }
                    }]}
                }
            }]
        }"#,
    );
    assert_eq!(module.exceptions.len(), 1);
    assert_eq!(module.exceptions[0].constructor.as_deref(), Some("TypeError"));
    assert_eq!(module.exceptions[0].message.as_deref(), Some("x"));
    let main = module.funcs.iter().find(|f| f.name == "main").unwrap();
    assert!(main.wasm.iter().any(|i| matches!(i, Instr::Try(_))));
    assert!(main.wasm.iter().any(|i| matches!(i, Instr::CatchAll)));
}

#[test]
fn typeof_arrow_is_the_constant_string_function_without_evaluating_it() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement",
                "expression": {
                    "type": "UnaryExpression",
                    "operator": "typeof",
                    "argument": {
                        "type": "ArrowFunctionExpression",
                        "id": null,
                        "params": [],
                        "expression": true,
                        "body": { "type": "Literal", "value": 0.0 }
                    }
                }
            }]
        }"#,
    );
    assert!(module.pages.reasons.keys().any(|k| k.starts_with("string:")));
}

#[test]
fn length_assignment_writes_and_rereads_the_prefix() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "a" },
                    "init": { "type": "ArrayExpression", "elements": [] }
                }]},
                { "type": "ExpressionStatement", "expression": {
                    "type": "AssignmentExpression",
                    "operator": "=",
                    "left": {
                        "type": "MemberExpression",
                        "object": { "type": "Identifier", "name": "a" },
                        "property": { "type": "Identifier", "name": "length" },
                        "computed": false
                    },
                    "right": { "type": "Literal", "value": 2.0 }
                }},
                { "type": "ExpressionStatement", "expression": {
                    "type": "MemberExpression",
                    "object": { "type": "Identifier", "name": "a" },
                    "property": { "type": "Identifier", "name": "length" },
                    "computed": false
                }}
            ]
        }"#,
    );
    let main = module.funcs.iter().find(|f| f.name == "main").unwrap();
    let store_count =
        main.wasm.iter().filter(|i| matches!(i, Instr::Store { op: wasmgen::types::Opcode::I32Store, .. })).count();
    assert!(store_count >= 1);
    let load_count =
        main.wasm.iter().filter(|i| matches!(i, Instr::Load { op: wasmgen::types::Opcode::I32Load, .. })).count();
    assert!(load_count >= 1);
    assert_leftover_in_pair_invariant(&module, "main");
}

#[test]
fn every_function_passes_invariant_checking() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [{
                "type": "ExportNamedDeclaration",
                "declaration": {
                    "type": "FunctionDeclaration",
                    "id": { "type": "Identifier", "name": "fact" },
                    "params": [{ "type": "Identifier", "name": "n" }],
                    "body": {
                        "type": "BlockStatement",
                        "body": [{
                            "type": "ReturnStatement",
                            "argument": { "type": "Identifier", "name": "n" }
                        }]
                    }
                }
            }]
        }"#,
    );
    assert!(wasmgen::validate::check(&module).is_empty());
    let fact = module.funcs.iter().find(|f| f.name == "fact").unwrap();
    assert_eq!(fact.returns.len(), 2);
    assert_leftover_in_pair_invariant(&module, "fact");
}

#[test]
fn array_push_dispatches_to_the_prototype_method_instead_of_the_object_hack() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "a" },
                    "init": { "type": "ArrayExpression", "elements": [
                        { "type": "Literal", "value": 1.0 }
                    ]}
                }]},
                { "type": "ExpressionStatement", "expression": {
                    "type": "CallExpression",
                    "callee": {
                        "type": "MemberExpression",
                        "object": { "type": "Identifier", "name": "a" },
                        "property": { "type": "Identifier", "name": "push" },
                        "computed": false
                    },
                    "arguments": [{ "type": "Literal", "value": 2.0 }]
                }}
            ]
        }"#,
    );
    // The object hack only ever flattens namespace roots (`Math`, `Array`);
    // an ordinary array variable's `.push` must survive as a real member
    // chain and resolve through the prototype-method registry (inlined
    // store instructions), not collapse into a synthesized `__a_push`
    // global the way the object hack treats `Math.max`.
    assert!(!module.globals.iter().any(|g| g.name == "__a_push"));
    let main = module.funcs.iter().find(|f| f.name == "main").unwrap();
    assert!(main.wasm.iter().any(|i| matches!(i, Instr::Store { .. })), "push must write the new length/element");
    assert_leftover_in_pair_invariant(&module, "main");
}

#[test]
fn string_plus_concatenates_instead_of_adding_numerically() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [{
                    "type": "VariableDeclarator",
                    "id": { "type": "Identifier", "name": "s" },
                    "init": {
                        "type": "BinaryExpression",
                        "operator": "+",
                        "left": { "type": "Literal", "value": "ab" },
                        "right": { "type": "Literal", "value": "cd" }
                    }
                }]}
            ]
        }"#,
    );
    assert!(module.pages.reasons.keys().any(|k| k.starts_with("string:")), "concatenation result needs a page");
    assert_leftover_in_pair_invariant(&module, "main");
}

#[test]
fn strict_equality_compares_type_tags_not_just_payloads() {
    let module = compile_source(
        r#"{
            "type": "Program",
            "body": [
                { "type": "ExpressionStatement", "expression": {
                    "type": "BinaryExpression",
                    "operator": "===",
                    "left": { "type": "Literal", "value": 0.0 },
                    "right": { "type": "Literal", "value": false }
                }}
            ]
        }"#,
    );
    let main = module.funcs.iter().find(|f| f.name == "main").unwrap();
    // A tag comparison (I32Eq over the two type-tag halves) must appear
    // alongside the payload comparison; otherwise `0 === false` would wrongly
    // come out true by comparing only the numeric payloads.
    let eq_count = main.wasm.iter().filter(|i| matches!(i, Instr::Bare(wasmgen::types::Opcode::I32Eq))).count();
    assert!(eq_count >= 1, "expected at least one tag comparison for strict equality");
    assert_leftover_in_pair_invariant(&module, "main");
}
