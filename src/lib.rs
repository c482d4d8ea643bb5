// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ahead-of-time compiler that lowers a strict subset of a C-family
//! dynamically-typed scripting language, parsed into an ESTree-shaped AST,
//! into a structured WebAssembly 1.0+ intermediate representation: a
//! function table, a global table, an exception-tag table, a
//! page-allocation map, and a data-segment list.
//!
//! This crate produces a [`module::CompiledModule`] value; turning it into a
//! `.wasm` byte stream is an external serializer's job. Lexical parsing,
//! built-in function bodies, regex compilation, and driver/CLI concerns are
//! likewise out of scope — see [`hooks`] for the two peripheral concerns
//! this crate does inject.

pub mod ast;
pub mod builtins;
pub mod compilation;
pub mod config;
pub mod data;
pub mod encode;
pub mod error;
pub mod hooks;
pub mod lower;
pub mod module;
pub mod object_hack;
pub mod page;
pub mod scope;
pub mod types;
pub mod validate;

use ast::{Node, Program};
use compilation::Compilation;
use config::Config;
use error::{CompileError, Result};
use hooks::{RegexCompiler, SourceParser};
use module::CompiledModule;

/// Compiles a parsed program into a [`CompiledModule`].
///
/// `source_parser` and `regex_compiler` back the `eval`-of-literal and
/// literal-regex hooks respectively (§6); either may be omitted if the
/// input program is known not to use the corresponding feature.
///
/// If `config.ast_log` is set, the input AST is dumped to the `log` facade
/// at debug level before lowering begins.
pub fn compile(
    program: &Program,
    config: Config,
    source_parser: Option<&dyn SourceParser>,
    mut regex_compiler: Option<&mut dyn RegexCompiler>,
) -> Result<CompiledModule> {
    if config.ast_log {
        log::debug!("input AST: {program:#?}");
    }

    let mut compilation = Compilation::new(config);

    let rewritten = object_hack::rewrite(Node::Program(program.clone()));
    let Node::Program(Program { body }) = rewritten else {
        unreachable!("object_hack::rewrite preserves the Program variant")
    };

    let mut function_decls = Vec::new();
    let mut main_body = Vec::new();
    for node in body {
        match node {
            Node::FunctionDeclaration(func) => function_decls.push((func, false)),
            Node::ExportNamedDeclaration { declaration: Some(decl) } => match *decl {
                Node::FunctionDeclaration(func) => function_decls.push((func, true)),
                other => main_body.push(other),
            },
            other => main_body.push(other),
        }
    }

    for (func, export) in function_decls {
        let name = func
            .id
            .as_ref()
            .map(|id| id.name.clone())
            .ok_or_else(|| CompileError::MalformedAst("function declaration missing a name".into()))?;
        let regex_compiler = regex_compiler.as_mut().map(|rc| &mut **rc);
        let compiled = lower::stmt::lower_function(
            &mut compilation,
            source_parser,
            regex_compiler,
            name,
            &func.params,
            &func.body,
            export,
        )?;
        compilation.funcs.push(compiled);
    }

    let main_block = Node::BlockStatement { body: main_body };
    let regex_compiler = regex_compiler.as_mut().map(|rc| &mut **rc);
    let main = lower::stmt::lower_function(
        &mut compilation,
        source_parser,
        regex_compiler,
        "main".to_string(),
        &[],
        &main_block,
        true,
    )?;
    compilation.funcs.push(main);

    log::trace!("compiled {} function(s)", compilation.funcs.len());

    Ok(compilation.into_module())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_compiles_to_an_exported_main() {
        let program = Program { body: vec![] };
        let module = compile(&program, Config::default(), None, None).unwrap();
        assert_eq!(module.funcs.len(), 1);
        assert_eq!(module.funcs[0].name, "main");
        assert!(module.funcs[0].export);
    }

    #[test]
    fn exported_add_function_compiles_and_is_marked_exported() {
        let json = r#"{
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
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        let module = compile(&program, Config::default(), None, None).unwrap();
        let add = module.funcs.iter().find(|f| f.name == "add").unwrap();
        assert!(add.export);
        assert!(matches!(add.wasm.last(), Some(types::Instr::Return)));
    }
}
