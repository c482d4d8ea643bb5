// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Statement lowering: declarations, assignment, control flow, `for-of`,
//! and `try`/`throw`.

use crate::ast::Node;
use crate::error::TodoError;
use crate::module::ExceptionRecord;
use crate::scope::lookup_name;
use crate::types::{BlockType, Instr, LabelIdx, Opcode, TypeTag, ValType};

use super::expr::{load_pair, lower_expr, payload_only, store_pair, tag_const, truthy_predicate, KnownType};
use super::{DepthKind, LowerCtx, LowerResult};

/// Lowers one statement, appending its instructions to `out`.
pub fn lower_stmt(ctx: &mut LowerCtx, node: &Node, out: &mut Vec<Instr>) -> LowerResult<()> {
    match node {
        Node::EmptyStatement {} | Node::DebuggerStatement {} | Node::Unsupported => Ok(()),
        Node::ExpressionStatement { expression } => {
            let (instrs, _) = lower_expr(ctx, expression)?;
            let leftover =
                super::leftover::count_leftover(&instrs, &super::CompilationArity(ctx.compilation));
            out.extend(instrs);
            // An expression statement discards its value; countLeftover
            // (§4.8) decides how many (payload, tag) slots are actually left
            // on the stack to drop.
            for _ in 0..leftover {
                out.push(Instr::Drop);
            }
            Ok(())
        }
        Node::BlockStatement { body } => {
            for stmt in body {
                lower_stmt(ctx, stmt, out)?;
            }
            Ok(())
        }
        Node::VariableDeclaration(decl) => lower_var_decl(ctx, decl, out),
        Node::ReturnStatement { argument } => lower_return(ctx, argument.as_deref(), out),
        Node::IfStatement { test, consequent, alternate } => {
            lower_if(ctx, test, consequent, alternate.as_deref(), out)
        }
        Node::WhileStatement { test, body } => lower_while(ctx, test, body, out),
        Node::ForStatement { init, test, update, body } => {
            lower_for(ctx, init.as_deref(), test.as_deref(), update.as_deref(), body, out)
        }
        Node::ForOfStatement { left, right, body } => lower_for_of(ctx, left, right, body, out),
        Node::BreakStatement { .. } => {
            let depth = ctx
                .nearest_loop_depth()
                .ok_or_else(|| TodoError::new("break outside of a loop"))?;
            out.push(Instr::Br(LabelIdx::new(depth)));
            Ok(())
        }
        Node::ContinueStatement { .. } => {
            let depth = ctx
                .nearest_loop_depth()
                .ok_or_else(|| TodoError::new("continue outside of a loop"))?;
            out.push(Instr::Br(LabelIdx::new(depth + 1)));
            Ok(())
        }
        Node::ThrowStatement { argument } => lower_throw(ctx, argument, out),
        Node::TryStatement { block, handler } => lower_try(ctx, block, handler.as_ref(), out),
        Node::FunctionDeclaration(_) => Ok(()), // hoisted and lowered separately by the driver
        Node::ExportNamedDeclaration { declaration } => {
            if let Some(decl) = declaration {
                lower_stmt(ctx, decl, out)?;
            }
            Ok(())
        }
        other => Err(TodoError::new(format!("unsupported statement node: {other:?}")).into()),
    }
}

fn lower_var_decl(
    ctx: &mut LowerCtx,
    decl: &crate::ast::VariableDeclaration,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    for declarator in &decl.declarations {
        let Node::Identifier(id) = &declarator.id else {
            return Err(TodoError::new("destructuring declarations are not supported").into());
        };
        let (init_instrs, known_type) = match &declarator.init {
            Some(init) => lower_expr(ctx, init)?,
            None => (vec![Instr::F64Const(0.0), tag_const(TypeTag::Undefined)], Some(TypeTag::Undefined)),
        };
        let valtype = ctx.compilation.config.valtype;
        let is_global = ctx.scope.slot_count() == 0 && ctx.depth.is_empty();
        let binding = if is_global {
            // Top-level declaration: becomes a global.
            ctx.compilation.globals.alloc_var(id.name.clone(), valtype)
        } else {
            match known_type {
                Some(tag) => ctx.scope.alloc_var_typed(id.name.clone(), valtype, tag),
                None => ctx.scope.alloc_var(id.name.clone(), valtype),
            }
        };
        out.extend(init_instrs);
        out.extend(store_pair(&binding, is_global));
    }
    Ok(())
}

fn lower_return(
    ctx: &mut LowerCtx,
    argument: Option<&Node>,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    let known = match argument {
        Some(arg) => {
            let (instrs, known) = lower_expr(ctx, arg)?;
            out.extend(instrs);
            known
        }
        None => {
            out.push(Instr::F64Const(0.0));
            out.push(tag_const(TypeTag::Undefined));
            Some(TypeTag::Undefined)
        }
    };
    ctx.scope.note_return_type(known);
    out.push(Instr::Return);
    ctx.scope.returns = true;
    Ok(())
}

fn lower_if(
    ctx: &mut LowerCtx,
    test: &Node,
    consequent: &Node,
    alternate: Option<&Node>,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    let (test_instrs, test_tmp, test_known) = super::expr::lower_to_temp(ctx, test, "#if_test")?;
    out.extend(test_instrs);
    out.extend(truthy_predicate(ctx, &test_tmp, test_known));
    out.push(Instr::If(BlockType::Empty));
    ctx.depth.push(DepthKind::If);
    lower_stmt(ctx, consequent, out)?;
    if let Some(alt) = alternate {
        out.push(Instr::Else);
        lower_stmt(ctx, alt, out)?;
    }
    ctx.depth.pop();
    out.push(Instr::End);
    Ok(())
}

fn lower_while(
    ctx: &mut LowerCtx,
    test: &Node,
    body: &Node,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    out.push(Instr::Block(BlockType::Empty));
    out.push(Instr::Loop(BlockType::Empty));
    ctx.depth.push(DepthKind::While);
    let (test_instrs, test_tmp, test_known) = super::expr::lower_to_temp(ctx, test, "#while_test")?;
    out.extend(test_instrs);
    out.extend(truthy_predicate(ctx, &test_tmp, test_known));
    out.push(Instr::Bare(Opcode::I32Eqz));
    out.push(Instr::BrIf(LabelIdx::new(1)));
    lower_stmt(ctx, body, out)?;
    out.push(Instr::Br(LabelIdx::new(0)));
    ctx.depth.pop();
    out.push(Instr::End);
    out.push(Instr::End);
    Ok(())
}

fn lower_for(
    ctx: &mut LowerCtx,
    init: Option<&Node>,
    test: Option<&Node>,
    update: Option<&Node>,
    body: &Node,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    if let Some(init) = init {
        lower_stmt(ctx, init, out)?;
    }
    out.push(Instr::Block(BlockType::Empty));
    out.push(Instr::Loop(BlockType::Empty));
    ctx.depth.push(DepthKind::For);
    if let Some(test) = test {
        let (test_instrs, test_tmp, test_known) = super::expr::lower_to_temp(ctx, test, "#for_test")?;
        out.extend(test_instrs);
        out.extend(truthy_predicate(ctx, &test_tmp, test_known));
        out.push(Instr::Bare(Opcode::I32Eqz));
        out.push(Instr::BrIf(LabelIdx::new(1)));
    }
    lower_stmt(ctx, body, out)?;
    if let Some(update) = update {
        let (update_instrs, _) = lower_expr(ctx, update)?;
        let leftover =
            super::leftover::count_leftover(&update_instrs, &super::CompilationArity(ctx.compilation));
        out.extend(update_instrs);
        for _ in 0..leftover {
            out.push(Instr::Drop);
        }
    }
    out.push(Instr::Br(LabelIdx::new(0)));
    ctx.depth.pop();
    out.push(Instr::End);
    out.push(Instr::End);
    Ok(())
}

/// `for (const x of iterable) body`: caches pointer, length, and counter in
/// i32 temporaries. The loop body is specialized for the iterable's
/// statically-known type: an array loop reads valtype-sized elements, a
/// string loop reads one UTF-16 code unit per iteration and materializes it
/// as a one-character string (§4.6). An iterable of unknown static type
/// falls back to the array-element loop, the only shape supported without a
/// full duplicated-body runtime switch.
fn lower_for_of(
    ctx: &mut LowerCtx,
    left: &Node,
    right: &Node,
    body: &Node,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    let name = match left {
        Node::Identifier(id) => id.name.clone(),
        Node::VariableDeclaration(decl) => match decl.declarations.first() {
            Some(crate::ast::VariableDeclarator { id: Node::Identifier(id), .. }) => id.name.clone(),
            _ => return Err(TodoError::new("for-of binding must be a simple identifier").into()),
        },
        _ => return Err(TodoError::new("for-of binding must be a simple identifier").into()),
    };

    let (iter_instrs, iter_known) = lower_expr(ctx, right)?;
    let valtype = ctx.compilation.config.valtype;
    let ptr = ctx.scope.named_temp("#forof_ptr", ValType::I32);
    let len = ctx.scope.named_temp("#forof_len", ValType::I32);
    let counter = ctx.scope.named_temp("#forof_counter", ValType::I32);
    let is_string = matches!(iter_known, Some(TypeTag::String));
    let elem = if is_string {
        ctx.scope.alloc_var_typed(name, valtype, TypeTag::String)
    } else {
        ctx.scope.alloc_var(name, valtype)
    };

    out.extend(payload_only(iter_instrs));
    out.push(Instr::LocalSet(ptr.idx.into()));
    out.push(Instr::LocalGet(ptr.idx.into()));
    out.push(Instr::Load { op: Opcode::I32Load, arg: crate::types::MemArg::natural(0, 4) });
    out.push(Instr::LocalSet(len.idx.into()));
    out.push(Instr::I32Const(0));
    out.push(Instr::LocalSet(counter.idx.into()));

    out.push(Instr::Block(BlockType::Empty));
    out.push(Instr::Loop(BlockType::Empty));
    ctx.depth.push(DepthKind::ForOf);

    out.push(Instr::LocalGet(counter.idx.into()));
    out.push(Instr::LocalGet(len.idx.into()));
    out.push(Instr::Bare(Opcode::I32GeS));
    out.push(Instr::BrIf(LabelIdx::new(1)));

    if is_string {
        out.extend(super::expr::string_index_load(ctx, &ptr, &counter));
        out.push(tag_const(TypeTag::String));
        out.extend(store_pair(&elem, false));
    } else {
        let elem_size = valtype.size_bytes();
        out.push(Instr::LocalGet(ptr.idx.into()));
        out.push(Instr::LocalGet(counter.idx.into()));
        out.push(Instr::I32Const(elem_size as i32));
        out.push(Instr::Bare(Opcode::I32Mul));
        out.push(Instr::I32Const(4));
        out.push(Instr::Bare(Opcode::I32Add));
        out.push(Instr::Bare(Opcode::I32Add));
        out.push(Instr::Load {
            op: crate::encode::OpcodeTable::resolve(valtype).load,
            arg: crate::types::MemArg::natural(0, elem_size),
        });
        out.push(tag_const(TypeTag::Number));
        out.extend(store_pair(&elem, false));
    }

    lower_stmt(ctx, body, out)?;

    out.push(Instr::LocalGet(counter.idx.into()));
    out.push(Instr::I32Const(1));
    out.push(Instr::Bare(Opcode::I32Add));
    out.push(Instr::LocalSet(counter.idx.into()));
    out.push(Instr::Br(LabelIdx::new(0)));
    ctx.depth.pop();
    out.push(Instr::End);
    out.push(Instr::End);
    Ok(())
}

/// `throw new X("msg")` / `throw "msg"`: assigns an `exceptions` index,
/// pushes it, and issues `throw` with the shared tag.
fn lower_throw(ctx: &mut LowerCtx, argument: &Node, out: &mut Vec<Instr>) -> LowerResult<()> {
    let (constructor, message) = match argument {
        Node::NewExpression { callee: box_callee, arguments } => {
            let Node::Identifier(ctor) = box_callee.as_ref() else {
                return Err(TodoError::new("thrown value must be `new X(\"msg\")` or a string literal").into());
            };
            let message = match arguments.first() {
                Some(Node::Literal(crate::ast::Literal {
                    value: crate::ast::LiteralValue::Str(s),
                    ..
                })) => Some(s.clone()),
                _ => None,
            };
            (Some(ctor.name.clone()), message)
        }
        Node::Literal(crate::ast::Literal { value: crate::ast::LiteralValue::Str(s), .. }) => {
            (None, Some(s.clone()))
        }
        _ => return Err(TodoError::new("thrown value must be `new X(\"msg\")` or a string literal").into()),
    };
    let index = ctx.compilation.push_exception(ExceptionRecord { constructor, message });
    let tag = ctx.compilation.ensure_throw_tag();
    ctx.scope.throws = true;
    out.push(Instr::I32Const(index as i32));
    out.push(Instr::Throw(tag));
    Ok(())
}

/// `try { … } catch { … }` lowers to `try`/`catch_all`/`end`. `finally` is
/// not supported (§4.6).
fn lower_try(
    ctx: &mut LowerCtx,
    block: &Node,
    handler: Option<&crate::ast::CatchClause>,
    out: &mut Vec<Instr>,
) -> LowerResult<()> {
    out.push(Instr::Try(BlockType::Empty));
    ctx.depth.push(DepthKind::Try);
    lower_stmt(ctx, block, out)?;
    ctx.depth.pop();
    if let Some(clause) = handler {
        out.push(Instr::CatchAll);
        ctx.depth.push(DepthKind::Catch);
        lower_stmt(ctx, &clause.body, out)?;
        ctx.depth.pop();
    }
    out.push(Instr::End);
    Ok(())
}

/// Lowers `=` and compound assignment (`+=`, `||=`, …) to an identifier.
/// Compound operators reuse the binary/logical lowering with the LHS
/// fetched twice: once as an operand, once as the store target.
pub fn lower_assignment(
    ctx: &mut LowerCtx,
    operator: &str,
    left: &Node,
    right: &Node,
) -> LowerResult<(Vec<Instr>, KnownType)> {
    match left {
        Node::Identifier(id) => lower_identifier_assignment(ctx, operator, id, right),
        Node::MemberExpression { object, property, computed: true, .. } => {
            lower_indexed_assignment(ctx, object, property, right)
        }
        Node::MemberExpression { property, computed: false, .. } => {
            let Node::Identifier(prop) = property.as_ref() else {
                return Err(TodoError::new("non-computed assignment target must be an identifier").into());
            };
            if prop.name == "length" {
                return lower_length_assignment(ctx, left, right);
            }
            Err(TodoError::new("assignment to an unrecognized member is not supported").into())
        }
        _ => Err(TodoError::new("unsupported assignment target").into()),
    }
}

fn lower_identifier_assignment(
    ctx: &mut LowerCtx,
    operator: &str,
    id: &crate::ast::Identifier,
    right: &Node,
) -> LowerResult<(Vec<Instr>, KnownType)> {
    let Some((binding, is_global)) = lookup_name(ctx.scope, &ctx.compilation.globals, &id.name)
    else {
        return Err(TodoError::new(format!("assignment to undeclared name `{}`", id.name)).into());
    };
    let binding = binding.clone();

    let (value_instrs, known_type) = if operator == "=" {
        lower_expr(ctx, right)?
    } else {
        let base_operator = operator.trim_end_matches('=');
        let synthetic = if matches!(base_operator, "||" | "&&" | "??") {
            Node::LogicalExpression {
                operator: base_operator.to_string(),
                left: Box::new(Node::Identifier(id.clone())),
                right: Box::new(right.clone()),
            }
        } else {
            Node::BinaryExpression {
                operator: base_operator.to_string(),
                left: Box::new(Node::Identifier(id.clone())),
                right: Box::new(right.clone()),
            }
        };
        lower_expr(ctx, &synthetic)?
    };

    let value_tmp = ctx.scope.named_temp("#assign_value", ctx.compilation.config.valtype);
    let mut instrs = value_instrs;
    instrs.extend(store_pair(&value_tmp, false));
    instrs.extend(load_pair(&value_tmp, false));
    instrs.extend(store_pair(&binding, is_global));
    // Assignment expressions yield the assigned value.
    instrs.extend(load_pair(&value_tmp, false));
    Ok((instrs, known_type))
}

fn lower_indexed_assignment(
    ctx: &mut LowerCtx,
    object: &Node,
    property: &Node,
    right: &Node,
) -> LowerResult<(Vec<Instr>, KnownType)> {
    let (object_instrs, _) = lower_expr(ctx, object)?;
    let mut instrs = payload_only(object_instrs);
    let (index_instrs, _) = lower_expr(ctx, property)?;
    instrs.extend(payload_only(index_instrs));
    let elem_size = ctx.compilation.config.valtype.size_bytes();
    instrs.push(Instr::I32Const(elem_size as i32));
    instrs.push(Instr::Bare(Opcode::I32Mul));
    instrs.push(Instr::I32Const(4));
    instrs.push(Instr::Bare(Opcode::I32Add));
    instrs.push(Instr::Bare(Opcode::I32Add));

    let (value_instrs, value_known) = lower_expr(ctx, right)?;
    let value_tmp = ctx.scope.named_temp("#index_assign_value", ctx.compilation.config.valtype);
    instrs.extend(value_instrs);
    instrs.extend(store_pair(&value_tmp, false));
    instrs.push(Instr::LocalGet(value_tmp.idx.into()));
    instrs.push(Instr::Store {
        op: crate::encode::OpcodeTable::resolve(ctx.compilation.config.valtype).store,
        arg: crate::types::MemArg::natural(0, elem_size),
    });
    instrs.extend(load_pair(&value_tmp, false));
    Ok((instrs, value_known))
}

/// `arr.length = n`: writes the 32-bit prefix. Assignment returns the new
/// value, per the return convention for assignments.
fn lower_length_assignment(
    ctx: &mut LowerCtx,
    left: &Node,
    right: &Node,
) -> LowerResult<(Vec<Instr>, KnownType)> {
    let Node::MemberExpression { object, .. } = left else { unreachable!() };
    let (object_instrs, _) = lower_expr(ctx, object)?;
    let mut instrs = payload_only(object_instrs);

    let (value_instrs, value_known) = lower_expr(ctx, right)?;
    let value_tmp = ctx.scope.named_temp("#length_assign_value", ctx.compilation.config.valtype);
    instrs.extend(value_instrs);
    instrs.extend(store_pair(&value_tmp, false));
    instrs.push(Instr::LocalGet(value_tmp.idx.into()));
    instrs.push(Instr::Store { op: Opcode::I32Store, arg: crate::types::MemArg::natural(0, 4) });
    instrs.extend(load_pair(&value_tmp, false));
    Ok((instrs, value_known))
}

/// Lowers a block's statements, treating the final expression statement's
/// value (if any) as the block's result — used by `eval` (§4.5) to splice a
/// freshly parsed program into the calling function as an expression.
pub fn lower_block_as_expr(ctx: &mut LowerCtx, body: &[Node]) -> LowerResult<(Vec<Instr>, KnownType)> {
    let mut out = Vec::new();
    let mut last_type = Some(TypeTag::Undefined);
    for (i, stmt) in body.iter().enumerate() {
        if i + 1 == body.len() {
            if let Node::ExpressionStatement { expression } = stmt {
                let (instrs, known_type) = lower_expr(ctx, expression)?;
                out.extend(instrs);
                last_type = known_type;
                continue;
            }
        }
        lower_stmt(ctx, stmt, &mut out)?;
    }
    if body.is_empty() {
        out.push(Instr::F64Const(0.0));
        out.push(tag_const(TypeTag::Undefined));
    }
    Ok((out, last_type))
}

/// Creates an inner scope, allocates paired slots for each declared
/// parameter, rewrites the body via the object hack, and lowers it. After
/// generation, self-referential call sites are patched to the assigned
/// function index. If the final instruction is not a `return` and the body
/// has a leftover value, an implicit `return undefined` is appended
/// (§4.7, §4.10).
pub fn lower_function(
    ctx_compilation: &mut crate::compilation::Compilation,
    source_parser: Option<&dyn crate::hooks::SourceParser>,
    regex_compiler: Option<&mut dyn crate::hooks::RegexCompiler>,
    name: String,
    params: &[Node],
    body: &Node,
    export: bool,
) -> LowerResult<crate::module::Function> {
    let mut scope = crate::scope::Scope::new(name.clone());
    let valtype = ctx_compilation.config.valtype;

    let mut param_types = Vec::new();
    for param in params {
        let Node::Identifier(id) = param else {
            return Err(TodoError::new("only simple identifier parameters are supported").into());
        };
        scope.alloc_var(id.name.clone(), valtype);
        param_types.push(valtype);
        param_types.push(ValType::I32);
    }
    let param_count = scope.slot_count();

    let rewritten = crate::object_hack::rewrite(body.clone());
    let mut depth = Vec::new();
    let mut ctx = LowerCtx {
        compilation: &mut *ctx_compilation,
        scope: &mut scope,
        depth: &mut depth,
        source_parser,
        regex_compiler,
    };

    let mut wasm = Vec::new();
    lower_stmt(&mut ctx, &rewritten, &mut wasm)?;

    let leftover = super::leftover::count_leftover(&wasm, &super::CompilationArity(ctx.compilation));
    let ends_in_return = matches!(wasm.last(), Some(Instr::Return));
    if !ends_in_return {
        if leftover == 0 {
            wasm.push(Instr::F64Const(0.0));
            wasm.push(tag_const(TypeTag::Undefined));
            ctx.scope.note_return_type(Some(TypeTag::Undefined));
        }
        wasm.push(Instr::Return);
    }

    let index = ctx_compilation.funcs.len() as u32;
    crate::types::patch_self_calls(&mut wasm, index.into());

    let locals = scope.local_valtypes(param_count);
    let return_type = scope.return_type;

    Ok(crate::module::Function {
        name,
        params: param_types,
        locals,
        returns: vec![valtype, ValType::I32],
        return_type,
        wasm,
        index,
        export,
        internal: false,
        throws: scope.throws,
    })
}
