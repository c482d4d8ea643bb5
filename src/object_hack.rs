// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The object-hack rewriter: collapses non-computed, non-optional member
//! chains rooted at an identifier into a single flat `__obj_prop` identifier,
//! binding well-known namespaces (`Math.*`, `Array.*`) to built-ins at
//! compile time.
//!
//! Idempotent by construction: a chain already rewritten into a plain
//! [`ast::Node::Identifier`] has no [`ast::Node::MemberExpression`] left to
//! match, so a second pass is a no-op.

use crate::ast::Node;

/// Rewrites every eligible member chain in `node`, recursing into all child
/// positions.
pub fn rewrite(node: Node) -> Node {
    match node {
        Node::Program(mut program) => {
            program.body = program.body.into_iter().map(rewrite).collect();
            Node::Program(program)
        }
        Node::BlockStatement { body } => {
            Node::BlockStatement { body: body.into_iter().map(rewrite).collect() }
        }
        Node::ExpressionStatement { expression } => {
            Node::ExpressionStatement { expression: Box::new(rewrite(*expression)) }
        }
        Node::VariableDeclaration(mut decl) => {
            for declarator in &mut decl.declarations {
                declarator.init = declarator.init.take().map(|init| Box::new(rewrite(*init)));
            }
            Node::VariableDeclaration(decl)
        }
        Node::ReturnStatement { argument } => {
            Node::ReturnStatement { argument: argument.map(|arg| Box::new(rewrite(*arg))) }
        }
        Node::IfStatement { test, consequent, alternate } => Node::IfStatement {
            test: Box::new(rewrite(*test)),
            consequent: Box::new(rewrite(*consequent)),
            alternate: alternate.map(|alt| Box::new(rewrite(*alt))),
        },
        Node::ForStatement { init, test, update, body } => Node::ForStatement {
            init: init.map(|n| Box::new(rewrite(*n))),
            test: test.map(|n| Box::new(rewrite(*n))),
            update: update.map(|n| Box::new(rewrite(*n))),
            body: Box::new(rewrite(*body)),
        },
        Node::WhileStatement { test, body } => {
            Node::WhileStatement { test: Box::new(rewrite(*test)), body: Box::new(rewrite(*body)) }
        }
        Node::ForOfStatement { left, right, body } => Node::ForOfStatement {
            left: Box::new(rewrite(*left)),
            right: Box::new(rewrite(*right)),
            body: Box::new(rewrite(*body)),
        },
        Node::TryStatement { block, handler } => Node::TryStatement {
            block: Box::new(rewrite(*block)),
            handler: handler.map(|mut clause| {
                clause.body = Box::new(rewrite(*clause.body));
                clause
            }),
        },
        Node::ThrowStatement { argument } => {
            Node::ThrowStatement { argument: Box::new(rewrite(*argument)) }
        }
        Node::ExportNamedDeclaration { declaration } => Node::ExportNamedDeclaration {
            declaration: declaration.map(|decl| Box::new(rewrite(*decl))),
        },
        Node::FunctionDeclaration(mut func) => {
            func.body = Box::new(rewrite(*func.body));
            Node::FunctionDeclaration(func)
        }
        Node::FunctionExpression(mut func) => {
            func.body = Box::new(rewrite(*func.body));
            Node::FunctionExpression(func)
        }
        Node::ArrowFunctionExpression(mut func) => {
            func.body = Box::new(rewrite(*func.body));
            Node::ArrowFunctionExpression(func)
        }
        Node::BinaryExpression { operator, left, right } => Node::BinaryExpression {
            operator,
            left: Box::new(rewrite(*left)),
            right: Box::new(rewrite(*right)),
        },
        Node::LogicalExpression { operator, left, right } => Node::LogicalExpression {
            operator,
            left: Box::new(rewrite(*left)),
            right: Box::new(rewrite(*right)),
        },
        Node::UnaryExpression { operator, argument } => {
            Node::UnaryExpression { operator, argument: Box::new(rewrite(*argument)) }
        }
        Node::UpdateExpression { operator, argument, prefix } => {
            Node::UpdateExpression { operator, argument: Box::new(rewrite(*argument)), prefix }
        }
        Node::AssignmentExpression { operator, left, right } => Node::AssignmentExpression {
            operator,
            left: Box::new(rewrite(*left)),
            right: Box::new(rewrite(*right)),
        },
        Node::ConditionalExpression { test, consequent, alternate } => {
            Node::ConditionalExpression {
                test: Box::new(rewrite(*test)),
                consequent: Box::new(rewrite(*consequent)),
                alternate: Box::new(rewrite(*alternate)),
            }
        }
        Node::CallExpression { callee, arguments } => Node::CallExpression {
            callee: Box::new(rewrite(*callee)),
            arguments: arguments.into_iter().map(rewrite).collect(),
        },
        Node::NewExpression { callee, arguments } => Node::NewExpression {
            callee: Box::new(rewrite(*callee)),
            arguments: arguments.into_iter().map(rewrite).collect(),
        },
        Node::ArrayExpression { elements } => Node::ArrayExpression {
            elements: elements.into_iter().map(|elem| elem.map(rewrite)).collect(),
        },
        Node::MemberExpression { object, property, computed, optional } => {
            let object = rewrite(*object);
            if !computed && !optional {
                if let Some(flat) = flatten(&object, &property) {
                    return flat;
                }
            }
            Node::MemberExpression {
                object: Box::new(object),
                property: Box::new(rewrite(*property)),
                computed,
                optional,
            }
        }
        other => other,
    }
}

/// Namespace roots whose members are resolved to built-ins at compile time
/// rather than treated as ordinary values. An ordinary variable's member
/// chain (`a.push`, `a.length`) is left as a real `MemberExpression` node so
/// that prototype-method dispatch in `lower::expr` can see it.
const NAMESPACE_ROOTS: &[&str] = &["Math", "Array"];

/// Attempts to collapse `object.property` into a single `__object_property`
/// identifier. Only applies when `object` is an identifier naming a known
/// namespace root and `property` is a plain, non-`length` identifier
/// (covering chained rewrites such as `Math.max` via repeated bottom-up
/// recursion).
fn flatten(object: &Node, property: &Node) -> Option<Node> {
    let Node::Identifier(property_id) = property else { return None };
    if property_id.name == "length" {
        return None;
    }
    let Node::Identifier(object_id) = object else { return None };
    if !NAMESPACE_ROOTS.contains(&object_id.name.as_str()) {
        return None;
    }
    Some(Node::Identifier(crate::ast::Identifier {
        name: format!("__{}_{}", object_id.name, property_id.name),
        type_annotation: None,
        start: object_id.start,
        end: property_id.end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Identifier;

    fn ident(name: &str) -> Node {
        Node::Identifier(Identifier { name: name.to_string(), type_annotation: None, start: None, end: None })
    }

    #[test]
    fn collapses_non_computed_member_chain() {
        let node = Node::MemberExpression {
            object: Box::new(ident("Math")),
            property: Box::new(ident("max")),
            computed: false,
            optional: false,
        };
        let rewritten = rewrite(node);
        match rewritten {
            Node::Identifier(id) => assert_eq!(id.name, "__Math_max"),
            other => panic!("expected flattened identifier, got {other:?}"),
        }
    }

    #[test]
    fn leaves_an_ordinary_variables_method_chain_alone() {
        let node = Node::MemberExpression {
            object: Box::new(ident("arr")),
            property: Box::new(ident("push")),
            computed: false,
            optional: false,
        };
        let rewritten = rewrite(node.clone());
        assert_eq!(rewritten, node, "non-namespace-root member chains must survive for prototype dispatch");
    }

    #[test]
    fn leaves_length_access_alone() {
        let node = Node::MemberExpression {
            object: Box::new(ident("arr")),
            property: Box::new(ident("length")),
            computed: false,
            optional: false,
        };
        let rewritten = rewrite(node.clone());
        assert_eq!(rewritten, node);
    }

    #[test]
    fn leaves_computed_access_alone() {
        let node = Node::MemberExpression {
            object: Box::new(ident("arr")),
            property: Box::new(ident("i")),
            computed: true,
            optional: false,
        };
        let rewritten = rewrite(node.clone());
        assert_eq!(rewritten, node);
    }

    #[test]
    fn is_idempotent() {
        let node = Node::MemberExpression {
            object: Box::new(ident("Math")),
            property: Box::new(ident("max")),
            computed: false,
            optional: false,
        };
        let once = rewrite(node);
        let twice = rewrite(once.clone());
        assert_eq!(once, twice);
    }
}
