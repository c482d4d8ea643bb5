// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ESTree-shaped AST node definitions.
//!
//! Every node derives [`serde::Deserialize`] so that a caller holding ESTree
//! JSON (the common case, produced by an off-the-shelf parser) can hand it
//! to this crate via `serde_json::from_str` with no glue code. A caller
//! building a front end of its own can equally construct these types
//! directly.
//!
//! Only the node kinds this compiler lowers are represented; any `TS…` node
//! kind deserializes into [`Node::Unsupported`] and is silently skipped
//! wherever it appears in a statement/expression list.

use serde::Deserialize;

use crate::error::Span;

fn span_default() -> Span {
    Span::default()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Program {
    pub body: Vec<Node>,
}

/// A TypeScript-style type annotation. Only its presence is consumed; the
/// annotated type itself is not otherwise interpreted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TypeAnnotation {
    #[serde(rename = "typeAnnotation")]
    pub type_annotation: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Identifier {
    pub name: String,
    #[serde(default)]
    #[serde(rename = "typeAnnotation")]
    pub type_annotation: Option<TypeAnnotation>,
    #[serde(default, skip_serializing)]
    pub start: Option<u32>,
    #[serde(default, skip_serializing)]
    pub end: Option<u32>,
}

impl Identifier {
    pub fn span(&self) -> Span {
        Span { start: self.start.unwrap_or(0), end: self.end.unwrap_or(0) }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    #[serde(default)]
    pub regex: Option<RegexLiteralMeta>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RegexLiteralMeta {
    pub pattern: String,
    pub flags: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VariableDeclarator {
    pub id: Node,
    pub init: Option<Box<Node>>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VariableDeclaration {
    pub declarations: Vec<VariableDeclarator>,
    pub kind: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Function {
    pub id: Option<Identifier>,
    pub params: Vec<Node>,
    pub body: Box<Node>,
    #[serde(default)]
    pub expression: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ObjectPattern {
    #[serde(default)]
    pub properties: Vec<serde_json::Value>,
}

/// An ESTree node. Tagged on the `type` field as in the wire format; a
/// `TS…` node kind (or anything else unrecognized) falls through to
/// [`Node::Unsupported`] rather than failing to deserialize.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Node {
    Program(Program),

    BlockStatement {
        body: Vec<Node>,
    },
    ExpressionStatement {
        expression: Box<Node>,
    },
    EmptyStatement {},
    VariableDeclaration(VariableDeclaration),
    FunctionDeclaration(Function),
    ArrowFunctionExpression(Function),
    FunctionExpression(Function),
    ReturnStatement {
        argument: Option<Box<Node>>,
    },
    IfStatement {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Option<Box<Node>>,
    },
    ForStatement {
        init: Option<Box<Node>>,
        test: Option<Box<Node>>,
        update: Option<Box<Node>>,
        body: Box<Node>,
    },
    WhileStatement {
        test: Box<Node>,
        body: Box<Node>,
    },
    ForOfStatement {
        left: Box<Node>,
        right: Box<Node>,
        body: Box<Node>,
    },
    BreakStatement {
        label: Option<Identifier>,
    },
    ContinueStatement {
        label: Option<Identifier>,
    },
    TryStatement {
        block: Box<Node>,
        handler: Option<CatchClause>,
    },
    ThrowStatement {
        argument: Box<Node>,
    },
    DebuggerStatement {},
    ExportNamedDeclaration {
        declaration: Option<Box<Node>>,
    },

    BinaryExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    LogicalExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    UnaryExpression {
        operator: String,
        argument: Box<Node>,
    },
    UpdateExpression {
        operator: String,
        argument: Box<Node>,
        prefix: bool,
    },
    AssignmentExpression {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    ConditionalExpression {
        test: Box<Node>,
        consequent: Box<Node>,
        alternate: Box<Node>,
    },
    Identifier(Identifier),
    Literal(Literal),
    MemberExpression {
        object: Box<Node>,
        property: Box<Node>,
        computed: bool,
        #[serde(default)]
        optional: bool,
    },
    CallExpression {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    NewExpression {
        callee: Box<Node>,
        arguments: Vec<Node>,
    },
    ArrayExpression {
        elements: Vec<Option<Node>>,
    },
    TaggedTemplateExpression {
        tag: Box<Node>,
        quasi: TemplateLiteral,
    },
    ObjectPattern(ObjectPattern),

    /// Any node kind this compiler does not recognize (including every
    /// `TS…` node). Carried so that callers can deserialize a full,
    /// unfiltered ESTree tree; the lowering passes skip these wherever
    /// they appear in a body list.
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CatchClause {
    pub param: Option<Box<Node>>,
    pub body: Box<Node>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TemplateLiteral {
    pub quasis: Vec<TemplateElement>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TemplateElement {
    pub value: TemplateElementValue,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TemplateElementValue {
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_simple_function() {
        let json = r#"{
            "type": "Program",
            "body": [{
                "type": "ExpressionStatement",
                "expression": { "type": "Literal", "value": 1.0 }
            }]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        match node {
            Node::Program(program) => assert_eq!(program.body.len(), 1),
            other => panic!("expected Program, got {other:?}"),
        }
    }

    #[test]
    fn unknown_ts_node_becomes_unsupported() {
        let json = r#"{ "type": "TSTypeAnnotation" }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node, Node::Unsupported);
    }
}
