// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::tags::TagNode;

/// A position inside the original template source.
///
/// `offset` is a byte offset; `line` and `column` are 1-based, with columns
/// counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Start and end locations of a token or node in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Zero-length span, used for tags with no contents.
    pub fn empty_at(location: Location) -> Self {
        Self {
            start: location,
            end: location,
        }
    }

    /// Span covering `self` through `other`.
    pub fn to(self, other: Span) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }
}

/// Compiled form of one template source.
#[derive(Debug, Clone)]
pub struct Ast {
    pub name: String,
    pub root: NodeList,
    /// Present when the template starts with `{% extends ... %}`.
    pub parent: Option<ExtendsNode>,
    /// Every `{% block %}` declared in the template, at any depth.
    pub blocks: BTreeMap<String, Arc<BlockNode>>,
}

impl Ast {
    pub fn new(
        name: impl Into<String>,
        root: NodeList,
        parent: Option<ExtendsNode>,
        blocks: BTreeMap<String, Arc<BlockNode>>,
    ) -> Self {
        Self {
            name: name.into(),
            root,
            parent,
            blocks,
        }
    }
}

/// A sequential list of nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    pub nodes: Vec<Node>,
}

impl NodeList {
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Node types produced by the parser.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Node {
    Text(TextNode),
    Variable(VariableNode),
    Comment(CommentNode),
    If(IfNode),
    For(ForNode),
    Include(IncludeNode),
    Extends(ExtendsNode),
    Block(Arc<BlockNode>),
    Custom(CustomNode),
}

/// Raw text literal.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

impl TextNode {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// `{{ ... }}` interpolation.
#[derive(Debug, Clone)]
pub struct VariableNode {
    pub span: Span,
    pub source: String,
    pub pipeline: Pipeline,
}

impl VariableNode {
    pub fn new(span: Span, source: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            span,
            source: source.into(),
            pipeline,
        }
    }
}

/// `{# ... #}`; kept in the tree but never rendered.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub span: Span,
    pub text: String,
}

impl CommentNode {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// `{% if %}` with optional `elif` branches and `else` body.
#[derive(Debug, Clone)]
pub struct IfNode {
    pub span: Span,
    pub condition: Condition,
    pub then_block: NodeList,
    pub elif_branches: Vec<ElifBranch>,
    pub else_block: Option<NodeList>,
}

impl IfNode {
    pub fn new(
        span: Span,
        condition: Condition,
        then_block: NodeList,
        elif_branches: Vec<ElifBranch>,
        else_block: Option<NodeList>,
    ) -> Self {
        Self {
            span,
            condition,
            then_block,
            elif_branches,
            else_block,
        }
    }
}

/// Captures an `{% elif ... %}` branch.
#[derive(Debug, Clone)]
pub struct ElifBranch {
    pub span: Span,
    pub condition: Condition,
    pub block: NodeList,
}

impl ElifBranch {
    pub fn new(span: Span, condition: Condition, block: NodeList) -> Self {
        Self {
            span,
            condition,
            block,
        }
    }
}

/// `{% for %}` loop.
#[derive(Debug, Clone)]
pub struct ForNode {
    pub span: Span,
    pub variables: Vec<String>,
    pub iterable: Pipeline,
    /// Optional `where` clause; items failing it are skipped.
    pub filter: Option<Condition>,
    pub body: NodeList,
    pub empty_block: Option<NodeList>,
}

impl ForNode {
    pub fn new(
        span: Span,
        variables: Vec<String>,
        iterable: Pipeline,
        filter: Option<Condition>,
        body: NodeList,
        empty_block: Option<NodeList>,
    ) -> Self {
        Self {
            span,
            variables,
            iterable,
            filter,
            body,
            empty_block,
        }
    }
}

/// Context visibility for an included template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IncludeMode {
    /// The included template sees the current context.
    Inherited,
    /// The included template starts from an empty context (`only`).
    Isolated,
}

/// `{% include %}` of another template.
#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub span: Span,
    pub template: Pipeline,
    pub with: Option<Pipeline>,
    pub mode: IncludeMode,
}

impl IncludeNode {
    pub fn new(
        span: Span,
        template: Pipeline,
        with: Option<Pipeline>,
        mode: IncludeMode,
    ) -> Self {
        Self {
            span,
            template,
            with,
            mode,
        }
    }
}

/// `{% extends %}`; the parent name is evaluated at render time.
#[derive(Debug, Clone)]
pub struct ExtendsNode {
    pub span: Span,
    pub parent: Pipeline,
}

impl ExtendsNode {
    pub fn new(span: Span, parent: Pipeline) -> Self {
        Self { span, parent }
    }
}

/// Named, overridable region (`{% block name %}`).
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub span: Span,
    pub name: String,
    pub body: NodeList,
}

impl BlockNode {
    pub fn new(span: Span, name: impl Into<String>, body: NodeList) -> Self {
        Self {
            span,
            name: name.into(),
            body,
        }
    }
}

/// Node produced by a host-registered tag parser.
#[derive(Debug, Clone)]
pub struct CustomNode {
    pub span: Span,
    pub name: String,
    pub node: Arc<dyn TagNode>,
}

impl CustomNode {
    pub fn new(span: Span, name: impl Into<String>, node: Arc<dyn TagNode>) -> Self {
        Self {
            span,
            name: name.into(),
            node,
        }
    }
}

/// A head expression followed by zero or more filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub span: Span,
    pub head: Expression,
    pub filters: Vec<FilterCall>,
}

impl Pipeline {
    pub fn new(span: Span, head: Expression, filters: Vec<FilterCall>) -> Self {
        Self {
            span,
            head,
            filters,
        }
    }

    /// Reports whether the head is the reserved `super` marker
    /// (`super` or `block.super`).
    pub fn is_super(&self) -> bool {
        match &self.head {
            Expression::Lookup(path) => match path.segments.as_slice() {
                [PathSegment::Key(only)] => only == "super",
                [PathSegment::Key(first), PathSegment::Key(second)] => {
                    first == "block" && second == "super"
                }
                _ => false,
            },
            Expression::Literal(_) => false,
        }
    }
}

/// `name` or `name(arg, ...)` applied after `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
}

impl FilterCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Expression {
    Literal(Value),
    Lookup(LookupPath),
}

impl Expression {
    pub fn lookup(segments: Vec<PathSegment>) -> Self {
        Expression::Lookup(LookupPath::new(segments))
    }
}

/// Dotted path resolved left-to-right against the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    pub segments: Vec<PathSegment>,
}

impl LookupPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }
}

impl fmt::Display for LookupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => f.write_str(key)?,
                PathSegment::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

/// Boolean condition used by `if`, `elif` and `for ... where`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Value(Pipeline),
    Compare {
        operator: Operator,
        lhs: Pipeline,
        rhs: Pipeline,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::In => "in",
        }
    }
}
