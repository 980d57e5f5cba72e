// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{
    Ast, BlockNode, CommentNode, CustomNode, ElifBranch, ExtendsNode, ForNode, IfNode,
    IncludeMode, IncludeNode, Node, NodeList, Span, TextNode, VariableNode,
};
use crate::error::Error;
use crate::expression::{self, ExpressionParser};
use crate::lexer::{self, Token, TokenKind};
use crate::tags::TagRegistry;

const BUILTIN_TAGS: &[&str] = &["if", "for", "block", "extends", "include"];

/// Keywords that only make sense as terminators of an enclosing tag.
const TERMINATOR_TAGS: &[&str] = &[
    "elif", "else", "endif", "empty", "endfor", "endblock",
];

/// Primary entry point for parsing template sources.
///
/// The token stream is consumed front to back. Paired tags (`if`, `for`,
/// `block` and custom tags with bodies) recurse through
/// [`TokenParser::parse_body`] until they see one of their terminators, so
/// nesting depth is unbounded and an exhausted stream inside a body is the
/// "missing end tag" failure. `open_tags` mirrors that recursion so errors
/// can name the innermost open tag.
pub fn parse_template(name: &str, source: &str, tags: &TagRegistry) -> Result<Ast, Error> {
    let tokens = lexer::tokenize(source);
    let mut parser = TokenParser::new(tokens, tags);
    let root = parser.parse_root()?;
    Ok(Ast::new(name, root, parser.extends, parser.blocks))
}

#[derive(Debug, Clone)]
struct OpenTag {
    name: String,
    span: Span,
    terminators: Vec<String>,
}

/// Stateful parser over a token stream; also the API surface offered to
/// custom tag parsers.
pub struct TokenParser<'a> {
    tokens: Vec<Token>,
    index: usize,
    tags: &'a TagRegistry,
    open_tags: Vec<OpenTag>,
    tags_seen: usize,
    extends: Option<ExtendsNode>,
    blocks: BTreeMap<String, Arc<BlockNode>>,
}

impl<'a> TokenParser<'a> {
    pub fn new(tokens: Vec<Token>, tags: &'a TagRegistry) -> Self {
        Self {
            tokens,
            index: 0,
            tags,
            open_tags: Vec::new(),
            tags_seen: 0,
            extends: None,
            blocks: BTreeMap::new(),
        }
    }

    fn parse_root(&mut self) -> Result<NodeList, Error> {
        let (nodes, terminator) = self.parse_until(&[])?;
        debug_assert!(terminator.is_none());
        Ok(nodes)
    }

    /// Parses the body of the tag opened by `open` until one of
    /// `terminators` is reached, returning the body and the terminator token.
    pub fn parse_body(
        &mut self,
        open: &Token,
        terminators: &[&str],
    ) -> Result<(NodeList, Token), Error> {
        self.open_tags.push(OpenTag {
            name: open.keyword().to_string(),
            span: open.span,
            terminators: terminators.iter().map(|t| (*t).to_string()).collect(),
        });
        let result = self.parse_until(terminators);
        let frame = self.open_tags.pop();

        let (nodes, terminator) = result?;
        match terminator {
            Some(token) => Ok((nodes, token)),
            None => {
                let (name, span) = frame
                    .map(|f| (f.name, f.span))
                    .unwrap_or_else(|| (open.keyword().to_string(), open.span));
                Err(Error::parse_with_span(
                    format!(
                        "missing end tag for '{name}', expected {}",
                        describe_terminators(terminators)
                    ),
                    span,
                ))
            }
        }
    }

    fn parse_until(&mut self, terminators: &[&str]) -> Result<(NodeList, Option<Token>), Error> {
        let mut nodes = NodeList::default();

        while let Some(token) = self.next_token() {
            match token.kind {
                TokenKind::Text => nodes.push(Node::Text(TextNode::new(token.span, token.contents))),
                TokenKind::Comment => {
                    nodes.push(Node::Comment(CommentNode::new(token.span, token.contents)));
                }
                TokenKind::Variable => {
                    self.tags_seen += 1;
                    nodes.push(parse_variable(&token)?);
                }
                TokenKind::Block => {
                    let keyword = token.keyword();
                    if keyword.is_empty() {
                        return Err(Error::parse_with_span("empty tag", token.span));
                    }
                    if terminators.contains(&keyword) {
                        return Ok((nodes, Some(token)));
                    }
                    self.tags_seen += 1;
                    nodes.push(self.parse_tag(&token)?);
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_tag(&mut self, token: &Token) -> Result<Node, Error> {
        let keyword = token.keyword();
        match keyword {
            "if" => self.parse_if(token),
            "for" => self.parse_for(token),
            "block" => self.parse_block(token),
            "extends" => self.parse_extends(token),
            "include" => parse_include(token),
            _ => {
                if let Some(tag_parser) = self.tags.get(keyword) {
                    let node = tag_parser.parse(self, token)?;
                    return Ok(Node::Custom(CustomNode::new(token.span, keyword, node)));
                }
                Err(self.unknown_tag_error(token))
            }
        }
    }

    fn unknown_tag_error(&self, token: &Token) -> Error {
        let keyword = token.keyword();
        let looks_like_terminator =
            TERMINATOR_TAGS.contains(&keyword) || keyword.starts_with("end");
        if !looks_like_terminator {
            return Error::parse_with_span(format!("unknown tag '{keyword}'"), token.span);
        }

        match self.open_tags.last() {
            Some(open) => {
                let expected: Vec<&str> = open.terminators.iter().map(String::as_str).collect();
                Error::parse_with_span(
                    format!(
                        "unexpected '{keyword}' inside '{}' opened at {}, expected {}",
                        open.name,
                        open.span.start,
                        describe_terminators(&expected)
                    ),
                    token.span,
                )
            }
            None => Error::parse_with_span(
                format!("unexpected '{keyword}' without a matching open tag"),
                token.span,
            ),
        }
    }

    fn parse_if(&mut self, token: &Token) -> Result<Node, Error> {
        let condition = parse_tag_condition(token, token.arguments())?;
        let (then_block, mut terminator) = self.parse_body(token, &["elif", "else", "endif"])?;

        let mut elif_branches = Vec::new();
        while terminator.keyword() == "elif" {
            let branch_condition = parse_tag_condition(&terminator, terminator.arguments())?;
            let (block, next) = self.parse_body(token, &["elif", "else", "endif"])?;
            elif_branches.push(ElifBranch::new(
                terminator.span.to(next.span),
                branch_condition,
                block,
            ));
            terminator = next;
        }

        let mut else_block = None;
        if terminator.keyword() == "else" {
            expect_bare(&terminator)?;
            let (block, next) = self.parse_body(token, &["endif"])?;
            else_block = Some(block);
            terminator = next;
        }
        expect_bare(&terminator)?;

        Ok(Node::If(IfNode::new(
            token.span.to(terminator.span),
            condition,
            then_block,
            elif_branches,
            else_block,
        )))
    }

    fn parse_for(&mut self, token: &Token) -> Result<Node, Error> {
        let mut args = ExpressionParser::new(token.arguments(), token.span)
            .map_err(|err| tag_error(token, err))?;

        let mut variables = vec![args
            .expect_identifier("loop variable")
            .map_err(|err| tag_error(token, err))?];
        while args.consume_comma() {
            variables.push(
                args.expect_identifier("loop variable")
                    .map_err(|err| tag_error(token, err))?,
            );
        }
        args.expect_word("in").map_err(|err| tag_error(token, err))?;
        let iterable = args.parse_pipeline().map_err(|err| tag_error(token, err))?;
        let filter = if args.consume_word("where") {
            Some(args.parse_condition().map_err(|err| tag_error(token, err))?)
        } else {
            None
        };
        args.expect_end().map_err(|err| tag_error(token, err))?;

        let (body, mut terminator) = self.parse_body(token, &["empty", "else", "endfor"])?;
        let mut empty_block = None;
        if matches!(terminator.keyword(), "empty" | "else") {
            expect_bare(&terminator)?;
            let (block, next) = self.parse_body(token, &["endfor"])?;
            empty_block = Some(block);
            terminator = next;
        }
        expect_bare(&terminator)?;

        Ok(Node::For(ForNode::new(
            token.span.to(terminator.span),
            variables,
            iterable,
            filter,
            body,
            empty_block,
        )))
    }

    fn parse_block(&mut self, token: &Token) -> Result<Node, Error> {
        let components = token.components();
        let name = match components.as_slice() {
            [_, name] if is_block_name(name) => name.clone(),
            _ => {
                return Err(Error::parse_with_span(
                    "block tag takes exactly one name: {% block name %}",
                    token.span,
                ))
            }
        };
        if self.blocks.contains_key(&name) {
            return Err(Error::parse_with_span(
                format!("block '{name}' is defined more than once"),
                token.span,
            ));
        }

        let (body, terminator) = self.parse_body(token, &["endblock"])?;
        match terminator.components().as_slice() {
            [_] => {}
            [_, closing] if *closing == name => {}
            _ => {
                return Err(Error::parse_with_span(
                    format!(
                        "mismatched end tag '{}' for block '{name}'",
                        terminator.contents
                    ),
                    terminator.span,
                ))
            }
        }

        // a nested block of the same name registers before its parent does
        if self.blocks.contains_key(&name) {
            return Err(Error::parse_with_span(
                format!("block '{name}' is defined more than once"),
                token.span,
            ));
        }
        let node = Arc::new(BlockNode::new(token.span.to(terminator.span), name, body));
        self.blocks.insert(node.name.clone(), node.clone());
        Ok(Node::Block(node))
    }

    fn parse_extends(&mut self, token: &Token) -> Result<Node, Error> {
        if self.extends.is_some() {
            return Err(Error::parse_with_span(
                "extends may only appear once per template",
                token.span,
            ));
        }
        if self.tags_seen > 1 || !self.open_tags.is_empty() {
            return Err(Error::parse_with_span(
                "extends must be the first tag in the template",
                token.span,
            ));
        }
        let parent = expression::parse_pipeline(token.arguments(), token.span)
            .map_err(|err| tag_error(token, err))?;
        let node = ExtendsNode::new(token.span, parent);
        self.extends = Some(node.clone());
        Ok(Node::Extends(node))
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index)?.clone();
        self.index += 1;
        Some(token)
    }

    /// Looks at the next token without consuming it.
    pub fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }
}

fn parse_variable(token: &Token) -> Result<Node, Error> {
    if token.contents.is_empty() {
        return Err(Error::parse_with_span("empty variable tag", token.span));
    }
    let pipeline = expression::parse_pipeline(&token.contents, token.span)?;
    Ok(Node::Variable(VariableNode::new(
        token.span,
        token.contents.clone(),
        pipeline,
    )))
}

fn parse_include(token: &Token) -> Result<Node, Error> {
    let mut args =
        ExpressionParser::new(token.arguments(), token.span).map_err(|err| tag_error(token, err))?;
    if args.is_eof() {
        return Err(Error::parse_with_span(
            "include requires a template name",
            token.span,
        ));
    }
    let template = args.parse_pipeline().map_err(|err| tag_error(token, err))?;
    let with = if args.consume_word("with") {
        Some(args.parse_pipeline().map_err(|err| tag_error(token, err))?)
    } else {
        None
    };
    let mode = if args.consume_word("only") {
        IncludeMode::Isolated
    } else {
        IncludeMode::Inherited
    };
    args.expect_end().map_err(|err| tag_error(token, err))?;

    Ok(Node::Include(IncludeNode::new(token.span, template, with, mode)))
}

fn parse_tag_condition(token: &Token, source: &str) -> Result<crate::ast::Condition, Error> {
    if source.is_empty() {
        return Err(Error::parse_with_span(
            format!("'{}' requires a condition", token.keyword()),
            token.span,
        ));
    }
    expression::parse_condition(source, token.span).map_err(|err| tag_error(token, err))
}

/// Rewraps expression errors raised while parsing tag arguments so they
/// surface as malformed-tag parse errors.
fn tag_error(token: &Token, err: Error) -> Error {
    match err {
        Error::Expression { message, span, .. } => Error::parse(
            format!("invalid arguments for '{}': {message}", token.keyword()),
            span.or(Some(token.span)),
        ),
        other => other,
    }
}

fn expect_bare(token: &Token) -> Result<(), Error> {
    if token.contents.split_whitespace().count() > 1 {
        return Err(Error::parse_with_span(
            format!("'{}' takes no arguments", token.keyword()),
            token.span,
        ));
    }
    Ok(())
}

fn is_block_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
}

fn describe_terminators(terminators: &[&str]) -> String {
    terminators
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Reports whether `keyword` is handled by the parser itself.
pub fn is_builtin_tag(keyword: &str) -> bool {
    BUILTIN_TAGS.contains(&keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Condition, Expression, PathSegment};
    use serde_json::json;

    fn parse(source: &str) -> Result<Ast, Error> {
        parse_template("test", source, &TagRegistry::empty())
    }

    #[test]
    fn parses_text_and_variables() {
        let ast = parse("hello {{ world }}!").unwrap();
        assert_eq!(ast.root.nodes.len(), 3);
        assert!(matches!(ast.root.nodes[1], Node::Variable(_)));
    }

    #[test]
    fn parses_if_elif_else_chain() {
        let ast = parse("{% if a %}A{% elif b %}B{% elif c %}C{% else %}D{% endif %}").unwrap();
        let Node::If(if_node) = &ast.root.nodes[0] else {
            panic!("expected if node");
        };
        assert_eq!(if_node.elif_branches.len(), 2);
        assert!(if_node.else_block.is_some());
        assert_eq!(if_node.span.start.offset, 3);
    }

    #[test]
    fn parses_for_with_destructuring_where_and_empty() {
        let ast = parse("{% for k, v in items|default(x) where v %}{{ k }}{% empty %}none{% endfor %}")
            .unwrap();
        let Node::For(for_node) = &ast.root.nodes[0] else {
            panic!("expected for node");
        };
        assert_eq!(for_node.variables, vec!["k", "v"]);
        assert_eq!(for_node.iterable.filters.len(), 1);
        assert!(matches!(for_node.filter, Some(Condition::Value(_))));
        assert!(for_node.empty_block.is_some());
    }

    #[test]
    fn missing_end_tag_reports_open_tag_location() {
        let err = parse("line\n{% if a %}\nbody").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("missing end tag for 'if'"));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn mismatched_end_tag_is_error() {
        let err = parse("{% for x in xs %}{% if x %}{% endfor %}{% endif %}").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unexpected 'endfor' inside 'if'"), "{message}");
    }

    #[test]
    fn stray_end_tag_is_error() {
        let err = parse("text{% endif %}").unwrap_err();
        assert!(err.to_string().contains("without a matching open tag"));
    }

    #[test]
    fn unknown_tag_is_error() {
        let err = parse("{% frobnicate %}").unwrap_err();
        assert!(err.to_string().contains("unknown tag 'frobnicate'"));
    }

    #[test]
    fn empty_tags_are_errors() {
        assert!(parse("{{}}").unwrap_err().to_string().contains("empty variable tag"));
        assert!(parse("{%}").unwrap_err().to_string().contains("empty tag"));
    }

    #[test]
    fn extends_must_come_first() {
        let ast = parse("{# note #}\n{% extends 'base' %}{% block a %}x{% endblock %}").unwrap();
        assert!(ast.parent.is_some());
        assert_eq!(
            ast.parent.unwrap().parent.head,
            Expression::Literal(json!("base"))
        );
        assert!(ast.blocks.contains_key("a"));

        let err = parse("{{ x }}{% extends 'base' %}").unwrap_err();
        assert!(err.to_string().contains("first tag"));

        let err = parse("{% extends 'a' %}{% extends 'b' %}").unwrap_err();
        assert!(err.to_string().contains("only appear once"));
    }

    #[test]
    fn blocks_are_collected_at_any_depth() {
        let ast =
            parse("{% block outer %}{% if x %}{% block inner %}i{% endblock inner %}{% endif %}{% endblock %}")
                .unwrap();
        let names: Vec<_> = ast.blocks.keys().cloned().collect();
        assert_eq!(names, vec!["inner", "outer"]);
    }

    #[test]
    fn duplicate_and_mismatched_blocks_fail() {
        let err = parse("{% block a %}{% endblock %}{% block a %}{% endblock %}").unwrap_err();
        assert!(err.to_string().contains("defined more than once"));

        let err = parse("{% block a %}{% endblock b %}").unwrap_err();
        assert!(err.to_string().contains("mismatched end tag"));
    }

    #[test]
    fn include_parses_with_and_only() {
        let ast = parse("{% include 'row' with user only %}").unwrap();
        let Node::Include(include) = &ast.root.nodes[0] else {
            panic!("expected include");
        };
        assert_eq!(include.mode, IncludeMode::Isolated);
        assert_eq!(
            include.with.as_ref().map(|p| p.head.clone()),
            Some(Expression::lookup(vec![PathSegment::Key("user".into())]))
        );
    }

    #[test]
    fn malformed_tag_arguments_are_parse_errors() {
        let err = parse("{% for in items %}{% endfor %}").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("invalid arguments for 'for'"));

        let err = parse("{% if %}{% endif %}").unwrap_err();
        assert!(err.to_string().contains("requires a condition"));
    }

    #[test]
    fn expression_errors_in_variables_propagate() {
        let err = parse("{{ user. }}").unwrap_err();
        assert!(matches!(err, Error::Expression { .. }));
    }
}
