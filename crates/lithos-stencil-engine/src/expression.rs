// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Expression grammar used inside `{{ }}` and tag arguments.
//!
//! ```text
//! pipeline   := primary ("|" filter)*
//! primary    := literal | lookup
//! lookup     := identifier ("." identifier | "." integer)*
//! filter     := identifier ("(" primary ("," primary)* ")")?
//! condition  := and ("or" and)*
//! and        := not ("and" not)*
//! not        := "not" not | comparison
//! comparison := pipeline (operator pipeline)?
//! ```

use std::str::Chars;

use serde_json::Value;

use crate::ast::{
    Condition, Expression, FilterCall, LookupPath, Operator, PathSegment, Pipeline, Span,
};
use crate::error::Error;
use crate::runtime::parse_number;

const RESERVED: &[&str] = &["and", "or", "not", "in"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprTokenKind {
    Identifier(String),
    StringLiteral(String),
    NumberLiteral(String),
    Dot,
    Pipe,
    Comma,
    LeftParen,
    RightParen,
    Operator(Operator),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExprToken {
    pub kind: ExprTokenKind,
}

pub(crate) fn lex_expression(input: &str, span: Span) -> Result<Vec<ExprToken>, Error> {
    let mut lexer = ExprLexer::new(input, span);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct ExprLexer<'a> {
    chars: Chars<'a>,
    span: Span,
    peeked: Option<char>,
}

impl<'a> ExprLexer<'a> {
    fn new(input: &'a str, span: Span) -> Self {
        Self {
            chars: input.chars(),
            span,
            peeked: None,
        }
    }

    fn next_token(&mut self) -> Result<Option<ExprToken>, Error> {
        self.skip_whitespace();

        let Some(chr) = self.bump_char() else {
            return Ok(None);
        };

        let kind = match chr {
            '.' => ExprTokenKind::Dot,
            '|' => ExprTokenKind::Pipe,
            ',' => ExprTokenKind::Comma,
            '(' => ExprTokenKind::LeftParen,
            ')' => ExprTokenKind::RightParen,
            '=' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    ExprTokenKind::Operator(Operator::Equal)
                } else {
                    return Err(self.error("unexpected '=', did you mean '=='?"));
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    ExprTokenKind::Operator(Operator::NotEqual)
                } else {
                    return Err(self.error("unexpected '!' without '='"));
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    ExprTokenKind::Operator(Operator::LessOrEqual)
                } else {
                    ExprTokenKind::Operator(Operator::Less)
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    ExprTokenKind::Operator(Operator::GreaterOrEqual)
                } else {
                    ExprTokenKind::Operator(Operator::Greater)
                }
            }
            '"' | '\'' => ExprTokenKind::StringLiteral(self.read_string(chr)?),
            '-' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => {
                ExprTokenKind::NumberLiteral(self.read_number('-'))
            }
            c if c.is_ascii_digit() => ExprTokenKind::NumberLiteral(self.read_number(c)),
            c if is_identifier_start(c) => ExprTokenKind::Identifier(self.read_identifier(c)),
            other => {
                return Err(self.error(format!("unexpected character '{other}'")));
            }
        };

        Ok(Some(ExprToken { kind }))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.bump_char();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::new();
        ident.push(first);
        while let Some(ch) = self.peek_char() {
            if !is_identifier_part(ch) {
                break;
            }
            ident.push(ch);
            self.bump_char();
        }
        ident
    }

    fn read_string(&mut self, quote: char) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.bump_char() {
            if ch == quote {
                return Ok(literal);
            }
            literal.push(ch);
        }
        Err(self.error("unbalanced quotes in string literal"))
    }

    /// Reads digits with at most one fractional part. The fraction is only
    /// consumed when a digit follows the dot, so `items.0.name` keeps its
    /// dots as path separators.
    fn read_number(&mut self, first: char) -> String {
        let mut literal = String::new();
        literal.push(first);
        let mut seen_dot = false;

        loop {
            match self.peek_char() {
                Some(ch) if ch.is_ascii_digit() => {
                    literal.push(ch);
                    self.bump_char();
                }
                Some('.')
                    if !seen_dot && self.char_after_peek().is_some_and(|c| c.is_ascii_digit()) =>
                {
                    seen_dot = true;
                    literal.push('.');
                    self.bump_char();
                }
                _ => break,
            }
        }
        literal
    }

    fn bump_char(&mut self) -> Option<char> {
        self.peeked.take().or_else(|| self.chars.next())
    }

    fn peek_char(&mut self) -> Option<char> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn char_after_peek(&mut self) -> Option<char> {
        self.peek_char()?;
        self.chars.clone().next()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::expression_with_span(message, self.span)
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}

/// Parses the contents of a `{{ }}` token.
pub fn parse_pipeline(source: &str, span: Span) -> Result<Pipeline, Error> {
    let mut parser = ExpressionParser::new(source, span)?;
    let pipeline = parser.parse_pipeline()?;
    parser.expect_end()?;
    Ok(pipeline)
}

/// Parses a full boolean condition such as `user and not user.banned`.
pub fn parse_condition(source: &str, span: Span) -> Result<Condition, Error> {
    let mut parser = ExpressionParser::new(source, span)?;
    let condition = parser.parse_condition()?;
    parser.expect_end()?;
    Ok(condition)
}

/// Parses a bare filter chain such as `lower|join(', ')`, as used by tags
/// that apply filters to rendered content.
pub fn parse_filter_chain(source: &str, span: Span) -> Result<Vec<FilterCall>, Error> {
    let mut parser = ExpressionParser::new(source, span)?;
    let mut filters = vec![parser.parse_filter()?];
    while parser.consume(&ExprTokenKind::Pipe) {
        filters.push(parser.parse_filter()?);
    }
    parser.expect_end()?;
    Ok(filters)
}

/// Recursive-descent parser over the tokens of one expression source.
///
/// Tag parsers use it to consume their arguments piece by piece, e.g.
/// `for k, v in items where v` reads identifiers, a keyword, a pipeline and a
/// condition from the same stream.
pub struct ExpressionParser {
    tokens: Vec<ExprToken>,
    index: usize,
    span: Span,
}

impl ExpressionParser {
    pub fn new(source: &str, span: Span) -> Result<Self, Error> {
        Ok(Self {
            tokens: lex_expression(source, span)?,
            index: 0,
            span,
        })
    }

    pub fn is_eof(&self) -> bool {
        self.index >= self.tokens.len()
    }

    pub fn expect_end(&self) -> Result<(), Error> {
        match self.peek_token() {
            None => Ok(()),
            Some(token) => Err(self.error(format!(
                "unexpected {} in expression",
                describe(&token.kind)
            ))),
        }
    }

    pub fn parse_pipeline(&mut self) -> Result<Pipeline, Error> {
        let head = self.parse_primary()?;
        let mut filters = Vec::new();

        while self.consume(&ExprTokenKind::Pipe) {
            filters.push(self.parse_filter()?);
        }

        Ok(Pipeline::new(self.span, head, filters))
    }

    pub fn parse_condition(&mut self) -> Result<Condition, Error> {
        let mut lhs = self.parse_and()?;
        while self.consume_word("or") {
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition, Error> {
        let mut lhs = self.parse_not()?;
        while self.consume_word("and") {
            let rhs = self.parse_not()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Condition, Error> {
        if self.consume_word("not") {
            let inner = self.parse_not()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Condition, Error> {
        let lhs = self.parse_pipeline()?;
        let operator = match self.peek_token().map(|token| &token.kind) {
            Some(ExprTokenKind::Operator(op)) => Some(*op),
            Some(ExprTokenKind::Identifier(word)) if word == "in" => Some(Operator::In),
            _ => None,
        };
        let Some(operator) = operator else {
            return Ok(Condition::Value(lhs));
        };
        self.index += 1;
        let rhs = self.parse_pipeline()?;
        Ok(Condition::Compare { operator, lhs, rhs })
    }

    fn parse_filter(&mut self) -> Result<FilterCall, Error> {
        let name = match self.next_token().map(|token| token.kind.clone()) {
            Some(ExprTokenKind::Identifier(name)) => name,
            Some(other) => {
                return Err(self.error(format!(
                    "expected filter name after '|', found {}",
                    describe(&other)
                )));
            }
            None if self.index == 0 => return Err(self.error("expected filter name")),
            None => return Err(self.error("expected filter name after '|'")),
        };

        let mut args = Vec::new();
        if self.consume(&ExprTokenKind::LeftParen) {
            if !self.consume(&ExprTokenKind::RightParen) {
                loop {
                    args.push(self.parse_primary()?);
                    if self.consume(&ExprTokenKind::Comma) {
                        continue;
                    }
                    if self.consume(&ExprTokenKind::RightParen) {
                        break;
                    }
                    return Err(self.error(format!(
                        "expected ',' or ')' in arguments of filter '{name}'"
                    )));
                }
            }
        }

        Ok(FilterCall::new(name, args))
    }

    pub fn parse_primary(&mut self) -> Result<Expression, Error> {
        let kind = match self.next_token() {
            Some(token) => token.kind.clone(),
            None => return Err(self.error("unexpected end of expression")),
        };

        match kind {
            ExprTokenKind::StringLiteral(value) => Ok(Expression::Literal(Value::String(value))),
            ExprTokenKind::NumberLiteral(text) => parse_number(&text)
                .map(|number| Expression::Literal(Value::Number(number)))
                .ok_or_else(|| self.error(format!("invalid number literal {text}"))),
            ExprTokenKind::Identifier(word) => match word.as_str() {
                "true" => Ok(Expression::Literal(Value::Bool(true))),
                "false" => Ok(Expression::Literal(Value::Bool(false))),
                "nil" | "none" | "None" => Ok(Expression::Literal(Value::Null)),
                reserved if RESERVED.contains(&reserved) => {
                    Err(self.error(format!("unexpected keyword '{reserved}'")))
                }
                _ => self.parse_lookup(word),
            },
            other => Err(self.error(format!("unexpected {} in expression", describe(&other)))),
        }
    }

    fn parse_lookup(&mut self, first: String) -> Result<Expression, Error> {
        let mut segments = vec![PathSegment::Key(first)];

        while self.consume(&ExprTokenKind::Dot) {
            match self.next_token().map(|token| token.kind.clone()) {
                Some(ExprTokenKind::Identifier(name)) => segments.push(PathSegment::Key(name)),
                Some(ExprTokenKind::NumberLiteral(text)) => {
                    // `items.0.1` lexes the tail as the number `0.1`
                    for part in text.split('.') {
                        let index = part.parse::<i64>().map_err(|_| {
                            self.error(format!("invalid index segment '{part}'"))
                        })?;
                        segments.push(PathSegment::Index(index));
                    }
                }
                _ => {
                    let path = LookupPath::new(segments);
                    return Err(self.error(format!("empty lookup segment after '{path}.'")));
                }
            }
        }

        Ok(Expression::Lookup(LookupPath::new(segments)))
    }

    /// Consumes an identifier and returns it.
    pub fn expect_identifier(&mut self, what: &str) -> Result<String, Error> {
        match self.next_token().map(|token| token.kind.clone()) {
            Some(ExprTokenKind::Identifier(name)) if !RESERVED.contains(&name.as_str()) => {
                Ok(name)
            }
            Some(other) => Err(self.error(format!("expected {what}, found {}", describe(&other)))),
            None => Err(self.error(format!("expected {what}"))),
        }
    }

    /// Consumes `word` if it is the next bare identifier.
    pub fn consume_word(&mut self, word: &str) -> bool {
        match self.peek_token() {
            Some(ExprToken {
                kind: ExprTokenKind::Identifier(name),
                ..
            }) if name == word => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    pub fn expect_word(&mut self, word: &str) -> Result<(), Error> {
        if self.consume_word(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{word}'")))
        }
    }

    pub fn consume_comma(&mut self) -> bool {
        self.consume(&ExprTokenKind::Comma)
    }

    fn consume(&mut self, kind: &ExprTokenKind) -> bool {
        if self.peek_token().is_some_and(|token| &token.kind == kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Option<&ExprToken> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn peek_token(&self) -> Option<&ExprToken> {
        self.tokens.get(self.index)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::expression_with_span(message, self.span)
    }
}

fn describe(kind: &ExprTokenKind) -> String {
    match kind {
        ExprTokenKind::Identifier(name) => format!("identifier '{name}'"),
        ExprTokenKind::StringLiteral(value) => format!("string \"{value}\""),
        ExprTokenKind::NumberLiteral(value) => format!("number {value}"),
        ExprTokenKind::Dot => "'.'".to_string(),
        ExprTokenKind::Pipe => "'|'".to_string(),
        ExprTokenKind::Comma => "','".to_string(),
        ExprTokenKind::LeftParen => "'('".to_string(),
        ExprTokenKind::RightParen => "')'".to_string(),
        ExprTokenKind::Operator(op) => format!("operator '{}'", op.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(source: &str) -> Pipeline {
        parse_pipeline(source, Span::default()).expect("pipeline should parse")
    }

    fn key(name: &str) -> PathSegment {
        PathSegment::Key(name.to_string())
    }

    #[test]
    fn parses_dotted_lookup_with_indices() {
        let parsed = pipeline("user.posts.0.1.title");
        assert_eq!(
            parsed.head,
            Expression::lookup(vec![
                key("user"),
                key("posts"),
                PathSegment::Index(0),
                PathSegment::Index(1),
                key("title"),
            ])
        );
        assert!(parsed.filters.is_empty());
    }

    #[test]
    fn parses_negative_index_segment() {
        let parsed = pipeline("items.-1");
        assert_eq!(
            parsed.head,
            Expression::lookup(vec![key("items"), PathSegment::Index(-1)])
        );
    }

    #[test]
    fn parses_literals() {
        assert_eq!(pipeline("'{'").head, Expression::Literal(json!("{")));
        assert_eq!(pipeline("\"a b\"").head, Expression::Literal(json!("a b")));
        assert_eq!(pipeline("42").head, Expression::Literal(json!(42)));
        assert_eq!(pipeline("-2.5").head, Expression::Literal(json!(-2.5)));
        assert_eq!(pipeline("true").head, Expression::Literal(json!(true)));
        assert_eq!(pipeline("none").head, Expression::Literal(Value::Null));
        assert_eq!(pipeline("nil").head, Expression::Literal(Value::Null));
    }

    #[test]
    fn parses_filter_chain_with_arguments() {
        let parsed = pipeline("name | default('anon') | join(', ', sep) | upper");
        let names: Vec<_> = parsed.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["default", "join", "upper"]);
        assert_eq!(
            parsed.filters[0].args,
            vec![Expression::Literal(json!("anon"))]
        );
        assert_eq!(
            parsed.filters[1].args,
            vec![
                Expression::Literal(json!(", ")),
                Expression::lookup(vec![key("sep")])
            ]
        );
        assert!(parsed.filters[2].args.is_empty());
    }

    #[test]
    fn rejects_trailing_dot() {
        let err = parse_pipeline("user.", Span::default()).unwrap_err();
        assert!(matches!(err, Error::Expression { .. }));
        assert!(err.to_string().contains("empty lookup segment"));
    }

    #[test]
    fn rejects_pipe_without_filter() {
        let err = parse_pipeline("name |", Span::default()).unwrap_err();
        assert!(err.to_string().contains("expected filter name"));
        let err = parse_pipeline("name | 'x'", Span::default()).unwrap_err();
        assert!(err.to_string().contains("expected filter name"));
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let err = parse_pipeline("'open", Span::default()).unwrap_err();
        assert!(err.to_string().contains("unbalanced quotes"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse_pipeline("a b", Span::default()).unwrap_err();
        assert!(err.to_string().contains("unexpected identifier 'b'"));
    }

    #[test]
    fn condition_precedence_binds_and_tighter_than_or() {
        let parsed = parse_condition("a or b and not c", Span::default()).unwrap();
        let value = |name: &str| {
            Condition::Value(Pipeline::new(
                Span::default(),
                Expression::lookup(vec![key(name)]),
                Vec::new(),
            ))
        };
        assert_eq!(
            parsed,
            Condition::Or(
                Box::new(value("a")),
                Box::new(Condition::And(
                    Box::new(value("b")),
                    Box::new(Condition::Not(Box::new(value("c"))))
                ))
            )
        );
    }

    #[test]
    fn condition_parses_comparisons() {
        let parsed = parse_condition("count >= 2 and name in names", Span::default()).unwrap();
        let Condition::And(lhs, rhs) = parsed else {
            panic!("expected and");
        };
        assert!(matches!(
            *lhs,
            Condition::Compare {
                operator: Operator::GreaterOrEqual,
                ..
            }
        ));
        assert!(matches!(
            *rhs,
            Condition::Compare {
                operator: Operator::In,
                ..
            }
        ));
    }

    #[test]
    fn parses_bare_filter_chain() {
        let filters = parse_filter_chain("lower | join(', ')", Span::default()).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].args, vec![Expression::Literal(json!(", "))]);

        let err = parse_filter_chain("", Span::default()).unwrap_err();
        assert!(err.to_string().ends_with(": expected filter name"));
    }

    #[test]
    fn single_equals_is_rejected() {
        let err = parse_condition("a = b", Span::default()).unwrap_err();
        assert!(err.to_string().contains("did you mean '=='"));
    }

    #[test]
    fn integer_literals_must_fit_64_bits() {
        assert_eq!(
            pipeline("18446744073709551615").head,
            Expression::Literal(json!(u64::MAX))
        );
        assert_eq!(
            pipeline("-9223372036854775808").head,
            Expression::Literal(json!(i64::MIN))
        );

        let err = parse_pipeline("99999999999999999999", Span::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("invalid number literal 99999999999999999999"));
    }
}
