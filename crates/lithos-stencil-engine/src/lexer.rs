// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Splits template source into text, variable, block and comment tokens.
//!
//! The lexer never fails. Malformed input degrades instead:
//!
//! - an opening delimiter without a closing one swallows the rest of the
//!   input; if no text was emitted for that position an empty `Text` token
//!   covering the swallowed range is produced,
//! - empty tags such as `{{}}` or `{%}` produce tokens with empty contents,
//!   which the parser rejects,
//! - quoted strings inside `{{ }}` and `{% %}` hide closing delimiters, so
//!   `{{ '}}' }}` is a single token.
//!
//! Tag contents spanning several lines are folded: every line is trimmed,
//! blank lines are dropped and the rest are joined with one space.

use crate::ast::{Location, Span};

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Variable,
    Block,
    Comment,
}

impl TokenKind {
    fn from_opener(marker: u8) -> Option<Self> {
        match marker {
            b'{' => Some(TokenKind::Variable),
            b'%' => Some(TokenKind::Block),
            b'#' => Some(TokenKind::Comment),
            _ => None,
        }
    }

    fn closing_marker(self) -> u8 {
        match self {
            TokenKind::Variable => b'}',
            TokenKind::Block => b'%',
            TokenKind::Comment => b'#',
            TokenKind::Text => 0,
        }
    }

    fn honours_quotes(self) -> bool {
        matches!(self, TokenKind::Variable | TokenKind::Block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub contents: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, contents: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            contents: contents.into(),
            span,
        }
    }

    pub fn text(contents: impl Into<String>, span: Span) -> Self {
        Self::new(TokenKind::Text, contents, span)
    }

    pub fn variable(contents: impl Into<String>, span: Span) -> Self {
        Self::new(TokenKind::Variable, contents, span)
    }

    pub fn block(contents: impl Into<String>, span: Span) -> Self {
        Self::new(TokenKind::Block, contents, span)
    }

    pub fn comment(contents: impl Into<String>, span: Span) -> Self {
        Self::new(TokenKind::Comment, contents, span)
    }

    /// Whitespace-separated words of the contents; quoted sections stay
    /// together and keep their quotes.
    pub fn components(&self) -> Vec<String> {
        split_components(&self.contents)
    }

    /// First word of a block token (`if`, `endfor`, ...).
    pub fn keyword(&self) -> &str {
        self.contents.split_whitespace().next().unwrap_or("")
    }

    /// Contents following the keyword, with leading whitespace removed.
    pub fn arguments(&self) -> &str {
        let keyword = self.keyword();
        let start = self.contents.find(keyword).unwrap_or(0) + keyword.len();
        self.contents[start..].trim_start()
    }
}

/// Tokenizes a full template source.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

/// Maps byte offsets to 1-based line/column locations.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(idx, _)| idx + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let line_start = self.line_starts[line];
        let column = self.source[line_start..offset].chars().count() + 1;
        Location::new(offset, line + 1, column)
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.location(start), self.location(end))
    }
}

/// Single-pass scanner over a template source.
pub struct Lexer<'a> {
    source: &'a str,
    lines: LineIndex<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
        }
    }

    pub fn tokenize(&self) -> Vec<Token> {
        let bytes = self.source.as_bytes();
        let mut tokens = Vec::new();
        let mut cursor = 0usize;

        if bytes.is_empty() {
            tokens.push(Token::text("", self.lines.span(0, 0)));
            return tokens;
        }

        while cursor < bytes.len() {
            let Some((open, kind)) = find_tag_start(bytes, cursor) else {
                tokens.push(self.text_token(cursor, bytes.len()));
                break;
            };

            if open > cursor {
                tokens.push(self.text_token(cursor, open));
            }

            match find_tag_end(bytes, open, kind) {
                Some(close) => {
                    tokens.push(self.tag_token(kind, open, close));
                    cursor = close + 2;
                }
                None => {
                    if open == cursor {
                        tokens.push(Token::text("", self.lines.span(open, bytes.len())));
                    }
                    break;
                }
            }
        }

        tokens
    }

    fn text_token(&self, start: usize, end: usize) -> Token {
        Token::text(&self.source[start..end], self.lines.span(start, end))
    }

    fn tag_token(&self, kind: TokenKind, open: usize, close: usize) -> Token {
        let body_start = open + 2;
        let body_end = close.max(body_start);
        let raw = &self.source[body_start..body_end];
        let contents = fold_whitespace(raw);

        let leading = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        let span = if trimmed.is_empty() {
            Span::empty_at(self.lines.location(body_start))
        } else {
            let start = body_start + leading;
            self.lines.span(start, start + trimmed.len())
        };

        Token::new(kind, contents, span)
    }
}

/// Collapses multi-line tag contents into a single line.
pub fn fold_whitespace(raw: &str) -> String {
    raw.lines()
        .map(|line| line.trim_matches(|ch: char| matches!(ch, ' ' | '\t' | '\r')))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_tag_start(bytes: &[u8], from: usize) -> Option<(usize, TokenKind)> {
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(kind) = TokenKind::from_opener(bytes[i + 1]) {
                return Some((i, kind));
            }
        }
        i += 1;
    }
    None
}

/// Returns the index of the closing delimiter's first byte.
///
/// The search starts on the opener's second byte, so `{%}` closes
/// immediately with empty contents.
fn find_tag_end(bytes: &[u8], open: usize, kind: TokenKind) -> Option<usize> {
    let marker = kind.closing_marker();
    let body_start = open + 2;
    let mut quote: Option<u8> = None;
    let mut i = open + 1;

    while i + 1 < bytes.len() {
        let current = bytes[i];

        if kind.honours_quotes() && i >= body_start {
            if let Some(open_quote) = quote {
                if current == open_quote {
                    quote = None;
                }
                i += 1;
                continue;
            }
            if current == b'\'' || current == b'"' {
                quote = Some(current);
                i += 1;
                continue;
            }
        }

        if current == marker && bytes[i + 1] == b'}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn split_components(contents: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in contents.chars() {
        match quote {
            Some(open) => {
                current.push(ch);
                if ch == open {
                    quote = None;
                }
            }
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    components.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }

    if !current.is_empty() {
        components.push(current);
    }
    components
}
