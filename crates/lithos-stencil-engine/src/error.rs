// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt::Write as _;

use crate::ast::Span;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the template engine.
///
/// Errors carry the message, optional source error, and – when available – the
/// `Span` pointing to the offending location plus the name of the template it
/// belongs to. Spans are attached where the failure is detected; the template
/// name is attached by [`Error::with_template`] as the error leaves a template.
#[derive(Debug, Error)]
pub enum Error {
    #[error("expression error{}: {message}", attribution(.template, .span))]
    Expression {
        message: String,
        span: Option<Span>,
        template: Option<String>,
    },
    #[error("parse error{}: {message}", attribution(.template, .span))]
    Parse {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        span: Option<Span>,
        template: Option<String>,
    },
    #[error("render error{}: {message}", attribution(.template, .span))]
    Render {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        span: Option<Span>,
        template: Option<String>,
    },
    #[error("template not found: {name}")]
    TemplateNotFound {
        name: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

fn attribution(template: &Option<String>, span: &Option<Span>) -> String {
    let mut out = String::new();
    if template.is_none() && span.is_none() {
        return out;
    }
    out.push_str(" in ");
    if let Some(name) = template.as_deref() {
        out.push_str(name);
    }
    if let Some(span) = span {
        if template.is_some() {
            out.push(':');
        }
        let _ = write!(out, "{}:{}", span.start.line, span.start.column);
    }
    out
}

impl Error {
    pub fn expression(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Expression {
            message: message.into(),
            span,
            template: None,
        }
    }

    pub fn expression_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::expression(message, Some(span))
    }

    pub fn parse(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Parse {
            message: message.into(),
            source: None,
            span,
            template: None,
        }
    }

    pub fn parse_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::parse(message, Some(span))
    }

    pub fn render(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Render {
            message: message.into(),
            source: None,
            span,
            template: None,
        }
    }

    pub fn render_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::render(message, Some(span))
    }

    /// Wraps another error as the cause of a render failure at `span`.
    pub fn render_caused_by(message: impl Into<String>, span: Span, cause: Error) -> Self {
        Error::Render {
            message: message.into(),
            source: Some(Box::new(cause)),
            span: Some(span),
            template: None,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Error::TemplateNotFound {
            name: name.into(),
            source: None,
        }
    }

    pub fn not_found_with_source(
        name: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::TemplateNotFound {
            name: name.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Attaches the template name unless the error is already attributed.
    #[must_use]
    pub fn with_template(mut self, name: &str) -> Self {
        match &mut self {
            Error::Expression { template, .. }
            | Error::Parse { template, .. }
            | Error::Render { template, .. } => {
                if template.is_none() {
                    *template = Some(name.to_string());
                }
            }
            Error::TemplateNotFound { .. } => {}
        }
        self
    }

    /// Attaches `span` when the error does not carry one yet.
    #[must_use]
    pub fn or_span(mut self, fallback: Span) -> Self {
        match &mut self {
            Error::Expression { span, .. }
            | Error::Parse { span, .. }
            | Error::Render { span, .. } => {
                if span.is_none() {
                    *span = Some(fallback);
                }
            }
            Error::TemplateNotFound { .. } => {}
        }
        self
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Expression { span, .. }
            | Error::Parse { span, .. }
            | Error::Render { span, .. } => *span,
            Error::TemplateNotFound { .. } => None,
        }
    }

    pub fn template(&self) -> Option<&str> {
        match self {
            Error::Expression { template, .. }
            | Error::Parse { template, .. }
            | Error::Render { template, .. } => template.as_deref(),
            Error::TemplateNotFound { .. } => None,
        }
    }

    /// The bare message, without kind prefix or attribution.
    pub fn message(&self) -> String {
        match self {
            Error::Expression { message, .. }
            | Error::Parse { message, .. }
            | Error::Render { message, .. } => message.clone(),
            Error::TemplateNotFound { name, .. } => format!("template not found: {name}"),
        }
    }

    /// 1-based line of the offending location, if known.
    pub fn line(&self) -> Option<usize> {
        self.span().map(|span| span.start.line)
    }

    /// 1-based column of the offending location, if known.
    pub fn column(&self) -> Option<usize> {
        self.span().map(|span| span.start.column)
    }
}
