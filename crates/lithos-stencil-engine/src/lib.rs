#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Lexer, parser and renderer for Django/Stencil-style text templates.
//!
//! Templates mix literal text with `{{ variable|filter }}` interpolations,
//! `{% tag %}` control structures and `{# comments #}`. Compilation produces
//! an immutable [`Template`]; rendering walks it against JSON data through an
//! [`Environment`], which supplies the loader used by `include`/`extends`,
//! the filter and tag registries and the output escaper.
//!
//! ```
//! use lithos_stencil_engine::{Environment, MemoryLoader};
//! use serde_json::json;
//!
//! let loader = MemoryLoader::new()
//!     .with_template("base", "<h1>{% block title %}Base{% endblock %}</h1>")
//!     .with_template("child", "{% extends 'base' %}{% block title %}{{ super }} Extra{% endblock %}");
//! let env = Environment::builder().loader(loader).build();
//! assert_eq!(env.render_template("child", &json!({})).unwrap(), "<h1>Base Extra</h1>");
//! ```

pub mod ast;
mod context;
mod environment;
mod error;
pub mod expression;
pub mod lexer;
mod parser;
mod render;
mod runtime;
mod tags;
pub mod telemetry;

pub use ast::{Ast, Location, Node, NodeList, Span};
pub use context::{Context, Scope};
pub use environment::{
    Environment, EnvironmentBuilder, Escaper, Loader, MemoryLoader, RenderOptions,
    INLINE_TEMPLATE_NAME,
};
pub use error::Error;
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{is_builtin_tag, parse_template, TokenParser};
pub use render::{resolve_lookup, Renderer};
pub use runtime::{
    coerce_number, escape_html, install_builtin_filters, is_truthy, value_to_string, Filter,
    FilterRegistry, FilterRegistryBuilder, DEFAULT_FILTER, SAFE_FILTER,
};
pub use tags::{TagNode, TagParser, TagRegistry, TagRegistryBuilder};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ast::{BlockNode, ExtendsNode};
use serde_json::Value;

/// Compiled template: its name, original source and node tree.
///
/// Cloning is cheap; the compiled form is shared.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

struct TemplateInner {
    name: String,
    source: String,
    ast: Ast,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.inner.name)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl Template {
    /// Parses template source using only the built-in tags.
    pub fn parse_str(name: &str, source: &str) -> Result<Self, Error> {
        Self::parse_with_tags(name, source, &TagRegistry::empty())
    }

    /// Parses template source, dispatching unknown tag keywords to `tags`.
    pub fn parse_with_tags(name: &str, source: &str, tags: &TagRegistry) -> Result<Self, Error> {
        let start = Instant::now();
        let result = parser::parse_template(name, source, tags).map_err(|err| err.with_template(name));
        telemetry::record_parse(name, source.len(), start.elapsed(), result.is_ok());

        Ok(Self {
            inner: Arc::new(TemplateInner {
                name: name.to_string(),
                source: source.to_string(),
                ast: result?,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn ast(&self) -> &Ast {
        &self.inner.ast
    }

    /// The `extends` declaration, when the template has one.
    pub fn parent(&self) -> Option<&ExtendsNode> {
        self.inner.ast.parent.as_ref()
    }

    /// Looks up a block declared anywhere in this template.
    pub fn block(&self, name: &str) -> Option<&BlockNode> {
        self.inner.ast.blocks.get(name).map(AsRef::as_ref)
    }

    /// Names of the declared blocks, sorted.
    pub fn block_names(&self) -> Vec<&str> {
        self.inner.ast.blocks.keys().map(String::as_str).collect()
    }

    /// Renders with a default [`Environment`] (built-in filters, no loader).
    pub fn render(&self, data: &Value) -> Result<String, Error> {
        Environment::default().render(self, data)
    }
}
