// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Extension point for host-defined `{% tags %}`.
//!
//! Built-in tags (`if`, `for`, `block`, `extends`, `include`) are handled by
//! the parser directly. Any other keyword is looked up in a [`TagRegistry`];
//! the registered [`TagParser`] consumes its arguments (and, for paired tags,
//! its body through [`TokenParser::parse_body`]) and returns a [`TagNode`]
//! that renders through the [`Renderer`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::lexer::Token;
use crate::parser::{is_builtin_tag, TokenParser};
use crate::render::Renderer;

/// Parsed state of a custom tag, rendered once per render pass.
pub trait TagNode: fmt::Debug + Send + Sync {
    fn render(
        &self,
        renderer: &mut Renderer<'_>,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error>;
}

/// Compiles a custom tag starting at `token`.
pub trait TagParser: Send + Sync {
    fn parse(&self, parser: &mut TokenParser<'_>, token: &Token)
        -> Result<Arc<dyn TagNode>, Error>;
}

impl<F> TagParser for F
where
    F: Fn(&mut TokenParser<'_>, &Token) -> Result<Arc<dyn TagNode>, Error> + Send + Sync,
{
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        token: &Token,
    ) -> Result<Arc<dyn TagNode>, Error> {
        self(parser, token)
    }
}

/// Registry that maps tag keywords to parsers.
#[derive(Clone, Default)]
pub struct TagRegistry {
    map: Arc<HashMap<String, Arc<dyn TagParser>>>,
}

impl TagRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> TagRegistryBuilder {
        TagRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TagParser>> {
        self.map.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered tag keywords.
    pub fn tag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.tag_names())
            .finish()
    }
}

#[derive(Default)]
pub struct TagRegistryBuilder {
    map: HashMap<String, Arc<dyn TagParser>>,
}

impl TagRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parser for `keyword`. Keywords of built-in tags are
    /// reserved and never reach the registry.
    pub fn register<P>(&mut self, keyword: impl Into<String>, parser: P) -> &mut Self
    where
        P: TagParser + 'static,
    {
        let keyword = keyword.into();
        if is_builtin_tag(&keyword) {
            tracing::warn!(tag = %keyword, "custom tag shadows a built-in tag and will be ignored");
            return self;
        }
        self.map.insert(keyword, Arc::new(parser));
        self
    }

    pub fn extend(&mut self, other: &TagRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn build(self) -> TagRegistry {
        TagRegistry {
            map: Arc::new(self.map),
        }
    }
}
