// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::Error;
use crate::render::Renderer;
use crate::runtime::{escape_html, FilterRegistry};
use crate::tags::TagRegistry;
use crate::telemetry;
use crate::Template;

/// Name given to templates compiled by [`Environment::render_str`].
pub const INLINE_TEMPLATE_NAME: &str = "<inline>";

/// Resolves template names to source text for `include` and `extends`.
pub trait Loader: Send + Sync {
    /// Returns the source of `name`, or [`Error::TemplateNotFound`].
    fn load(&self, name: &str) -> Result<String, Error>;
}

/// Loader backed by an in-memory name to source map.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String, Error> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }
}

/// Escaping function applied to `{{ }}` output.
pub type Escaper = dyn Fn(&str) -> String + Send + Sync;

/// Per-render behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Fail on lookups that resolve to nothing instead of rendering empty.
    pub strict_undefined: bool,
    /// Pass variable output through the environment's escaper.
    pub autoescape: bool,
    /// Bound on nested template renders (includes plus extends chains).
    pub max_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            strict_undefined: false,
            autoescape: true,
            max_depth: 64,
        }
    }
}

/// Shared configuration for compiling and rendering templates.
///
/// An environment is immutable once built and can be shared across threads;
/// every render call owns its own [`Context`] and [`Renderer`].
#[derive(Clone)]
pub struct Environment {
    loader: Option<Arc<dyn Loader>>,
    filters: FilterRegistry,
    tags: TagRegistry,
    escaper: Arc<Escaper>,
    options: RenderOptions,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("has_loader", &self.loader.is_some())
            .field("filters", &self.filters.filter_names())
            .field("tags", &self.tags)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Applies the configured escaper.
    pub fn escape(&self, text: &str) -> String {
        (self.escaper)(text)
    }

    /// Compiles `source` with this environment's custom tags.
    pub fn template_from_str(&self, name: &str, source: &str) -> Result<Template, Error> {
        Template::parse_with_tags(name, source, &self.tags)
    }

    /// Loads and compiles `name` through the configured loader.
    pub fn load_template(&self, name: &str) -> Result<Template, Error> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(Error::not_found(name));
        };
        tracing::debug!(template = name, "loading template");
        let source = loader.load(name)?;
        self.template_from_str(name, &source)
    }

    pub fn render_template(&self, name: &str, data: &Value) -> Result<String, Error> {
        let template = self.load_template(name)?;
        self.render(&template, data)
    }

    /// Compiles and renders a one-off source string.
    pub fn render_str(&self, source: &str, data: &Value) -> Result<String, Error> {
        let template = self.template_from_str(INLINE_TEMPLATE_NAME, source)?;
        self.render(&template, data)
    }

    pub fn render(&self, template: &Template, data: &Value) -> Result<String, Error> {
        self.render_with_options(template, data, &self.options)
    }

    /// Renders with options overriding the environment's defaults.
    pub fn render_with_options(
        &self,
        template: &Template,
        data: &Value,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        let start = Instant::now();
        let mut ctx = Context::new(data);
        let mut output = String::new();
        let result = Renderer::new(self, options.clone())
            .render_template(template, &mut ctx, &mut output)
            .map_err(|err| err.with_template(template.name()));
        telemetry::record_render(
            template.name(),
            template.source().len(),
            start.elapsed(),
            result.is_ok(),
        );
        result.map(|()| output)
    }
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    loader: Option<Arc<dyn Loader>>,
    filters: FilterRegistry,
    tags: TagRegistry,
    escaper: Arc<Escaper>,
    options: RenderOptions,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            loader: None,
            filters: FilterRegistry::builtin(),
            tags: TagRegistry::empty(),
            escaper: Arc::new(escape_html),
            options: RenderOptions::default(),
        }
    }

    #[must_use]
    pub fn loader<L>(mut self, loader: L) -> Self
    where
        L: Loader + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Replaces the filter registry. The registry should include
    /// `default` and `safe`, see [`crate::install_builtin_filters`].
    #[must_use]
    pub fn filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn tags(mut self, tags: TagRegistry) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn escaper<F>(mut self, escaper: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.escaper = Arc::new(escaper);
        self
    }

    #[must_use]
    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn strict_undefined(mut self, strict: bool) -> Self {
        self.options.strict_undefined = strict;
        self
    }

    #[must_use]
    pub fn autoescape(mut self, enabled: bool) -> Self {
        self.options.autoescape = enabled;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            loader: self.loader,
            filters: self.filters,
            tags: self.tags,
            escaper: self.escaper,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RenderOptions = serde_json::from_value(json!({"strict_undefined": true})).unwrap();
        assert!(options.strict_undefined);
        assert!(options.autoescape);
        assert_eq!(options.max_depth, 64);
    }

    #[test]
    fn missing_loader_reports_not_found() {
        let env = Environment::new();
        let err = env.load_template("page").unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { ref name, .. } if name == "page"));
    }

    #[test]
    fn unresolved_include_is_render_error() {
        let env = Environment::builder().loader(MemoryLoader::new()).build();
        let err = env.render_str("a{% include 'nope' %}", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert_eq!(
            err.to_string(),
            "render error in <inline>:1:5: cannot resolve include target 'nope'"
        );
    }

    #[test]
    fn custom_escaper_and_per_call_options() {
        let env = Environment::builder()
            .escaper(|text| text.replace('<', "[lt]"))
            .build();
        let template = env.template_from_str("t", "{{ v }}").unwrap();
        let data = json!({"v": "<b>"});
        assert_eq!(env.render(&template, &data).unwrap(), "[lt]b>");

        let raw = RenderOptions {
            autoescape: false,
            ..RenderOptions::default()
        };
        assert_eq!(env.render_with_options(&template, &data, &raw).unwrap(), "<b>");
    }

    #[test]
    fn environment_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Environment>();
    }
}
