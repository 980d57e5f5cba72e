// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Tree-walking renderer and inheritance resolver.
//!
//! Rendering a template first resolves its `extends` chain (most-derived
//! first) and records every block definition along it in an
//! [`InheritanceFrame`]. Only the root ancestor's node tree is walked; each
//! `Block` node it reaches renders the most-derived definition of that name,
//! and `super` inside a definition renders the next less-derived one.
//! Includes render with a frame of their own, so blocks never leak across
//! an include boundary.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{
    BlockNode, Condition, Expression, FilterCall, ForNode, IfNode, IncludeMode, IncludeNode,
    LookupPath, Node, NodeList, PathSegment, Pipeline, Span, VariableNode,
};
use crate::context::{Context, Scope};
use crate::environment::{Environment, RenderOptions};
use crate::error::Error;
use crate::runtime::{compare, is_truthy, value_to_string, DEFAULT_FILTER};
use crate::telemetry;
use crate::Template;

#[derive(Debug, Clone)]
struct BlockDefinition {
    template: String,
    node: Arc<BlockNode>,
}

/// Block definitions of one extends chain, keyed by name, most-derived first.
#[derive(Debug, Default)]
struct InheritanceFrame {
    blocks: HashMap<String, Vec<BlockDefinition>>,
}

#[derive(Debug, Clone)]
struct ActiveBlock {
    frame: usize,
    name: String,
    level: usize,
}

/// Per-render state; one renderer serves exactly one top-level render call.
pub struct Renderer<'a> {
    env: &'a Environment,
    options: RenderOptions,
    depth: usize,
    frames: Vec<InheritanceFrame>,
    active_blocks: Vec<ActiveBlock>,
}

impl<'a> Renderer<'a> {
    pub fn new(env: &'a Environment, options: RenderOptions) -> Self {
        Self {
            env,
            options,
            depth: 0,
            frames: Vec::new(),
            active_blocks: Vec::new(),
        }
    }

    pub fn environment(&self) -> &'a Environment {
        self.env
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Renders `template` and everything it extends or includes.
    pub fn render_template(
        &mut self,
        template: &Template,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        if self.depth >= self.options.max_depth {
            return Err(Error::render(
                format!(
                    "maximum template depth of {} exceeded",
                    self.options.max_depth
                ),
                None,
            )
            .with_template(template.name()));
        }
        self.depth += 1;
        let result = self.render_inheritance(template, ctx, output);
        self.depth -= 1;
        result
    }

    fn render_inheritance(
        &mut self,
        template: &Template,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let chain = self.resolve_chain(template, ctx)?;

        let mut frame = InheritanceFrame::default();
        for member in &chain {
            for (name, node) in &member.ast().blocks {
                frame
                    .blocks
                    .entry(name.clone())
                    .or_default()
                    .push(BlockDefinition {
                        template: member.name().to_string(),
                        node: Arc::clone(node),
                    });
            }
        }

        let root = chain.last().unwrap_or(template);
        self.frames.push(frame);
        let result = self
            .render_nodes(&root.ast().root, ctx, output)
            .map_err(|err| err.with_template(root.name()));
        self.frames.pop();
        result
    }

    /// Follows `extends` links from `template` up to the root ancestor.
    fn resolve_chain(&self, template: &Template, ctx: &Context) -> Result<Vec<Template>, Error> {
        let mut chain = vec![template.clone()];
        let mut current = template.clone();

        while let Some(extends) = current.parent().cloned() {
            let parent_name = self
                .eval_template_name(&extends.parent, ctx)
                .map_err(|err| err.with_template(current.name()))?;

            if chain.iter().any(|member| member.name() == parent_name) {
                let mut cycle: Vec<&str> = chain.iter().map(Template::name).collect();
                cycle.push(&parent_name);
                return Err(Error::render_with_span(
                    format!("extends cycle detected: {}", cycle.join(" -> ")),
                    extends.span,
                )
                .with_template(current.name()));
            }
            if self.depth + chain.len() > self.options.max_depth {
                return Err(Error::render_with_span(
                    format!(
                        "extends chain exceeds maximum depth of {}",
                        self.options.max_depth
                    ),
                    extends.span,
                )
                .with_template(current.name()));
            }

            tracing::debug!(template = current.name(), parent = %parent_name, "resolving extends");
            let parent = self
                .load(&parent_name, extends.span, "extends")
                .map_err(|err| err.with_template(current.name()))?;
            chain.push(parent.clone());
            current = parent;
        }

        tracing::trace!(
            template = template.name(),
            depth = chain.len(),
            "resolved inheritance chain"
        );
        Ok(chain)
    }

    fn load(&self, name: &str, span: Span, purpose: &str) -> Result<Template, Error> {
        self.env.load_template(name).map_err(|err| match err {
            Error::TemplateNotFound { .. } => Error::render_caused_by(
                format!("cannot resolve {purpose} target '{name}'"),
                span,
                err,
            ),
            other => other,
        })
    }

    /// Renders a node sequence into `output`.
    pub fn render_nodes(
        &mut self,
        nodes: &NodeList,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        for node in &nodes.nodes {
            self.render_node(node, ctx, output)?;
        }
        Ok(())
    }

    /// Renders a node sequence into a fresh string.
    pub fn render_to_string(&mut self, nodes: &NodeList, ctx: &mut Context) -> Result<String, Error> {
        let mut buffer = String::new();
        self.render_nodes(nodes, ctx, &mut buffer)?;
        Ok(buffer)
    }

    fn render_node(
        &mut self,
        node: &Node,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        match node {
            Node::Text(text) => {
                output.push_str(&text.text);
                Ok(())
            }
            Node::Variable(variable) => self.render_variable(variable, ctx, output),
            Node::Comment(_) | Node::Extends(_) => Ok(()),
            Node::If(if_node) => self.render_if(if_node, ctx, output),
            Node::For(for_node) => self.render_for(for_node, ctx, output),
            Node::Include(include) => self.render_include(include, ctx, output),
            Node::Block(block) => self.render_block(block, ctx, output),
            Node::Custom(custom) => custom
                .node
                .render(self, ctx, output)
                .map_err(|err| err.or_span(custom.span)),
        }
    }

    fn render_variable(
        &mut self,
        node: &VariableNode,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        if node.pipeline.is_super() {
            let rendered = self.render_super(&node.pipeline, ctx)?;
            if node.pipeline.filters.is_empty() {
                output.push_str(&rendered);
            } else {
                let value = self.apply_filters(
                    Value::String(rendered),
                    &node.pipeline.filters,
                    node.pipeline.span,
                    ctx,
                )?;
                output.push_str(&value_to_string(&value));
            }
            return Ok(());
        }

        let value = self.eval_pipeline(&node.pipeline, ctx)?;
        let text = value_to_string(&value);
        let marked_safe = node
            .pipeline
            .filters
            .last()
            .is_some_and(|filter| self.env.filters().is_safe(&filter.name));

        if self.options.autoescape && !marked_safe {
            output.push_str(&self.env.escape(&text));
        } else {
            output.push_str(&text);
        }
        Ok(())
    }

    fn render_if(
        &mut self,
        node: &IfNode,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        if self.eval_condition(&node.condition, ctx)? {
            return self.render_nodes(&node.then_block, ctx, output);
        }
        for branch in &node.elif_branches {
            if self.eval_condition(&branch.condition, ctx)? {
                return self.render_nodes(&branch.block, ctx, output);
            }
        }
        match &node.else_block {
            Some(block) => self.render_nodes(block, ctx, output),
            None => Ok(()),
        }
    }

    fn render_for(
        &mut self,
        node: &ForNode,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let iterable = self.eval_pipeline(&node.iterable, ctx)?;
        let items = iteration_items(iterable, node.variables.len());

        let mut scopes = Vec::with_capacity(items.len());
        for item in items {
            let scope = bind_loop_variables(&node.variables, item)
                .map_err(|message| Error::render_with_span(message, node.iterable.span))?;
            if let Some(filter) = &node.filter {
                let keep = ctx.with_scope(scope.clone(), |inner| self.eval_condition(filter, inner))?;
                if !keep {
                    continue;
                }
            }
            scopes.push(scope);
        }

        if scopes.is_empty() {
            return match &node.empty_block {
                Some(block) => self.render_nodes(block, ctx, output),
                None => Ok(()),
            };
        }

        let length = scopes.len();
        for (index, mut scope) in scopes.into_iter().enumerate() {
            scope.insert("forloop".to_string(), loop_metadata(index, length));
            ctx.with_scope(scope, |inner| self.render_nodes(&node.body, inner, output))?;
        }
        Ok(())
    }

    fn render_include(
        &mut self,
        node: &IncludeNode,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let name = self.eval_template_name(&node.template, ctx)?;
        let extra = match &node.with {
            Some(pipeline) => match self.eval_pipeline(pipeline, ctx)? {
                Value::Object(map) => map,
                Value::Null => Scope::new(),
                other => {
                    return Err(Error::render_with_span(
                        format!(
                            "include 'with' expects an object, found {}",
                            describe_value(&other)
                        ),
                        pipeline.span,
                    ))
                }
            },
            None => Scope::new(),
        };

        let template = self.load(&name, node.span, "include")?;
        tracing::debug!(template = %name, mode = ?node.mode, "rendering include");

        match node.mode {
            IncludeMode::Inherited => {
                ctx.with_scope(extra, |inner| self.render_template(&template, inner, output))
            }
            IncludeMode::Isolated => {
                let mut isolated = Context::from_scope(extra);
                self.render_template(&template, &mut isolated, output)
            }
        }
    }

    fn render_block(
        &mut self,
        node: &BlockNode,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let Some(frame) = self.frames.len().checked_sub(1) else {
            return self.render_nodes(&node.body, ctx, output);
        };
        let definition = self.frames[frame]
            .blocks
            .get(&node.name)
            .and_then(|defs| defs.first())
            .cloned();
        match definition {
            Some(definition) => {
                self.render_definition(frame, &node.name, 0, &definition, ctx, output)
            }
            None => self.render_nodes(&node.body, ctx, output),
        }
    }

    fn render_definition(
        &mut self,
        frame: usize,
        name: &str,
        level: usize,
        definition: &BlockDefinition,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        self.active_blocks.push(ActiveBlock {
            frame,
            name: name.to_string(),
            level,
        });
        let result = self
            .render_nodes(&definition.node.body, ctx, output)
            .map_err(|err| err.with_template(&definition.template));
        self.active_blocks.pop();
        result
    }

    /// Renders the next less-derived definition of the innermost active block.
    fn render_super(&mut self, pipeline: &Pipeline, ctx: &mut Context) -> Result<String, Error> {
        let current_frame = self.frames.len().checked_sub(1);
        let active = self
            .active_blocks
            .last()
            .filter(|active| Some(active.frame) == current_frame)
            .cloned();

        let Some(active) = active else {
            if self.options.strict_undefined {
                return Err(Error::render_with_span(
                    "'super' used outside of a block",
                    pipeline.span,
                ));
            }
            return Ok(String::new());
        };

        let parent = self.frames[active.frame]
            .blocks
            .get(&active.name)
            .and_then(|defs| defs.get(active.level + 1))
            .cloned();
        let mut buffer = String::new();
        if let Some(parent) = parent {
            self.render_definition(
                active.frame,
                &active.name,
                active.level + 1,
                &parent,
                ctx,
                &mut buffer,
            )?;
        }
        Ok(buffer)
    }

    /// Evaluates a pipeline: resolves the head, then applies each filter.
    pub fn eval_pipeline(&self, pipeline: &Pipeline, ctx: &Context) -> Result<Value, Error> {
        let tolerate_undefined = pipeline
            .filters
            .first()
            .is_some_and(|filter| filter.name == DEFAULT_FILTER);
        self.eval_pipeline_with(pipeline, ctx, tolerate_undefined)
    }

    fn eval_pipeline_with(
        &self,
        pipeline: &Pipeline,
        ctx: &Context,
        tolerate_undefined: bool,
    ) -> Result<Value, Error> {
        let head = self.eval_expression(&pipeline.head, ctx, pipeline.span, tolerate_undefined)?;
        self.apply_filters(head, &pipeline.filters, pipeline.span, ctx)
    }

    /// Applies `filters` left to right, starting from `value`.
    pub fn apply_filters(
        &self,
        value: Value,
        filters: &[FilterCall],
        span: Span,
        ctx: &Context,
    ) -> Result<Value, Error> {
        let mut value = value;
        for call in filters {
            let filter = self.env.filters().get(&call.name).ok_or_else(|| {
                Error::render_with_span(format!("unknown filter '{}'", call.name), span)
            })?;
            let args = call
                .args
                .iter()
                .map(|arg| self.eval_expression(arg, ctx, span, false))
                .collect::<Result<Vec<_>, _>>()?;

            let result = filter(&value, &args);
            telemetry::record_filter_invocation(&call.name, result.is_ok());
            value = result.map_err(|err| {
                let message = format!("filter '{}' failed: {}", call.name, err.message());
                Error::render_caused_by(message, span, err)
            })?;
        }
        Ok(value)
    }

    /// Evaluates a condition. Undefined lookups are falsy even in strict mode.
    pub fn eval_condition(&self, condition: &Condition, ctx: &Context) -> Result<bool, Error> {
        match condition {
            Condition::Value(pipeline) => {
                Ok(is_truthy(&self.eval_pipeline_with(pipeline, ctx, true)?))
            }
            Condition::Compare { operator, lhs, rhs } => {
                let left = self.eval_pipeline_with(lhs, ctx, true)?;
                let right = self.eval_pipeline_with(rhs, ctx, true)?;
                compare(*operator, &left, &right).map_err(|err| err.or_span(lhs.span))
            }
            Condition::Not(inner) => Ok(!self.eval_condition(inner, ctx)?),
            Condition::And(lhs, rhs) => {
                Ok(self.eval_condition(lhs, ctx)? && self.eval_condition(rhs, ctx)?)
            }
            Condition::Or(lhs, rhs) => {
                Ok(self.eval_condition(lhs, ctx)? || self.eval_condition(rhs, ctx)?)
            }
        }
    }

    fn eval_expression(
        &self,
        expression: &Expression,
        ctx: &Context,
        span: Span,
        tolerate_undefined: bool,
    ) -> Result<Value, Error> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Lookup(path) => match resolve_lookup(ctx, path) {
                Some(value) => Ok(value),
                None if self.options.strict_undefined && !tolerate_undefined => Err(
                    Error::render_with_span(format!("undefined variable '{path}'"), span),
                ),
                None => Ok(Value::Null),
            },
        }
    }

    fn eval_template_name(&self, pipeline: &Pipeline, ctx: &Context) -> Result<String, Error> {
        match self.eval_pipeline(pipeline, ctx)? {
            Value::String(name) if !name.is_empty() => Ok(name),
            other => Err(Error::render_with_span(
                format!(
                    "expected a template name, found {}",
                    describe_value(&other)
                ),
                pipeline.span,
            )),
        }
    }
}

/// Resolves a dotted path against the context.
pub fn resolve_lookup(ctx: &Context, path: &LookupPath) -> Option<Value> {
    let (first, rest) = path.segments.split_first()?;
    let PathSegment::Key(name) = first else {
        return None;
    };

    let mut current = Cow::Borrowed(ctx.lookup(name)?);
    for segment in rest {
        current = match current {
            Cow::Borrowed(value) => lookup_segment(value, segment)?,
            Cow::Owned(value) => Cow::Owned(lookup_segment(&value, segment)?.into_owned()),
        };
    }
    Some(current.into_owned())
}

fn lookup_segment<'v>(value: &'v Value, segment: &PathSegment) -> Option<Cow<'v, Value>> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key).map(Cow::Borrowed),
        (Value::Object(map), PathSegment::Index(index)) => {
            map.get(&index.to_string()).map(Cow::Borrowed)
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            resolve_index(items.len(), *index).map(|idx| Cow::Borrowed(&items[idx]))
        }
        (Value::Array(items), PathSegment::Key(key)) => match key.as_str() {
            "count" => Some(Cow::Owned(Value::from(items.len()))),
            "first" => items.first().map(Cow::Borrowed),
            "last" => items.last().map(Cow::Borrowed),
            _ => None,
        },
        (Value::String(text), PathSegment::Index(index)) => {
            let chars: Vec<char> = text.chars().collect();
            resolve_index(chars.len(), *index)
                .map(|idx| Cow::Owned(Value::String(chars[idx].to_string())))
        }
        (Value::String(text), PathSegment::Key(key)) => match key.as_str() {
            "count" => Some(Cow::Owned(Value::from(text.chars().count()))),
            "first" => text.chars().next().map(|ch| Cow::Owned(Value::String(ch.to_string()))),
            "last" => text
                .chars()
                .next_back()
                .map(|ch| Cow::Owned(Value::String(ch.to_string()))),
            _ => None,
        },
        _ => None,
    }
}

/// Negative indices count from the end.
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    if index >= 0 {
        let idx = usize::try_from(index).ok()?;
        (idx < len).then_some(idx)
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(back)
    }
}

/// Items a `for` loop walks over. Non-iterable values yield nothing.
fn iteration_items(iterable: Value, variables: usize) -> Vec<Value> {
    match iterable {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                if variables > 1 {
                    Value::Array(vec![Value::String(key), value])
                } else {
                    Value::String(key)
                }
            })
            .collect(),
        Value::String(text) => text
            .chars()
            .map(|ch| Value::String(ch.to_string()))
            .collect(),
        Value::Null | Value::Bool(_) | Value::Number(_) => Vec::new(),
    }
}

fn bind_loop_variables(variables: &[String], item: Value) -> Result<Scope, String> {
    let mut scope = Scope::new();
    if let [single] = variables {
        scope.insert(single.clone(), item);
        return Ok(scope);
    }

    match item {
        Value::Array(values) if values.len() == variables.len() => {
            for (name, value) in variables.iter().zip(values) {
                scope.insert(name.clone(), value);
            }
            Ok(scope)
        }
        other => Err(format!(
            "cannot unpack {} into {} loop variables",
            describe_value(&other),
            variables.len()
        )),
    }
}

fn loop_metadata(index: usize, length: usize) -> Value {
    let mut meta = Map::new();
    meta.insert("index".to_string(), Value::from(index));
    meta.insert("counter".to_string(), Value::from(index + 1));
    meta.insert("counter0".to_string(), Value::from(index));
    meta.insert("first".to_string(), Value::Bool(index == 0));
    meta.insert("last".to_string(), Value::Bool(index + 1 == length));
    meta.insert("length".to_string(), Value::from(length));
    Value::Object(meta)
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(items) => format!("an array of {} values", items.len()),
        Value::Object(_) => "an object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryLoader;
    use serde_json::json;

    fn env_with(templates: &[(&str, &str)]) -> Environment {
        let mut loader = MemoryLoader::new();
        for (name, source) in templates {
            loader.insert(*name, *source);
        }
        Environment::builder().loader(loader).build()
    }

    fn path(source: &str) -> LookupPath {
        match crate::expression::parse_pipeline(source, Span::default()).unwrap().head {
            Expression::Lookup(path) => path,
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    #[test]
    fn lookup_walks_keys_indices_and_builtins() {
        let ctx = Context::new(&json!({
            "user": {"posts": [{"title": "a"}, {"title": "b"}], "name": "Ada"}
        }));
        assert_eq!(resolve_lookup(&ctx, &path("user.posts.1.title")), Some(json!("b")));
        assert_eq!(resolve_lookup(&ctx, &path("user.posts.-1.title")), Some(json!("b")));
        assert_eq!(resolve_lookup(&ctx, &path("user.posts.count")), Some(json!(2)));
        assert_eq!(
            resolve_lookup(&ctx, &path("user.posts.first.title")),
            Some(json!("a"))
        );
        assert_eq!(resolve_lookup(&ctx, &path("user.name.last")), Some(json!("a")));
        assert_eq!(resolve_lookup(&ctx, &path("user.name.count")), Some(json!(3)));
        assert_eq!(resolve_lookup(&ctx, &path("user.posts.5")), None);
        assert_eq!(resolve_lookup(&ctx, &path("user.missing.deeper")), None);
    }

    #[test]
    fn resolve_index_bounds() {
        assert_eq!(resolve_index(3, 0), Some(0));
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, -3), Some(0));
        assert_eq!(resolve_index(3, -4), None);
        assert_eq!(resolve_index(3, 3), None);
    }

    #[test]
    fn for_loop_pushes_and_pops_one_scope_per_item() {
        let env = Environment::default();
        let template = env
            .template_from_str(
                "loop",
                "{% for x in items %}{{ forloop.index }}{{ x }}{% if forloop.last %}.{% endif %}{% endfor %}",
            )
            .unwrap();
        let mut ctx = Context::new(&json!({"items": ["a", "b", "c"]}));
        let mut output = String::new();
        Renderer::new(&env, RenderOptions::default())
            .render_template(&template, &mut ctx, &mut output)
            .unwrap();
        assert_eq!(output, "0a1b2c.");
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("x"), None);
    }

    #[test]
    fn failing_iteration_pops_its_scope() {
        let env = Environment::builder().strict_undefined(true).build();
        let template = env
            .template_from_str("loop", "{% for x in items %}{{ missing }}{% endfor %}")
            .unwrap();
        let mut ctx = Context::new(&json!({"items": [1]}));
        let mut output = String::new();
        let err = Renderer::new(&env, env.options().clone())
            .render_template(&template, &mut ctx, &mut output)
            .unwrap_err();
        assert!(err.to_string().contains("undefined variable 'missing'"));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn super_walks_three_levels() {
        let env = env_with(&[
            ("base", "[{% block b %}base{% endblock %}]"),
            ("middle", "{% extends 'base' %}{% block b %}mid+{{ super }}{% endblock %}"),
            ("leaf", "{% extends 'middle' %}{% block b %}leaf+{{ block.super }}{% endblock %}"),
        ]);
        assert_eq!(env.render_template("leaf", &json!({})).unwrap(), "[leaf+mid+base]");
    }

    #[test]
    fn super_without_parent_definition_is_empty() {
        let env = env_with(&[("base", "{% block b %}x{{ super }}y{% endblock %}")]);
        assert_eq!(env.render_template("base", &json!({})).unwrap(), "xy");
    }

    #[test]
    fn extends_cycle_is_render_error() {
        let env = env_with(&[
            ("a", "{% extends 'b' %}"),
            ("b", "{% extends 'a' %}"),
        ]);
        let err = env.render_template("a", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(err.to_string().contains("extends cycle detected: a -> b -> a"));
        assert_eq!(err.template(), Some("b"));
    }

    #[test]
    fn recursive_include_hits_depth_limit() {
        let env = env_with(&[("self", "x{% include 'self' %}")]);
        let err = env.render_template("self", &json!({})).unwrap_err();
        assert!(err.to_string().contains("maximum template depth of 64 exceeded"));
    }

    #[test]
    fn include_blocks_do_not_see_outer_overrides() {
        let env = env_with(&[
            ("base", "{% block a %}base-a{% endblock %}|{% include 'part' %}"),
            ("part", "{% block a %}part-a{% endblock %}"),
            ("child", "{% extends 'base' %}{% block a %}child-a{% endblock %}"),
        ]);
        assert_eq!(
            env.render_template("child", &json!({})).unwrap(),
            "child-a|part-a"
        );
    }

    #[test]
    fn tuple_mismatch_is_render_error() {
        let env = Environment::default();
        let err = env
            .render_str("{% for a, b in items %}{% endfor %}", &json!({"items": [[1, 2, 3]]}))
            .unwrap_err();
        assert!(err.to_string().contains("cannot unpack an array of 3 values into 2 loop variables"));
    }
}
