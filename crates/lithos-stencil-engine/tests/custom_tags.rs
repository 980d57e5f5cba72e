// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::sync::Arc;

use lithos_stencil_engine::ast::{NodeList, Pipeline};
use lithos_stencil_engine::expression::parse_pipeline;
use lithos_stencil_engine::{
    Context, Environment, Error, Renderer, TagNode, TagRegistry, Token, TokenParser,
};
use serde_json::json;

/// `{% repeat n %}body{% endrepeat %}`
#[derive(Debug)]
struct RepeatNode {
    count: Pipeline,
    body: NodeList,
}

impl TagNode for RepeatNode {
    fn render(
        &self,
        renderer: &mut Renderer<'_>,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let count = renderer
            .eval_pipeline(&self.count, ctx)?
            .as_u64()
            .ok_or_else(|| Error::render("repeat count must be a non-negative integer", None))?;
        for _ in 0..count {
            renderer.render_nodes(&self.body, ctx, output)?;
        }
        Ok(())
    }
}

fn parse_repeat(parser: &mut TokenParser<'_>, token: &Token) -> Result<Arc<dyn TagNode>, Error> {
    let count = parse_pipeline(token.arguments(), token.span)?;
    let (body, _end) = parser.parse_body(token, &["endrepeat"])?;
    Ok(Arc::new(RepeatNode { count, body }))
}

fn environment() -> Environment {
    let mut tags = TagRegistry::builder();
    tags.register("repeat", parse_repeat);
    Environment::builder().tags(tags.build()).build()
}

#[test]
fn custom_tag_renders_nested_body() {
    let env = environment();
    let out = env
        .render_str(
            "{% repeat times %}[{% for x in xs %}{{ x }}{% endfor %}]{% endrepeat %}",
            &json!({"times": 2, "xs": [1, 2]}),
        )
        .unwrap();
    assert_eq!(out, "[12][12]");
}

#[test]
fn custom_tag_missing_terminator_is_parse_error() {
    let err = environment()
        .template_from_str("t", "{% repeat 2 %}body")
        .unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err
        .to_string()
        .contains("missing end tag for 'repeat', expected 'endrepeat'"));
}

#[test]
fn custom_tag_errors_point_at_the_tag() {
    let err = environment()
        .render_str("\n{% repeat 'x' %}{% endrepeat %}", &json!({}))
        .unwrap_err();
    assert_eq!(err.line(), Some(2));
    assert!(err.to_string().contains("repeat count must be a non-negative integer"));
}

#[test]
fn unregistered_keyword_is_unknown_tag() {
    let err = Environment::default()
        .template_from_str("t", "{% repeat 2 %}{% endrepeat %}")
        .unwrap_err();
    assert!(err.to_string().contains("unknown tag 'repeat'"));
}

#[test]
fn built_in_tags_take_precedence() {
    let mut tags = TagRegistry::builder();
    tags.register("if", parse_repeat).register("repeat", parse_repeat);
    let registry = tags.build();
    assert!(registry.get("if").is_none());
    assert_eq!(registry.tag_names(), vec!["repeat".to_string()]);
    let env = Environment::builder().tags(registry).build();
    assert_eq!(
        env.render_str("{% if 0 %}no{% else %}yes{% endif %}", &json!({})).unwrap(),
        "yes"
    );
}
