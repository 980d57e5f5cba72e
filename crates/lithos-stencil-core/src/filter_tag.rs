// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::sync::Arc;

use lithos_stencil_engine::ast::{FilterCall, NodeList, Span};
use lithos_stencil_engine::expression::parse_filter_chain;
use lithos_stencil_engine::{
    value_to_string, Context, Error, Renderer, TagNode, Token, TokenParser,
};
use serde_json::Value;

/// `{% filter lower|trim %}...{% endfilter %}`: renders the body, then pipes
/// the result through the listed filters.
#[derive(Debug)]
struct FilterTagNode {
    span: Span,
    filters: Vec<FilterCall>,
    body: NodeList,
}

impl TagNode for FilterTagNode {
    fn render(
        &self,
        renderer: &mut Renderer<'_>,
        ctx: &mut Context,
        output: &mut String,
    ) -> Result<(), Error> {
        let body = renderer.render_to_string(&self.body, ctx)?;
        let value = renderer.apply_filters(Value::String(body), &self.filters, self.span, ctx)?;
        output.push_str(&value_to_string(&value));
        Ok(())
    }
}

/// Parser for the `filter` tag.
pub fn parse_filter_tag(
    parser: &mut TokenParser<'_>,
    token: &Token,
) -> Result<Arc<dyn TagNode>, Error> {
    let filters = parse_filter_chain(token.arguments(), token.span).map_err(|err| {
        Error::parse_with_span(format!("invalid 'filter' tag: {}", err.message()), token.span)
    })?;
    let (body, _end) = parser.parse_body(token, &["endfilter"])?;
    Ok(Arc::new(FilterTagNode {
        span: token.span,
        filters,
        body,
    }))
}
