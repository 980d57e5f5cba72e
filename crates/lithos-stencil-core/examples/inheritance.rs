// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Renders a three-level `extends` chain held in memory.

use lithos_stencil_core::{environment_builder, MemoryLoader};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loader = MemoryLoader::new()
        .with_template(
            "base",
            "<html><head><title>{% block title %}Site{% endblock %}</title></head>\
             <body>{% block content %}{% endblock %}</body></html>",
        )
        .with_template(
            "layout",
            "{% extends 'base' %}{% block content %}<main>{% block main %}{% endblock %}</main>{% endblock %}",
        )
        .with_template(
            "post",
            "{% extends 'layout' %}\
             {% block title %}{{ post.title|capitalize }} - {{ super }}{% endblock %}\
             {% block main %}{% for tag in post.tags %}#{{ tag }}{% if not forloop.last %} {% endif %}{% endfor %}{% endblock %}",
        );

    let env = environment_builder().loader(loader).build();
    let output = env.render_template(
        "post",
        &json!({"post": {"title": "hello", "tags": ["rust", "templates"]}}),
    )?;

    println!("{output}");
    assert_eq!(
        output,
        "<html><head><title>Hello - Site</title></head><body><main>#rust #templates</main></body></html>"
    );
    Ok(())
}
