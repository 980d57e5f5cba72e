// SPDX-License-Identifier: Apache-2.0 OR MIT
use lithos_stencil_core::{install_stencil_filters, stencil_tags, Environment, FilterRegistryBuilder};
use serde_json::{json, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Start from the stock Stencil filters.
    let mut builder = FilterRegistryBuilder::new();
    install_stencil_filters(&mut builder);

    // Register a simple custom filter.
    builder.register("shout", |value, _args| {
        let input = value.as_str().unwrap_or("");
        Ok(Value::String(format!("{}!", input.to_uppercase())))
    });

    let env = Environment::builder()
        .filters(builder.build())
        .tags(stencil_tags())
        .build();
    let output = env.render_str("{{ phrase|shout }}", &json!({"phrase": "hello core"}))?;

    println!("{output}");
    assert_eq!(output, "HELLO CORE!");
    Ok(())
}
