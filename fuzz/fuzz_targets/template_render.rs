#![no_main]

use libfuzzer_sys::fuzz_target;
use lithos_stencil_core::{environment_builder, Environment, MemoryLoader};
use once_cell::sync::Lazy;
use serde_json::{json, Value};

static ENVIRONMENT: Lazy<Environment> = Lazy::new(|| {
    let loader = MemoryLoader::new()
        .with_template("base", "[{% block a %}A{% endblock %}|{% block b %}B{% endblock %}]")
        .with_template("loop", "{% include 'loop' %}")
        .with_template("row", "<{{ item }}>");
    environment_builder().loader(loader).build()
});

static DATA: Lazy<Value> = Lazy::new(|| {
    json!({
        "name": "fuzz",
        "items": [1, "two", {"three": 3}, [4]],
        "user": {"admin": true, "tags": ["a", "b"]},
    })
});

fuzz_target!(|data: &[u8]| {
    let source = match std::str::from_utf8(data) {
        Ok(src) => src,
        Err(_) => return,
    };

    if let Ok(template) = ENVIRONMENT.template_from_str("fuzz-template-render", source) {
        let _ = ENVIRONMENT.render(&template, &DATA);
    }
});
