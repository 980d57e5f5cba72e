// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fs;

use lithos_stencil_core::{environment_builder, Error, FileSystemLoader};
use serde_json::json;

#[test]
fn renders_inheritance_and_includes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("partials")).unwrap();
    fs::write(
        root.join("base.html"),
        "<title>{% block title %}Site{% endblock %}</title>\n<body>{% block body %}{% endblock %}</body>",
    )
    .unwrap();
    fs::write(
        root.join("page.html"),
        "{% extends 'base.html' %}\n{% block title %}{{ page.title|upper }} | {{ super }}{% endblock %}\n{% block body %}{% for item in page.items %}{% include 'partials/item.html' %}{% endfor %}{% endblock %}",
    )
    .unwrap();
    fs::write(root.join("partials/item.html"), "<li>{{ item }}</li>").unwrap();

    let env = environment_builder()
        .loader(FileSystemLoader::new(root))
        .build();
    let out = env
        .render_template(
            "page.html",
            &json!({"page": {"title": "News", "items": ["a", "b"]}}),
        )
        .unwrap();
    assert_eq!(
        out,
        "<title>NEWS | Site</title>\n<body><li>a</li><li>b</li></body>"
    );
}

#[test]
fn missing_parent_reports_the_child() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("orphan.html"), "{% extends 'gone.html' %}").unwrap();

    let env = environment_builder()
        .loader(FileSystemLoader::new(dir.path()))
        .build();
    let err = env.render_template("orphan.html", &json!({})).unwrap_err();
    assert!(matches!(err, Error::Render { .. }));
    assert_eq!(err.template(), Some("orphan.html"));
    assert!(err.to_string().contains("cannot resolve extends target 'gone.html'"));
}

#[test]
fn parse_errors_in_parents_name_the_parent() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("child.html"), "{% extends 'broken.html' %}").unwrap();
    fs::write(dir.path().join("broken.html"), "\n\n{% if x %}").unwrap();

    let env = environment_builder()
        .loader(FileSystemLoader::new(dir.path()))
        .build();
    let err = env.render_template("child.html", &json!({})).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert_eq!(err.template(), Some("broken.html"));
    assert_eq!(err.line(), Some(3));
}
