#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Stencil's standard catalog on top of `lithos-stencil-engine`: the
//! built-in filters, the `{% filter %}` tag and a filesystem loader.

mod filter_tag;
mod loader;

pub use filter_tag::parse_filter_tag;
pub use lithos_stencil_engine::{
    escape_html, install_builtin_filters, is_truthy, value_to_string, Context, Environment,
    EnvironmentBuilder, Error, FilterRegistry, FilterRegistryBuilder, Loader, MemoryLoader,
    RenderOptions, Renderer, TagNode, TagParser, TagRegistry, TagRegistryBuilder, Template,
};
pub use loader::FileSystemLoader;

use serde_json::Value;

/// Builds a registry holding the engine built-ins plus Stencil's filters.
pub fn stencil_filters() -> FilterRegistry {
    let mut builder = FilterRegistryBuilder::new();
    install_stencil_filters(&mut builder);
    builder.build()
}

/// Installs the standard Stencil filters into an existing registry builder.
pub fn install_stencil_filters(builder: &mut FilterRegistryBuilder) {
    install_builtin_filters(builder);
    builder
        .register("capitalize", filter_capitalize)
        .register("uppercase", filter_uppercase)
        .register("upper", filter_uppercase)
        .register("lowercase", filter_lowercase)
        .register("lower", filter_lowercase)
        .register("join", filter_join)
        .register("split", filter_split)
        .register("indent", filter_indent)
        .register("length", filter_length)
        .register("first", filter_first)
        .register("last", filter_last)
        .register("trim", filter_trim)
        .register_safe("escape", filter_escape);
}

/// Builds a registry holding the standard Stencil tags.
pub fn stencil_tags() -> TagRegistry {
    let mut builder = TagRegistryBuilder::new();
    install_stencil_tags(&mut builder);
    builder.build()
}

/// Registers the `filter` tag.
pub fn install_stencil_tags(builder: &mut TagRegistryBuilder) {
    builder.register("filter", parse_filter_tag);
}

/// An environment builder preloaded with the standard filters and tags.
pub fn environment_builder() -> EnvironmentBuilder {
    Environment::builder()
        .filters(stencil_filters())
        .tags(stencil_tags())
}

/// Applies `transform` to strings, and element-wise to arrays of strings.
fn map_strings(value: &Value, transform: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| Value::String(transform(&value_to_string(item))))
                .collect(),
        ),
        other => Value::String(transform(&value_to_string(other))),
    }
}

fn filter_capitalize(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    Ok(map_strings(value, |text| {
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }))
}

fn filter_uppercase(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    Ok(map_strings(value, str::to_uppercase))
}

fn filter_lowercase(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    Ok(map_strings(value, str::to_lowercase))
}

fn filter_trim(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    Ok(map_strings(value, |text| text.trim().to_string()))
}

fn filter_escape(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(escape_html(&value_to_string(value))))
}

fn string_arg<'a>(args: &'a [Value], index: usize, filter: &str) -> Result<Option<&'a str>, Error> {
    match args.get(index) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(_) => Err(Error::render(
            format!("{filter} expects a string argument at position {}", index + 1),
            None,
        )),
    }
}

fn filter_join(value: &Value, args: &[Value]) -> Result<Value, Error> {
    let separator = string_arg(args, 0, "join")?.unwrap_or("");
    match value {
        Value::Array(items) => Ok(Value::String(
            items
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(separator),
        )),
        other => Ok(other.clone()),
    }
}

fn filter_split(value: &Value, args: &[Value]) -> Result<Value, Error> {
    let separator = string_arg(args, 0, "split")?.unwrap_or(" ");
    if separator.is_empty() {
        return Err(Error::render("split separator must not be empty", None));
    }
    let text = value_to_string(value);
    Ok(Value::Array(
        text.split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

/// `indent(width=4, char=" ", first=false)`: indents every line but the
/// first, or all lines when `first` is true. Blank lines stay blank.
fn filter_indent(value: &Value, args: &[Value]) -> Result<Value, Error> {
    let width = match args.first() {
        None => 4,
        Some(arg) => arg
            .as_u64()
            .and_then(|width| usize::try_from(width).ok())
            .ok_or_else(|| Error::render("indent width must be a non-negative integer", None))?,
    };
    let fill = string_arg(args, 1, "indent")?.unwrap_or(" ");
    let indent_first = args.get(2).is_some_and(is_truthy);
    let prefix = fill.repeat(width);

    let text = value_to_string(value);
    let lines: Vec<String> = text
        .split('\n')
        .enumerate()
        .map(|(idx, line)| {
            if line.is_empty() || (idx == 0 && !indent_first) {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect();
    Ok(Value::String(lines.join("\n")))
}

fn filter_length(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    match value {
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        Value::String(text) => Ok(Value::from(text.chars().count())),
        Value::Null => Ok(Value::from(0)),
        _ => Err(Error::render(
            "length expects an array, object or string",
            None,
        )),
    }
}

fn filter_first(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    match value {
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(text) => Ok(text
            .chars()
            .next()
            .map_or(Value::Null, |ch| Value::String(ch.to_string()))),
        other => Ok(other.clone()),
    }
}

fn filter_last(value: &Value, _args: &[Value]) -> Result<Value, Error> {
    match value {
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(text) => Ok(text
            .chars()
            .next_back()
            .map_or(Value::Null, |ch| Value::String(ch.to_string()))),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(name: &str, value: Value, args: &[Value]) -> Result<Value, Error> {
        let registry = stencil_filters();
        let filter = registry.get(name).expect("filter registered");
        filter(&value, args)
    }

    #[test]
    fn case_filters_map_arrays() {
        assert_eq!(apply("capitalize", json!("hello world"), &[]).unwrap(), json!("Hello world"));
        assert_eq!(apply("upper", json!(["a", "b"]), &[]).unwrap(), json!(["A", "B"]));
        assert_eq!(apply("lowercase", json!("MiXeD"), &[]).unwrap(), json!("mixed"));
        assert_eq!(apply("capitalize", json!(""), &[]).unwrap(), json!(""));
    }

    #[test]
    fn join_and_split() {
        assert_eq!(
            apply("join", json!(["a", 1, true]), &[json!(", ")]).unwrap(),
            json!("a, 1, true")
        );
        assert_eq!(apply("join", json!(["a", "b"]), &[]).unwrap(), json!("ab"));
        assert_eq!(
            apply("split", json!("a,b,,c"), &[json!(",")]).unwrap(),
            json!(["a", "b", "", "c"])
        );
        assert!(apply("join", json!(["a"]), &[json!(1)]).is_err());
        assert!(apply("split", json!("abc"), &[json!("")]).is_err());
    }

    #[test]
    fn indent_skips_first_line_by_default() {
        assert_eq!(
            apply("indent", json!("a\nb\n\nc"), &[json!(2)]).unwrap(),
            json!("a\n  b\n\n  c")
        );
        assert_eq!(
            apply("indent", json!("a\nb"), &[json!(1), json!("\t"), json!(true)]).unwrap(),
            json!("\ta\n\tb")
        );
        assert!(apply("indent", json!("a"), &[json!(-1)]).is_err());
    }

    #[test]
    fn length_first_last() {
        assert_eq!(apply("length", json!([1, 2, 3]), &[]).unwrap(), json!(3));
        assert_eq!(apply("length", json!("héllo"), &[]).unwrap(), json!(5));
        assert_eq!(apply("length", json!({"a": 1}), &[]).unwrap(), json!(1));
        assert!(apply("length", json!(3), &[]).is_err());
        assert_eq!(apply("first", json!([7, 8]), &[]).unwrap(), json!(7));
        assert_eq!(apply("last", json!("abc"), &[]).unwrap(), json!("c"));
        assert_eq!(apply("first", json!([]), &[]).unwrap(), Value::Null);
    }

    #[test]
    fn escape_output_is_not_escaped_twice() {
        let env = environment_builder().build();
        let out = env
            .render_str("{{ v|escape }}|{{ v }}|{{ v|trim }}", &json!({"v": " <a> "}))
            .unwrap();
        assert_eq!(out, " &lt;a&gt; | &lt;a&gt; |&lt;a&gt;");
    }
}
