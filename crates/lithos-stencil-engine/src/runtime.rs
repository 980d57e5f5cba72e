// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::ast::Operator;
use crate::error::Error;

/// Signature implemented by filters: the piped value plus evaluated arguments.
pub type Filter = dyn Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync;

/// Name of the filter that marks its output as already escaped.
pub const SAFE_FILTER: &str = "safe";

/// Name of the filter that tolerates undefined input in strict mode.
pub const DEFAULT_FILTER: &str = "default";

/// Registry that maps filter names to callables.
///
/// Filters registered with [`FilterRegistryBuilder::register_safe`] produce
/// already-escaped output; when one ends a pipeline autoescaping is skipped.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    map: Arc<HashMap<String, Arc<Filter>>>,
    safe: Arc<HashSet<String>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding only the engine's built-in filters.
    pub fn builtin() -> Self {
        let mut builder = FilterRegistryBuilder::new();
        install_builtin_filters(&mut builder);
        builder.build()
    }

    /// Returns a new builder for constructing registries.
    pub fn builder() -> FilterRegistryBuilder {
        FilterRegistryBuilder::new()
    }

    /// Fetches a filter by name.
    pub fn get(&self, name: &str) -> Option<Arc<Filter>> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Reports whether `name` marks its output as already escaped.
    pub fn is_safe(&self, name: &str) -> bool {
        self.safe.contains(name)
    }

    /// Reports whether the registry contains no filters.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered filter names.
    pub fn filter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Helper for constructing registries before freezing them into an immutable map.
#[derive(Default)]
pub struct FilterRegistryBuilder {
    map: HashMap<String, Arc<Filter>>,
    safe: HashSet<String>,
}

impl FilterRegistryBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter under the provided name, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        self.safe.remove(&name);
        self.map.insert(name, Arc::new(filter));
        self
    }

    /// Registers a filter whose output is already escaped.
    pub fn register_safe<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        self.map.insert(name.clone(), Arc::new(filter));
        self.safe.insert(name);
        self
    }

    /// Extends the builder with all filters from another registry.
    pub fn extend(&mut self, other: &FilterRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
            if other.is_safe(key) {
                self.safe.insert(key.clone());
            } else {
                self.safe.remove(key);
            }
        }
        self
    }

    /// Finalises the builder into an immutable registry.
    pub fn build(self) -> FilterRegistry {
        FilterRegistry {
            map: Arc::new(self.map),
            safe: Arc::new(self.safe),
        }
    }
}

/// Installs `default` and `safe`, the filters the renderer itself relies on.
pub fn install_builtin_filters(builder: &mut FilterRegistryBuilder) {
    builder
        .register(DEFAULT_FILTER, builtin_default)
        .register_safe(SAFE_FILTER, |value, _args| Ok(value.clone()));
}

fn builtin_default(value: &Value, args: &[Value]) -> Result<Value, Error> {
    if is_truthy(value) {
        return Ok(value.clone());
    }
    Ok(args.first().cloned().unwrap_or_else(|| value.clone()))
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let mut s = n.to_string();
                if s.contains('.') {
                    while s.ends_with('0') {
                        s.pop();
                    }
                    if s.ends_with('.') {
                        s.pop();
                    }
                }
                s
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

pub fn parse_number(text: &str) -> Option<Number> {
    if !text.contains(['.', 'e', 'E']) {
        // integers outside i64/u64 are rejected, not widened to f64
        return text
            .parse::<i64>()
            .map(Number::from)
            .or_else(|_| text.parse::<u64>().map(Number::from))
            .ok();
    }

    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Truthiness used by `if` and `where`: null, `false`, zero, the empty string
/// and empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().is_some_and(|f| f != 0.0)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn coerce_number(value: &Value) -> Result<f64, Error> {
    if let Some(i) = value.as_i64() {
        Ok(i as f64)
    } else if let Some(u) = value.as_u64() {
        Ok(u as f64)
    } else if let Some(f) = value.as_f64() {
        Ok(f)
    } else if let Some(s) = value.as_str() {
        s.parse::<f64>()
            .map_err(|_| Error::render("cannot convert string to number", None))
    } else {
        Err(Error::render("expected numeric value for comparison", None))
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => lhs == rhs,
    }
}

/// Evaluates a binary comparison operator.
pub fn compare(operator: Operator, lhs: &Value, rhs: &Value) -> Result<bool, Error> {
    match operator {
        Operator::Equal => Ok(values_equal(lhs, rhs)),
        Operator::NotEqual => Ok(!values_equal(lhs, rhs)),
        Operator::In => contains(rhs, lhs),
        Operator::Less => ordering(lhs, rhs).map(Ordering::is_lt),
        Operator::LessOrEqual => ordering(lhs, rhs).map(Ordering::is_le),
        Operator::Greater => ordering(lhs, rhs).map(Ordering::is_gt),
        Operator::GreaterOrEqual => ordering(lhs, rhs).map(Ordering::is_ge),
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<Ordering, Error> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => {
            let left = coerce_number(lhs)?;
            let right = coerce_number(rhs)?;
            left.partial_cmp(&right)
                .ok_or_else(|| Error::render("cannot order NaN values", None))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(Error::render(
            "comparison requires both operands to be numbers or strings",
            None,
        )),
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, Error> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => Ok(map.contains_key(&value_to_string(needle))),
        Value::String(haystack) => Ok(haystack.contains(&value_to_string(needle))),
        Value::Null => Ok(false),
        _ => Err(Error::render(
            "'in' requires an array, object or string on the right-hand side",
            None,
        )),
    }
}

/// Default escaper used for `{{ }}` output when autoescaping is enabled.
pub fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&#34;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_template_semantics() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-0.5), json!("0"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn value_to_string_trims_float_noise() {
        assert_eq!(value_to_string(&json!(2.50)), "2.5");
        assert_eq!(value_to_string(&json!(3)), "3");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!([1, "a"])), "[1,\"a\"]");
    }

    #[test]
    fn compare_handles_mixed_numbers_and_membership() {
        assert!(compare(Operator::Equal, &json!(1), &json!(1.0)).unwrap());
        assert!(compare(Operator::Less, &json!("abc"), &json!("abd")).unwrap());
        assert!(compare(Operator::In, &json!("b"), &json!(["a", "b"])).unwrap());
        assert!(compare(Operator::In, &json!("ell"), &json!("hello")).unwrap());
        assert!(compare(Operator::In, &json!("key"), &json!({"key": 1})).unwrap());
        assert!(compare(Operator::Greater, &json!(1), &json!("a")).is_err());
    }

    #[test]
    fn default_filter_replaces_falsy_values() {
        let registry = FilterRegistry::builtin();
        let default = registry.get("default").unwrap();
        assert_eq!(default(&json!(""), &[json!("x")]).unwrap(), json!("x"));
        assert_eq!(default(&json!("v"), &[json!("x")]).unwrap(), json!("v"));
        assert!(registry.contains("safe"));
        assert!(registry.is_safe("safe"));
        assert!(!registry.is_safe("default"));
    }

    #[test]
    fn escape_html_replaces_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&#34;x&#34;&gt;&amp;&#39;");
    }
}
