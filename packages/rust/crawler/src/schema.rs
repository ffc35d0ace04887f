//! Plugin option schemas.
//!
//! A schema is a JSON document in the familiar JSON-schema shape:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "frequency": { "type": "number", "default": -1 },
//!     "pathnameRe": { "type": "string", "subType": "regex", "default": "" }
//!   }
//! }
//! ```
//!
//! Supported node types are `object`, `string`, `number`, `integer` and
//! `boolean`. A string node with `subType` or `format` set to `"regex"` must
//! compile. Keys the engine has no use for (`ui`, `customField`, `description`,
//! ...) are ignored.

use regex::Regex;
use serde_json::{Map, Value};
use sitecrawl_shared::{Result, SiteCrawlError};

/// Build a plugin's effective options: schema defaults overlaid with `supplied`.
///
/// Unknown keys, type mismatches and invalid regexes are rejected. An explicit
/// `null` falls back to the default.
pub fn instantiate(
    plugin: &str,
    schema: &Value,
    supplied: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    match instantiate_object(schema, supplied, "") {
        Ok(opts) => Ok(opts),
        Err(message) => Err(SiteCrawlError::schema(plugin, message)),
    }
}

/// Default options of a schema.
pub fn defaults(schema: &Value) -> Map<String, Value> {
    instantiate_object(schema, &Map::new(), "").unwrap_or_default()
}

fn instantiate_object(
    schema: &Value,
    supplied: &Map<String, Value>,
    path: &str,
) -> std::result::Result<Map<String, Value>, String> {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(unknown) = supplied.keys().find(|k| !properties.contains_key(*k)) {
        return Err(format!("unknown option {}", join(path, unknown)));
    }

    let mut opts = Map::new();
    for (key, node) in properties {
        let key_path = join(path, key);
        let value = match supplied.get(key) {
            Some(v) if !v.is_null() => check(node, v, &key_path)?,
            _ => default_for(node, &key_path)?,
        };
        if let Some(value) = value {
            opts.insert(key.clone(), value);
        }
    }
    Ok(opts)
}

/// Validate a supplied value against its schema node.
fn check(node: &Value, value: &Value, path: &str) -> std::result::Result<Option<Value>, String> {
    let kind = node_type(node, path)?;
    let ok = match kind {
        "object" => {
            let Some(obj) = value.as_object() else {
                return Err(format!("{path}: expected object, got {}", type_name(value)));
            };
            return instantiate_object(node, obj, path).map(|m| Some(Value::Object(m)));
        }
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        other => return Err(format!("{path}: unsupported schema type {other}")),
    };
    if !ok {
        return Err(format!("{path}: expected {kind}, got {}", type_name(value)));
    }
    if let Some(s) = value.as_str() {
        check_regex(node, s, path)?;
    }
    Ok(Some(value.clone()))
}

fn default_for(node: &Value, path: &str) -> std::result::Result<Option<Value>, String> {
    if node_type(node, path)? == "object" {
        let nested = match node.get("default").and_then(Value::as_object) {
            Some(obj) => instantiate_object(node, obj, path)?,
            None => instantiate_object(node, &Map::new(), path)?,
        };
        return Ok(Some(Value::Object(nested)));
    }
    match node.get("default") {
        Some(Value::Null) | None => Ok(None),
        Some(default) => check(node, default, path),
    }
}

fn check_regex(node: &Value, s: &str, path: &str) -> std::result::Result<(), String> {
    let is_regex = ["subType", "format"]
        .iter()
        .any(|k| node.get(*k).and_then(Value::as_str) == Some("regex"));
    if is_regex {
        Regex::new(s).map_err(|e| format!("{path}: invalid regex: {e}"))?;
    }
    Ok(())
}

fn node_type<'a>(node: &'a Value, path: &str) -> std::result::Result<&'a str, String> {
    node.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{path}: schema node has no type"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
