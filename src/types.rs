//! Core types shared by the resolver, the state builders and the form controller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default root token of an id tree.
pub const DEFAULT_ID_PREFIX: &str = "root";

/// Separator between id tokens (`root_address_street`).
pub const ID_SEPARATOR: &str = "_";

/// Marker set on properties stubbed from `additionalProperties`.
pub const ADDITIONAL_PROPERTY_FLAG: &str = "__additional_property";

/// Dependency key that refers to a root-level primitive schema itself.
pub const SELF_DEPENDENCY_KEY: &str = "$self";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Guess the schema type that would describe `value`.
pub fn guess_type(value: &Value) -> &'static str {
    json_type_name(value)
}

/// Determine the effective type of a schema node.
///
/// An explicit `type` wins; a nullable pair such as `["string", "null"]`
/// collapses to its non-null member. Untyped nodes are inferred from
/// `const`, `enum` and the presence of object keywords.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => return Some(t.as_str()),
        Some(Value::Array(types)) => {
            if types.len() == 2 && types.iter().any(|t| t == "null") {
                return types
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|t| *t != "null");
            }
            return None;
        }
        _ => {}
    }

    if let Some(constant) = schema.get("const") {
        return Some(guess_type(constant));
    }
    if schema.get("enum").is_some() {
        return Some("string");
    }
    if schema.get("properties").is_some() || schema.get("additionalProperties").is_some() {
        return Some("object");
    }
    None
}

/// Truthiness as the form data model sees it: `null`, `false`, `0` and `""`
/// do not count as present.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One step of a data path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    pub fn key(name: impl Into<String>) -> Self {
        PathSegment::Key(name.into())
    }

    /// Look this segment up in `value`, tolerating shape mismatches.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match (self, value) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k),
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            // An index used as an object key ("1") still resolves.
            (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        }
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Read the value at `path`, or `None` when any step is missing.
pub fn get_value<'a>(path: &[PathSegment], root: Option<&'a Value>) -> Option<&'a Value> {
    path.iter()
        .try_fold(root?, |current, segment| segment.get(current))
}

/// Render a data path the way error lists display it: `.name`, `['odd key']`, `[3]`.
pub fn property_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in path {
        match segment {
            PathSegment::Key(k) if is_identifier(k) => {
                out.push('.');
                out.push_str(k);
            }
            PathSegment::Key(k) => {
                out.push_str("['");
                out.push_str(&k.replace('\\', "\\\\").replace('\'', "\\'"));
                out.push_str("']");
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_type_explicit() {
        assert_eq!(schema_type(&json!({"type": "number"})), Some("number"));
    }

    #[test]
    fn schema_type_nullable_pair() {
        assert_eq!(
            schema_type(&json!({"type": ["null", "integer"]})),
            Some("integer")
        );
        assert_eq!(schema_type(&json!({"type": ["string", "number"]})), None);
    }

    #[test]
    fn schema_type_inferred() {
        assert_eq!(schema_type(&json!({"const": true})), Some("boolean"));
        assert_eq!(schema_type(&json!({"enum": ["a", "b"]})), Some("string"));
        assert_eq!(schema_type(&json!({"properties": {}})), Some("object"));
        assert_eq!(schema_type(&json!({"title": "untyped"})), None);
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("int")));
        assert!(is_truthy(&json!(2)));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn get_value_walks_objects_and_arrays() {
        let data = json!({"outer": [["good", "bad"]]});
        let path = [
            PathSegment::key("outer"),
            PathSegment::Index(0),
            PathSegment::Index(1),
        ];
        assert_eq!(get_value(&path, Some(&data)), Some(&json!("bad")));
        assert_eq!(get_value(&[], Some(&data)), Some(&data));
        assert_eq!(get_value(&[PathSegment::key("missing")], Some(&data)), None);
        assert_eq!(get_value(&[], None), None);
    }

    #[test]
    fn property_path_formatting() {
        let path = [
            PathSegment::key("level1"),
            PathSegment::Index(3),
            PathSegment::key("first name"),
        ];
        assert_eq!(property_path(&path), ".level1[3]['first name']");
        assert_eq!(property_path(&[]), "");
    }

    #[test]
    fn path_segment_serializes_untagged() {
        let path = vec![PathSegment::key("foo"), PathSegment::Index(2)];
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["foo", 2]));
    }
}
