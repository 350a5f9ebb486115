//! Error trees - validation messages projected onto the data structure.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{property_path, PathSegment};

/// Key under which a node's own messages are serialized.
pub const ERRORS_KEY: &str = "__errors";

/// Per-field error tree. Each node holds its own messages plus sub-trees
/// per property name or array index, in insertion order.
///
/// Serializes as `{"__errors": [...], "field": {...}}`, omitting empty
/// `__errors` lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSchema {
    pub errors: Vec<String>,
    pub children: Vec<(PathSegment, ErrorSchema)>,
}

impl ErrorSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no node of the tree carries a message.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.children.iter().all(|(_, child)| child.is_empty())
    }

    /// Sub-tree for a property name or index, if present.
    pub fn get(&self, key: &str) -> Option<&ErrorSchema> {
        self.children
            .iter()
            .find(|(segment, _)| segment.to_string() == key)
            .map(|(_, child)| child)
    }

    /// Sub-tree at `path`, if present.
    pub fn lookup(&self, path: &[PathSegment]) -> Option<&ErrorSchema> {
        path.iter()
            .try_fold(self, |node, segment| node.get(&segment.to_string()))
    }

    /// Sub-tree at `path`, creating intermediate nodes as needed.
    pub fn at(&mut self, path: &[PathSegment]) -> &mut ErrorSchema {
        let mut node = self;
        for segment in path {
            node = node.child_mut(segment);
        }
        node
    }

    fn child_mut(&mut self, segment: &PathSegment) -> &mut ErrorSchema {
        let key = segment.to_string();
        let position = self
            .children
            .iter()
            .position(|(existing, _)| existing.to_string() == key);
        let index = match position {
            Some(index) => index,
            None => {
                self.children.push((segment.clone(), ErrorSchema::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }

    pub fn add_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(message.into());
        self
    }

    /// Merge `other` into this tree; message lists at the same node are concatenated.
    pub fn merge(&mut self, other: ErrorSchema) {
        self.errors.extend(other.errors);
        for (segment, child) in other.children {
            self.child_mut(&segment).merge(child);
        }
    }

    /// Parse a tree from its JSON form. Unknown shapes are skipped rather
    /// than rejected, and non-string messages are ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut tree = ErrorSchema::new();
        let Value::Object(map) = value else {
            return tree;
        };
        for (key, child) in map {
            if key == ERRORS_KEY {
                if let Value::Array(messages) = child {
                    tree.errors
                        .extend(messages.iter().filter_map(Value::as_str).map(str::to_string));
                }
                continue;
            }
            let segment = match key.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::key(key.as_str()),
            };
            tree.children.push((segment, ErrorSchema::from_value(child)));
        }
        tree
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ErrorSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.errors.is_empty() {
            map.serialize_entry(ERRORS_KEY, &self.errors)?;
        }
        for (segment, child) in &self.children {
            map.serialize_entry(&segment.to_string(), child)?;
        }
        map.end()
    }
}

/// Build an error tree from a flat error list.
///
/// Each message lands at its error's path; messages sharing a path keep
/// their arrival order. Paths are not checked against any schema.
pub fn to_error_schema(errors: &[ValidationError]) -> ErrorSchema {
    let mut tree = ErrorSchema::new();
    for error in errors {
        tree.at(&error.path).add_error(error.message.clone());
    }
    tree
}

/// Flatten an error tree depth-first, in insertion order.
///
/// Each entry's `stack` reads `"<field>: <message>"`, where the field is the
/// last path segment or `root`.
pub fn to_error_list(tree: &ErrorSchema) -> Vec<ValidationError> {
    let mut out = Vec::new();
    collect(tree, None, &mut Vec::new(), &mut out);
    out
}

/// Flatten an error tree, visiting siblings in the schema's own order:
/// declared `properties` first, array indices ascending, anything else after.
pub fn to_error_list_in_schema_order(tree: &ErrorSchema, schema: &Value) -> Vec<ValidationError> {
    let mut out = Vec::new();
    collect(tree, Some(schema), &mut Vec::new(), &mut out);
    out
}

fn collect(
    node: &ErrorSchema,
    schema: Option<&Value>,
    path: &mut Vec<PathSegment>,
    out: &mut Vec<ValidationError>,
) {
    let field = path
        .last()
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| "root".to_string());
    for message in &node.errors {
        out.push(ValidationError {
            path: path.clone(),
            property: property_path(path),
            message: message.clone(),
            stack: format!("{}: {}", field, message),
        });
    }

    for (segment, child) in ordered_children(node, schema) {
        path.push(segment.clone());
        collect(child, schema.and_then(|s| child_schema(s, segment)), path, out);
        path.pop();
    }
}

fn ordered_children<'a>(
    node: &'a ErrorSchema,
    schema: Option<&Value>,
) -> Vec<&'a (PathSegment, ErrorSchema)> {
    let mut children: Vec<_> = node.children.iter().collect();
    let Some(schema) = schema else {
        return children;
    };

    let declared: Vec<&String> = match schema.get("properties") {
        Some(Value::Object(properties)) => properties.keys().collect(),
        _ => Vec::new(),
    };
    // Stable sort: declared properties by position, indices ascending, the rest keep order.
    children.sort_by_key(|(segment, _)| match segment {
        PathSegment::Index(i) => (1, *i),
        PathSegment::Key(key) => match declared.iter().position(|d| *d == key) {
            Some(position) => (0, position),
            None => match key.parse::<usize>() {
                Ok(i) => (1, i),
                Err(_) => (2, 0),
            },
        },
    });
    children
}

fn child_schema<'a>(schema: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match segment {
        PathSegment::Key(key) => schema
            .get("properties")
            .and_then(|p| p.get(key))
            .or_else(|| {
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| child_schema(schema, &PathSegment::Index(i)))
            }),
        PathSegment::Index(i) => match schema.get("items") {
            Some(Value::Array(tuple)) => tuple.get(*i).or_else(|| schema.get("additionalItems")),
            items => items,
        },
    }
}
