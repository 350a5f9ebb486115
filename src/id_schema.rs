//! Identity trees - stable field ids mirroring the resolved schema.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::ResolveError;
use crate::resolver::resolve;
use crate::types::{schema_type, PathSegment, DEFAULT_ID_PREFIX, ID_SEPARATOR};

/// A field identity: its `$id`, its data path, and the ids of its object properties.
///
/// Serializes as `{"$id": "root", "foo": {"$id": "root_foo"}}`; the path is
/// carried for lookups but not serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct IdSchema {
    pub id: String,
    pub path: Vec<PathSegment>,
    pub children: Vec<(String, IdSchema)>,
}

impl IdSchema {
    fn leaf(id: String, path: Vec<PathSegment>) -> Self {
        Self {
            id,
            path,
            children: Vec::new(),
        }
    }

    /// The id tree of a declared property.
    pub fn get(&self, name: &str) -> Option<&IdSchema> {
        self.children
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, child)| child)
    }

    /// Id derived for a child segment (`parent_name`, `parent_3`).
    pub fn child_id(&self, segment: &PathSegment) -> String {
        format!("{}{}{}", self.id, ID_SEPARATOR, segment)
    }

    /// Build the tree for the array element at `index`.
    ///
    /// Array elements are not part of the static tree; the presentation layer
    /// asks for them per rendered index.
    pub fn item(
        &self,
        index: usize,
        item_schema: &Value,
        definitions: &Value,
        item_data: Option<&Value>,
    ) -> Result<IdSchema, ResolveError> {
        self.descend(PathSegment::Index(index), item_schema, definitions, item_data)
    }

    /// The tree of property `name`, built on demand when the static tree
    /// lacks it (a property activated by data changed since the tree was built).
    pub fn property(
        &self,
        name: &str,
        property_schema: &Value,
        definitions: &Value,
        property_data: Option<&Value>,
    ) -> Result<IdSchema, ResolveError> {
        match self.get(name) {
            Some(existing) => Ok(existing.clone()),
            None => self.descend(
                PathSegment::key(name),
                property_schema,
                definitions,
                property_data,
            ),
        }
    }

    fn descend(
        &self,
        segment: PathSegment,
        schema: &Value,
        definitions: &Value,
        data: Option<&Value>,
    ) -> Result<IdSchema, ResolveError> {
        let id = self.child_id(&segment);
        let mut path = self.path.clone();
        path.push(segment);
        IdBuilder::new(definitions).build(schema, id, path, data)
    }

    /// Converts the tree into its JSON form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for IdSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len() + 1))?;
        map.serialize_entry("$id", &self.id)?;
        for (name, child) in &self.children {
            map.serialize_entry(name, child)?;
        }
        map.end()
    }
}

/// Build the id tree for `schema`.
///
/// The root id is `root_id` when given, else `id_prefix`, else `"root"`.
/// Object properties get `parent_id + "_" + name`; arrays and primitives
/// are leaves. The tree depends on `form_data` only through the
/// dependencies it activates.
pub fn to_id_schema(
    schema: &Value,
    root_id: Option<&str>,
    definitions: &Value,
    form_data: Option<&Value>,
    id_prefix: Option<&str>,
) -> Result<IdSchema, ResolveError> {
    let id = root_id
        .or(id_prefix)
        .unwrap_or(DEFAULT_ID_PREFIX)
        .to_string();
    IdBuilder::new(definitions).build(schema, id, Vec::new(), form_data)
}

struct IdBuilder<'a> {
    definitions: &'a Value,
    expanding: Vec<String>,
}

impl<'a> IdBuilder<'a> {
    fn new(definitions: &'a Value) -> Self {
        Self {
            definitions,
            expanding: Vec::new(),
        }
    }

    fn build(
        &mut self,
        schema: &Value,
        id: String,
        path: Vec<PathSegment>,
        data: Option<&Value>,
    ) -> Result<IdSchema, ResolveError> {
        let reference = schema.get("$ref").and_then(Value::as_str);
        match reference {
            // A definition nested inside itself ends the tree.
            Some(reference) if self.expanding.iter().any(|r| r == reference) => {
                Ok(IdSchema::leaf(id, path))
            }
            Some(reference) => {
                self.expanding.push(reference.to_string());
                let node = self.build_resolved(schema, id, path, data);
                self.expanding.pop();
                node
            }
            None => self.build_resolved(schema, id, path, data),
        }
    }

    fn build_resolved(
        &mut self,
        schema: &Value,
        id: String,
        path: Vec<PathSegment>,
        data: Option<&Value>,
    ) -> Result<IdSchema, ResolveError> {
        let resolved = resolve(schema, self.definitions, data)?;
        let mut node = IdSchema::leaf(id, path);

        if schema_type(&resolved) != Some("object") {
            return Ok(node);
        }
        let Some(Value::Object(properties)) = resolved.get("properties") else {
            return Ok(node);
        };

        for (name, property) in properties {
            let segment = PathSegment::key(name.as_str());
            let child_id = node.child_id(&segment);
            let mut child_path = node.path.clone();
            child_path.push(segment);
            let child_data = data.and_then(|d| d.get(name));
            let child = self.build(property, child_id, child_path, child_data)?;
            node.children.push((name.clone(), child));
        }
        Ok(node)
    }
}
