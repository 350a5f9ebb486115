//! Default form state - seeds form data from schema-declared defaults.
//!
//! Explicit data always wins: defaults only fill positions where no data
//! exists, and are never re-applied over a value the user supplied (even an
//! empty string or an empty array).

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ResolveError;
use crate::resolver::{is_multi_select, resolve};
use crate::types::schema_type;

/// Upper bound on the number of array items seeded from `minItems`.
const MAX_PADDED_ITEMS: usize = 10_000;

/// Compute the default value of `schema`, using `form_data` as the override.
///
/// Returns `None` when neither data nor any default exists for the node.
///
/// # Errors
///
/// Propagates `ResolveError` from resolving any (sub)schema on the way.
pub fn compute_defaults(
    schema: &Value,
    form_data: Option<&Value>,
    definitions: &Value,
) -> Result<Option<Value>, ResolveError> {
    DefaultsBuilder {
        definitions,
        expanding: Vec::new(),
    }
    .compute(schema, form_data, None)
}

/// Compute defaults for a root schema document, taking `definitions` from it.
pub fn get_default_form_state(
    schema: &Value,
    form_data: Option<&Value>,
) -> Result<Option<Value>, ResolveError> {
    let empty = Value::Object(Map::new());
    let definitions = schema.get("definitions").unwrap_or(&empty);
    compute_defaults(schema, form_data, definitions)
}

struct DefaultsBuilder<'a> {
    definitions: &'a Value,
    /// `$ref`s being expanded without data, to cut self-referential schemas short.
    expanding: Vec<String>,
}

impl DefaultsBuilder<'_> {
    /// `inherited` is the value an enclosing schema's `default` declares for this position.
    fn compute(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        inherited: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        let reference = schema
            .get("$ref")
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(reference) = reference else {
            return self.compute_resolved(schema, data, inherited);
        };
        if data.is_none() && self.expanding.contains(&reference) {
            return Ok(inherited.cloned());
        }

        self.expanding.push(reference);
        let result = self.compute_resolved(schema, data, inherited);
        self.expanding.pop();
        result
    }

    fn compute_resolved(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        inherited: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        let resolved = resolve(schema, self.definitions, data)?;
        let own_default = resolved.get("default");

        match schema_type(&resolved) {
            Some("object") => self.object_defaults(&resolved, data, inherited, own_default),
            Some("array") => self.array_defaults(&resolved, data, inherited, own_default),
            _ => Ok(data.or(own_default).or(inherited).cloned()),
        }
    }

    fn object_defaults(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        inherited: Option<&Value>,
        own_default: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        if let Some(data) = data.filter(|d| !d.is_object()) {
            return Ok(Some(data.clone()));
        }

        let fallback = match (inherited, own_default) {
            (Some(Value::Object(parent)), Some(Value::Object(own))) => {
                let mut merged = parent.clone();
                merged.extend(own.clone());
                Some(Value::Object(merged))
            }
            (parent, own) => own.or(parent).cloned(),
        };
        let data = data.and_then(Value::as_object);
        let fallback = fallback.as_ref().and_then(Value::as_object);

        let mut out = Map::new();
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (name, property) in properties {
                let value = self.compute(
                    property,
                    data.and_then(|d| d.get(name)),
                    fallback.and_then(|f| f.get(name)),
                )?;
                if let Some(value) = value {
                    out.insert(name.clone(), value);
                }
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn array_defaults(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        inherited: Option<&Value>,
        own_default: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        // Explicit data, even `[]`, is kept at its length.
        if let Some(data) = data.or(own_default).or(inherited) {
            let Value::Array(items) = data else {
                return Ok(Some(data.clone()));
            };
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let value = match item_schema(schema, index) {
                    Some(item_schema) => self.compute(item_schema, Some(item), None)?,
                    None => None,
                };
                out.push(value.unwrap_or_else(|| item.clone()));
            }
            return Ok(Some(Value::Array(out)));
        }

        let min_items = match schema.get("minItems").and_then(Value::as_u64) {
            Some(n) => match usize::try_from(n) {
                Ok(n) if n <= MAX_PADDED_ITEMS => n,
                _ => {
                    warn!(min_items = n, "minItems too large to pad, skipping");
                    0
                }
            },
            None => 0,
        };

        if is_multi_select(schema, self.definitions)? {
            return Ok((min_items > 0).then(|| Value::Array(Vec::new())));
        }

        let mut positions = Vec::new();
        if let Some(Value::Array(tuple)) = schema.get("items") {
            for item in tuple {
                positions.push(self.compute(item, None, None)?);
            }
        }
        // Tuple positions are only seeded when one has a default or minItems asks.
        if min_items == 0 && positions.iter().all(Option::is_none) {
            return Ok(None);
        }
        let mut out: Vec<Value> = positions
            .into_iter()
            .map(|value| value.unwrap_or(Value::Null))
            .collect();
        if out.len() < min_items {
            let filler = match schema.get("items") {
                Some(Value::Array(_)) => schema.get("additionalItems"),
                items => items,
            };
            let filler = match filler.filter(|f| f.is_object()) {
                Some(filler) => self.compute(filler, None, None)?.unwrap_or(Value::Null),
                None => Value::Null,
            };
            out.resize(min_items, filler);
        }

        if out.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Array(out)))
    }
}

/// Schema of the array element at `index`: tuple position, then
/// `additionalItems`, then the uniform `items` schema.
pub(crate) fn item_schema(schema: &Value, index: usize) -> Option<&Value> {
    match schema.get("items") {
        Some(Value::Array(tuple)) => tuple
            .get(index)
            .or_else(|| schema.get("additionalItems").filter(|a| a.is_object())),
        Some(items @ Value::Object(_)) => Some(items),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults(schema: &Value, data: Option<&Value>) -> Option<Value> {
        compute_defaults(schema, data, &json!({})).unwrap()
    }

    #[test]
    fn primitive_default() {
        let schema = json!({ "type": "string", "default": "foo" });
        assert_eq!(defaults(&schema, None), Some(json!("foo")));
    }

    #[test]
    fn explicit_empty_string_is_kept() {
        let schema = json!({ "type": "string", "default": "foo" });
        assert_eq!(defaults(&schema, Some(&json!(""))), Some(json!("")));
    }

    #[test]
    fn primitive_without_default_is_undefined() {
        assert_eq!(defaults(&json!({ "type": "number" }), None), None);
    }

    #[test]
    fn object_collects_property_defaults() {
        let schema = json!({
            "type": "object",
            "properties": {
                "string": { "type": "string", "default": "foo" },
                "number": { "type": "number" },
                "bool": { "type": "boolean", "default": false }
            }
        });
        assert_eq!(
            defaults(&schema, None),
            Some(json!({ "string": "foo", "bool": false }))
        );
    }

    #[test]
    fn object_data_overrides_defaults() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": { "type": "string", "default": "x" },
                "b": { "type": "string", "default": "y" }
            }
        });
        assert_eq!(
            defaults(&schema, Some(&json!({ "a": "given" }))),
            Some(json!({ "a": "given", "b": "y" }))
        );
    }

    #[test]
    fn object_drops_keys_outside_schema() {
        let schema = json!({
            "type": "object",
            "properties": { "bar": { "type": "string" } }
        });
        assert_eq!(
            defaults(&schema, Some(&json!({ "foo": "foo", "bar": "bar" }))),
            Some(json!({ "bar": "bar" }))
        );
    }

    #[test]
    fn object_default_flows_to_properties() {
        let schema = json!({
            "type": "object",
            "default": { "name": "parent" },
            "properties": { "name": { "type": "string" } }
        });
        assert_eq!(defaults(&schema, None), Some(json!({ "name": "parent" })));
    }

    #[test]
    fn array_min_items_padding() {
        let schema = json!({
            "type": "array",
            "minItems": 2,
            "items": {
                "type": "object",
                "properties": { "name": { "type": "string", "default": "Default name" } }
            }
        });
        assert_eq!(
            defaults(&schema, None),
            Some(json!([{ "name": "Default name" }, { "name": "Default name" }]))
        );
        assert_eq!(defaults(&schema, Some(&json!([]))), Some(json!([])));
    }

    #[test]
    fn array_default_is_used() {
        let schema = json!({
            "type": "array",
            "default": ["a", "b"],
            "items": { "type": "string" }
        });
        assert_eq!(defaults(&schema, None), Some(json!(["a", "b"])));
    }

    #[test]
    fn array_items_get_nested_defaults() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": { "bool": { "type": "boolean", "default": true } }
            }
        });
        assert_eq!(
            defaults(&schema, Some(&json!([{}, { "bool": false }]))),
            Some(json!([{ "bool": true }, { "bool": false }]))
        );
    }

    #[test]
    fn array_without_data_or_min_items_is_undefined() {
        let schema = json!({ "type": "array", "items": { "type": "string" } });
        assert_eq!(defaults(&schema, None), None);
    }

    #[test]
    fn tuple_positions_and_filler() {
        let schema = json!({
            "type": "array",
            "minItems": 3,
            "items": [
                { "type": "string", "default": "first" },
                { "type": "number", "default": 2 }
            ],
            "additionalItems": { "type": "boolean", "default": true }
        });
        assert_eq!(defaults(&schema, None), Some(json!(["first", 2, true])));
    }

    #[test]
    fn tuple_without_defaults_or_min_items_is_undefined() {
        let schema = json!({ "type": "array", "items": [{ "type": "string" }] });
        assert_eq!(defaults(&schema, None), None);
    }

    #[test]
    fn tuple_with_one_default_is_seeded() {
        let schema = json!({
            "type": "array",
            "items": [{ "type": "string" }, { "type": "number", "default": 1 }]
        });
        assert_eq!(defaults(&schema, None), Some(json!([null, 1])));
    }

    #[test]
    fn huge_min_items_is_not_padded() {
        let schema = json!({
            "type": "array",
            "minItems": 1_000_000_000_000_000u64,
            "items": { "type": "string", "default": "x" }
        });
        assert_eq!(defaults(&schema, None), None);
    }

    #[test]
    fn multi_select_is_not_padded() {
        let schema = json!({
            "type": "array",
            "minItems": 2,
            "uniqueItems": true,
            "items": { "type": "string", "enum": ["a", "b", "c"] }
        });
        assert_eq!(defaults(&schema, None), Some(json!([])));
    }

    #[test]
    fn referenced_default_propagates() {
        let definitions = json!({ "testdef": { "type": "string", "default": "hello" } });
        let schema = json!({
            "type": "object",
            "properties": { "foo": { "$ref": "#/definitions/testdef" } }
        });
        assert_eq!(
            compute_defaults(&schema, None, &definitions).unwrap(),
            Some(json!({ "foo": "hello" }))
        );
    }

    #[test]
    fn root_document_definitions() {
        let schema = json!({
            "definitions": { "testdef": { "type": "string", "default": "hello" } },
            "$ref": "#/definitions/testdef"
        });
        assert_eq!(
            get_default_form_state(&schema, None).unwrap(),
            Some(json!("hello"))
        );
    }

    #[test]
    fn self_referential_schema_terminates() {
        let schema = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "default": "leaf" },
                        "child": { "$ref": "#/definitions/node" }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });
        assert_eq!(
            get_default_form_state(&schema, None).unwrap(),
            Some(json!({ "name": "leaf" }))
        );
        assert_eq!(
            get_default_form_state(&schema, Some(&json!({ "child": {} }))).unwrap(),
            Some(json!({ "name": "leaf", "child": { "name": "leaf" } }))
        );
    }

    #[test]
    fn dependency_properties_receive_defaults() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": {
                "a": { "properties": { "b": { "type": "integer", "default": 5 } } }
            }
        });
        assert_eq!(
            defaults(&schema, Some(&json!({ "a": "on" }))),
            Some(json!({ "a": "on", "b": 5 }))
        );
    }

    #[test]
    fn missing_reference_propagates() {
        let schema = json!({
            "type": "object",
            "properties": { "foo": { "$ref": "#/definitions/nonexistent" } }
        });
        let result = compute_defaults(&schema, None, &json!({}));
        assert!(matches!(result, Err(ResolveError::MissingDefinition { .. })));
    }
}
