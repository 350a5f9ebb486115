//! Schema resolution - expands `$ref` and `dependencies` against the current form data.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::loader::navigate_fragment;
use crate::types::{
    guess_type, is_truthy, json_type_name, schema_type, ADDITIONAL_PROPERTY_FLAG,
    SELF_DEPENDENCY_KEY,
};

/// Prefix every supported `$ref` starts with.
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Resolve a schema node for a given form data snapshot.
///
/// Follows `$ref` chains through `definitions` (local keys override the
/// referenced definition), applies the `dependencies` triggered by
/// `form_data`, and stubs properties for data keys covered by
/// `additionalProperties`. The result never carries `$ref` or
/// `dependencies` at its top level, so resolving it again is a no-op.
///
/// # Errors
///
/// Returns `ResolveError::MissingDefinition` when a pointer has no target,
/// `ResolveError::CyclicReference` for a `$ref` chain that loops, and
/// `ResolveError::InvalidDependency` for a malformed dependency `oneOf`.
pub fn resolve(
    schema: &Value,
    definitions: &Value,
    form_data: Option<&Value>,
) -> Result<Value, ResolveError> {
    Resolver {
        definitions,
        form_data,
    }
    .resolve(schema, &mut Vec::new())
}

/// Look up a `#/definitions/...` pointer.
///
/// Pointers may descend into a definition (`#/definitions/address/properties/street`).
pub fn find_definition<'a>(
    reference: &str,
    definitions: &'a Value,
) -> Result<&'a Value, ResolveError> {
    let Some(rest) = reference.strip_prefix(DEFINITIONS_PREFIX) else {
        return Err(ResolveError::UnsupportedReference {
            reference: reference.to_string(),
        });
    };

    navigate_fragment(definitions, &format!("#/{}", rest)).ok_or_else(|| {
        ResolveError::MissingDefinition {
            reference: reference.to_string(),
        }
    })
}

/// Deep-merge two schema nodes; the right side wins on conflicts.
///
/// Nested objects merge key by key. When either side describes an object,
/// their `required` lists are unioned instead of replaced.
pub fn merge_schemas(left: &Value, right: &Value) -> Value {
    let (Value::Object(l), Value::Object(r)) = (left, right) else {
        return right.clone();
    };

    let object_schema = schema_type(left) == Some("object") || schema_type(right) == Some("object");
    let mut merged = l.clone();

    for (key, right_value) in r {
        let value = match (l.get(key), right_value) {
            (Some(left_value @ Value::Object(_)), Value::Object(_)) => {
                merge_schemas(left_value, right_value)
            }
            (Some(Value::Array(left_items)), Value::Array(right_items))
                if key == "required" && object_schema =>
            {
                Value::Array(union(left_items, right_items))
            }
            _ => right_value.clone(),
        };
        merged.insert(key.clone(), value);
    }

    Value::Object(merged)
}

/// True for arrays whose items are an enum and whose entries must be unique:
/// a set of choices rather than a list of input fields.
pub fn is_multi_select(schema: &Value, definitions: &Value) -> Result<bool, ResolveError> {
    let unique = schema.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false);
    let Some(items) = schema.get("items").filter(|items| items.is_object()) else {
        return Ok(false);
    };
    if !unique {
        return Ok(false);
    }
    let items = resolve(items, definitions, None)?;
    Ok(items.get("enum").is_some_and(Value::is_array))
}

// --- Internal implementation ---

struct Resolver<'a> {
    definitions: &'a Value,
    form_data: Option<&'a Value>,
}

impl Resolver<'_> {
    /// `chain` holds the `$ref`s currently being expanded, outermost first.
    fn resolve(&self, schema: &Value, chain: &mut Vec<String>) -> Result<Value, ResolveError> {
        let resolved = if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            self.resolve_reference(schema, reference, chain)?
        } else if schema.get("dependencies").is_some() {
            let merged = self.resolve_dependencies(schema, chain)?;
            self.resolve(&merged, chain)?
        } else {
            schema.clone()
        };

        self.stub_additional_properties(resolved, chain)
    }

    fn resolve_reference(
        &self,
        schema: &Value,
        reference: &str,
        chain: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        if chain.iter().any(|seen| seen == reference) {
            let mut cycle = chain.clone();
            cycle.push(reference.to_string());
            return Err(ResolveError::CyclicReference { chain: cycle });
        }

        debug!(reference, "resolving $ref");
        let target = find_definition(reference, self.definitions)?;
        let mut merged = target.as_object().cloned().unwrap_or_default();
        if let Some(local) = schema.as_object() {
            for (key, value) in local {
                if key != "$ref" {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        chain.push(reference.to_string());
        let resolved = self.resolve(&Value::Object(merged), chain);
        chain.pop();
        resolved
    }

    fn resolve_dependencies(
        &self,
        schema: &Value,
        chain: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        let mut resolved = schema.as_object().cloned().unwrap_or_default();
        let Some(Value::Object(dependencies)) = resolved.remove("dependencies") else {
            return Ok(Value::Object(resolved));
        };
        let mut resolved = Value::Object(resolved);

        for (key, dependency) in &dependencies {
            let Some(trigger) = self.trigger_value(key).filter(|v| is_truthy(v)) else {
                continue;
            };

            match dependency {
                Value::Array(names) => {
                    debug!(key = key.as_str(), "applying property dependency");
                    with_dependent_properties(&mut resolved, names);
                }
                Value::Object(_) => {
                    debug!(key = key.as_str(), "applying schema dependency");
                    resolved =
                        self.with_dependent_schema(&resolved, key, dependency, trigger, chain)?;
                }
                _ => {}
            }
        }

        Ok(resolved)
    }

    fn trigger_value(&self, key: &str) -> Option<&Value> {
        match self.form_data? {
            Value::Object(data) => data.get(key),
            primitive if key == SELF_DEPENDENCY_KEY => Some(primitive),
            _ => None,
        }
    }

    fn with_dependent_schema(
        &self,
        schema: &Value,
        key: &str,
        dependency: &Value,
        trigger: &Value,
        chain: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        let mut dependent = match self.resolve(dependency, chain)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let one_of = dependent.remove("oneOf");
        let merged = merge_schemas(schema, &Value::Object(dependent));

        match one_of {
            None => Ok(merged),
            Some(Value::Array(branches)) => {
                self.with_exactly_one_subschema(merged, key, &branches, trigger, chain)
            }
            Some(other) => Err(ResolveError::InvalidDependency {
                key: key.to_string(),
                message: format!("oneOf must be an array, got {}", json_type_name(&other)),
            }),
        }
    }

    fn with_exactly_one_subschema(
        &self,
        schema: Value,
        key: &str,
        branches: &[Value],
        trigger: &Value,
        chain: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        let mut matching = Vec::new();
        for branch in branches {
            let branch = if branch.get("$ref").is_some() {
                self.resolve(branch, chain)?
            } else {
                branch.clone()
            };
            let Some(condition) = branch.get("properties").and_then(|p| p.get(key)) else {
                continue;
            };
            let condition = self.resolve(condition, chain)?;
            if self.condition_holds(key, &condition, trigger)? {
                matching.push(branch);
            }
        }

        if matching.len() != 1 {
            warn!(
                key,
                matches = matching.len(),
                "ignoring dependency: expected exactly one matching oneOf branch"
            );
            return Ok(schema);
        }

        let mut branch = matching.remove(0);
        if let Some(Value::Object(properties)) = branch.get_mut("properties") {
            properties.remove(key);
        }
        let dependent = self.resolve(&branch, chain)?;
        Ok(merge_schemas(&schema, &dependent))
    }

    /// Check a branch's constraint on the trigger property against the data.
    fn condition_holds(
        &self,
        key: &str,
        condition: &Value,
        trigger: &Value,
    ) -> Result<bool, ResolveError> {
        let mut check = Map::new();
        let instance = if key == SELF_DEPENDENCY_KEY && !trigger.is_object() {
            if let Value::Object(condition) = condition {
                check.extend(condition.clone());
            }
            trigger
        } else {
            check.insert("type".into(), "object".into());
            let mut properties = Map::new();
            properties.insert(key.to_string(), condition.clone());
            check.insert("properties".into(), Value::Object(properties));
            self.form_data.unwrap_or(&Value::Null)
        };
        if self.definitions.is_object() {
            check.insert("definitions".into(), self.definitions.clone());
        }

        let validator = jsonschema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .build(&Value::Object(check))
            .map_err(|e| ResolveError::InvalidSchema {
                message: e.to_string(),
            })?;
        Ok(validator.is_valid(instance))
    }

    fn stub_additional_properties(
        &self,
        schema: Value,
        chain: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        let additional = match schema.get("additionalProperties") {
            None | Some(Value::Bool(false)) => None,
            Some(additional) => Some(additional.clone()),
        };
        let Some(additional) = additional else {
            return Ok(schema);
        };
        let Some(Value::Object(data)) = self.form_data else {
            return Ok(schema);
        };
        let mut map = match schema {
            Value::Object(map) => map,
            other => return Ok(other),
        };

        let mut properties = match map.get("properties") {
            Some(Value::Object(properties)) => properties.clone(),
            _ => Map::new(),
        };
        let before = properties.len();

        for (key, value) in data {
            if properties.contains_key(key) {
                continue;
            }
            let mut stub = if let Some(reference) = additional.get("$ref") {
                let mut by_ref = Map::new();
                by_ref.insert("$ref".into(), reference.clone());
                self.resolve(&Value::Object(by_ref), chain)?
            } else if additional.get("type").is_some() {
                additional.clone()
            } else {
                serde_json::json!({ "type": guess_type(value) })
            };
            if let Value::Object(stub) = &mut stub {
                stub.insert(ADDITIONAL_PROPERTY_FLAG.into(), Value::Bool(true));
            }
            properties.insert(key.clone(), stub);
        }

        if properties.len() != before {
            map.insert("properties".into(), Value::Object(properties));
        }
        Ok(Value::Object(map))
    }
}

fn with_dependent_properties(schema: &mut Value, names: &[Value]) {
    let Value::Object(map) = schema else {
        return;
    };
    let required = match map.get("required") {
        Some(Value::Array(existing)) => union(existing, names),
        _ => union(&[], names),
    };
    map.insert("required".into(), Value::Array(required));
}

fn union(left: &[Value], right: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(left.len() + right.len());
    for value in left.iter().chain(right) {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_definition() {
        let address = json!({
            "type": "object",
            "properties": { "street_address": { "type": "string" } }
        });
        let definitions = json!({ "address": address });
        let schema = json!({ "$ref": "#/definitions/address" });

        assert_eq!(resolve(&schema, &definitions, None).unwrap(), address);
    }

    #[test]
    fn resolves_escaped_pointer() {
        let address = json!({ "type": "string" });
        let definitions = json!({ "a~complex/name": address });
        let schema = json!({ "$ref": "#/definitions/a~0complex~1name" });

        assert_eq!(resolve(&schema, &definitions, None).unwrap(), address);
    }

    #[test]
    fn local_keys_override_definition() {
        let definitions = json!({ "address": { "type": "string", "title": "bar" } });
        let schema = json!({ "$ref": "#/definitions/address", "title": "foo" });

        assert_eq!(
            resolve(&schema, &definitions, None).unwrap(),
            json!({ "type": "string", "title": "foo" })
        );
    }

    #[test]
    fn follows_ref_chains() {
        let definitions = json!({
            "a": { "$ref": "#/definitions/b", "title": "A" },
            "b": { "type": "integer", "title": "B" }
        });
        let schema = json!({ "$ref": "#/definitions/a" });

        assert_eq!(
            resolve(&schema, &definitions, None).unwrap(),
            json!({ "type": "integer", "title": "A" })
        );
    }

    #[test]
    fn missing_definition_errors() {
        let schema = json!({ "$ref": "#/definitions/missing" });
        let result = resolve(&schema, &json!({}), None);

        match result {
            Err(ResolveError::MissingDefinition { reference }) => {
                assert_eq!(reference, "#/definitions/missing")
            }
            other => panic!("expected MissingDefinition, got {:?}", other),
        }
    }

    #[test]
    fn non_definitions_pointer_is_unsupported() {
        let schema = json!({ "$ref": "#/properties/foo" });
        let result = resolve(&schema, &json!({}), None);

        assert!(matches!(result, Err(ResolveError::UnsupportedReference { .. })));
    }

    #[test]
    fn cyclic_chain_errors() {
        let definitions = json!({
            "a": { "$ref": "#/definitions/b" },
            "b": { "$ref": "#/definitions/a" }
        });
        let schema = json!({ "$ref": "#/definitions/a" });

        match resolve(&schema, &definitions, None) {
            Err(ResolveError::CyclicReference { chain }) => {
                assert_eq!(
                    chain,
                    vec!["#/definitions/a", "#/definitions/b", "#/definitions/a"]
                );
            }
            other => panic!("expected cyclic reference, got {:?}", other),
        }
    }

    #[test]
    fn recursive_definition_resolves_one_level() {
        let definitions = json!({
            "node": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "children": { "type": "array", "items": { "$ref": "#/definitions/node" } }
                }
            }
        });
        let schema = json!({ "$ref": "#/definitions/node" });

        let resolved = resolve(&schema, &definitions, None).unwrap();
        assert_eq!(
            resolved["properties"]["children"]["items"],
            json!({ "$ref": "#/definitions/node" })
        );
    }

    #[test]
    fn property_dependency_inactive_without_trigger() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
            "required": ["a"],
            "dependencies": { "a": ["b"] }
        });

        assert_eq!(
            resolve(&schema, &json!({}), Some(&json!({}))).unwrap(),
            json!({
                "type": "object",
                "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
                "required": ["a"]
            })
        );
    }

    #[test]
    fn property_dependency_defines_required() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
            "dependencies": { "a": ["b"] }
        });

        let resolved = resolve(&schema, &json!({}), Some(&json!({ "a": "1" }))).unwrap();
        assert_eq!(resolved["required"], json!(["b"]));
    }

    #[test]
    fn property_dependency_concats_required() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
            "required": ["a"],
            "dependencies": { "a": ["b"] }
        });

        let resolved = resolve(&schema, &json!({}), Some(&json!({ "a": "1" }))).unwrap();
        assert_eq!(resolved["required"], json!(["a", "b"]));
    }

    #[test]
    fn falsy_trigger_does_not_activate() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": { "a": { "properties": { "b": { "type": "integer" } } } }
        });

        let resolved = resolve(&schema, &json!({}), Some(&json!({ "a": "" }))).unwrap();
        assert!(resolved["properties"].get("b").is_none());
    }

    #[test]
    fn schema_dependency_adds_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": { "a": { "properties": { "b": { "type": "integer" } } } }
        });

        assert_eq!(
            resolve(&schema, &json!({}), Some(&json!({ "a": "1" }))).unwrap(),
            json!({
                "type": "object",
                "properties": { "a": { "type": "string" }, "b": { "type": "integer" } }
            })
        );
    }

    #[test]
    fn schema_dependency_through_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": { "a": { "$ref": "#/definitions/needsB" } }
        });
        let definitions = json!({
            "needsB": { "properties": { "b": { "type": "integer" } } }
        });

        let resolved = resolve(&schema, &definitions, Some(&json!({ "a": "1" }))).unwrap();
        assert_eq!(resolved["properties"]["b"], json!({ "type": "integer" }));
    }

    fn typed_input_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "string", "enum": ["int", "bool"] } },
            "dependencies": {
                "a": {
                    "oneOf": [
                        { "properties": { "a": { "enum": ["int"] }, "b": { "type": "integer" } } },
                        { "properties": { "a": { "enum": ["bool"] }, "b": { "type": "boolean" } } }
                    ]
                }
            }
        })
    }

    #[test]
    fn one_of_selects_first_branch() {
        let resolved =
            resolve(&typed_input_schema(), &json!({}), Some(&json!({ "a": "int" }))).unwrap();
        assert_eq!(
            resolved,
            json!({
                "type": "object",
                "properties": {
                    "a": { "type": "string", "enum": ["int", "bool"] },
                    "b": { "type": "integer" }
                }
            })
        );
    }

    #[test]
    fn one_of_selects_second_branch() {
        let resolved =
            resolve(&typed_input_schema(), &json!({}), Some(&json!({ "a": "bool" }))).unwrap();
        assert_eq!(resolved["properties"]["b"], json!({ "type": "boolean" }));
        assert_eq!(
            resolved["properties"]["a"],
            json!({ "type": "string", "enum": ["int", "bool"] })
        );
    }

    #[test]
    fn one_of_without_match_leaves_schema() {
        let resolved =
            resolve(&typed_input_schema(), &json!({}), Some(&json!({ "a": "float" }))).unwrap();
        assert!(resolved["properties"].get("b").is_none());
        assert!(resolved.get("dependencies").is_none());
    }

    #[test]
    fn one_of_through_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string", "enum": ["int", "bool"] } },
            "dependencies": { "a": { "$ref": "#/definitions/typedInput" } }
        });
        let definitions = json!({
            "typedInput": {
                "oneOf": [
                    { "properties": { "a": { "enum": ["int"] }, "b": { "type": "integer" } } },
                    { "properties": { "a": { "enum": ["bool"] }, "b": { "type": "boolean" } } }
                ]
            }
        });

        let resolved = resolve(&schema, &definitions, Some(&json!({ "a": "bool" }))).unwrap();
        assert_eq!(resolved["properties"]["b"], json!({ "type": "boolean" }));
    }

    #[test]
    fn one_of_branch_with_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": {
                "a": { "oneOf": [{ "$ref": "#/definitions/intBranch" }] }
            }
        });
        let definitions = json!({
            "intBranch": {
                "properties": { "a": { "enum": ["int"] }, "b": { "type": "integer" } },
                "required": ["b"]
            }
        });

        let resolved = resolve(&schema, &definitions, Some(&json!({ "a": "int" }))).unwrap();
        assert_eq!(resolved["properties"]["b"], json!({ "type": "integer" }));
        assert_eq!(resolved["required"], json!(["b"]));
    }

    #[test]
    fn one_of_must_be_array() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "dependencies": { "a": { "oneOf": { "properties": {} } } }
        });

        let result = resolve(&schema, &json!({}), Some(&json!({ "a": "x" })));
        assert!(matches!(result, Err(ResolveError::InvalidDependency { key, .. }) if key == "a"));
    }

    #[test]
    fn self_dependency_on_primitive_root() {
        let schema = json!({
            "type": "string",
            "dependencies": { "$self": { "title": "Filled in" } }
        });

        let resolved = resolve(&schema, &json!({}), Some(&json!("value"))).unwrap();
        assert_eq!(resolved["title"], "Filled in");

        let resolved = resolve(&schema, &json!({}), Some(&json!(""))).unwrap();
        assert!(resolved.get("title").is_none());
    }

    #[test]
    fn stubs_additional_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "known": { "type": "string" } },
            "additionalProperties": { "type": "number" }
        });
        let data = json!({ "known": "x", "extra": 3 });

        let resolved = resolve(&schema, &json!({}), Some(&data)).unwrap();
        assert_eq!(
            resolved["properties"]["extra"],
            json!({ "type": "number", "__additional_property": true })
        );
        assert_eq!(resolved["properties"]["known"], json!({ "type": "string" }));
    }

    #[test]
    fn stubs_guess_type_for_untyped_additional_properties() {
        let schema = json!({ "type": "object", "additionalProperties": true });
        let data = json!({ "flag": true });

        let resolved = resolve(&schema, &json!({}), Some(&data)).unwrap();
        assert_eq!(
            resolved["properties"]["flag"],
            json!({ "type": "boolean", "__additional_property": true })
        );
    }

    #[test]
    fn closed_objects_are_not_stubbed() {
        let schema = json!({ "type": "object", "additionalProperties": false });
        let resolved = resolve(&schema, &json!({}), Some(&json!({ "x": 1 }))).unwrap();
        assert_eq!(resolved, schema);
    }

    #[test]
    fn resolution_is_idempotent() {
        let definitions = json!({
            "base": { "type": "object", "properties": { "a": { "type": "string" } } }
        });
        let schema = json!({
            "$ref": "#/definitions/base",
            "dependencies": { "a": { "properties": { "b": { "type": "integer" } } } },
            "additionalProperties": true
        });
        let data = json!({ "a": "1", "c": "extra" });

        let once = resolve(&schema, &definitions, Some(&data)).unwrap();
        let twice = resolve(&once, &definitions, Some(&data)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_unions_required_for_objects() {
        let left = json!({
            "type": "object",
            "required": ["a"],
            "properties": { "a": { "type": "string" } }
        });
        let right = json!({ "required": ["b", "a"], "properties": { "b": { "type": "integer" } } });

        assert_eq!(
            merge_schemas(&left, &right),
            json!({
                "type": "object",
                "required": ["a", "b"],
                "properties": { "a": { "type": "string" }, "b": { "type": "integer" } }
            })
        );
    }

    #[test]
    fn merge_replaces_non_object_values() {
        let left = json!({ "title": "left", "enum": [1, 2] });
        let right = json!({ "title": "right", "enum": [3] });
        assert_eq!(
            merge_schemas(&left, &right),
            json!({ "title": "right", "enum": [3] })
        );
    }

    #[test]
    fn multi_select_detection() {
        let definitions = json!({ "choices": { "type": "string", "enum": ["a", "b"] } });
        let schema = json!({
            "type": "array",
            "uniqueItems": true,
            "items": { "$ref": "#/definitions/choices" }
        });
        assert!(is_multi_select(&schema, &definitions).unwrap());

        let list = json!({ "type": "array", "items": { "type": "string" } });
        assert!(!is_multi_select(&list, &definitions).unwrap());
    }
}
