//! Form data validation against resolved schemas.
//!
//! The built-in [`JsonSchemaValidator`] runs Draft 7 validation through the
//! `jsonschema` crate and reports messages in the wording form renderers
//! conventionally display ("should NOT be shorter than 3 characters").

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ResolveError, ValidationError};
use crate::error_schema::{to_error_list_in_schema_order, to_error_schema, ErrorSchema};
use crate::resolver::find_definition;
use crate::types::PathSegment;

/// A validation back end.
///
/// `schema` is a root schema; nested `$ref`s resolve against its `definitions`.
pub trait Validator {
    fn validate(&self, form_data: &Value, schema: &Value)
        -> Result<Vec<ValidationError>, ResolveError>;
}

/// Draft 7 validation via the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl Validator for JsonSchemaValidator {
    fn validate(
        &self,
        form_data: &Value,
        schema: &Value,
    ) -> Result<Vec<ValidationError>, ResolveError> {
        let validator = jsonschema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .build(schema)
            .map_err(|e| ResolveError::InvalidSchema {
                message: e.to_string(),
            })?;

        let errors = validator
            .iter_errors(form_data)
            .map(|e| {
                let mut path = data_path(&e.instance_path.to_string(), form_data);
                if let jsonschema::error::ValidationErrorKind::Required { property } = &e.kind {
                    let name = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    path.push(PathSegment::Key(name));
                }
                let message = describe(schema, &e.schema_path.to_string())
                    .unwrap_or_else(|| e.to_string());
                ValidationError::new(path, message)
            })
            .collect();
        Ok(errors)
    }
}

/// Signature of a custom validation hook: receives the form data and an
/// empty error tree to fill in.
pub type CustomValidate = Box<dyn Fn(&Value, ErrorSchema) -> ErrorSchema>;

/// Signature of an error transform, applied to the raw list before projection.
pub type TransformErrors = Box<dyn Fn(Vec<ValidationError>) -> Vec<ValidationError>>;

/// Optional caller-supplied validation stages.
#[derive(Default)]
pub struct ValidationHooks {
    pub validate: Option<CustomValidate>,
    pub transform_errors: Option<TransformErrors>,
}

impl ValidationHooks {
    pub fn with_validate(
        mut self,
        hook: impl Fn(&Value, ErrorSchema) -> ErrorSchema + 'static,
    ) -> Self {
        self.validate = Some(Box::new(hook));
        self
    }

    pub fn with_transform_errors(
        mut self,
        hook: impl Fn(Vec<ValidationError>) -> Vec<ValidationError> + 'static,
    ) -> Self {
        self.transform_errors = Some(Box::new(hook));
        self
    }
}

/// Errors in both shapes: the flat list and the per-field tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    #[serde(rename = "errorSchema")]
    pub error_schema: ErrorSchema,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate form data and project the errors.
///
/// Undefined data validates as `null`. The raw errors pass through
/// `transform_errors` before projection. When a custom `validate` hook is
/// set, its tree is merged over the built-in one and the flat list is
/// rebuilt from the merged tree in the schema's property order.
pub fn validate_form_data(
    form_data: Option<&Value>,
    schema: &Value,
    validator: &dyn Validator,
    hooks: &ValidationHooks,
) -> Result<ValidationOutcome, ResolveError> {
    let data = form_data.unwrap_or(&Value::Null);
    let mut errors = validator.validate(data, schema)?;
    debug!(count = errors.len(), "validated form data");

    if let Some(transform) = &hooks.transform_errors {
        errors = transform(errors);
    }
    let mut error_schema = to_error_schema(&errors);

    let Some(custom) = &hooks.validate else {
        return Ok(ValidationOutcome {
            errors,
            error_schema,
        });
    };
    error_schema.merge(custom(data, ErrorSchema::new()));
    Ok(ValidationOutcome {
        errors: to_error_list_in_schema_order(&error_schema, schema),
        error_schema,
    })
}

/// Convert a JSON Pointer into a data path. Numeric tokens become indices
/// only where the data at that point is an array.
fn data_path(pointer: &str, data: &Value) -> Vec<PathSegment> {
    let mut path = Vec::new();
    let mut current = Some(data);
    for token in pointer_tokens(pointer) {
        let segment = match (current, token.parse::<usize>()) {
            (Some(Value::Array(_)), Ok(index)) => PathSegment::Index(index),
            _ => PathSegment::Key(token),
        };
        current = current.and_then(|value| segment.get(value));
        path.push(segment);
    }
    path
}

fn pointer_tokens(pointer: &str) -> impl Iterator<Item = String> + '_ {
    pointer
        .split('/')
        .skip(1)
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
}

/// Message for the keyword at the end of `schema_path`, read from the schema
/// itself. `None` when the keyword is unknown or the path cannot be walked.
fn describe(schema: &Value, schema_path: &str) -> Option<String> {
    let tokens: Vec<String> = pointer_tokens(schema_path).collect();
    let keyword = tokens.last()?.as_str();
    let value = walk_schema(schema, &tokens)?;

    let message = match keyword {
        "minLength" => format!("should NOT be shorter than {} characters", value),
        "maxLength" => format!("should NOT be longer than {} characters", value),
        "minItems" => format!("should NOT have fewer than {} items", value),
        "maxItems" => format!("should NOT have more than {} items", value),
        "minProperties" => format!("should NOT have fewer than {} properties", value),
        "maxProperties" => format!("should NOT have more than {} properties", value),
        "minimum" => format!("should be >= {}", value),
        "maximum" => format!("should be <= {}", value),
        "exclusiveMinimum" => format!("should be > {}", value),
        "exclusiveMaximum" => format!("should be < {}", value),
        "multipleOf" => format!("should be multiple of {}", value),
        "pattern" => format!("should match pattern \"{}\"", value.as_str()?),
        "format" => format!("should match format \"{}\"", value.as_str()?),
        "type" => match value {
            Value::String(t) => format!("should be {}", t),
            Value::Array(types) => {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                format!("should be {}", names.join(","))
            }
            _ => return None,
        },
        "enum" => "should be equal to one of the allowed values".to_string(),
        "const" => "should be equal to constant".to_string(),
        "required" => "is a required property".to_string(),
        "uniqueItems" => "should NOT have duplicate items".to_string(),
        "additionalProperties" => "should NOT have additional properties".to_string(),
        "oneOf" => "should match exactly one schema in oneOf".to_string(),
        "anyOf" => "should match some schema in anyOf".to_string(),
        "not" => "should NOT be valid".to_string(),
        _ => return None,
    };
    Some(message)
}

fn walk_schema<'a>(root: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    let definitions = root.get("definitions").unwrap_or(&Value::Null);
    let mut current = root;
    for token in tokens {
        if token == "$ref" {
            current = follow_ref(current, definitions)?;
            continue;
        }
        current = match child(current, token) {
            Some(next) => next,
            // Some paths name keywords of the referenced schema directly.
            None => child(follow_ref(current, definitions)?, token)?,
        };
    }
    Some(current)
}

fn follow_ref<'a>(node: &'a Value, definitions: &'a Value) -> Option<&'a Value> {
    let reference = node.get("$ref")?.as_str()?;
    find_definition(reference, definitions).ok()
}

fn child<'a>(node: &'a Value, token: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(token),
        Value::Array(items) => items.get(token.parse::<usize>().ok()?),
        _ => None,
    }
}
