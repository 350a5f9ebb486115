//! Type dispatch for field rendering.
//!
//! Each schema node is classified once into a [`FieldKind`]; every kind has a
//! [`Render`] implementation producing a [`RenderedField`] outline. Custom
//! renderers registered in the [`Registry`] replace the type dispatch for
//! nodes whose uiSchema names them in `ui:field`.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::defaults::item_schema;
use crate::error::{ResolveError, ValidationError};
use crate::error_schema::ErrorSchema;
use crate::field::{resolve_field, FieldCache, NoCache, ResolverRegistry};
use crate::id_schema::IdSchema;
use crate::resolver::{is_multi_select, resolve};
use crate::types::{get_value, schema_type, PathSegment};

/// uiSchema key selecting a custom field renderer.
pub const UI_FIELD: &str = "ui:field";

/// uiSchema key ordering object properties.
pub const UI_ORDER: &str = "ui:order";

const WILDCARD: &str = "*";

/// The renderer family of a schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Array,
    Boolean,
    /// `number` and `integer`.
    Number,
    Object,
    String,
    Unsupported { reason: String },
}

impl FieldKind {
    /// Classify a resolved schema node.
    pub fn of(schema: &Value) -> Self {
        match schema_type(schema) {
            Some("array") => FieldKind::Array,
            Some("boolean") => FieldKind::Boolean,
            Some("number") | Some("integer") => FieldKind::Number,
            Some("object") => FieldKind::Object,
            Some("string") => FieldKind::String,
            Some(other) => FieldKind::Unsupported {
                reason: format!("unsupported field type \"{}\"", other),
            },
            None => match schema.get("type") {
                Some(types @ Value::Array(_)) => FieldKind::Unsupported {
                    reason: format!("unsupported type list {}", types),
                },
                _ => FieldKind::Unsupported {
                    reason: "schema has no type".to_string(),
                },
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Array => "array",
            FieldKind::Boolean => "boolean",
            FieldKind::Number => "number",
            FieldKind::Object => "object",
            FieldKind::String => "string",
            FieldKind::Unsupported { .. } => "unsupported",
        }
    }
}

/// Outline of one rendered field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RenderedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A whole form outline plus the top-level error list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedForm {
    pub root: RenderedField,
    #[serde(rename = "errorList", skip_serializing_if = "Vec::is_empty")]
    pub error_list: Vec<ValidationError>,
}

/// A schema node ready to render: schema resolved, value looked up.
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub schema: &'a Value,
    pub ui_schema: &'a Value,
    pub id_schema: &'a IdSchema,
    pub name: Option<&'a str>,
    pub value: Option<Value>,
    pub required: bool,
}

impl Field<'_> {
    pub fn path(&self) -> &[PathSegment] {
        &self.id_schema.path
    }

    /// The outline every renderer starts from.
    pub fn outline(&self, kind: &str, ctx: &RenderContext<'_>) -> RenderedField {
        RenderedField {
            id: self.id_schema.id.clone(),
            kind: kind.to_string(),
            label: self
                .schema
                .get("title")
                .and_then(Value::as_str)
                .or(self.name)
                .map(str::to_string),
            value: self.value.clone(),
            required: self.required,
            errors: ctx
                .error_schema
                .lookup(self.path())
                .map(|node| node.errors.clone())
                .unwrap_or_default(),
            children: Vec::new(),
            reason: None,
        }
    }
}

/// Renders one field.
pub trait Render {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError>;
}

/// Custom field renderers, by `ui:field` name.
#[derive(Default)]
pub struct Registry {
    fields: HashMap<String, Box<dyn Render>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_field(
        &mut self,
        name: impl Into<String>,
        field: impl Render + 'static,
    ) -> &mut Self {
        self.fields.insert(name.into(), Box::new(field));
        self
    }

    pub fn field(&self, name: &str) -> Option<&dyn Render> {
        self.fields.get(name).map(|f| f.as_ref())
    }
}

/// Everything a render pass reads, passed by reference down the field tree.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub registry: &'a Registry,
    pub resolvers: &'a ResolverRegistry,
    pub cache: &'a dyn FieldCache,
    pub form_context: &'a Value,
    pub values: &'a Value,
    pub definitions: &'a Value,
    pub error_schema: &'a ErrorSchema,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        registry: &'a Registry,
        resolvers: &'a ResolverRegistry,
        values: &'a Value,
        definitions: &'a Value,
        error_schema: &'a ErrorSchema,
    ) -> Self {
        Self {
            registry,
            resolvers,
            cache: &NoCache,
            form_context: &Value::Null,
            values,
            definitions,
            error_schema,
        }
    }

    pub fn with_cache(mut self, cache: &'a dyn FieldCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_form_context(mut self, form_context: &'a Value) -> Self {
        self.form_context = form_context;
        self
    }

    /// Resolve and render the field at `id_schema.path`.
    pub fn render_field(
        &self,
        schema: &Value,
        ui_schema: &Value,
        id_schema: &IdSchema,
        name: Option<&str>,
        required: bool,
    ) -> Result<RenderedField, ResolveError> {
        let path = &id_schema.path;
        let resolved_field = resolve_field(
            schema,
            self.values,
            path,
            self.form_context,
            self.resolvers,
            self.cache,
        )?;
        let data = get_value(path, Some(self.values));
        let resolved = resolve(&resolved_field.schema, self.definitions, data)?;

        let field = Field {
            schema: &resolved,
            ui_schema,
            id_schema,
            name,
            value: resolved_field.value,
            required,
        };

        if let Some(custom) = ui_schema.get(UI_FIELD).and_then(Value::as_str) {
            match self.registry.field(custom) {
                Some(renderer) => return renderer.render(&field, self),
                None => warn!(field = custom, "unknown ui:field, rendering by schema type"),
            }
        }
        FieldKind::of(&resolved).render(&field, self)
    }
}

impl Render for FieldKind {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError> {
        match self {
            FieldKind::Array => ArrayField.render(field, ctx),
            FieldKind::Object => ObjectField.render(field, ctx),
            FieldKind::Boolean | FieldKind::Number | FieldKind::String => {
                PrimitiveField(self.name()).render(field, ctx)
            }
            FieldKind::Unsupported { reason } => UnsupportedField(reason).render(field, ctx),
        }
    }
}

/// Leaf fields: strings, numbers and booleans.
pub struct PrimitiveField(pub &'static str);

impl Render for PrimitiveField {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError> {
        Ok(field.outline(self.0, ctx))
    }
}

pub struct UnsupportedField<'r>(pub &'r str);

impl Render for UnsupportedField<'_> {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError> {
        let mut out = field.outline("unsupported", ctx);
        out.reason = Some(self.0.to_string());
        Ok(out)
    }
}

pub struct ObjectField;

impl Render for ObjectField {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError> {
        let mut out = field.outline("object", ctx);
        out.value = None;
        let Some(Value::Object(properties)) = field.schema.get("properties") else {
            return Ok(out);
        };
        let required: Vec<&str> = field
            .schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let names: Vec<String> = properties.keys().cloned().collect();
        for name in order_properties(&names, field.ui_schema.get(UI_ORDER))? {
            let Some(property) = properties.get(&name) else {
                continue;
            };
            let mut path = field.path().to_vec();
            path.push(PathSegment::key(name.as_str()));
            let id = field.id_schema.property(
                &name,
                property,
                ctx.definitions,
                get_value(&path, Some(ctx.values)),
            )?;
            let ui = field.ui_schema.get(&name).unwrap_or(&Value::Null);
            let is_required = required.contains(&name.as_str());
            let child = ctx.render_field(property, ui, &id, Some(&name), is_required)?;
            out.children.push(child);
        }
        Ok(out)
    }
}

pub struct ArrayField;

impl Render for ArrayField {
    fn render(
        &self,
        field: &Field<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderedField, ResolveError> {
        let mut out = field.outline("array", ctx);
        // A set of choices is a single input.
        if is_multi_select(field.schema, ctx.definitions)? {
            return Ok(out);
        }
        out.value = None;
        let Some(Value::Array(items)) = &field.value else {
            return Ok(out);
        };

        for (index, item) in items.iter().enumerate() {
            let schema = item_schema(field.schema, index).unwrap_or(&Value::Null);
            let ui = match field.ui_schema.get("items") {
                Some(Value::Array(tuple)) => tuple.get(index).unwrap_or(&Value::Null),
                Some(ui) => ui,
                None => &Value::Null,
            };
            let id = field.id_schema.item(index, schema, ctx.definitions, Some(item))?;
            out.children.push(ctx.render_field(schema, ui, &id, None, false)?);
        }
        Ok(out)
    }
}

/// Order property names by a `ui:order` list.
///
/// Names missing from the list are only allowed when the list has a `"*"`
/// wildcard, which expands to them in declaration order. Listed names the
/// schema does not declare are ignored.
///
/// # Errors
///
/// Returns `ResolveError::InvalidUiOrder` for a non-array order, unlisted
/// properties without a wildcard, or more than one wildcard.
pub fn order_properties(
    properties: &[String],
    order: Option<&Value>,
) -> Result<Vec<String>, ResolveError> {
    let Some(order) = order else {
        return Ok(properties.to_vec());
    };
    let Some(order) = order.as_array() else {
        return Err(ResolveError::InvalidUiOrder {
            message: format!("expected an array, got {}", order),
        });
    };

    let listed: Vec<&str> = order
        .iter()
        .filter_map(Value::as_str)
        .filter(|name| *name == WILDCARD || properties.iter().any(|p| p == name))
        .collect();
    let rest: Vec<&String> = properties
        .iter()
        .filter(|p| !listed.contains(&p.as_str()))
        .collect();

    let wildcards = listed.iter().filter(|name| **name == WILDCARD).count();
    if wildcards > 1 {
        return Err(ResolveError::InvalidUiOrder {
            message: "uiSchema order list contains more than one wildcard item".to_string(),
        });
    }
    if wildcards == 0 && !rest.is_empty() {
        let names: Vec<String> = rest.iter().map(|p| format!("'{}'", p)).collect();
        let noun = if rest.len() == 1 { "property" } else { "properties" };
        return Err(ResolveError::InvalidUiOrder {
            message: format!(
                "uiSchema order list does not contain {} {}",
                noun,
                names.join(", ")
            ),
        });
    }

    let mut ordered = Vec::with_capacity(properties.len());
    for name in listed {
        if name == WILDCARD {
            ordered.extend(rest.iter().map(|p| p.to_string()));
        } else {
            ordered.push(name.to_string());
        }
    }
    Ok(ordered)
}

/// Render a whole form.
///
/// `errors` is listed at the top of the outline when `show_error_list` is set.
pub fn render_form(
    schema: &Value,
    ui_schema: &Value,
    id_schema: &IdSchema,
    errors: &[ValidationError],
    show_error_list: bool,
    ctx: &RenderContext<'_>,
) -> Result<RenderedForm, ResolveError> {
    let root = ctx.render_field(schema, ui_schema, id_schema, None, false)?;
    Ok(RenderedForm {
        root,
        error_list: if show_error_list {
            errors.to_vec()
        } else {
            Vec::new()
        },
    })
}
