//! Schema Form
//!
//! Schema resolution and form state for JSON Schema driven forms.
//!
//! This library normalizes a schema against the current form data (`$ref`
//! definitions, property and schema `dependencies`), derives default form
//! data, builds a stable tree of field ids, and projects validation errors
//! onto a per-field error tree. A [`Form`] ties these together into a state
//! machine driven by change, submit, blur and focus events.
//!
//! # Example
//!
//! ```
//! use schema_form::{Form, FormOptions, FormProps};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "name": { "type": "string", "default": "Ada", "minLength": 3 }
//!     }
//! });
//!
//! let props = FormProps::new(schema).options(FormOptions::new().live_validate(true));
//! let mut form = Form::new(props).unwrap();
//! assert_eq!(form.state().form_data, Some(json!({ "name": "Ada" })));
//! assert_eq!(form.state().id_schema.get("name").unwrap().id, "root_name");
//!
//! form.change(Some(json!({ "name": "A" })), None).unwrap();
//! assert_eq!(
//!     form.state().error_schema.to_value(),
//!     json!({ "name": { "__errors": ["should NOT be shorter than 3 characters"] } })
//! );
//! ```
//!
//! # Validation Modes
//!
//! | Options | On change | On submit |
//! |---------|-----------|-----------|
//! | default | errors untouched | validate; stop on errors |
//! | `liveValidate` | validate | validate; stop on errors |
//! | `noValidate` | errors untouched | submit without validating |
//!
//! # uiSchema Keys
//!
//! | Key | Effect |
//! |-----|--------|
//! | `ui:rootFieldId` | Root field id, replacing the id prefix |
//! | `ui:order` | Order of object properties, `"*"` for the rest |
//! | `ui:field` | Custom renderer from the [`Registry`] |

mod defaults;
mod error;
mod error_schema;
mod field;
mod form;
mod id_schema;
mod loader;
mod render;
mod resolver;
mod types;
mod validator;

pub use defaults::{compute_defaults, get_default_form_state};
pub use error::{ResolveError, ValidationError};
pub use error_schema::{
    to_error_list, to_error_list_in_schema_order, to_error_schema, ErrorSchema, ERRORS_KEY,
};
pub use field::{
    resolve_field, FieldCache, FieldResolver, FnResolver, MemoCache, NoCache, ResolvedField,
    ResolverRegistry, Selection, RESOLVER_KEY,
};
pub use form::{
    apply_transition, derive_state, Effect, Form, FormBuilder, FormCallbacks, FormEvent,
    FormOptions, FormProps, FormState, SubmitEvent, Submission, Transition, SUBMITTED,
    UI_ROOT_FIELD_ID,
};
pub use id_schema::{to_id_schema, IdSchema};
pub use loader::{is_url, load_schema, load_schema_auto, load_schema_str, navigate_fragment};
pub use render::{
    order_properties, render_form, ArrayField, Field, FieldKind, ObjectField, PrimitiveField,
    Registry, Render, RenderContext, RenderedField, RenderedForm, UnsupportedField, UI_FIELD,
    UI_ORDER,
};
pub use resolver::{find_definition, is_multi_select, merge_schemas, resolve};
pub use types::{
    get_value, guess_type, is_truthy, json_type_name, schema_type, PathSegment,
    ADDITIONAL_PROPERTY_FLAG, DEFAULT_ID_PREFIX, ID_SEPARATOR, SELF_DEPENDENCY_KEY,
};
pub use validator::{
    validate_form_data, CustomValidate, JsonSchemaValidator, TransformErrors, ValidationHooks,
    ValidationOutcome, Validator,
};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
