//! Form state controller.
//!
//! [`apply_transition`] is a pure reducer from a state and an event to the
//! next state plus the notifications it implies. [`Form`] owns the state,
//! commits each transition and only then runs the caller's callbacks, so a
//! callback always observes the updated state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::defaults::compute_defaults;
use crate::error::{ResolveError, ValidationError};
use crate::error_schema::{to_error_list_in_schema_order, ErrorSchema};
use crate::field::{FieldCache, ResolverRegistry};
use crate::id_schema::{to_id_schema, IdSchema};
use crate::render::{render_form, Registry, RenderContext, RenderedForm};
use crate::resolver::resolve;
use crate::types::DEFAULT_ID_PREFIX;
use crate::validator::{
    validate_form_data, JsonSchemaValidator, ValidationHooks, ValidationOutcome, Validator,
};

/// uiSchema key overriding the root field id.
pub const UI_ROOT_FIELD_ID: &str = "ui:rootFieldId";

/// Status attached to a successful submission.
pub const SUBMITTED: &str = "submitted";

/// Validation and presentation flags of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormOptions {
    /// Validate on every change instead of only at submit.
    pub live_validate: bool,
    /// Skip all validation, including at submit.
    pub no_validate: bool,
    /// Root token of generated field ids.
    pub id_prefix: String,
    /// List all errors at the top of the rendered form.
    pub show_error_list: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            live_validate: false,
            no_validate: false,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            show_error_list: true,
        }
    }
}

impl FormOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_validate(mut self, live_validate: bool) -> Self {
        self.live_validate = live_validate;
        self
    }

    pub fn no_validate(mut self, no_validate: bool) -> Self {
        self.no_validate = no_validate;
        self
    }

    pub fn id_prefix(mut self, id_prefix: impl Into<String>) -> Self {
        self.id_prefix = id_prefix.into();
        self
    }

    pub fn show_error_list(mut self, show_error_list: bool) -> Self {
        self.show_error_list = show_error_list;
        self
    }
}

/// Inputs supplied by the host application.
#[derive(Debug, Clone, PartialEq)]
pub struct FormProps {
    pub schema: Value,
    pub ui_schema: Value,
    /// `None` when the host supplied no data.
    pub form_data: Option<Value>,
    pub options: FormOptions,
}

impl FormProps {
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            ui_schema: Value::Object(Default::default()),
            form_data: None,
            options: FormOptions::default(),
        }
    }

    pub fn ui_schema(mut self, ui_schema: Value) -> Self {
        self.ui_schema = ui_schema;
        self
    }

    pub fn form_data(mut self, form_data: Value) -> Self {
        self.form_data = Some(form_data);
        self
    }

    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }
}

/// Everything the presentation layer renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub schema: Value,
    pub ui_schema: Value,
    pub form_data: Option<Value>,
    pub edit: bool,
    pub errors: Vec<ValidationError>,
    pub error_schema: ErrorSchema,
    pub id_schema: IdSchema,
    /// The props this state was derived from.
    #[serde(skip)]
    pub props: FormProps,
}

impl FormState {
    pub fn definitions(&self) -> Value {
        definitions_of(&self.schema)
    }

    pub fn options(&self) -> &FormOptions {
        &self.props.options
    }
}

/// A state snapshot handed to `on_submit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    #[serde(flatten)]
    pub state: FormState,
    pub status: &'static str,
}

/// The interaction that triggered a submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitEvent {
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    PropsChanged(FormProps),
    /// New data from the presentation layer, with an optional error tree for
    /// field-local problems found before schema validation.
    Change {
        form_data: Option<Value>,
        error_schema: Option<ErrorSchema>,
    },
    Submit,
    Blur { id: String, value: Option<Value> },
    Focus { id: String, value: Option<Value> },
}

/// Notifications to run once a transition is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Changed,
    Submitted,
    ValidationFailed(Vec<ValidationError>),
    Blurred { id: String, value: Option<Value> },
    Focused { id: String, value: Option<Value> },
}

/// Result of one reducer step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: FormState,
    pub effects: Vec<Effect>,
}

/// Recompute the state from props.
///
/// Defaults are merged into the supplied data and the id tree is rebuilt.
/// Validation runs only when data was supplied and live validation is on;
/// otherwise the errors of `previous` are kept, or start empty.
pub fn derive_state(
    props: &FormProps,
    previous: Option<&FormState>,
    validator: &dyn Validator,
    hooks: &ValidationHooks,
) -> Result<FormState, ResolveError> {
    let options = &props.options;
    let definitions = definitions_of(&props.schema);
    let edit = props.form_data.is_some();
    let form_data = compute_defaults(&props.schema, props.form_data.as_ref(), &definitions)?;

    let must_validate = edit && !options.no_validate && options.live_validate;
    let (errors, error_schema) = if must_validate {
        let outcome = run_validation(&props.schema, form_data.as_ref(), validator, hooks)?;
        (outcome.errors, outcome.error_schema)
    } else {
        previous
            .map(|p| (p.errors.clone(), p.error_schema.clone()))
            .unwrap_or_default()
    };

    let resolved = resolve(&props.schema, &definitions, form_data.as_ref())?;
    let root_id = props.ui_schema.get(UI_ROOT_FIELD_ID).and_then(Value::as_str);
    let id_schema = to_id_schema(
        &resolved,
        root_id,
        &definitions,
        form_data.as_ref(),
        Some(&options.id_prefix),
    )?;

    Ok(FormState {
        schema: props.schema.clone(),
        ui_schema: props.ui_schema.clone(),
        form_data,
        edit,
        errors,
        error_schema,
        id_schema,
        props: props.clone(),
    })
}

/// Compute the state following `event`, and the notifications it implies.
pub fn apply_transition(
    state: &FormState,
    event: FormEvent,
    validator: &dyn Validator,
    hooks: &ValidationHooks,
) -> Result<Transition, ResolveError> {
    let options = state.options();
    match event {
        FormEvent::PropsChanged(props) if props == state.props => {
            debug!("props unchanged, keeping state");
            Ok(Transition {
                state: state.clone(),
                effects: Vec::new(),
            })
        }

        FormEvent::PropsChanged(props) => Ok(Transition {
            state: derive_state(&props, Some(state), validator, hooks)?,
            effects: Vec::new(),
        }),

        FormEvent::Change {
            form_data,
            error_schema,
        } => {
            let mut next = state.clone();
            next.form_data = form_data;
            if !options.no_validate && options.live_validate {
                let outcome =
                    run_validation(&next.schema, next.form_data.as_ref(), validator, hooks)?;
                next.errors = outcome.errors;
                next.error_schema = outcome.error_schema;
            } else if let Some(hint) = error_schema.filter(|_| !options.no_validate) {
                let resolved = resolve(&next.schema, &next.definitions(), next.form_data.as_ref())?;
                next.errors = to_error_list_in_schema_order(&hint, &resolved);
                next.error_schema = hint;
            }
            Ok(Transition {
                state: next,
                effects: vec![Effect::Changed],
            })
        }

        FormEvent::Submit => {
            let mut next = state.clone();
            if !options.no_validate {
                let outcome =
                    run_validation(&next.schema, next.form_data.as_ref(), validator, hooks)?;
                if !outcome.is_valid() {
                    let errors = outcome.errors.clone();
                    next.errors = outcome.errors;
                    next.error_schema = outcome.error_schema;
                    return Ok(Transition {
                        state: next,
                        effects: vec![Effect::ValidationFailed(errors)],
                    });
                }
            }
            next.errors = Vec::new();
            next.error_schema = ErrorSchema::new();
            Ok(Transition {
                state: next,
                effects: vec![Effect::Submitted],
            })
        }

        FormEvent::Blur { id, value } => Ok(Transition {
            state: state.clone(),
            effects: vec![Effect::Blurred { id, value }],
        }),

        FormEvent::Focus { id, value } => Ok(Transition {
            state: state.clone(),
            effects: vec![Effect::Focused { id, value }],
        }),
    }
}

fn run_validation(
    schema: &Value,
    form_data: Option<&Value>,
    validator: &dyn Validator,
    hooks: &ValidationHooks,
) -> Result<ValidationOutcome, ResolveError> {
    let resolved = resolve(schema, &definitions_of(schema), form_data)?;
    validate_form_data(form_data, &resolved, validator, hooks)
}

fn definitions_of(schema: &Value) -> Value {
    schema
        .get("definitions")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()))
}

type StateCallback = Box<dyn FnMut(&FormState)>;
type SubmitCallback = Box<dyn FnMut(&Submission)>;
type ErrorCallback = Box<dyn FnMut(&[ValidationError])>;
type FieldCallback = Box<dyn FnMut(&str, Option<&Value>)>;

/// Caller-supplied notification hooks. All optional.
#[derive(Default)]
pub struct FormCallbacks {
    pub on_change: Option<StateCallback>,
    pub on_submit: Option<SubmitCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_blur: Option<FieldCallback>,
    pub on_focus: Option<FieldCallback>,
}

impl FormCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(mut self, f: impl FnMut(&FormState) + 'static) -> Self {
        self.on_change = Some(Box::new(f));
        self
    }

    pub fn on_submit(mut self, f: impl FnMut(&Submission) + 'static) -> Self {
        self.on_submit = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&[ValidationError]) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_blur(mut self, f: impl FnMut(&str, Option<&Value>) + 'static) -> Self {
        self.on_blur = Some(Box::new(f));
        self
    }

    pub fn on_focus(mut self, f: impl FnMut(&str, Option<&Value>) + 'static) -> Self {
        self.on_focus = Some(Box::new(f));
        self
    }

    fn notify(&mut self, state: &FormState, effect: Effect) {
        match effect {
            Effect::Changed => {
                if let Some(f) = self.on_change.as_mut() {
                    f(state);
                }
            }
            Effect::Submitted => {
                if let Some(f) = self.on_submit.as_mut() {
                    f(&Submission {
                        state: state.clone(),
                        status: SUBMITTED,
                    });
                }
            }
            Effect::ValidationFailed(errors) => match self.on_error.as_mut() {
                Some(f) => f(errors.as_slice()),
                None => error!(count = errors.len(), "Form validation failed"),
            },
            Effect::Blurred { id, value } => {
                if let Some(f) = self.on_blur.as_mut() {
                    f(id.as_str(), value.as_ref());
                }
            }
            Effect::Focused { id, value } => {
                if let Some(f) = self.on_focus.as_mut() {
                    f(id.as_str(), value.as_ref());
                }
            }
        }
    }
}

/// Configures a [`Form`] before its first state is derived.
pub struct FormBuilder {
    props: FormProps,
    validator: Box<dyn Validator>,
    hooks: ValidationHooks,
    callbacks: FormCallbacks,
}

impl FormBuilder {
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn hooks(mut self, hooks: ValidationHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn callbacks(mut self, callbacks: FormCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Derive the initial state.
    ///
    /// # Errors
    ///
    /// Any `ResolveError` of the schema aborts construction.
    pub fn build(self) -> Result<Form, ResolveError> {
        let state = derive_state(&self.props, None, self.validator.as_ref(), &self.hooks)?;
        Ok(Form {
            state,
            validator: self.validator,
            hooks: self.hooks,
            callbacks: self.callbacks,
        })
    }
}

/// A mounted form: owns its state and applies events in arrival order.
pub struct Form {
    state: FormState,
    validator: Box<dyn Validator>,
    hooks: ValidationHooks,
    callbacks: FormCallbacks,
}

impl Form {
    pub fn builder(props: FormProps) -> FormBuilder {
        FormBuilder {
            props,
            validator: Box::new(JsonSchemaValidator),
            hooks: ValidationHooks::default(),
            callbacks: FormCallbacks::default(),
        }
    }

    pub fn new(props: FormProps) -> Result<Self, ResolveError> {
        Self::builder(props).build()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Apply `event`, commit the new state, then notify.
    ///
    /// On error the state is left as it was.
    pub fn dispatch(&mut self, event: FormEvent) -> Result<(), ResolveError> {
        let Transition { state, effects } =
            apply_transition(&self.state, event, self.validator.as_ref(), &self.hooks)?;
        self.state = state;
        debug!(effects = effects.len(), "form state committed");
        for effect in effects {
            self.callbacks.notify(&self.state, effect);
        }
        Ok(())
    }

    /// Deliver props from the host. Props equal to the current ones are a no-op.
    pub fn receive_props(&mut self, props: FormProps) -> Result<(), ResolveError> {
        self.dispatch(FormEvent::PropsChanged(props))
    }

    /// Deliver props together with new validation hooks.
    ///
    /// Hooks cannot be compared, so the state is always recomputed, and
    /// revalidated when live validation applies.
    pub fn receive_props_with_hooks(
        &mut self,
        props: FormProps,
        hooks: ValidationHooks,
    ) -> Result<(), ResolveError> {
        let state = derive_state(&props, Some(&self.state), self.validator.as_ref(), &hooks)?;
        self.hooks = hooks;
        self.state = state;
        debug!("form state committed with new hooks");
        Ok(())
    }

    pub fn change(
        &mut self,
        form_data: Option<Value>,
        error_schema: Option<ErrorSchema>,
    ) -> Result<(), ResolveError> {
        self.dispatch(FormEvent::Change {
            form_data,
            error_schema,
        })
    }

    pub fn submit(&mut self, event: &mut SubmitEvent) -> Result<(), ResolveError> {
        event.prevent_default();
        self.dispatch(FormEvent::Submit)
    }

    pub fn blur(
        &mut self,
        id: impl Into<String>,
        value: Option<Value>,
    ) -> Result<(), ResolveError> {
        self.dispatch(FormEvent::Blur {
            id: id.into(),
            value,
        })
    }

    pub fn focus(
        &mut self,
        id: impl Into<String>,
        value: Option<Value>,
    ) -> Result<(), ResolveError> {
        self.dispatch(FormEvent::Focus {
            id: id.into(),
            value,
        })
    }

    /// Render the current state as an outline.
    pub fn render(
        &self,
        registry: &Registry,
        resolvers: &ResolverRegistry,
        cache: &dyn FieldCache,
        form_context: &Value,
    ) -> Result<RenderedForm, ResolveError> {
        let state = &self.state;
        let values = state.form_data.clone().unwrap_or(Value::Null);
        let definitions = state.definitions();
        let ctx = RenderContext::new(
            registry,
            resolvers,
            &values,
            &definitions,
            &state.error_schema,
        )
        .with_cache(cache)
        .with_form_context(form_context);
        render_form(
            &state.schema,
            &state.ui_schema,
            &state.id_schema,
            &state.errors,
            state.options().show_error_list,
            &ctx,
        )
    }
}
