//! Per-field resolution through named resolvers.
//!
//! A schema node may name a resolver (`"resolver": "fullName"`). The resolver
//! selects its inputs from the current values, the field's path and the form
//! context, then derives a partial schema override and/or the field's value.
//! Outputs may be memoized by a [`FieldCache`]; results are identical with
//! [`NoCache`].

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ResolveError;
use crate::types::{get_value, schema_type, PathSegment};

/// Schema key naming the resolver of a field.
pub const RESOLVER_KEY: &str = "resolver";

/// Ambient inputs a resolver may select from.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub values: &'a Value,
    pub path: &'a [PathSegment],
    pub form_context: &'a Value,
}

/// A named per-field resolver.
pub trait FieldResolver {
    /// Pick the inputs the outputs depend on. Outputs are cached per selection.
    fn select(&self, selection: &Selection<'_>) -> Vec<Value>;

    /// Partial schema shallow-merged over the field's schema.
    fn schema(&self, _inputs: &[Value]) -> Option<Value> {
        None
    }

    /// Value for the field. `None` falls back to the data at the field's path.
    fn value(&self, _inputs: &[Value]) -> Option<Value> {
        None
    }
}

type SelectFn = Box<dyn Fn(&Selection<'_>) -> Vec<Value>>;
type OutputFn = Box<dyn Fn(&[Value]) -> Option<Value>>;

/// A resolver assembled from closures.
pub struct FnResolver {
    select: SelectFn,
    schema: Option<OutputFn>,
    value: Option<OutputFn>,
}

impl FnResolver {
    pub fn new(select: impl Fn(&Selection<'_>) -> Vec<Value> + 'static) -> Self {
        Self {
            select: Box::new(select),
            schema: None,
            value: None,
        }
    }

    pub fn with_schema(mut self, f: impl Fn(&[Value]) -> Option<Value> + 'static) -> Self {
        self.schema = Some(Box::new(f));
        self
    }

    pub fn with_value(mut self, f: impl Fn(&[Value]) -> Option<Value> + 'static) -> Self {
        self.value = Some(Box::new(f));
        self
    }
}

impl FieldResolver for FnResolver {
    fn select(&self, selection: &Selection<'_>) -> Vec<Value> {
        (self.select)(selection)
    }

    fn schema(&self, inputs: &[Value]) -> Option<Value> {
        self.schema.as_ref().and_then(|f| f(inputs))
    }

    fn value(&self, inputs: &[Value]) -> Option<Value> {
        self.value.as_ref().and_then(|f| f(inputs))
    }
}

/// Resolvers available to a form, by name.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Box<dyn FieldResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        resolver: impl FieldResolver + 'static,
    ) -> &mut Self {
        self.resolvers.insert(name.into(), Box::new(resolver));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn FieldResolver> {
        self.resolvers.get(name).map(|r| r.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// Memoization of resolver outputs, keyed by resolver, stage and selected inputs.
pub trait FieldCache {
    fn get(&self, key: &str) -> Option<Option<Value>>;
    fn put(&self, key: String, output: Option<Value>);
}

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl FieldCache for NoCache {
    fn get(&self, _key: &str) -> Option<Option<Value>> {
        None
    }

    fn put(&self, _key: String, _output: Option<Value>) {}
}

/// In-memory cache for a single form instance.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: RefCell<HashMap<String, Option<Value>>>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl FieldCache for MemoCache {
    fn get(&self, key: &str) -> Option<Option<Value>> {
        self.entries.borrow().get(key).cloned()
    }

    fn put(&self, key: String, output: Option<Value>) {
        self.entries.borrow_mut().insert(key, output);
    }
}

/// A field's effective schema and value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub schema: Value,
    pub value: Option<Value>,
}

/// Resolve the effective schema and value of the field at `path`.
///
/// Without a `resolver` key the schema is returned unchanged and the value
/// is the data at `path`. Object fields never carry a value; their children
/// resolve their own.
///
/// # Errors
///
/// Returns `ResolveError::UnknownFieldResolver` when the named resolver is
/// not registered.
pub fn resolve_field(
    schema: &Value,
    values: &Value,
    path: &[PathSegment],
    form_context: &Value,
    resolvers: &ResolverRegistry,
    cache: &dyn FieldCache,
) -> Result<ResolvedField, ResolveError> {
    let selection = Selection {
        values,
        path,
        form_context,
    };

    let mut resolved_schema = schema.clone();
    if let Some((name, resolver)) = lookup(schema, resolvers)? {
        let partial = run(cache, name, "schema", resolver, &selection, |r, inputs| {
            r.schema(inputs)
        });
        if let (Value::Object(target), Some(Value::Object(partial))) =
            (&mut resolved_schema, partial)
        {
            target.extend(partial);
        }
    }

    if schema_type(schema) == Some("object") {
        return Ok(ResolvedField {
            schema: resolved_schema,
            value: None,
        });
    }

    // The override may itself name a different resolver for the value.
    let value = match lookup(&resolved_schema, resolvers)? {
        Some((name, resolver)) => {
            run(cache, name, "value", resolver, &selection, |r, inputs| r.value(inputs))
        }
        None => None,
    };
    let value = value.or_else(|| get_value(path, Some(values)).cloned());

    Ok(ResolvedField {
        schema: resolved_schema,
        value,
    })
}

fn lookup<'s, 'r>(
    schema: &'s Value,
    resolvers: &'r ResolverRegistry,
) -> Result<Option<(&'s str, &'r dyn FieldResolver)>, ResolveError> {
    let Some(name) = schema.get(RESOLVER_KEY) else {
        return Ok(None);
    };
    let Some(name) = name.as_str() else {
        return Err(ResolveError::InvalidSchema {
            message: format!("\"{}\" must be a resolver name, got {}", RESOLVER_KEY, name),
        });
    };
    resolvers
        .get(name)
        .map(|resolver| Some((name, resolver)))
        .ok_or_else(|| ResolveError::UnknownFieldResolver {
            name: name.to_string(),
        })
}

fn run(
    cache: &dyn FieldCache,
    name: &str,
    stage: &str,
    resolver: &dyn FieldResolver,
    selection: &Selection<'_>,
    output: impl Fn(&dyn FieldResolver, &[Value]) -> Option<Value>,
) -> Option<Value> {
    let inputs = resolver.select(selection);
    let key = cache_key(name, stage, &inputs);
    if let Some(hit) = cache.get(&key) {
        return hit;
    }
    debug!(resolver = name, stage, "running field resolver");
    let result = output(resolver, &inputs);
    cache.put(key, result.clone());
    result
}

fn cache_key(name: &str, stage: &str, inputs: &[Value]) -> String {
    let mut key = Map::new();
    key.insert("resolver".into(), name.into());
    key.insert("stage".into(), stage.into());
    key.insert("inputs".into(), Value::Array(inputs.to_vec()));
    Value::Object(key).to_string()
}
