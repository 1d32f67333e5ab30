//! Per-render execution context handed to tag handlers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::TagError;

/// Caller-supplied environment for one render call.
///
/// Handlers read host fields from it (a page's `title`, site `config`, ...).
/// Cloning is cheap; async handlers receive their own clone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    locals: Arc<Map<String, Value>>,
    source: Option<Arc<str>>,
}

impl RenderContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, TagError> {
        match value {
            Value::Object(map) => Ok(Self {
                locals: Arc::new(map),
                source: None,
            }),
            other => Err(TagError::invalid_argument(format!(
                "render context must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Build a context from any serializable struct or map.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, TagError> {
        let value = serde_json::to_value(value)
            .map_err(|err| TagError::invalid_argument(format!("invalid render context: {err}")))?;
        Self::from_value(value)
    }

    /// Name the document being rendered; errors report it in their location.
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source = Some(Arc::from(path.into()));
        self
    }

    /// Set a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.locals).insert(key.into(), value.into());
        self
    }

    /// Read a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(key)
    }

    /// Read a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// All fields.
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    /// Path of the document being rendered, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
