//! The slice of a script engine the bridge depends on.
//!
//! The bridge never owns an engine. It only needs to define callable
//! globals and, for hosts driving the engine, to call them. Everything
//! here is touched exclusively on the script-execution domain.

mod in_memory;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use in_memory::InMemoryScriptRuntime;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ScriptValue {
    /// Converts a JSON scalar. Arrays and objects have no counterpart here.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ScriptValue::Null),
            Value::Bool(b) => Some(ScriptValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ScriptValue::Number),
            Value::String(s) => Some(ScriptValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Number(value)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Error,
    TypeError,
    ReferenceError,
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptErrorKind::Error => "Error",
            ScriptErrorKind::TypeError => "TypeError",
            ScriptErrorKind::ReferenceError => "ReferenceError",
        };
        f.write_str(name)
    }
}

/// An exception thrown inside the script runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptErrorKind::Error,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptErrorKind::TypeError,
            message: message.into(),
        }
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptErrorKind::ReferenceError,
            message: message.into(),
        }
    }
}

/// A host-implemented function callable from script.
pub type HostFunction =
    Arc<dyn Fn(&[ScriptValue]) -> Result<ScriptValue, ScriptError> + Send + Sync>;

pub trait ScriptRuntime: Send {
    /// Defines (or redefines) a callable property on the global object.
    fn set_global_function(
        &mut self,
        name: &str,
        arity: usize,
        function: HostFunction,
    ) -> Result<(), ScriptError>;

    /// Invokes a global function the way script code would.
    fn call_global(&mut self, name: &str, args: &[ScriptValue])
    -> Result<ScriptValue, ScriptError>;
}
