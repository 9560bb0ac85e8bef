use std::collections::HashMap;

use super::{HostFunction, ScriptError, ScriptRuntime, ScriptValue};

enum GlobalValue {
    Value(ScriptValue),
    Function { arity: usize, function: HostFunction },
}

struct GlobalSlot {
    value: GlobalValue,
    writable: bool,
}

/// A global namespace without an interpreter behind it.
///
/// Hosts and tests use it as the script runtime: functions are defined and
/// called by name, plain values can be placed on the global object, and
/// individual globals can be frozen to make later assignments throw.
#[derive(Default)]
pub struct InMemoryScriptRuntime {
    globals: HashMap<String, GlobalSlot>,
}

impl InMemoryScriptRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global_value(&mut self, name: &str, value: ScriptValue) -> Result<(), ScriptError> {
        self.assign(name, GlobalValue::Value(value))
    }

    /// Makes an existing global read-only. Returns false if it does not exist.
    pub fn freeze_global(&mut self, name: &str) -> bool {
        match self.globals.get_mut(name) {
            Some(slot) => {
                slot.writable = false;
                true
            }
            None => false,
        }
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// The plain value stored under `name`, if it is not a function.
    pub fn global_value(&self, name: &str) -> Option<&ScriptValue> {
        match self.globals.get(name).map(|slot| &slot.value) {
            Some(GlobalValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn function_arity(&self, name: &str) -> Option<usize> {
        match self.globals.get(name).map(|slot| &slot.value) {
            Some(GlobalValue::Function { arity, .. }) => Some(*arity),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: GlobalValue) -> Result<(), ScriptError> {
        if !is_identifier(name) {
            return Err(ScriptError::new(format!(
                "Invalid global property name: {name:?}"
            )));
        }
        if let Some(slot) = self.globals.get(name)
            && !slot.writable
        {
            return Err(ScriptError::type_error(format!(
                "Cannot assign to read only property '{name}' of object '#<Object>'"
            )));
        }
        self.globals.insert(
            name.to_string(),
            GlobalSlot {
                value,
                writable: true,
            },
        );
        Ok(())
    }
}

impl ScriptRuntime for InMemoryScriptRuntime {
    fn set_global_function(
        &mut self,
        name: &str,
        arity: usize,
        function: HostFunction,
    ) -> Result<(), ScriptError> {
        self.assign(name, GlobalValue::Function { arity, function })
    }

    fn call_global(
        &mut self,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        match self.globals.get(name).map(|slot| &slot.value) {
            Some(GlobalValue::Function { function, .. }) => {
                let function = function.clone();
                function(args)
            }
            Some(GlobalValue::Value(_)) => Err(ScriptError::type_error(format!(
                "{name} is not a function"
            ))),
            None => Err(ScriptError::reference_error(format!(
                "{name} is not defined"
            ))),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
