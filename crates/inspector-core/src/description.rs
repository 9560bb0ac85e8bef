use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Immutable description of one script execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContextDescription {
    pub id: i32,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl Default for ExecutionContextDescription {
    fn default() -> Self {
        Self {
            id: 0,
            kind: String::new(),
            name: "<anonymous>".to_string(),
            unique_id: None,
        }
    }
}

impl ExecutionContextDescription {
    pub fn new(id: i32, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            name: name.into(),
            unique_id: None,
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// Protocol shape used by `Runtime.executionContextCreated`.
    pub fn to_protocol_json(&self) -> Value {
        let mut context = json!({
            "id": self.id,
            "origin": self.kind,
            "name": self.name,
        });
        if let (Some(unique_id), Some(object)) = (&self.unique_id, context.as_object_mut()) {
            object.insert("uniqueId".to_string(), Value::String(unique_id.clone()));
        }
        context
    }
}

/// Picks out execution contexts a binding subscription applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionContextSelector {
    All,
    ById(i32),
    ByName(String),
}

impl ExecutionContextSelector {
    pub fn matches(&self, description: &ExecutionContextDescription) -> bool {
        match self {
            ExecutionContextSelector::All => true,
            ExecutionContextSelector::ById(id) => description.id == *id,
            ExecutionContextSelector::ByName(name) => description.name == *name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContextSelectorSet {
    selectors: HashSet<ExecutionContextSelector>,
}

impl ExecutionContextSelectorSet {
    pub fn insert(&mut self, selector: ExecutionContextSelector) -> bool {
        self.selectors.insert(selector)
    }

    pub fn matches_any(&self, description: &ExecutionContextDescription) -> bool {
        self.selectors
            .iter()
            .any(|selector| selector.matches(description))
    }
}

impl FromIterator<ExecutionContextSelector> for ExecutionContextSelectorSet {
    fn from_iter<I: IntoIterator<Item = ExecutionContextSelector>>(iter: I) -> Self {
        Self {
            selectors: iter.into_iter().collect(),
        }
    }
}
