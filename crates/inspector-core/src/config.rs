use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::description::ExecutionContextDescription;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Binding name cannot be empty")]
    EmptyBindingName,
}

/// Bridge configuration as written in a TOML file. Every field is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialBridgeConfig {
    pub context: Option<PartialContextConfig>,
    pub bindings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialContextConfig {
    pub id: Option<i32>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub unique_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// The execution context the host's runtime target describes.
    pub context: ExecutionContextDescription,
    /// Bindings installed through the target controller at startup.
    pub bindings: Vec<String>,
}

impl BridgeConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let partial: PartialBridgeConfig = toml::from_str(contents)?;
        Self::from_partial(partial)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), "Loaded bridge config");
        Self::from_toml_str(&contents)
    }

    pub fn from_partial(partial: PartialBridgeConfig) -> Result<Self, ConfigError> {
        let mut context = ExecutionContextDescription::default();
        if let Some(partial_context) = partial.context {
            if let Some(id) = partial_context.id {
                context.id = id;
            }
            if let Some(kind) = partial_context.kind {
                context.kind = kind;
            }
            if let Some(name) = partial_context.name {
                context.name = name;
            }
            context.unique_id = partial_context.unique_id;
        }

        Self {
            context,
            bindings: Vec::new(),
        }
        .with_bindings(partial.bindings.unwrap_or_default())
    }

    /// Adds bindings, skipping ones already present.
    pub fn with_bindings(
        mut self,
        bindings: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        for binding in bindings {
            if binding.trim().is_empty() {
                return Err(ConfigError::EmptyBindingName);
            }
            if !self.bindings.contains(&binding) {
                self.bindings.push(binding);
            }
        }
        Ok(self)
    }
}
