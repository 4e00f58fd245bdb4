use serde::{Deserialize, Serialize};

use crate::compile::CompilerOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid engine config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine settings. Every field has a default, so an empty document is a
/// valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Name the payload is bound to in event transformations without a
    /// `source`.
    pub event_binding: String,

    /// Upper bound on simultaneously running children per dynamic region.
    pub max_region_instances: Option<usize>,

    /// Write process variables back to the store after every operation.
    pub persist_variables: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_binding: "event".to_string(),
            max_region_instances: None,
            persist_variables: true,
        }
    }
}

impl EngineConfig {
    /// Parses JSON when the document looks like a JSON object, YAML otherwise.
    pub fn from_str_auto(input: &str) -> Result<Self, ConfigError> {
        if input.trim_start().starts_with('{') {
            Ok(serde_json::from_str(input)?)
        } else if input.trim().is_empty() {
            Ok(Self::default())
        } else {
            Ok(serde_yaml::from_str(input)?)
        }
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            event_binding: self.event_binding.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = EngineConfig::from_str_auto("maxRegionInstances: 4\n").unwrap();
        assert_eq!(cfg.max_region_instances, Some(4));
        assert_eq!(cfg.event_binding, "event");
        assert!(cfg.persist_variables);
        assert_eq!(EngineConfig::from_str_auto("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn json_documents_are_detected() {
        let cfg = EngineConfig::from_str_auto(r#"{"eventBinding": "msg", "persistVariables": false}"#)
            .unwrap();
        assert_eq!(cfg.compiler_options().event_binding, "msg");
        assert!(!cfg.persist_variables);
        assert!(matches!(
            EngineConfig::from_str_auto("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
