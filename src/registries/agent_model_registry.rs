use crate::contexts::{AgentModelRegistry, ExecutionError, Model};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Model used for agents the registry does not mention
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// File-based implementation of AgentModelRegistry
/// Loads agent-to-model mappings from a YAML file
#[derive(Clone, Debug)]
pub struct FileAgentModelRegistry {
    registry_path: PathBuf,
    default_model: String,
}

impl FileAgentModelRegistry {
    /// Creates a new FileAgentModelRegistry
    ///
    /// # Arguments
    /// * `registry_path` - Optional path to registry file (defaults to "agents/agent_model_registry.yml")
    /// * `default_model` - Model to use if agent not found in registry
    pub fn new(registry_path: Option<PathBuf>, default_model: Option<String>) -> Self {
        Self {
            registry_path: registry_path
                .unwrap_or_else(|| PathBuf::from("agents/agent_model_registry.yml")),
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Loads the registry from the file
    fn load_registry(&self) -> Result<HashMap<String, String>, ExecutionError> {
        if !self.registry_path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.registry_path).map_err(|e| {
            ExecutionError::ExecutionFailed(format!("Failed to read agent model registry: {}", e))
        })?;

        parse_registry(&content, &self.default_model)
    }
}

impl AgentModelRegistry for FileAgentModelRegistry {
    fn get_model(&self, agent_name: &str) -> Result<Model, ExecutionError> {
        let registry = self.load_registry()?;

        let name = registry
            .get(agent_name)
            .cloned()
            .unwrap_or_else(|| self.default_model.clone());

        Ok(Model { name })
    }
}

/// Parses the YAML registry file into agent -> model name.
/// Accepts both `agent: model` and `agent: {model: ...}` entries
fn parse_registry(
    yaml_content: &str,
    default_model: &str,
) -> Result<HashMap<String, String>, ExecutionError> {
    use yaml_rust::{Yaml, YamlLoader};

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| ExecutionError::ExecutionFailed(format!("Invalid registry YAML: {}", e)))?;

    let mut registry = HashMap::new();
    let Some(hash) = docs.first().and_then(|doc| doc.as_hash()) else {
        return Ok(registry);
    };

    for (key, value) in hash {
        let Some(agent) = key.as_str() else {
            continue;
        };

        let model = if let Some(name) = value.as_str() {
            name.to_string()
        } else if let Some(entry) = value.as_hash() {
            entry
                .get(&Yaml::String("model".to_string()))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| default_model.to_string())
        } else {
            default_model.to_string()
        };

        registry.insert(agent.to_string(), model);
    }

    Ok(registry)
}
