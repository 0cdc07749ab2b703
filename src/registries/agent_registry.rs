use crate::contexts::{AgentRegistry, PopulateError};
use std::fs;
use std::path::PathBuf;

/// File-based implementation of AgentRegistry
/// Loads prompt templates from YAML files in the agents/ directory
#[derive(Clone, Debug)]
pub struct FileAgentRegistry {
    agents_dir: PathBuf,
}

impl FileAgentRegistry {
    /// Creates a new FileAgentRegistry
    ///
    /// # Arguments
    /// * `agents_dir` - Optional path to agents directory (defaults to "agents")
    pub fn new(agents_dir: Option<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.unwrap_or_else(|| PathBuf::from("agents")),
        }
    }

    /// Fails early when any of `agent_names` has no template file
    pub fn ensure_agents(&self, agent_names: &[&str]) -> Result<(), PopulateError> {
        for name in agent_names {
            if !self.agent_path(name).exists() {
                return Err(PopulateError::AgentNotFound(name.to_string()));
            }
        }
        Ok(())
    }

    fn agent_path(&self, agent_name: &str) -> PathBuf {
        self.agents_dir.join(format!("{}.yml", agent_name))
    }
}

impl AgentRegistry for FileAgentRegistry {
    fn get_specification(&self, agent_name: &str) -> Result<String, PopulateError> {
        let agent_path = self.agent_path(agent_name);

        if !agent_path.exists() {
            return Err(PopulateError::AgentNotFound(agent_name.to_string()));
        }

        fs::read_to_string(&agent_path)
            .map_err(|e| {
                PopulateError::InvalidSpecification(format!(
                    "Failed to read agent template {}: {}",
                    agent_path.display(),
                    e
                ))
            })
            .and_then(|content| extract_prompt(&content))
    }
}

/// Extracts the prompt field from a YAML agent template
fn extract_prompt(yaml_content: &str) -> Result<String, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidSpecification(format!("Invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(PopulateError::InvalidSpecification(
            "Empty YAML document".to_string(),
        ));
    };

    match doc["prompt"].as_str() {
        Some(prompt) => Ok(prompt.to_string()),
        None => Err(PopulateError::InvalidSpecification(
            "No prompt field found in agent template".to_string(),
        )),
    }
}
