use serde::Serialize;
use serde_json;
use std::fmt;

use crate::data::Transcript;

/// Errors that can occur during prompt population
#[derive(Debug)]
pub enum PopulateError {
    MissingMandatoryPlaceholder(String),
    InvalidPlaceholderPath(String),
    AgentNotFound(String),
    InvalidSpecification(String),
}

impl fmt::Display for PopulateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PopulateError::MissingMandatoryPlaceholder(ph) => {
                write!(f, "Required placeholder '{}' could not be resolved", ph)
            }
            PopulateError::InvalidPlaceholderPath(path) => {
                write!(f, "Invalid path '{}' in placeholder", path)
            }
            PopulateError::AgentNotFound(name) => {
                write!(f, "Agent '{}' not found in registry", name)
            }
            PopulateError::InvalidSpecification(details) => {
                write!(f, "Agent specification is invalid: {}", details)
            }
        }
    }
}

impl std::error::Error for PopulateError {}

/// Errors that can occur while calling the generation service
#[derive(Debug)]
pub enum ExecutionError {
    ModelNotFound(String),
    ExecutionFailed(String),
    InvalidResponse(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::ModelNotFound(name) => {
                write!(f, "Model for agent '{}' not found", name)
            }
            ExecutionError::ExecutionFailed(details) => {
                write!(f, "Generation service call failed: {}", details)
            }
            ExecutionError::InvalidResponse(details) => {
                write!(f, "Generation service returned an unusable response: {}", details)
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Errors that can occur in the agent runner
#[derive(Debug)]
pub enum AgentRunnerError {
    Populate(PopulateError),
    Execution(ExecutionError),
}

impl fmt::Display for AgentRunnerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgentRunnerError::Populate(e) => write!(f, "{}", e),
            AgentRunnerError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AgentRunnerError {}

impl From<PopulateError> for AgentRunnerError {
    fn from(e: PopulateError) -> Self {
        AgentRunnerError::Populate(e)
    }
}

impl From<ExecutionError> for AgentRunnerError {
    fn from(e: ExecutionError) -> Self {
        AgentRunnerError::Execution(e)
    }
}

/// A populated prompt ready to seed a transcript
#[derive(Debug, Clone)]
pub struct AgentSpecification {
    pub prompt: String,
}

/// The result of executing an agent
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
}

/// A model the generation service can run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
}

/// Trait for loading prompt templates by agent name
pub trait AgentRegistry {
    /// Load a prompt template by agent name
    fn get_specification(&self, agent_name: &str) -> Result<String, PopulateError>;
}

/// Trait for resolving execution models by agent name
pub trait AgentModelRegistry {
    /// Get the model to use for a given agent
    fn get_model(&self, agent_name: &str) -> Result<Model, ExecutionError>;
}

/// The external generation service.
///
/// Given the conversation so far, returns the next assistant reply or
/// fails. Retries and timeouts belong to the implementation, not callers.
pub trait GenerationService: Send + Sync {
    fn invoke(&self, model: &Model, transcript: &Transcript) -> Result<String, ExecutionError>;
}

impl<S: GenerationService + ?Sized> GenerationService for &S {
    fn invoke(&self, model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
        (**self).invoke(model, transcript)
    }
}

/// Populates an agent's prompt from its input and runs it for one reply
pub struct AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    /// The agent name
    agent: String,
    /// Input data for template population
    input: T,
    /// Registry for loading prompt templates
    agent_registry: &'a R,
    /// Registry for resolving execution models
    agent_model_registry: &'a M,
}

impl<'a, T, R, M> AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    /// Creates a new AgentRunner
    ///
    /// # Arguments
    /// * `agent` - The agent name
    /// * `input` - The input data for template population
    /// * `agent_registry` - Registry for loading prompt templates
    /// * `agent_model_registry` - Registry for resolving execution models
    pub fn new(agent: &str, input: T, agent_registry: &'a R, agent_model_registry: &'a M) -> Self {
        Self {
            agent: agent.to_string(),
            input,
            agent_registry,
            agent_model_registry,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Loads the agent's template and fills it with values from the input
    pub fn populate(&self) -> Result<AgentSpecification, PopulateError> {
        let template = self.agent_registry.get_specification(&self.agent)?;
        let populated = self.replace_placeholders(&template)?;

        Ok(AgentSpecification { prompt: populated })
    }

    /// Resolves the model the agent runs on
    pub fn model(&self) -> Result<Model, ExecutionError> {
        self.agent_model_registry.get_model(&self.agent)
    }

    /// Runs the agent as a single-turn conversation
    pub fn run(&self, service: &dyn GenerationService) -> Result<ExecutionResult, AgentRunnerError> {
        let specification = self.populate()?;
        let model = self.model()?;

        let transcript = Transcript::seeded(specification.prompt);
        let output = service.invoke(&model, &transcript)?;

        Ok(ExecutionResult { output })
    }

    /// Helper: Replace placeholders in a template
    ///
    /// Supports:
    /// - Mandatory: {{input.prop_name}}
    /// - Optional: {{input.prop_name?}}
    /// - Nested: {{input.prop1.prop2}}
    fn replace_placeholders(&self, template: &str) -> Result<String, PopulateError> {
        let input_json = serde_json::to_value(&self.input)
            .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?;

        let mut result = template.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("{{") {
            let start = offset + start;
            let Some(end_pos) = result[start..].find("}}") else {
                break;
            };
            let end = start + end_pos;

            let placeholder = result[start + 2..end].trim();
            let (path, is_optional) = match placeholder.strip_suffix('?') {
                Some(path) => (path, true),
                None => (placeholder, false),
            };

            match resolve_path(&input_json, path)? {
                Some(value) => {
                    let replacement = match value {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        serde_json::Value::Null => String::new(),
                        other => serde_json::to_string(other)
                            .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?,
                    };

                    // substituted text is never rescanned for placeholders
                    result.replace_range(start..end + 2, &replacement);
                    offset = start + replacement.len();
                }
                None if is_optional => {
                    result.replace_range(start..end + 2, "");
                    offset = start;
                }
                None => {
                    return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string()));
                }
            }
        }

        Ok(result)
    }
}

/// Helper: Resolve a dotted path such as `input.prop1.prop2`
fn resolve_path<'v>(
    value: &'v serde_json::Value,
    path: &str,
) -> Result<Option<&'v serde_json::Value>, PopulateError> {
    let parts: Vec<&str> = path.split('.').collect();

    if parts.is_empty() || parts[0] != "input" {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in &parts[1..] {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}
