//! OpenAI-compatible chat-completion backend for the generation service.

use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::contexts::agent_runner::{ExecutionError, GenerationService, Model};
use crate::data::{Message, Transcript};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Connection settings for the chat-completion endpoint
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServiceSettings {
    /// Reads `API_KEY` and `API_BASE`, loading a `.env` file first if present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_base = std::env::var("API_BASE")
            .ok()
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Self {
            api_base,
            api_key,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'r> {
    model: &'r str,
    messages: &'r [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking chat-completion client.
///
/// The HTTP client is built per call so the service can be shared across
/// worker threads and constructed inside an async runtime.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    settings: ServiceSettings,
}

impl ChatCompletionClient {
    pub fn new(settings: ServiceSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }
}

impl GenerationService for ChatCompletionClient {
    fn invoke(&self, model: &Model, transcript: &Transcript) -> Result<String, ExecutionError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| ExecutionError::ExecutionFailed("API_KEY is not set".to_string()))?;

        let client = HttpClient::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| ExecutionError::ExecutionFailed(format!("Failed to build HTTP client: {}", e)))?;

        let request = ChatRequest {
            model: &model.name,
            messages: transcript.messages(),
            temperature: 0.0,
        };

        log::debug!(
            "Calling {} with {} message(s) on {}",
            model.name,
            transcript.len(),
            self.settings.endpoint()
        );

        let response = client
            .post(self.settings.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(|e| ExecutionError::ExecutionFailed(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExecutionError::ExecutionFailed(format!(
                "Service answered {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .map_err(|e| ExecutionError::InvalidResponse(e.to_string()))?;
        parse_reply(&body)
    }
}

/// Extracts `choices[0].message.content` from a response body
fn parse_reply(body: &str) -> Result<String, ExecutionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ExecutionError::InvalidResponse(format!("Malformed response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ExecutionError::InvalidResponse("Response carries no message content".to_string()))
}
