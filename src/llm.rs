//! Language-model client.
//!
//! [`LanguageModel`] is the seam the assistant talks to; [`OllamaClient`]
//! implements it over Ollama's HTTP API:
//!
//! - `POST /api/chat` with `stream: false` for generation, reading
//!   `message.content` from the reply.
//! - `GET /api/tags` for connection tests, checking that the model is served.
//!
//! Each call is one synchronous request bounded by the client timeout. Calls
//! are never retried.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::models::LlmTarget;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("could not connect to language model server: {0}")]
    Connection(String),
    #[error("language model request timed out: {0}")]
    Timeout(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid response from language model server: {0}")]
    InvalidResponse(String),
}

/// A single-turn request: optional system preamble plus the user message.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

pub trait LanguageModel: Send + Sync {
    /// Sends `prompt` to `target` and returns the generated text.
    fn generate(&self, prompt: &Prompt, target: &LlmTarget) -> Result<String, LlmError>;

    /// Checks that `target` is reachable and serves its model.
    fn test_connection(&self, target: &LlmTarget) -> Result<(), LlmError>;
}

pub struct OllamaClient {
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self) -> Result<reqwest::blocking::Client, LlmError> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &Prompt, target: &LlmTarget) -> Result<String, LlmError> {
        let base = base_url(&target.server_url);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt.user }));
        let body = serde_json::json!({
            "model": target.model,
            "messages": messages,
            "stream": false,
        });

        debug!(url = %base, model = %target.model, "sending chat request");
        let response = self
            .client()?
            .post(format!("{}/api/chat", base))
            .json(&body)
            .send()
            .map_err(|e| transport_error(e, base))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotFound(target.model.clone()));
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!("{}: {}", status, text)));
        }

        let parsed: ChatResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(base.to_string())
            } else {
                LlmError::InvalidResponse(e.to_string())
            }
        })?;
        parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no message".into()))
    }

    fn test_connection(&self, target: &LlmTarget) -> Result<(), LlmError> {
        let base = base_url(&target.server_url);
        let response = self
            .client()?
            .get(format!("{}/api/tags", base))
            .send()
            .map_err(|e| transport_error(e, base))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Connection(format!(
                "{} returned status {}",
                base, status
            )));
        }

        let tags: TagsResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if tags.models.iter().any(|m| model_matches(&m.name, &target.model)) {
            Ok(())
        } else {
            Err(LlmError::ModelNotFound(format!(
                "'{}' is not available at {}",
                target.model, base
            )))
        }
    }
}

fn base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn transport_error(e: reqwest::Error, base: &str) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(base.to_string())
    } else {
        LlmError::Connection(format!("is Ollama running at {}? {}", base, e))
    }
}

/// Whether a served model name satisfies a requested one.
///
/// A request without a tag matches the `latest` tag.
fn model_matches(served: &str, requested: &str) -> bool {
    if served == requested {
        return true;
    }
    let untagged = |s: &str| s.strip_suffix(":latest").map(str::to_string);
    untagged(served).as_deref() == Some(requested) || untagged(requested).as_deref() == Some(served)
}
