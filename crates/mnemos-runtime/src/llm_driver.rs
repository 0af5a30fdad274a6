//! [`LlmDriver`] – blocking OpenAI-compatible chat client.
//!
//! Talks to a locally-running model server that exposes
//! `/v1/chat/completions`, such as [Ollama](https://ollama.com)
//! (`http://localhost:11434`). Everything in the workspace is synchronous,
//! so the driver uses `reqwest::blocking`.
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemos_runtime::llm_driver::{ChatMessage, Completion, LlmDriver};
//!
//! let driver = LlmDriver::new("http://localhost:11434", "llama3");
//! let reply = driver.chat(&[
//!     ChatMessage::system("Answer in one word."),
//!     ChatMessage::user("What colour is the sky?"),
//! ]);
//!
//! // Same call through the two-message shorthand.
//! let reply = driver.complete("Answer in one word.", "What colour is the sky?");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from LLM driver operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion capability
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can answer a system + user prompt pair with text.
///
/// [`IntentClassifier`](crate::intent::IntentClassifier) depends on this
/// trait rather than on [`LlmDriver`] so tests can substitute a canned
/// model.
pub trait Completion {
    fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
}

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// A blocking client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and reuse; the underlying connection pool is shared.
pub struct LlmDriver {
    base_url: String,
    model: String,
    response_schema: Option<(String, serde_json::Value)>,
    client: reqwest::blocking::Client,
}

impl LlmDriver {
    /// Create a new driver pointing at `base_url` (e.g. `"http://localhost:11434"`)
    /// and using `model` (e.g. `"llama3"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            response_schema: None,
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Constrain every reply to `schema` through `response_format`.
    pub fn response_schema(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.response_schema = Some((name.into(), schema));
        self
    }

    /// Send `messages` to the model and return the assistant's reply text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    pub fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request(messages);
        debug!(model = %self.model, messages = messages.len(), "chat completion request");

        let response: ChatResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            response_format: self.response_schema.as_ref().map(|(name, schema)| {
                ResponseFormat {
                    kind: "json_schema",
                    json_schema: JsonSchemaFormat {
                        name: name.as_str(),
                        schema,
                    },
                }
            }),
        }
    }
}

impl Completion for LlmDriver {
    fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.chat(&[ChatMessage::system(system), ChatMessage::user(user)])
    }
}
