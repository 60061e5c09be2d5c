//! Completion service seam.
//!
//! The orchestrator talks to the language model only through
//! [`CompletionClient`]: role-tagged messages in, one text completion out.

use crate::model::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a completion backend
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion backend not available: {0}")]
    Unavailable(String),

    #[error("Failed to spawn completion process: {0}")]
    SpawnError(#[from] std::io::Error),

    #[error("Completion process failed with exit code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Upstream rate limit: {0}")]
    RateLimited(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Empty completion returned")]
    EmptyResponse,

    #[error("Completion backend error: {0}")]
    Backend(String),
}

/// One completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// JSON schema the output should conform to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            output_schema: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Total characters across all messages
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Opaque text completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion and return the generated text
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Whether the backend looks usable, for health reporting
    async fn check_available(&self) -> bool {
        true
    }
}
