//! Gemini CLI completion backend.
//!
//! Implements [`CompletionClient`] by running the official `gemini` CLI in
//! non-interactive mode, handling process spawning, output parsing and error
//! classification.

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::GeminiConfig;
use crate::model::{ChatMessage, Role};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Client for the Gemini CLI
pub struct GeminiClient {
    /// Path to the gemini binary
    binary_path: PathBuf,

    /// Model passed with `-m`
    model: String,

    /// Timeout in seconds (0 = no timeout)
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(binary_path: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model: model.into(),
            timeout_secs: 120,
        }
    }

    pub fn from_config(config: &GeminiConfig) -> Self {
        Self::new(&config.binary, &config.model).with_timeout(config.timeout_secs)
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Get the version of the gemini CLI
    pub async fn version(&self) -> Result<String, CompletionError> {
        let output = Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(CompletionError::Unavailable(
                self.binary_path.display().to_string(),
            ))
        }
    }

    async fn run(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-p")
            .arg(prompt)
            .arg("-m")
            .arg(&self.model)
            .arg("--output-format")
            .arg("json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(self.timeout_secs),
                cmd.output(),
            )
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout_secs))??
        } else {
            cmd.output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!("Gemini CLI exit code: {:?}", output.status.code());

        if !output.status.success() {
            return Err(classify_failure(output.status.code().unwrap_or(-1), stderr));
        }

        Ok(stdout)
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::from_config(&GeminiConfig::default())
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    /// The CLI has no sampling flags, so `temperature` and `max_tokens`
    /// are not forwarded.
    #[instrument(skip(self, request), fields(model = %self.model, prompt_chars = request.prompt_chars()))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let prompt = build_prompt(&request);
        let stdout = self.run(&prompt).await?;

        let text = parse_output(&stdout);
        if text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(text)
    }

    async fn check_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

fn classify_failure(exit_code: i32, stderr: String) -> CompletionError {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication") || lower.contains("login") {
        return CompletionError::AuthenticationError(stderr);
    }
    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("429") {
        return CompletionError::RateLimited(stderr);
    }
    CompletionError::ProcessFailed { exit_code, stderr }
}

/// Flatten role-tagged messages into a single CLI prompt
fn build_prompt(request: &CompletionRequest) -> String {
    let mut system = Vec::new();
    let mut conversation = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system.push(msg.content.as_str()),
            Role::User => conversation.push(format!("User: {}", msg.content)),
            Role::Assistant => conversation.push(format!("Assistant: {}", msg.content)),
        }
    }

    let users: Vec<&ChatMessage> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let body = match users.as_slice() {
        [only] if only.role == Role::User => only.content.clone(),
        _ => conversation.join("\n\n"),
    };

    let mut prompt = if system.is_empty() {
        body
    } else {
        format!("{}\n\n{}", system.join("\n\n"), body)
    };

    if let Some(schema) = &request.output_schema {
        prompt.push_str(&format!(
            "\n\nRespond with valid JSON only, matching this JSON schema:\n{}\nDo not include markdown code fences or any other text.",
            schema
        ));
    }

    prompt
}

/// Extract the response text from `--output-format json` output
fn parse_output(output: &str) -> String {
    let trimmed = output.trim();

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => extract_text_from_gemini_json(&value),
        Err(_) => trimmed.to_string(),
    }
}

fn extract_text_from_gemini_json(value: &serde_json::Value) -> String {
    for field in ["response", "text", "content", "output"] {
        if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
            return text.to_string();
        }
    }

    if let Some(text) = value.as_str() {
        return text.to_string();
    }

    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_single_user() {
        let req = CompletionRequest::new(vec![ChatMessage::user("Hello")]);
        assert_eq!(build_prompt(&req), "Hello");
    }

    #[test]
    fn test_build_prompt_with_system() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
        ]);
        assert_eq!(build_prompt(&req), "You are helpful\n\nHello");
    }

    #[test]
    fn test_build_prompt_conversation() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there!"),
            ChatMessage::user("How are you?"),
        ]);
        let prompt = build_prompt(&req);
        assert!(prompt.starts_with("You are helpful"));
        assert!(prompt.contains("User: Hello"));
        assert!(prompt.contains("Assistant: Hi there!"));
        assert!(prompt.contains("User: How are you?"));
    }

    #[test]
    fn test_build_prompt_appends_schema() {
        let req = CompletionRequest::new(vec![ChatMessage::user("List facts")])
            .with_output_schema(serde_json::json!({"type": "array"}));
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Respond with valid JSON only"));
        assert!(prompt.contains(r#"{"type":"array"}"#));
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output(r#"{"response": "Done"}"#), "Done");
        assert_eq!(parse_output("  plain text \n"), "plain text");
        assert_eq!(parse_output(r#""quoted""#), "quoted");
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(1, "Error 429: quota exhausted".into()),
            CompletionError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure(1, "Please login first".into()),
            CompletionError::AuthenticationError(_)
        ));
        assert!(matches!(
            classify_failure(2, "boom".into()),
            CompletionError::ProcessFailed { exit_code: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let client = GeminiClient::new("/nonexistent/gemini-binary", "gemini-2.5-flash");
        assert!(!client.check_available().await);
        assert!(matches!(
            client.version().await,
            Err(CompletionError::SpawnError(_))
        ));
        let err = client
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::SpawnError(_)));
    }
}
