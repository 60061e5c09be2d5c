//! Study pack generation.
//!
//! Admission control first (rate window, then daily quota), then a
//! map-reduce pass over the content: one summary per chunk in parallel,
//! then the merged summary, key points and flashcards in parallel. Any
//! completion failure fails the whole request.

use crate::chunker::{chunk_text, ChunkOptions};
use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::{Config, ConsumePolicy};
use crate::model::{ActorKey, ChatMessage, GenerationMode, StudyPackResult, UsageSnapshot};
use crate::prompts;
use crate::quota::{QuotaError, UsageTracker};
use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Errors surfaced to callers of [`StudyPackGenerator::generate`]
#[derive(Debug, Error)]
pub enum StudyPackError {
    #[error("Content must not be empty")]
    MalformedInput,

    #[error("Rate limit exceeded. Please wait a minute before generating again.")]
    RateLimitExceeded { limit: u32, window_secs: u64 },

    #[error("Daily limit reached ({used}/{limit}). Try again tomorrow.")]
    DailyLimitReached { used: u32, limit: u32 },

    #[error("Failed to generate study pack")]
    GenerationFailed,

    #[error("Quota store error: {0}")]
    Tracker(QuotaError),
}

impl From<QuotaError> for StudyPackError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::RateLimitExceeded {
                limit, window_secs, ..
            } => StudyPackError::RateLimitExceeded { limit, window_secs },
            QuotaError::DailyLimitReached { used, limit } => {
                StudyPackError::DailyLimitReached { used, limit }
            }
            other => StudyPackError::Tracker(other),
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, Copy)]
pub struct StudyPackOptions {
    pub chunk: ChunkOptions,
    pub consume: ConsumePolicy,
    /// Token cap forwarded with every completion call
    pub max_tokens: Option<u32>,
}

impl Default for StudyPackOptions {
    fn default() -> Self {
        Self {
            chunk: ChunkOptions::default(),
            consume: ConsumePolicy::default(),
            max_tokens: None,
        }
    }
}

impl From<&Config> for StudyPackOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk: ChunkOptions::from(&config.generation),
            consume: config.generation.consume,
            max_tokens: Some(config.gemini.max_tokens),
        }
    }
}

/// Texts produced by the completion calls of one request
struct GeneratedText {
    summary: String,
    key_points: String,
    flashcards: String,
}

/// Turns study material into a summary, key points and flashcards
pub struct StudyPackGenerator {
    tracker: Arc<dyn UsageTracker>,
    client: Arc<dyn CompletionClient>,
    options: StudyPackOptions,
}

impl StudyPackGenerator {
    pub fn new(tracker: Arc<dyn UsageTracker>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            tracker,
            client,
            options: StudyPackOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StudyPackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tracker(&self) -> &Arc<dyn UsageTracker> {
        &self.tracker
    }

    pub fn client(&self) -> &Arc<dyn CompletionClient> {
        &self.client
    }

    /// Today's usage for an actor
    pub async fn usage(&self, actor: &ActorKey) -> Result<UsageSnapshot, StudyPackError> {
        Ok(self.tracker.usage(actor).await?)
    }

    /// Generate a study pack for `content` on behalf of `actor`
    #[instrument(
        skip(self, actor, content, mode),
        fields(actor = %actor, mode = %mode, request_id = %Uuid::new_v4())
    )]
    pub async fn generate(
        &self,
        actor: &ActorKey,
        content: &str,
        mode: GenerationMode,
    ) -> Result<StudyPackResult, StudyPackError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StudyPackError::MalformedInput);
        }

        self.tracker.check_rate_limit(actor).await?;

        let usage = match self.options.consume {
            ConsumePolicy::BeforeGeneration => self.tracker.consume_daily_usage(actor).await?,
            ConsumePolicy::AfterSuccess => {
                let usage = self.tracker.usage(actor).await?;
                if usage.is_exhausted() {
                    return Err(StudyPackError::DailyLimitReached {
                        used: usage.used_today,
                        limit: usage.daily_limit,
                    });
                }
                usage
            }
        };

        let chunks = chunk_text(content, &self.options.chunk);
        info!(
            "Generating study pack from {} chars in {} chunk(s)",
            content.chars().count(),
            chunks.len()
        );

        let generated = self
            .run_completions(mode, content, &chunks)
            .await
            .map_err(|e| {
                error!("Study pack generation failed: {}", e);
                StudyPackError::GenerationFailed
            })?;

        let usage = match self.options.consume {
            ConsumePolicy::BeforeGeneration => usage,
            ConsumePolicy::AfterSuccess => self.tracker.consume_daily_usage(actor).await?,
        };

        info!(
            "Study pack ready ({} used, {} remaining today)",
            usage.used_today, usage.remaining_today
        );

        Ok(StudyPackResult {
            summary: generated.summary,
            key_points: generated.key_points,
            flashcards: generated.flashcards,
            usage,
            chunks_processed: chunks.len(),
        })
    }

    async fn run_completions(
        &self,
        mode: GenerationMode,
        content: &str,
        chunks: &[String],
    ) -> Result<GeneratedText, CompletionError> {
        let total = chunks.len();

        // Part summaries are joined in chunk order, whatever order they finish in
        let combined = if total > 1 {
            let parts = try_join_all(chunks.iter().enumerate().map(|(i, chunk)| {
                self.complete(mode, prompts::chunk_summary(mode, chunk, i, total), None)
            }))
            .await?;
            debug!("Summarized {} chunks", parts.len());
            Some(parts.join("\n\n"))
        } else {
            None
        };

        let (summary_messages, basis) = match &combined {
            Some(combined) => (prompts::merge_summary(mode, combined, total), combined.as_str()),
            None => (prompts::direct_summary(mode, content), content),
        };

        let (summary, key_points, flashcards) = tokio::try_join!(
            self.complete(mode, summary_messages, None),
            self.complete(
                mode,
                prompts::key_points(mode, basis),
                Some(prompts::key_points_schema())
            ),
            self.complete(
                mode,
                prompts::flashcards(mode, basis),
                Some(prompts::flashcards_schema())
            ),
        )?;

        Ok(GeneratedText {
            summary,
            key_points,
            flashcards,
        })
    }

    async fn complete(
        &self,
        mode: GenerationMode,
        messages: Vec<ChatMessage>,
        schema: Option<serde_json::Value>,
    ) -> Result<String, CompletionError> {
        let mut request = CompletionRequest::new(messages).with_temperature(mode.temperature());
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(schema) = schema {
            request = request.with_output_schema(schema);
        }

        let text = self.client.complete(request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::quota::{InMemoryTracker, QuotaLimits};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Completion client that answers by prompt kind and records every call
    #[derive(Default)]
    struct ScriptedClient {
        calls: Mutex<Vec<CompletionRequest>>,
        fail_on: Option<&'static str>,
    }

    impl ScriptedClient {
        fn failing_on(marker: &'static str) -> Self {
            Self {
                fail_on: Some(marker),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn user_text(request: &CompletionRequest) -> &str {
        request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    fn part_number(prompt: &str) -> Option<(usize, usize)> {
        let rest = prompt.strip_prefix("This is part ")?;
        let mut words = rest.split_whitespace();
        let index = words.next()?.parse().ok()?;
        words.next()?;
        let total = words.next()?.parse().ok()?;
        Some((index, total))
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push(request.clone());
            let prompt = user_text(&request).to_string();

            if let Some(marker) = self.fail_on {
                if prompt.contains(marker) {
                    return Err(CompletionError::Backend(format!("scripted failure: {}", marker)));
                }
            }

            if let Some((index, total)) = part_number(&prompt) {
                // Earlier parts finish last
                tokio::time::sleep(std::time::Duration::from_millis(
                    ((total - index) * 15) as u64,
                ))
                .await;
                return Ok(format!("summary of part {}", index));
            }
            if prompt.contains("JSON array of strings") {
                return Ok(r#"["Cells are the unit of life"]"#.to_string());
            }
            if prompt.contains("Create flashcards") {
                return Ok(r#"[{"question": "What is ATP?", "answer": "Energy currency"}]"#
                    .to_string());
            }
            if prompt.contains("Part summaries") {
                return Ok("merged summary".to_string());
            }
            Ok("direct summary".to_string())
        }
    }

    fn generator(
        client: Arc<ScriptedClient>,
        tracker: Arc<InMemoryTracker>,
        consume: ConsumePolicy,
    ) -> StudyPackGenerator {
        StudyPackGenerator::new(tracker, client).with_options(StudyPackOptions {
            consume,
            ..StudyPackOptions::default()
        })
    }

    fn roomy_tracker(daily_limit: u32) -> Arc<InMemoryTracker> {
        Arc::new(InMemoryTracker::new(QuotaLimits {
            daily_limit,
            rate_limit: 100,
            rate_window: Duration::seconds(60),
        }))
    }

    fn alice() -> ActorKey {
        ActorKey::resolve(Some("alice"), None)
    }

    fn lines(count: usize, width: usize) -> String {
        (0..count)
            .map(|i| format!("{:0>width$}", i, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_single_chunk_makes_three_calls() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            Arc::new(InMemoryTracker::default()),
            ConsumePolicy::BeforeGeneration,
        );

        let content = "Photosynthesis turns light into sugar. ".repeat(13);
        assert!(content.len() >= 500);

        let result = generator
            .generate(&alice(), &content, GenerationMode::Simple)
            .await
            .unwrap();

        assert_eq!(client.calls().len(), 3);
        assert_eq!(result.chunks_processed, 1);
        assert_eq!(result.summary, "direct summary");
        assert!(result.key_points.contains("unit of life"));
        assert!(result.flashcards.contains("ATP"));
        assert_eq!(result.usage, UsageSnapshot::new(1, 10));
    }

    #[tokio::test]
    async fn test_two_chunks_make_five_calls() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(10),
            ConsumePolicy::BeforeGeneration,
        );

        let content = lines(400, 9); // 3999 chars
        let result = generator
            .generate(&alice(), &content, GenerationMode::Exam)
            .await
            .unwrap();

        assert_eq!(result.chunks_processed, 2);
        assert_eq!(client.calls().len(), 5);
        assert_eq!(result.summary, "merged summary");
    }

    #[tokio::test]
    async fn test_chunk_outputs_merge_in_input_order() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(10),
            ConsumePolicy::BeforeGeneration,
        );

        let content = lines(800, 9); // three chunks
        let result = generator
            .generate(&alice(), &content, GenerationMode::Detailed)
            .await
            .unwrap();
        assert_eq!(result.chunks_processed, 3);

        let calls = client.calls();
        let merge = calls
            .iter()
            .map(user_text)
            .find(|p| p.contains("Part summaries"))
            .unwrap();
        assert!(merge.ends_with("summary of part 1\n\nsummary of part 2\n\nsummary of part 3"));

        // Key points and flashcards are extracted from the merged part summaries
        let key_points = calls
            .iter()
            .map(user_text)
            .find(|p| p.contains("JSON array of strings"))
            .unwrap();
        assert!(key_points.contains("summary of part 2"));
    }

    #[tokio::test]
    async fn test_mode_framing_applies_to_every_call() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(10),
            ConsumePolicy::BeforeGeneration,
        );

        generator
            .generate(&alice(), &lines(400, 9), GenerationMode::Exam)
            .await
            .unwrap();

        for call in client.calls() {
            assert_eq!(call.messages[0].role, Role::System);
            assert_eq!(
                call.messages[0].content,
                prompts::system_prompt(GenerationMode::Exam)
            );
            assert_eq!(call.temperature, Some(0.3));
        }
    }

    #[tokio::test]
    async fn test_structured_calls_carry_schema() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(10),
            ConsumePolicy::BeforeGeneration,
        );

        generator
            .generate(&alice(), "Short notes on osmosis.", GenerationMode::Simple)
            .await
            .unwrap();

        let with_schema = client
            .calls()
            .iter()
            .filter(|c| c.output_schema.is_some())
            .count();
        assert_eq!(with_schema, 2);
    }

    #[tokio::test]
    async fn test_final_call_failure_fails_request_after_consuming_quota() {
        let client = Arc::new(ScriptedClient::failing_on("Create flashcards"));
        let tracker = roomy_tracker(10);
        let generator = generator(
            client,
            Arc::clone(&tracker),
            ConsumePolicy::BeforeGeneration,
        );

        let result = generator
            .generate(&alice(), "Notes about enzymes.", GenerationMode::Simple)
            .await;
        assert!(matches!(result, Err(StudyPackError::GenerationFailed)));

        assert_eq!(tracker.usage(&alice()).await.unwrap().used_today, 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_skips_final_calls() {
        let client = Arc::new(ScriptedClient::failing_on("Part 2 of 2"));
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(10),
            ConsumePolicy::BeforeGeneration,
        );

        let result = generator
            .generate(&alice(), &lines(400, 9), GenerationMode::Simple)
            .await;
        assert!(matches!(result, Err(StudyPackError::GenerationFailed)));
        assert!(client
            .calls()
            .iter()
            .all(|c| part_number(user_text(c)).is_some()));
    }

    #[tokio::test]
    async fn test_after_success_policy_does_not_charge_failures() {
        let tracker = roomy_tracker(10);

        let failing = generator(
            Arc::new(ScriptedClient::failing_on("JSON array of strings")),
            Arc::clone(&tracker),
            ConsumePolicy::AfterSuccess,
        );
        assert!(failing
            .generate(&alice(), "Notes", GenerationMode::Simple)
            .await
            .is_err());
        assert_eq!(tracker.usage(&alice()).await.unwrap().used_today, 0);

        let working = generator(
            Arc::new(ScriptedClient::default()),
            Arc::clone(&tracker),
            ConsumePolicy::AfterSuccess,
        );
        let result = working
            .generate(&alice(), "Notes", GenerationMode::Simple)
            .await
            .unwrap();
        assert_eq!(result.usage.used_today, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_refuses_before_any_call() {
        let client = Arc::new(ScriptedClient::default());
        let tracker = Arc::new(InMemoryTracker::default());
        let generator = generator(
            Arc::clone(&client),
            Arc::clone(&tracker),
            ConsumePolicy::BeforeGeneration,
        );

        for _ in 0..5 {
            generator
                .generate(&alice(), "Notes", GenerationMode::Simple)
                .await
                .unwrap();
        }
        let calls_before = client.calls().len();

        let result = generator
            .generate(&alice(), "Notes", GenerationMode::Simple)
            .await;
        assert!(matches!(
            result,
            Err(StudyPackError::RateLimitExceeded {
                limit: 5,
                window_secs: 60
            })
        ));
        assert_eq!(client.calls().len(), calls_before);
        // A refused request never reaches the daily quota
        assert_eq!(tracker.usage(&alice()).await.unwrap().used_today, 5);
    }

    #[tokio::test]
    async fn test_daily_limit_refuses_before_any_call() {
        let client = Arc::new(ScriptedClient::default());
        let generator = generator(
            Arc::clone(&client),
            roomy_tracker(2),
            ConsumePolicy::BeforeGeneration,
        );

        for _ in 0..2 {
            generator
                .generate(&alice(), "Notes", GenerationMode::Simple)
                .await
                .unwrap();
        }

        let result = generator
            .generate(&alice(), "Notes", GenerationMode::Simple)
            .await;
        assert!(matches!(
            result,
            Err(StudyPackError::DailyLimitReached { used: 2, limit: 2 })
        ));
        assert_eq!(client.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_blank_content_is_rejected_without_side_effects() {
        let client = Arc::new(ScriptedClient::default());
        let tracker = Arc::new(InMemoryTracker::default());
        let generator = generator(
            Arc::clone(&client),
            Arc::clone(&tracker),
            ConsumePolicy::BeforeGeneration,
        );

        let result = generator
            .generate(&alice(), "   \n  ", GenerationMode::Simple)
            .await;
        assert!(matches!(result, Err(StudyPackError::MalformedInput)));
        assert!(client.calls().is_empty());
        assert_eq!(tracker.tracked_actors().await, 0);
        assert_eq!(tracker.usage(&alice()).await.unwrap().used_today, 0);
    }
}
