//! Shared data models for StudyPack.
//!
//! This module contains types used across the application for
//! requests, responses, and internal data structures.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Role of a message sent to the completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation mode, selecting prompt framing for every call in a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Simple,
    Exam,
    Detailed,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 3] = [
        GenerationMode::Simple,
        GenerationMode::Exam,
        GenerationMode::Detailed,
    ];

    /// Sampling temperature used for this mode
    pub fn temperature(self) -> f32 {
        match self {
            GenerationMode::Exam => 0.3,
            GenerationMode::Simple | GenerationMode::Detailed => 0.6,
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Simple => write!(f, "simple"),
            GenerationMode::Exam => write!(f, "exam"),
            GenerationMode::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(GenerationMode::Simple),
            "exam" => Ok(GenerationMode::Exam),
            "detailed" => Ok(GenerationMode::Detailed),
            other => Err(format!(
                "unknown mode '{}', expected one of: simple, exam, detailed",
                other
            )),
        }
    }
}

/// Partition key for quota and rate state.
///
/// Authenticated callers are keyed by user id, everyone else by network origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorKey(String);

impl ActorKey {
    /// Resolve the key for a caller
    pub fn resolve(user_id: Option<&str>, network_origin: Option<&str>) -> Self {
        let user_id = user_id.map(str::trim).filter(|s| !s.is_empty());
        let origin = network_origin.map(str::trim).filter(|s| !s.is_empty());

        match (user_id, origin) {
            (Some(id), _) => ActorKey(format!("user:{}", id)),
            (None, Some(origin)) => ActorKey(format!("ip:{}", origin)),
            (None, None) => ActorKey("ip:unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Daily usage for one actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub used_today: u32,
    pub daily_limit: u32,
    pub remaining_today: u32,
}

impl UsageSnapshot {
    pub fn new(used_today: u32, daily_limit: u32) -> Self {
        Self {
            used_today,
            daily_limit,
            remaining_today: daily_limit.saturating_sub(used_today),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_today >= self.daily_limit
    }
}

/// Study pack generation request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudyPackRequest {
    /// Study material; must be non-empty after trimming
    pub content: String,
    #[serde(default)]
    pub mode: GenerationMode,
}

/// Output of one study pack generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudyPackResult {
    pub summary: String,
    /// Raw model output; a JSON array of strings when the model complied
    pub key_points: String,
    /// Raw model output; a JSON array of question/answer objects when the model complied
    pub flashcards: String,
    pub usage: UsageSnapshot,
    pub chunks_processed: usize,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: None,
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(message, "rate_limit_exceeded").with_code("too_many_requests")
    }

    pub fn daily_limit(message: impl Into<String>) -> Self {
        Self::new(message, "daily_limit_reached").with_code("forbidden")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(message, "internal_error")
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub completion_available: bool,
    pub quota_store: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_key_prefers_user_id() {
        let key = ActorKey::resolve(Some("42"), Some("10.0.0.1"));
        assert_eq!(key.as_str(), "user:42");
    }

    #[test]
    fn test_actor_key_falls_back_to_origin() {
        assert_eq!(
            ActorKey::resolve(None, Some("10.0.0.1")).as_str(),
            "ip:10.0.0.1"
        );
        assert_eq!(ActorKey::resolve(Some("  "), None).as_str(), "ip:unknown");
        assert_eq!(ActorKey::resolve(None, None).as_str(), "ip:unknown");
    }

    #[test]
    fn test_actor_keys_do_not_collide_across_kinds() {
        assert_ne!(
            ActorKey::resolve(Some("1.2.3.4"), None),
            ActorKey::resolve(None, Some("1.2.3.4"))
        );
    }

    #[test]
    fn test_generation_mode_parsing() {
        assert_eq!("exam".parse::<GenerationMode>(), Ok(GenerationMode::Exam));
        assert_eq!(
            " Detailed ".parse::<GenerationMode>(),
            Ok(GenerationMode::Detailed)
        );
        assert!("casual".parse::<GenerationMode>().is_err());
        assert_eq!(GenerationMode::default(), GenerationMode::Simple);
    }

    #[test]
    fn test_request_mode_defaults_to_simple() {
        let req: StudyPackRequest = serde_json::from_str(r#"{"content": "notes"}"#).unwrap();
        assert_eq!(req.mode, GenerationMode::Simple);
    }

    #[test]
    fn test_usage_snapshot_serializes_camel_case() {
        let usage = UsageSnapshot::new(3, 10);
        let json = serde_json::to_value(usage).unwrap();
        assert_eq!(json["usedToday"], 3);
        assert_eq!(json["dailyLimit"], 10);
        assert_eq!(json["remainingToday"], 7);
    }

    #[test]
    fn test_usage_snapshot_never_negative() {
        let usage = UsageSnapshot::new(12, 10);
        assert_eq!(usage.remaining_today, 0);
        assert!(usage.is_exhausted());
    }

    #[test]
    fn test_api_error_serialization() {
        let error = ApiError::rate_limited("slow down");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("rate_limit_exceeded"));
        assert!(json.contains("too_many_requests"));
    }
}
