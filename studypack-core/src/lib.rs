//! # StudyPack Core
//!
//! Core library for StudyPack - turns study notes into a summary, key points
//! and flashcards using the Gemini CLI.
//!
//! This crate provides:
//! - Configuration management
//! - Text chunking and prompt construction
//! - Gemini CLI process wrapper
//! - Per-actor rate limiting and daily quotas (in memory or SQLite)
//! - The generation pipeline
//! - Decoding of key points and flashcards
//! - HTTP API server
//! - Shared data models

pub mod chunker;
pub mod completion;
pub mod config;
pub mod decode;
pub mod gemini;
pub mod model;
pub mod prompts;
pub mod quota;
pub mod server;
pub mod store;
pub mod study;

pub use chunker::{chunk_text, ChunkOptions};
pub use completion::{CompletionClient, CompletionError, CompletionRequest};
pub use config::{Config, ConsumePolicy, QuotaConfig, QuotaStore};
pub use decode::{parse_flashcards, parse_key_points, DecodedStudyPack, Flashcard, KeyPoint};
pub use gemini::GeminiClient;
pub use model::*;
pub use quota::{open_tracker, InMemoryTracker, QuotaError, QuotaLimits, UsageTracker};
pub use store::SqliteTracker;
pub use study::{StudyPackError, StudyPackGenerator, StudyPackOptions};
