//! CLI command implementations

pub mod chunk;
pub mod config;
pub mod generate;
pub mod serve;
pub mod status;
pub mod usage;

use anyhow::{bail, Context, Result};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use studypack_core::{
    open_tracker, ActorKey, Config, GeminiClient, QuotaConfig, QuotaStore, StudyPackGenerator,
    StudyPackOptions,
};
use tracing::debug;

/// Network origin recorded for requests made from this machine
const LOCAL_ORIGIN: &str = "local";

/// Read piped stdin; `None` when stdin is a terminal or empty
fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(if buf.trim().is_empty() { None } else { Some(buf) })
}

/// Notes from an argument, a file, or stdin, in that order
pub(crate) fn read_notes(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = inline {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    match read_stdin()? {
        Some(text) => Ok(text),
        None => bail!("No notes provided. Pass them as an argument, with --file, or on stdin"),
    }
}

pub(crate) fn local_actor(user: Option<&str>) -> ActorKey {
    ActorKey::resolve(user, Some(LOCAL_ORIGIN))
}

/// Quota settings for one-shot commands.
///
/// Each invocation is a fresh process, so the memory store would forget every
/// charge on exit. Those commands always count usage in the sqlite store.
pub(crate) fn local_quota(config: &Config) -> QuotaConfig {
    let mut quota = config.quota.clone();
    if quota.store == QuotaStore::Memory {
        debug!("Using the sqlite quota store for a one-shot command");
        quota.store = QuotaStore::Sqlite;
    }
    quota
}

/// Wire a tracker for `quota` and the Gemini client into a generator
pub(crate) async fn build_generator(
    config: &Config,
    quota: &QuotaConfig,
) -> Result<StudyPackGenerator> {
    let tracker = open_tracker(quota)
        .await
        .context("Failed to open usage tracker")?;
    let client = Arc::new(GeminiClient::from_config(&config.gemini));

    Ok(StudyPackGenerator::new(tracker, client).with_options(StudyPackOptions::from(config)))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
