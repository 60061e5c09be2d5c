//! `studypack generate` command - Build a study pack from notes

use super::{build_generator, local_actor, local_quota, read_notes};
use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use studypack_core::{Config, DecodedStudyPack, GenerationMode, StudyPackError};
use tracing::{debug, info};

pub async fn run(
    config: Config,
    content: Option<String>,
    file: Option<PathBuf>,
    mode: GenerationMode,
    user: Option<String>,
    json_output: bool,
) -> Result<()> {
    let notes = read_notes(content, file.as_deref())?;
    debug!("Notes: {} chars", notes.chars().count());

    let generator = build_generator(&config, &local_quota(&config)).await?;
    let actor = local_actor(user.as_deref());

    info!("Generating {} study pack for {}", mode, actor);

    let result = match generator.generate(&actor, &notes, mode).await {
        Ok(result) => result,
        Err(StudyPackError::GenerationFailed) => {
            anyhow::bail!(
                "Failed to generate study pack. Check that the Gemini CLI at '{}' is installed \
                 and signed in (rerun with --log-level debug for details).",
                config.gemini.binary
            )
        }
        Err(e) => return Err(e.into()),
    };
    let decoded = DecodedStudyPack::from(&result);

    if json_output {
        let output = json!({
            "summary": result.summary,
            "keyPoints": decoded.key_points,
            "flashcards": decoded.flashcards,
            "usage": result.usage,
            "chunksProcessed": result.chunks_processed,
            "raw": {
                "keyPoints": result.key_points,
                "flashcards": result.flashcards,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("📘 Summary ({} mode, {} chunk(s))\n", mode, result.chunks_processed);
    println!("{}\n", result.summary);

    println!("🔑 Key points");
    if decoded.key_points.is_empty() {
        println!("{}", result.key_points);
    }
    for point in &decoded.key_points {
        println!("  {}. {}", point.id, point.text);
    }

    println!("\n🃏 Flashcards");
    if decoded.flashcards.is_empty() {
        println!("{}", result.flashcards);
    }
    for card in &decoded.flashcards {
        println!("  Q{}: {}", card.id, card.question);
        println!("      {}", card.answer);
    }

    println!(
        "\n📊 Used {}/{} today ({} remaining)",
        result.usage.used_today, result.usage.daily_limit, result.usage.remaining_today
    );

    Ok(())
}
