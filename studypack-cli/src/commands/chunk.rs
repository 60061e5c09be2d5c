//! `studypack chunk` command - Preview chunk boundaries

use super::read_notes;
use anyhow::Result;
use std::path::PathBuf;
use studypack_core::{chunk_text, ChunkOptions, Config};

pub fn run(config: Config, file: Option<PathBuf>, max_chars: Option<usize>) -> Result<()> {
    let notes = read_notes(None, file.as_deref())?;

    let mut options = ChunkOptions::from(&config.generation);
    if let Some(max) = max_chars {
        anyhow::ensure!(max > 0, "--max-chars must be greater than zero");
        options = options.with_max_chunk_chars(max);
    }

    let chunks = chunk_text(&notes, &options);

    println!(
        "{} chars → {} chunk(s) (max {} chars per chunk)\n",
        notes.trim().chars().count(),
        chunks.len(),
        options.max_chunk_chars
    );

    for (i, chunk) in chunks.iter().enumerate() {
        let first_line = chunk.lines().next().unwrap_or_default();
        let preview: String = first_line.chars().take(60).collect();
        println!(
            "  [{:>3}] {:>5} chars  {}{}",
            i + 1,
            chunk.chars().count(),
            preview,
            if first_line.chars().count() > 60 { "…" } else { "" }
        );
    }

    Ok(())
}
