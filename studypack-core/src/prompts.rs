//! Prompt construction for study pack generation.
//!
//! Every completion call in a request uses the same mode framing as its
//! system message; the user message carries the task.

use crate::model::{ChatMessage, GenerationMode};
use serde_json::{json, Value};

/// System framing for a mode
pub fn system_prompt(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Simple => {
            "You are a friendly study assistant who explains topics in plain, simple language \
             suitable for beginners. Avoid jargon unless you define it."
        }
        GenerationMode::Exam => {
            "You are an exam-revision coach. Focus on high-yield revision points, definitions \
             and the angles examiners commonly take."
        }
        GenerationMode::Detailed => {
            "You are an expert subject-matter tutor. Provide deep explanations including \
             mechanisms, examples and contextual understanding."
        }
    }
}

/// What a summary should contain in this mode
fn summary_intent(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Simple => {
            "Write a beginner-friendly summary as 5-8 short bullet points."
        }
        GenerationMode::Exam => {
            "Write exam-focused revision notes: list the key terms with one-line definitions, \
             note the likely question angles, and finish with quick-revision bullets."
        }
        GenerationMode::Detailed => {
            "Write a detailed summary that explains the underlying mechanisms, gives concrete \
             examples, and spells out cause-and-effect relationships."
        }
    }
}

/// Summary of one chunk of a longer text
pub fn chunk_summary(
    mode: GenerationMode,
    chunk: &str,
    index: usize,
    total: usize,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(mode)),
        ChatMessage::user(format!(
            "This is part {} of {} of a longer set of study notes. \
             Summarize only this part; later parts will be merged afterwards.\n\
             {}\n\nPart {} of {}:\n{}",
            index + 1,
            total,
            summary_intent(mode),
            index + 1,
            total,
            chunk
        )),
    ]
}

/// Summary of content short enough to fit in one call
pub fn direct_summary(mode: GenerationMode, content: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(mode)),
        ChatMessage::user(format!(
            "{}\n\nStudy notes:\n{}",
            summary_intent(mode),
            content
        )),
    ]
}

/// Merge of per-part summaries into one
pub fn merge_summary(mode: GenerationMode, combined: &str, parts: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(mode)),
        ChatMessage::user(format!(
            "The following are summaries of {} consecutive parts of the same study notes. \
             Merge them into one coherent summary. Remove repetition and keep the original \
             order of ideas.\n{}\n\nPart summaries:\n{}",
            parts,
            summary_intent(mode),
            combined
        )),
    ]
}

pub fn key_points(mode: GenerationMode, basis: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(mode)),
        ChatMessage::user(format!(
            "Extract the most important key points from the study material below.\n\
             Return ONLY a JSON array of strings, for example [\"point one\", \"point two\"]. \
             Do not include markdown or any text outside the array.\n\nStudy material:\n{}",
            basis
        )),
    ]
}

pub fn flashcards(mode: GenerationMode, basis: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(mode)),
        ChatMessage::user(format!(
            "Create flashcards for active recall from the study material below.\n\
             Return ONLY a JSON array of objects with \"question\" and \"answer\" string fields, \
             for example [{{\"question\": \"...\", \"answer\": \"...\"}}]. \
             Do not include markdown or any text outside the array.\n\nStudy material:\n{}",
            basis
        )),
    ]
}

pub fn key_points_schema() -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" }
    })
}

pub fn flashcards_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "answer": { "type": "string" }
            },
            "required": ["question", "answer"],
            "additionalProperties": false
        }
    })
}
