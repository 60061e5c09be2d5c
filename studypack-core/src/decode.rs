//! Decoding of key points and flashcards from raw model output.
//!
//! The model is asked for JSON but is not guaranteed to comply, so each
//! decoder accepts a JSON array (optionally wrapped in a markdown fence or
//! surrounded by prose) and falls back to a line-based format. Decoding
//! never fails; unusable input yields an empty list.

use crate::model::StudyPackResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// A single key point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub id: String,
    pub text: String,
}

/// A question/answer card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// Decoded structured parts of a study pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedStudyPack {
    pub key_points: Vec<KeyPoint>,
    pub flashcards: Vec<Flashcard>,
}

impl From<&StudyPackResult> for DecodedStudyPack {
    fn from(result: &StudyPackResult) -> Self {
        Self {
            key_points: parse_key_points(&result.key_points),
            flashcards: parse_flashcards(&result.flashcards),
        }
    }
}

fn bullet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]\s*|\d+[.)]\s+)").expect("valid bullet regex"))
}

fn inline_card_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*Q\s*[:\-]?\s*(.+?)\s+A\s*[:\-]\s*(.+)$").expect("valid card regex")
    })
}

fn question_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*Q\s*[:\-]\s*(.+)$").expect("valid question regex"))
}

fn answer_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*A\s*[:\-]\s*(.+)$").expect("valid answer regex"))
}

/// Parse key points from a JSON array or a bulleted / numbered list
pub fn parse_key_points(raw: &str) -> Vec<KeyPoint> {
    let texts: Vec<String> = match extract_json_array(raw) {
        Some(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["text", "point"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        None => raw
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .map(|line| bullet_regex().replace(line, "").trim().to_string())
            .collect(),
    };

    texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(i, text)| KeyPoint {
            id: (i + 1).to_string(),
            text,
        })
        .collect()
}

/// Parse flashcards from a JSON array or `Q: ... A: ...` lines
pub fn parse_flashcards(raw: &str) -> Vec<Flashcard> {
    let pairs = match extract_json_array(raw) {
        Some(items) => items
            .iter()
            .filter_map(|item| {
                let question = first_str(item, &["question", "q"])?;
                let answer = first_str(item, &["answer", "a"])?;
                Some((question, answer))
            })
            .collect(),
        None => parse_card_lines(raw),
    };

    pairs
        .into_iter()
        .map(|(q, a)| (q.trim().to_string(), a.trim().to_string()))
        .filter(|(q, a)| !q.is_empty() && !a.is_empty())
        .enumerate()
        .map(|(i, (question, answer))| Flashcard {
            id: (i + 1).to_string(),
            question,
            answer,
        })
        .collect()
}

/// First of `keys` holding a string, number or boolean, as text
fn first_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Cards on one line (`Q: x A: y`) or on consecutive lines (`Q: x` / `A: y`)
fn parse_card_lines(raw: &str) -> Vec<(String, String)> {
    let mut cards = Vec::new();
    let mut pending_question: Option<String> = None;

    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let line = bullet_regex().replace(line, "");

        if let Some(question) = &pending_question {
            if let Some(caps) = answer_line_regex().captures(&line) {
                cards.push((question.clone(), caps[1].to_string()));
                pending_question = None;
                continue;
            }
        }

        if let Some(caps) = inline_card_regex().captures(&line) {
            cards.push((caps[1].to_string(), caps[2].to_string()));
            pending_question = None;
        } else if let Some(caps) = question_line_regex().captures(&line) {
            pending_question = Some(caps[1].to_string());
        }
    }

    cards
}

/// Locate a JSON array in text that may carry fences or surrounding prose
fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let trimmed = text.trim();

    let mut candidates = vec![trimmed.to_string()];

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let inner = after_fence[..end].trim();
            // Skip a language tag such as `json`
            let inner = match inner.find(['[', '{']) {
                Some(pos) => &inner[pos..],
                None => inner,
            };
            candidates.push(inner.to_string());
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    candidates.iter().find_map(|candidate| {
        match serde_json::from_str::<Value>(candidate).ok()? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UsageSnapshot;

    #[test]
    fn test_key_points_from_json() {
        let points = parse_key_points(r#"["Mitosis has four phases", " DNA replicates first "]"#);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "1");
        assert_eq!(points[1].text, "DNA replicates first");
    }

    #[test]
    fn test_key_points_from_fenced_json() {
        let raw = "Here you go:\n```json\n[\"alpha\", \"beta\"]\n```";
        let texts: Vec<String> = parse_key_points(raw).into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_key_points_from_object_items() {
        let points = parse_key_points(r#"[{"text": "one"}, {"point": "two"}, 3]"#);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].text, "two");
    }

    #[test]
    fn test_key_points_from_bullets() {
        let raw = "- First idea\n* Second idea\n\n3. Third idea\n• Fourth idea";
        let texts: Vec<String> = parse_key_points(raw).into_iter().map(|p| p.text).collect();
        assert_eq!(
            texts,
            vec!["First idea", "Second idea", "Third idea", "Fourth idea"]
        );
    }

    #[test]
    fn test_numbered_marker_needs_whitespace() {
        let raw = "3.14 is pi\n2) Second idea\n10. Tenth idea";
        let texts: Vec<String> = parse_key_points(raw).into_iter().map(|p| p.text).collect();
        assert_eq!(texts, vec!["3.14 is pi", "Second idea", "Tenth idea"]);
    }

    #[test]
    fn test_flashcards_from_json() {
        let raw = r#"[
            {"question": "What is osmosis?", "answer": "Water diffusion"},
            {"q": "Unit of force?", "a": "Newton"},
            {"question": "Missing answer"}
        ]"#;
        let cards = parse_flashcards(raw);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].question, "Unit of force?");
        assert_eq!(cards[1].answer, "Newton");
        assert_eq!(cards[1].id, "2");
    }

    #[test]
    fn test_flashcards_with_scalar_answers() {
        let raw = r#"[
            {"question": "What is 2+2?", "answer": 4},
            {"question": "Year of Magna Carta?", "answer": 1215},
            {"q": "Is water polar?", "a": true},
            {"question": "Nested?", "answer": {"x": 1}}
        ]"#;
        let cards = parse_flashcards(raw);
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].answer, "4");
        assert_eq!(cards[1].answer, "1215");
        assert_eq!(cards[2].answer, "true");
    }

    #[test]
    fn test_flashcards_from_inline_lines() {
        let raw = "Q: What is ATP? A: Energy currency\nq- Who wrote Origin? a- Darwin\nnoise";
        let cards = parse_flashcards(raw);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "What is ATP?");
        assert_eq!(cards[0].answer, "Energy currency");
        assert_eq!(cards[1].answer, "Darwin");
    }

    #[test]
    fn test_flashcards_from_paired_lines() {
        let raw = "1. Q: Define entropy\n   A: Measure of disorder\nQ: Speed of light?\nA: 3e8 m/s";
        let cards = parse_flashcards(raw);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "Define entropy");
        assert_eq!(cards[0].answer, "Measure of disorder");
        assert_eq!(cards[1].answer, "3e8 m/s");
    }

    #[test]
    fn test_unparseable_input_is_empty() {
        assert!(parse_flashcards("no cards here").is_empty());
        assert!(parse_key_points("").is_empty());
    }

    #[test]
    fn test_decode_study_pack() {
        let result = StudyPackResult {
            summary: "s".to_string(),
            key_points: r#"["k"]"#.to_string(),
            flashcards: r#"[{"question": "q", "answer": "a"}]"#.to_string(),
            usage: UsageSnapshot::new(1, 10),
            chunks_processed: 1,
        };
        let decoded = DecodedStudyPack::from(&result);
        assert_eq!(decoded.key_points.len(), 1);
        assert_eq!(decoded.flashcards[0].answer, "a");
    }
}
