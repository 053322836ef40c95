use super::Citation;
use crate::retrieval::RetrievedPassage;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

/// Result of looking for and decoding the fenced JSON block
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    NoBlockFound,
    MalformedJson { block: String, error: String },
    Parsed {
        /// `None` when the key is absent or null
        answer: Option<String>,
        /// Citation entries before validation; empty when absent or not a list
        raw_citations: Vec<Value>,
    },
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("fence pattern is valid")
    })
}

/// Contents of the first ```json fenced block, trimmed
pub fn extract_json_block(text: &str) -> Option<&str> {
    fence_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

pub fn parse_response(text: &str) -> ParseOutcome {
    let Some(block) = extract_json_block(text) else {
        return ParseOutcome::NoBlockFound;
    };

    let value: Value = match serde_json::from_str(block) {
        Ok(value) => value,
        Err(e) => {
            return ParseOutcome::MalformedJson {
                block: block.to_string(),
                error: e.to_string(),
            }
        }
    };

    let Value::Object(mut object) = value else {
        return ParseOutcome::MalformedJson {
            block: block.to_string(),
            error: "top-level JSON value is not an object".to_string(),
        };
    };

    let answer = match object.remove("answer") {
        None | Some(Value::Null) => None,
        Some(Value::String(answer)) => Some(answer),
        Some(other) => Some(other.to_string()),
    };

    let raw_citations = match object.remove("citations") {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!("'citations' is not a list ({}); ignoring", kind(&other));
            Vec::new()
        }
    };

    ParseOutcome::Parsed {
        answer,
        raw_citations,
    }
}

/// Keep entries that are objects carrying both `text` and `source`
pub fn validate_citations(entries: &[Value]) -> Vec<Citation> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let field = |name: &str| match entry.get(name) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            match (field("text"), field("source")) {
                (Some(text), Some(source)) => Some(Citation { text, source }),
                _ => {
                    warn!("Skipping invalid citation format at index {}: {}", i, entry);
                    None
                }
            }
        })
        .collect()
}

/// Whether the citation text occurs in a passage carrying its source
///
/// Matching ignores differences in whitespace. A citation may name either the
/// passage label shown to the model or the underlying source name.
pub fn citation_is_grounded(
    citation: &Citation,
    passages: &[RetrievedPassage],
    labels: &[String],
) -> bool {
    let needle = normalize_whitespace(&citation.text);
    if needle.is_empty() {
        return false;
    }

    passages
        .iter()
        .zip(labels)
        .filter(|(passage, label)| {
            label.as_str() == citation.source || passage.source == citation.source
        })
        .any(|(passage, _)| normalize_whitespace(&passage.text).contains(&needle))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
