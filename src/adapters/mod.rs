//! Adapter interfaces for external systems.
//!
//! Remote annotators are an alternative black-box extractor: an LLM behind
//! HTTP that receives a prompt embedding the report and answers with a JSON
//! object. Malformed answers are returned as raw text, never raised.

pub mod dashboard;
pub mod ollama;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use dashboard::DashboardLink;
pub use ollama::OllamaAnnotator;

/// Errors that prevent a remote annotator from answering at all
#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("Remote annotator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote annotator timed out after {0:?}")]
    Timeout(Duration),
}

/// Entities in the remote annotator's JSON contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntities {
    #[serde(default)]
    pub equipment: Option<String>,

    /// Equipment identifier; models answer with either a string or a number
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: Option<String>,

    #[serde(default)]
    pub symptom: Option<String>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub urgency: Option<String>,
}

/// Outcome of one remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RemoteExtraction {
    Parsed(RemoteEntities),
    /// Non-200 status or a payload that is not a JSON object
    Raw { raw_response: String },
}

impl RemoteExtraction {
    pub fn entities(&self) -> Option<&RemoteEntities> {
        match self {
            RemoteExtraction::Parsed(entities) => Some(entities),
            RemoteExtraction::Raw { .. } => None,
        }
    }
}

/// Trait for remote entity annotators
#[async_trait]
pub trait RemoteAnnotator: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Extract entities from one report
    async fn annotate(&self, text: &str) -> Result<RemoteExtraction, AnnotatorError>;
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Interpret the model's generated text
///
/// Code fences are stripped; the remainder must start with `{` and parse as
/// a JSON object, otherwise the text comes back as `Raw`.
pub fn parse_generation(generated: &str) -> RemoteExtraction {
    let raw = || RemoteExtraction::Raw {
        raw_response: generated.to_string(),
    };
    let cleaned = strip_fences(generated);
    if !cleaned.starts_with('{') {
        return raw();
    }
    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value)
            .map(RemoteExtraction::Parsed)
            .unwrap_or_else(|_| raw()),
        _ => raw(),
    }
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = match text.find("```json") {
        Some(start) => &text[start + "```json".len()..],
        None => match text.strip_prefix("```") {
            Some(rest) => rest,
            None => return text,
        },
    };
    match inner.find("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let out = parse_generation(
            r#"{"equipment": "электродвигатель", "number": "12", "symptom": "коррозия", "action": "проверить", "urgency": "нормальный"}"#,
        );
        let entities = out.entities().unwrap();
        assert_eq!(entities.equipment.as_deref(), Some("электродвигатель"));
        assert_eq!(entities.number.as_deref(), Some("12"));
    }

    #[test]
    fn test_parse_fenced_json_with_numeric_id() {
        let out = parse_generation("Вот ответ:\n```json\n{\"equipment\": \"пресс\", \"number\": 7}\n```");
        let entities = out.entities().unwrap();
        assert_eq!(entities.number.as_deref(), Some("7"));
        assert_eq!(entities.symptom, None);
    }

    #[test]
    fn test_non_json_is_raw() {
        let out = parse_generation("Не могу определить оборудование");
        assert_eq!(
            out,
            RemoteExtraction::Raw {
                raw_response: "Не могу определить оборудование".to_string()
            }
        );
        assert!(matches!(parse_generation("{broken"), RemoteExtraction::Raw { .. }));
        assert!(matches!(parse_generation("[1, 2]"), RemoteExtraction::Raw { .. }));
    }

    #[test]
    fn test_raw_serializes_with_field_name() {
        let json = serde_json::to_string(&RemoteExtraction::Raw {
            raw_response: "oops".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"raw_response":"oops"}"#);
    }
}
