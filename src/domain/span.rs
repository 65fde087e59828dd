//! Labeled entity spans.
//!
//! Spans are emitted by the sequence tagger and by the regex rules of the
//! term dictionary. Offsets are character offsets (not bytes) so they line
//! up with training corpora written by other tools.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed entity label set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityLabel {
    Equipment,
    EquipmentId,
    Date,
    ErrorCode,
    Time,
    Component,
    Symptom,
    Action,
    Urgency,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 9] = [
        EntityLabel::Equipment,
        EntityLabel::EquipmentId,
        EntityLabel::Date,
        EntityLabel::ErrorCode,
        EntityLabel::Time,
        EntityLabel::Component,
        EntityLabel::Symptom,
        EntityLabel::Action,
        EntityLabel::Urgency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Equipment => "EQUIPMENT",
            EntityLabel::EquipmentId => "EQUIPMENT_ID",
            EntityLabel::Date => "DATE",
            EntityLabel::ErrorCode => "ERROR_CODE",
            EntityLabel::Time => "TIME",
            EntityLabel::Component => "COMPONENT",
            EntityLabel::Symptom => "SYMPTOM",
            EntityLabel::Action => "ACTION",
            EntityLabel::Urgency => "URGENCY",
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown entity label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for EntityLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// A labeled character range in the input text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Character offset of the first char
    pub start: usize,
    /// Character offset one past the last char
    pub end: usize,
    pub label: EntityLabel,
    /// Covered text (copied so spans can outlive the input)
    pub text: String,
}

impl Span {
    /// Build a span from character offsets, copying the covered text
    pub fn from_chars(text: &str, start: usize, end: usize, label: EntityLabel) -> Self {
        let covered: String = text.chars().skip(start).take(end.saturating_sub(start)).collect();
        Self {
            start,
            end,
            label,
            text: covered,
        }
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Convert a byte offset into a character offset
///
/// Offsets past the end clamp to the character count.
pub fn byte_to_char_offset(text: &str, byte: usize) -> usize {
    let byte = byte.min(text.len());
    text[..floor_char_boundary(text, byte)].chars().count()
}

fn floor_char_boundary(text: &str, mut byte: usize) -> usize {
    while byte > 0 && !text.is_char_boundary(byte) {
        byte -= 1;
    }
    byte
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_roundtrip_names() {
        for label in EntityLabel::ALL {
            assert_eq!(label.as_str().parse::<EntityLabel>().unwrap(), label);
        }
        assert!("NUMBER".parse::<EntityLabel>().is_err());
    }

    #[test]
    fn test_label_serde_matches_corpus_names() {
        let json = serde_json::to_string(&EntityLabel::ErrorCode).unwrap();
        assert_eq!(json, "\"ERROR_CODE\"");
    }

    #[test]
    fn test_span_from_char_offsets() {
        let text = "Шпиндель станка 2 вибрирует";
        let span = Span::from_chars(text, 9, 16, EntityLabel::Equipment);
        assert_eq!(span.text, "станка ");
        let span = Span::from_chars(text, 0, 8, EntityLabel::Component);
        assert_eq!(span.text, "Шпиндель");
    }

    #[test]
    fn test_byte_to_char_offset() {
        let text = "Ошибка E15";
        // "Ошибка" is 6 chars, 12 bytes
        assert_eq!(byte_to_char_offset(text, 12), 6);
        assert_eq!(byte_to_char_offset(text, 13), 7);
        assert_eq!(byte_to_char_offset(text, 1000), 10);
    }

    #[test]
    fn test_overlap() {
        let span = Span::from_chars("abcdef", 1, 3, EntityLabel::Time);
        assert!(span.overlaps(2, 4));
        assert!(!span.overlaps(3, 5));
    }
}
