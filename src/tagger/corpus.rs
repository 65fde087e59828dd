//! Training corpus: annotated texts and their token-level BIO alignment.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::TrainingError;
use crate::annotate::tokenize;
use crate::domain::EntityLabel;

/// `{"entities": [[start, end, label], ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub entities: Vec<(usize, usize, String)>,
}

/// One annotated text; offsets are character offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Annotations)", into = "(String, Annotations)")]
pub struct TrainingExample {
    pub text: String,
    pub annotations: Annotations,
}

impl From<(String, Annotations)> for TrainingExample {
    fn from((text, annotations): (String, Annotations)) -> Self {
        Self { text, annotations }
    }
}

impl From<TrainingExample> for (String, Annotations) {
    fn from(example: TrainingExample) -> Self {
        (example.text, example.annotations)
    }
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, entities: Vec<(usize, usize, &str)>) -> Self {
        Self {
            text: text.into(),
            annotations: Annotations {
                entities: entities
                    .into_iter()
                    .map(|(s, e, l)| (s, e, l.to_string()))
                    .collect(),
            },
        }
    }
}

/// Labeled texts for supervised training
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingCorpus {
    pub examples: Vec<TrainingExample>,
}

impl TrainingCorpus {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples }
    }

    /// Parse `[[text, {"entities": [[s, e, label], ...]}], ...]`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid corpus: {}", path.display()))
    }

    pub fn extend(&mut self, other: TrainingCorpus) {
        self.examples.extend(other.examples);
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// BIO tag of one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bio {
    Outside,
    Begin(EntityLabel),
    Inside(EntityLabel),
}

impl Bio {
    pub fn label(&self) -> Option<EntityLabel> {
        match self {
            Bio::Outside => None,
            Bio::Begin(l) | Bio::Inside(l) => Some(*l),
        }
    }

    /// Every tag over the label set, `O` first
    pub fn all() -> Vec<Bio> {
        std::iter::once(Bio::Outside)
            .chain(
                EntityLabel::ALL
                    .iter()
                    .flat_map(|l| [Bio::Begin(*l), Bio::Inside(*l)]),
            )
            .collect()
    }

    pub fn parse(s: &str) -> Option<Bio> {
        if s == "O" {
            return Some(Bio::Outside);
        }
        let (prefix, label) = s.split_once('-')?;
        let label = label.parse().ok()?;
        match prefix {
            "B" => Some(Bio::Begin(label)),
            "I" => Some(Bio::Inside(label)),
            _ => None,
        }
    }
}

impl fmt::Display for Bio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bio::Outside => f.write_str("O"),
            Bio::Begin(l) => write!(f, "B-{}", l),
            Bio::Inside(l) => write!(f, "I-{}", l),
        }
    }
}

/// Token texts with gold tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedExample {
    pub words: Vec<String>,
    pub tags: Vec<Bio>,
}

/// Counters of spans dropped during alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlignmentStats {
    /// Label outside the enumerated set ("NUMBER", typos)
    pub unknown_labels: usize,
    /// Boundaries that cut through a token
    pub misaligned: usize,
}

/// Map character spans onto tokens
///
/// Surrounding whitespace inside a span is trimmed first. Out-of-range and
/// overlapping spans are errors; unknown labels and boundaries that cut a
/// token are skipped and counted.
pub fn align(example: &TrainingExample, stats: &mut AlignmentStats) -> Result<AlignedExample, TrainingError> {
    let chars: Vec<char> = example.text.chars().collect();
    let tokens = tokenize(&example.text);

    let mut accepted: Vec<(usize, usize, EntityLabel)> = Vec::new();
    for (start, end, label) in &example.annotations.entities {
        let (start, end) = (*start, *end);
        if start >= end || end > chars.len() {
            return Err(TrainingError::InvalidSpan {
                text: example.text.clone(),
                start,
                end,
            });
        }
        let label: EntityLabel = match label.parse() {
            Ok(label) => label,
            Err(_) => {
                warn!(label = %label, text = %example.text, "Skipping span with unknown label");
                stats.unknown_labels += 1;
                continue;
            }
        };

        let (mut s, mut e) = (start, end);
        while s < e && chars[s].is_whitespace() {
            s += 1;
        }
        while e > s && chars[e - 1].is_whitespace() {
            e -= 1;
        }
        let starts_token = tokens.iter().any(|t| t.start == s);
        let ends_token = tokens.iter().any(|t| t.end == e);
        if s == e || !starts_token || !ends_token {
            warn!(start, end, label = %label, text = %example.text, "Skipping misaligned span");
            stats.misaligned += 1;
            continue;
        }

        if accepted.iter().any(|(as_, ae, _)| s < *ae && *as_ < e) {
            return Err(TrainingError::OverlappingSpans {
                text: example.text.clone(),
                start,
                end,
            });
        }
        accepted.push((s, e, label));
    }

    let mut tags = vec![Bio::Outside; tokens.len()];
    for (s, e, label) in accepted {
        let mut first = true;
        for (i, token) in tokens.iter().enumerate() {
            if token.start >= s && token.end <= e {
                tags[i] = if first { Bio::Begin(label) } else { Bio::Inside(label) };
                first = false;
            }
        }
    }

    Ok(AlignedExample {
        words: tokens.iter().map(|t| t.text.to_string()).collect(),
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corpus_json() {
        let json = r#"[
            ["Шпиндель станка 2 вибрирует", {"entities": [[0, 8, "COMPONENT"], [9, 16, "EQUIPMENT"]]}],
            ["Пустой пример", {"entities": []}]
        ]"#;
        let corpus = TrainingCorpus::from_json(json).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.examples[0].annotations.entities[1], (9, 16, "EQUIPMENT".to_string()));
    }

    #[test]
    fn test_align_trims_whitespace() {
        let example = TrainingExample::new(
            "Шпиндель станка 2 вибрирует",
            vec![(0, 8, "COMPONENT"), (9, 16, "EQUIPMENT"), (18, 27, "SYMPTOM")],
        );
        let mut stats = AlignmentStats::default();
        let aligned = align(&example, &mut stats).unwrap();
        assert_eq!(
            aligned.tags,
            vec![
                Bio::Begin(EntityLabel::Component),
                Bio::Begin(EntityLabel::Equipment),
                Bio::Outside,
                Bio::Begin(EntityLabel::Symptom),
            ]
        );
        assert_eq!(stats, AlignmentStats::default());
    }

    #[test]
    fn test_align_skips_unknown_and_misaligned() {
        let example = TrainingExample::new(
            "Шпиндель станка 2 вибрирует",
            vec![(16, 17, "NUMBER"), (17, 26, "SYMPOM"), (18, 26, "SYMPTOM")],
        );
        let mut stats = AlignmentStats::default();
        let aligned = align(&example, &mut stats).unwrap();
        assert!(aligned.tags.iter().all(|t| *t == Bio::Outside));
        assert_eq!(stats.unknown_labels, 2);
        assert_eq!(stats.misaligned, 1);
    }

    #[test]
    fn test_align_multi_token_span() {
        let example = TrainingExample::new("Фрезерный станок стоит", vec![(0, 16, "EQUIPMENT")]);
        let aligned = align(&example, &mut AlignmentStats::default()).unwrap();
        assert_eq!(
            aligned.tags,
            vec![
                Bio::Begin(EntityLabel::Equipment),
                Bio::Inside(EntityLabel::Equipment),
                Bio::Outside
            ]
        );
    }

    #[test]
    fn test_align_rejects_invalid_and_overlapping() {
        let out_of_range = TrainingExample::new("станок", vec![(0, 50, "EQUIPMENT")]);
        assert!(matches!(
            align(&out_of_range, &mut AlignmentStats::default()),
            Err(TrainingError::InvalidSpan { .. })
        ));
        let overlapping = TrainingExample::new(
            "фрезерный станок",
            vec![(0, 16, "EQUIPMENT"), (10, 16, "COMPONENT")],
        );
        assert!(matches!(
            align(&overlapping, &mut AlignmentStats::default()),
            Err(TrainingError::OverlappingSpans { .. })
        ));
    }

    #[test]
    fn test_bio_display_and_parse() {
        for tag in Bio::all() {
            assert_eq!(Bio::parse(&tag.to_string()), Some(tag));
        }
        assert_eq!(Bio::parse("B-NUMBER"), None);
        assert_eq!(Bio::all().len(), 19);
    }
}
