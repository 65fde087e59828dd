//! Term dictionary: canonical concepts, keyword rules and regex rules.
//!
//! The dictionary is plain data loaded from YAML. It is built once and then
//! shared read-only; nothing here knows about morphology. The matcher
//! normalizes variants against a `Normalizer` when it indexes them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{fold, ConceptClass};
use crate::domain::{byte_to_char_offset, EntityLabel, Span};

const BUILTIN_RU: &str = include_str!("../../resources/terms.ru.yaml");

/// Errors raised while loading a term dictionary
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("Duplicate canonical key in {class}: {key}")]
    DuplicateKey { class: ConceptClass, key: String },

    #[error("Empty canonical key in {0}")]
    EmptyKey(ConceptClass),

    #[error("Invalid {kind} pattern {pattern:?}: {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to parse term dictionary: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// One canonical concept with its surface variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub key: String,
    #[serde(default)]
    pub variants: Vec<String>,
}

/// High/low urgency keyword lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrgencyRules {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

/// Catch-all phrases implying a symptom concept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub concept: String,
    pub phrases: Vec<String>,
}

/// Placeholders used instead of empty fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub unknown_equipment: String,
    pub no_equipment_id: String,
    pub no_components: String,
    pub no_symptoms: String,
    pub no_actions: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            unknown_equipment: "Неизвестное оборудование".to_string(),
            no_equipment_id: "Не указан".to_string(),
            no_components: "Не указаны".to_string(),
            no_symptoms: "Симптомы не описаны".to_string(),
            no_actions: "Не указаны".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PatternFile {
    #[serde(default)]
    dates: Vec<String>,
    #[serde(default)]
    times: Vec<String>,
    #[serde(default)]
    error_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TermFile {
    #[serde(default)]
    equipment: Vec<TermEntry>,
    #[serde(default)]
    components: Vec<TermEntry>,
    #[serde(default)]
    symptoms: Vec<TermEntry>,
    #[serde(default)]
    actions: Vec<TermEntry>,
    #[serde(default)]
    urgency: UrgencyRules,
    #[serde(default)]
    triggers: Vec<TriggerRule>,
    #[serde(default)]
    equipment_context_verbs: Vec<String>,
    #[serde(default)]
    patterns: PatternFile,
    #[serde(default)]
    sentinels: Sentinels,
}

/// A compiled regex rule producing spans of one label
#[derive(Debug, Clone)]
pub struct PatternRule {
    label: EntityLabel,
    regex: Regex,
}

impl PatternRule {
    fn compile(label: EntityLabel, kind: &'static str, pattern: &str) -> Result<Self, DictionaryError> {
        let regex = Regex::new(pattern).map_err(|source| DictionaryError::InvalidPattern {
            kind,
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { label, regex })
    }

    pub fn label(&self) -> EntityLabel {
        self.label
    }

    /// All matches as character-offset spans (group 1 when the rule has one)
    pub fn find_spans(&self, text: &str) -> Vec<Span> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .filter(|m| !m.as_str().is_empty())
            .map(|m| Span {
                start: byte_to_char_offset(text, m.start()),
                end: byte_to_char_offset(text, m.end()),
                label: self.label,
                text: m.as_str().to_string(),
            })
            .collect()
    }
}

/// A surface form registered under more than one canonical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantOverlap {
    pub class: ConceptClass,
    pub variant: String,
    pub keys: Vec<String>,
}

/// The loaded term dictionary
#[derive(Debug, Clone)]
pub struct TermDictionary {
    equipment: Vec<TermEntry>,
    components: Vec<TermEntry>,
    symptoms: Vec<TermEntry>,
    actions: Vec<TermEntry>,
    urgency: UrgencyRules,
    triggers: Vec<TriggerRule>,
    equipment_context_verbs: Vec<String>,
    date_rules: Vec<PatternRule>,
    time_rules: Vec<PatternRule>,
    error_code_rules: Vec<PatternRule>,
    sentinels: Sentinels,
}

impl TermDictionary {
    /// The embedded Russian dictionary
    pub fn builtin_russian() -> Result<Self, DictionaryError> {
        Self::from_yaml(BUILTIN_RU)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read term dictionary: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid term dictionary: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, DictionaryError> {
        let file: TermFile = serde_yaml::from_str(yaml)?;

        for (class, entries) in [
            (ConceptClass::Equipment, &file.equipment),
            (ConceptClass::Component, &file.components),
            (ConceptClass::Symptom, &file.symptoms),
            (ConceptClass::Action, &file.actions),
        ] {
            validate_keys(class, entries)?;
        }

        let compile = |label, kind, patterns: &[String]| {
            patterns
                .iter()
                .map(|p| PatternRule::compile(label, kind, p))
                .collect::<Result<Vec<_>, _>>()
        };
        let date_rules = compile(EntityLabel::Date, "date", &file.patterns.dates)?;
        let time_rules = compile(EntityLabel::Time, "time", &file.patterns.times)?;
        let error_code_rules = compile(EntityLabel::ErrorCode, "error code", &file.patterns.error_codes)?;

        let dictionary = Self {
            equipment: file.equipment,
            components: file.components,
            symptoms: file.symptoms,
            actions: file.actions,
            urgency: fold_rules(file.urgency),
            triggers: file.triggers,
            equipment_context_verbs: file
                .equipment_context_verbs
                .iter()
                .map(|v| fold(v))
                .collect(),
            date_rules,
            time_rules,
            error_code_rules,
            sentinels: file.sentinels,
        };

        let overlaps = dictionary.overlaps();
        if !overlaps.is_empty() {
            let names: Vec<String> = overlaps
                .iter()
                .map(|o| format!("{}:{}", o.class, o.variant))
                .collect();
            warn!(
                count = overlaps.len(),
                variants = ?names,
                "Variants registered under several canonical keys"
            );
        }
        debug!(
            equipment = dictionary.equipment.len(),
            components = dictionary.components.len(),
            symptoms = dictionary.symptoms.len(),
            actions = dictionary.actions.len(),
            "term dictionary loaded"
        );

        Ok(dictionary)
    }

    /// Entries of one concept class, in definition order
    pub fn entries(&self, class: ConceptClass) -> &[TermEntry] {
        match class {
            ConceptClass::Equipment => &self.equipment,
            ConceptClass::Component => &self.components,
            ConceptClass::Symptom => &self.symptoms,
            ConceptClass::Action => &self.actions,
        }
    }

    pub fn urgency(&self) -> &UrgencyRules {
        &self.urgency
    }

    pub fn triggers(&self) -> &[TriggerRule] {
        &self.triggers
    }

    /// Lemmas of verbs that introduce an equipment noun ("сломался станок")
    pub fn equipment_context_verbs(&self) -> &[String] {
        &self.equipment_context_verbs
    }

    pub fn date_rules(&self) -> &[PatternRule] {
        &self.date_rules
    }

    pub fn time_rules(&self) -> &[PatternRule] {
        &self.time_rules
    }

    pub fn error_code_rules(&self) -> &[PatternRule] {
        &self.error_code_rules
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    /// Surface forms (keys or variants, lowercased) claimed by several keys
    /// of the same class
    pub fn overlaps(&self) -> Vec<VariantOverlap> {
        let mut result = Vec::new();
        for class in ConceptClass::ALL {
            let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for entry in self.entries(class) {
                let mut seen = HashSet::new();
                for form in std::iter::once(&entry.key).chain(entry.variants.iter()) {
                    let form = fold(form);
                    if seen.insert(form.clone()) {
                        owners.entry(form).or_default().push(entry.key.clone());
                    }
                }
            }
            result.extend(
                owners
                    .into_iter()
                    .filter(|(_, keys)| keys.len() > 1)
                    .map(|(variant, keys)| VariantOverlap {
                        class,
                        variant,
                        keys,
                    }),
            );
        }
        result
    }
}

fn validate_keys(class: ConceptClass, entries: &[TermEntry]) -> Result<(), DictionaryError> {
    let mut keys = HashSet::new();
    for entry in entries {
        let key = entry.key.trim().to_lowercase();
        if key.is_empty() {
            return Err(DictionaryError::EmptyKey(class));
        }
        if !keys.insert(key) {
            return Err(DictionaryError::DuplicateKey {
                class,
                key: entry.key.clone(),
            });
        }
    }
    Ok(())
}

fn fold_rules(rules: UrgencyRules) -> UrgencyRules {
    let fold_all = |words: Vec<String>| words.iter().map(|w| fold(w)).collect();
    UrgencyRules {
        high: fold_all(rules.high),
        low: fold_all(rules.low),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dictionary_loads() {
        let dict = TermDictionary::builtin_russian().unwrap();
        assert_eq!(dict.entries(ConceptClass::Equipment)[0].key, "станок");
        assert_eq!(dict.entries(ConceptClass::Component).len(), 8);
        assert!(dict.urgency().high.contains(&"срочно".to_string()));
        assert_eq!(dict.sentinels().no_equipment_id, "Не указан");
        assert_eq!(dict.equipment_context_verbs().len(), 3);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let yaml = r#"
equipment:
  - key: станок
    variants: [станка]
  - key: Станок
    variants: [фрезер]
"#;
        let err = TermDictionary::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateKey { class: ConceptClass::Equipment, .. }));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let yaml = "patterns:\n  times: ['(unclosed']\n";
        let err = TermDictionary::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, DictionaryError::InvalidPattern { kind: "time", .. }));
    }

    #[test]
    fn test_overlaps_reported() {
        let dict = TermDictionary::builtin_russian().unwrap();
        let overlaps = dict.overlaps();
        let fraser = overlaps
            .iter()
            .find(|o| o.class == ConceptClass::Equipment && o.variant == "фрезер")
            .unwrap();
        assert_eq!(fraser.keys, vec!["станок", "фрезерный станок"]);
        assert!(overlaps
            .iter()
            .any(|o| o.class == ConceptClass::Action && o.variant == "ремонт"));
        // same word in different classes is not an overlap
        assert!(!overlaps.iter().any(|o| o.variant == "лента"));
    }

    #[test]
    fn test_error_code_rule_reports_capture_group() {
        let dict = TermDictionary::builtin_russian().unwrap();
        let text = "Ошибка E15 на прессе";
        let spans: Vec<Span> = dict
            .error_code_rules()
            .iter()
            .flat_map(|r| r.find_spans(text))
            .collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "E15");
        assert_eq!((spans[0].start, spans[0].end), (7, 10));
        assert_eq!(spans[0].label, EntityLabel::ErrorCode);
    }

    #[test]
    fn test_date_and_time_rules() {
        let dict = TermDictionary::builtin_russian().unwrap();
        let text = "Вчера в 14:30 и 12.03.2024 станок остановился";
        let dates: Vec<String> = dict
            .date_rules()
            .iter()
            .flat_map(|r| r.find_spans(text))
            .map(|s| s.text)
            .collect();
        assert!(dates.contains(&"12.03.2024".to_string()));
        assert!(dates.contains(&"Вчера".to_string()));
        let times: Vec<String> = dict
            .time_rules()
            .iter()
            .flat_map(|r| r.find_spans(text))
            .map(|s| s.text)
            .collect();
        assert_eq!(times, vec!["14:30"]);
    }

    #[test]
    fn test_keyword_rules_fold_yo() {
        let yaml = "urgency:\n  high: [Взрыв Ёмкости]\n  low: [ПОТОМ]\nequipment_context_verbs: [Зачёркнут]\n";
        let dict = TermDictionary::from_yaml(yaml).unwrap();
        assert_eq!(dict.urgency().high, vec!["взрыв емкости"]);
        assert_eq!(dict.urgency().low, vec!["потом"]);
        assert_eq!(dict.equipment_context_verbs(), ["зачеркнут"]);
    }
}
