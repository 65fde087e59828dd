//! Term dictionary and lexical matching.

pub mod dictionary;
pub mod matcher;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dictionary::{
    DictionaryError, PatternRule, Sentinels, TermDictionary, TermEntry, TriggerRule, UrgencyRules,
    VariantOverlap,
};
pub use matcher::{LexicalMatcher, MatchKind};

/// The four concept classes of the term dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptClass {
    Equipment,
    Component,
    Symptom,
    Action,
}

impl ConceptClass {
    pub const ALL: [ConceptClass; 4] = [
        ConceptClass::Equipment,
        ConceptClass::Component,
        ConceptClass::Symptom,
        ConceptClass::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptClass::Equipment => "equipment",
            ConceptClass::Component => "component",
            ConceptClass::Symptom => "symptom",
            ConceptClass::Action => "action",
        }
    }
}

/// Lowercase and fold `ё` to `е`; keyword rules and scanned text share it
pub fn fold(text: &str) -> String {
    text.to_lowercase().replace('ё', "е")
}

impl fmt::Display for ConceptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
