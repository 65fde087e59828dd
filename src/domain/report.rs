//! Extraction results.
//!
//! `ExtractionResult` is the renderable fault report: every set-valued field
//! carries a sentinel instead of being empty. `Analysis` wraps it together
//! with the fused entity lists and their provenance.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Urgency of a fault report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Default for Urgency {
    fn default() -> Self {
        Self::Medium
    }
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

/// The structured fault report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Canonical equipment type (capitalized) or the unknown-equipment sentinel
    pub equipment_type: String,
    /// Digits identifying the asset, or the not-specified sentinel
    pub equipment_id: String,
    pub components: BTreeSet<String>,
    pub symptoms: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    pub urgency: Urgency,
    /// First DATE mention, or the analysis wall-clock time (`dd.mm.YYYY HH:MM`)
    pub timestamp: String,
    /// Nouns that no tagger span or dictionary concept accounted for
    pub unknown_terms: Vec<String>,
}

/// Which pass supplied a fused category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Tagger,
    Rules,
    /// Neither pass found anything
    None,
}

/// Fused entity mentions per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReport {
    pub equipment: Vec<String>,
    pub equipment_id: Vec<String>,
    pub dates: Vec<String>,
    pub error_codes: Vec<String>,
    pub times: Vec<String>,
    pub components: Vec<String>,
    pub symptoms: Vec<String>,
    pub actions: Vec<String>,
}

impl EntityReport {
    pub fn is_empty(&self) -> bool {
        self.equipment.is_empty()
            && self.equipment_id.is_empty()
            && self.dates.is_empty()
            && self.error_codes.is_empty()
            && self.times.is_empty()
            && self.components.is_empty()
            && self.symptoms.is_empty()
            && self.actions.is_empty()
    }
}

/// Full output of one analysis call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub raw_text: String,
    pub entities: EntityReport,
    pub report: ExtractionResult,
    /// Category name → pass that supplied it
    pub sources: BTreeMap<String, Source>,
    /// True iff at least one category produced a non-empty result
    pub success: bool,
}

/// Uppercase the first character, leave the rest untouched
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
