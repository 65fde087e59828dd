//! Rule-based extraction.
//!
//! `RuleExtractor` runs the lexical matcher plus keyword and regex heuristics
//! over annotated text. `findings` yields raw per-category hits (no
//! sentinels) for fusion; `extract` builds a complete rules-only report.

pub mod rules;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{Span, Urgency};

pub use rules::{equipment_id_from, or_sentinel, RuleExtractor, TIMESTAMP_FORMAT};

/// Rule-based hits for one text, before fusion
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleFindings {
    /// Capitalized canonical equipment type
    pub equipment: Option<String>,
    /// Asset-tag candidates ("KUKA-5", "станка 2")
    pub equipment_mentions: Vec<String>,
    pub components: BTreeSet<String>,
    pub symptoms: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    pub error_codes: Vec<Span>,
    pub dates: Vec<Span>,
    pub times: Vec<Span>,
    pub urgency: Urgency,
}

impl RuleFindings {
    /// Spans produced by the regex rules
    pub fn claimed_spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.error_codes
            .iter()
            .chain(&self.dates)
            .chain(&self.times)
            .cloned()
    }
}
