//! Fusion of tagger spans and rule-based findings, and the analysis pipeline.
//!
//! For every category the tagger's spans win; when the tagger found nothing
//! in a category the rule-based hits are used instead. Symptoms are the
//! exception: tagged symptom spans are one more layer of the rule-based
//! symptom union.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::annotate::{AnnotatedText, Annotator};
use crate::domain::{capitalize, Analysis, EntityLabel, EntityReport, ExtractionResult, Source, Span};
use crate::extract::{equipment_id_from, or_sentinel, RuleExtractor, RuleFindings};
use crate::lexical::{ConceptClass, LexicalMatcher, TermDictionary};
use crate::morphology::{LexiconMorphology, Normalizer};
use crate::tagger::EntityTagger;

/// Merges tagger output with rule-based findings
#[derive(Debug, Clone)]
pub struct FusionPolicy {
    rules: RuleExtractor,
}

impl FusionPolicy {
    pub fn new(rules: RuleExtractor) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleExtractor {
        &self.rules
    }

    pub fn fuse(&self, annotated: &AnnotatedText, spans: &[Span], findings: RuleFindings) -> Analysis {
        let mut sources = BTreeMap::new();
        let mut entities = EntityReport::default();

        let tagged_equipment = self.tagged_equipment(spans);
        let rule_equipment: Vec<String> = findings.equipment.iter().cloned().collect();
        entities.equipment = prefer("equipment", tagged_equipment, rule_equipment, &mut sources);

        entities.equipment_id = self.fuse_equipment_id(spans, &findings, &mut sources);

        entities.components = prefer(
            "components",
            self.tagged_concepts(ConceptClass::Component, EntityLabel::Component, spans),
            findings.components.iter().cloned().collect(),
            &mut sources,
        );
        entities.actions = prefer(
            "actions",
            self.tagged_concepts(ConceptClass::Action, EntityLabel::Action, spans),
            findings.actions.iter().cloned().collect(),
            &mut sources,
        );

        let tagged_symptoms = self
            .rules
            .span_hits(ConceptClass::Symptom, EntityLabel::Symptom, spans);
        let symptom_source = source_of(!tagged_symptoms.is_empty(), !findings.symptoms.is_empty());
        sources.insert("symptoms".to_string(), symptom_source);
        let mut symptoms: BTreeSet<String> = tagged_symptoms;
        symptoms.extend(findings.symptoms.iter().cloned());
        entities.symptoms = symptoms.into_iter().collect();

        let date_spans = prefer_spans("dates", EntityLabel::Date, spans, &findings.dates, &mut sources);
        let time_spans = prefer_spans("times", EntityLabel::Time, spans, &findings.times, &mut sources);
        let code_spans = prefer_spans(
            "error_codes",
            EntityLabel::ErrorCode,
            spans,
            &findings.error_codes,
            &mut sources,
        );
        entities.dates = texts(&date_spans);
        entities.times = texts(&time_spans);
        entities.error_codes = texts(&code_spans);

        let sentinels = self.rules.matcher().dictionary().sentinels();
        let equipment_type = entities
            .equipment
            .first()
            .cloned()
            .unwrap_or_else(|| sentinels.unknown_equipment.clone());
        let covered: Vec<Span> = spans.iter().cloned().chain(findings.claimed_spans()).collect();

        let report = ExtractionResult {
            unknown_terms: self
                .rules
                .unknown_terms(&annotated.tokens, &covered, &equipment_type),
            equipment_type,
            equipment_id: entities
                .equipment_id
                .first()
                .cloned()
                .unwrap_or_else(|| sentinels.no_equipment_id.clone()),
            components: or_sentinel(to_set(&entities.components), &sentinels.no_components),
            symptoms: or_sentinel(to_set(&entities.symptoms), &sentinels.no_symptoms),
            actions: or_sentinel(to_set(&entities.actions), &sentinels.no_actions),
            urgency: findings.urgency,
            timestamp: self.rules.extract_timestamp(&date_spans),
        };

        let success = !entities.is_empty();
        Analysis {
            raw_text: annotated.text.clone(),
            entities,
            report,
            sources,
            success,
        }
    }

    /// EQUIPMENT spans resolved to canonical types, unresolved text kept
    fn tagged_equipment(&self, spans: &[Span]) -> Vec<String> {
        let mut found = Vec::new();
        for span in spans.iter().filter(|s| s.label == EntityLabel::Equipment) {
            let text = span.text.trim();
            if text.is_empty() {
                continue;
            }
            let value = match self.rules.matcher().match_term(ConceptClass::Equipment, text) {
                Some(key) => capitalize(key),
                None => capitalize(text),
            };
            if !found.contains(&value) {
                found.push(value);
            }
        }
        found
    }

    fn tagged_concepts(&self, class: ConceptClass, label: EntityLabel, spans: &[Span]) -> Vec<String> {
        self.rules.span_hits(class, label, spans).into_iter().collect()
    }

    /// Digits from tagged ids, then tagged equipment mentions, then rule mentions
    fn fuse_equipment_id(
        &self,
        spans: &[Span],
        findings: &RuleFindings,
        sources: &mut BTreeMap<String, Source>,
    ) -> Vec<String> {
        let tagged: Vec<&str> = spans
            .iter()
            .filter(|s| s.label == EntityLabel::EquipmentId)
            .chain(spans.iter().filter(|s| s.label == EntityLabel::Equipment))
            .map(|s| s.text.as_str())
            .collect();

        let (id, source) = match equipment_id_from(&tagged) {
            Some(id) => (Some(id), Source::Tagger),
            None => match equipment_id_from(&findings.equipment_mentions) {
                Some(id) => (Some(id), Source::Rules),
                None => (None, Source::None),
            },
        };
        sources.insert("equipment_id".to_string(), source);
        id.into_iter().collect()
    }
}

fn source_of(tagger: bool, rules: bool) -> Source {
    if tagger {
        Source::Tagger
    } else if rules {
        Source::Rules
    } else {
        Source::None
    }
}

fn prefer(
    category: &str,
    tagged: Vec<String>,
    rules: Vec<String>,
    sources: &mut BTreeMap<String, Source>,
) -> Vec<String> {
    let source = source_of(!tagged.is_empty(), !rules.is_empty());
    sources.insert(category.to_string(), source);
    if tagged.is_empty() {
        rules
    } else {
        tagged
    }
}

fn prefer_spans(
    category: &str,
    label: EntityLabel,
    spans: &[Span],
    rules: &[Span],
    sources: &mut BTreeMap<String, Source>,
) -> Vec<Span> {
    let tagged: Vec<Span> = spans.iter().filter(|s| s.label == label).cloned().collect();
    let source = source_of(!tagged.is_empty(), !rules.is_empty());
    sources.insert(category.to_string(), source);
    if tagged.is_empty() {
        rules.to_vec()
    } else {
        tagged
    }
}

fn texts(spans: &[Span]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for span in spans {
        let text = span.text.trim().to_string();
        if !text.is_empty() && !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

fn to_set(items: &[String]) -> BTreeSet<String> {
    items.iter().cloned().collect()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Annotate → {tag, rule-extract} → fuse
#[derive(Clone)]
pub struct FaultAnalyzer {
    annotator: Annotator,
    policy: FusionPolicy,
    tagger: Arc<dyn EntityTagger>,
}

impl std::fmt::Debug for FaultAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultAnalyzer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl FaultAnalyzer {
    pub fn new(normalizer: Normalizer, dictionary: Arc<TermDictionary>, tagger: Arc<dyn EntityTagger>) -> Self {
        let matcher = LexicalMatcher::new(dictionary, normalizer.clone());
        Self {
            annotator: Annotator::new(normalizer),
            policy: FusionPolicy::new(RuleExtractor::new(matcher)),
            tagger,
        }
    }

    /// Embedded Russian lexicon and dictionary
    pub fn builtin(tagger: Arc<dyn EntityTagger>) -> anyhow::Result<Self> {
        Self::from_resources(None, None, tagger)
    }

    /// Lexicon and dictionary from files, embedded defaults where `None`
    pub fn from_resources(
        lexicon: Option<&Path>,
        terms: Option<&Path>,
        tagger: Arc<dyn EntityTagger>,
    ) -> anyhow::Result<Self> {
        let morphology = match lexicon {
            Some(path) => LexiconMorphology::from_file(path)?,
            None => LexiconMorphology::builtin_russian()?,
        };
        let dictionary = match terms {
            Some(path) => TermDictionary::from_file(path)?,
            None => TermDictionary::builtin_russian()?,
        };
        Ok(Self::new(
            Normalizer::new(Arc::new(morphology)),
            Arc::new(dictionary),
            tagger,
        ))
    }

    pub fn rules(&self) -> &RuleExtractor {
        self.policy.rules()
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Analyze one report; never fails
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub fn analyze(&self, text: &str) -> Analysis {
        let (spans, (annotated, findings)) = rayon::join(
            || self.tagger.predict(text),
            || {
                let annotated = self.annotator.annotate(text);
                let findings = self.policy.rules().findings(&annotated);
                (annotated, findings)
            },
        );
        debug!(spans = spans.len(), tokens = annotated.tokens.len(), "passes joined");
        self.policy.fuse(&annotated, &spans, findings)
    }

    /// Rules-only report, ignoring the tagger
    pub fn analyze_rules_only(&self, text: &str) -> ExtractionResult {
        let annotated = self.annotator.annotate(text);
        self.policy.rules().extract(&annotated, &[])
    }

    /// Analyze independent texts in parallel, preserving input order
    pub fn analyze_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Analysis> {
        texts.par_iter().map(|t| self.analyze(t.as_ref())).collect()
    }
}
