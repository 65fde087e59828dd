//! Dictionary- and keyword-driven extraction.

use std::collections::BTreeSet;

use chrono::Local;

use crate::annotate::{AnnotatedText, Sentence};
use crate::domain::{capitalize, EntityLabel, ExtractionResult, Span, Token, Urgency};
use crate::lexical::{fold, ConceptClass, LexicalMatcher, PatternRule};

use super::RuleFindings;

/// Wall-clock fallback format for the report timestamp
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Rule-based extractor over annotated text
#[derive(Debug, Clone)]
pub struct RuleExtractor {
    matcher: LexicalMatcher,
}

impl RuleExtractor {
    pub fn new(matcher: LexicalMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &LexicalMatcher {
        &self.matcher
    }

    // ========================================================================
    // Equipment
    // ========================================================================

    /// Canonical equipment type, or the unknown-equipment sentinel
    pub fn extract_equipment(&self, tokens: &[Token]) -> String {
        self.equipment_hit(tokens)
            .unwrap_or_else(|| self.sentinels().unknown_equipment.clone())
    }

    /// Equipment without sentinel: dictionary match on lemmas, then on
    /// noun-converted tokens ("фрезерный" → "фрезер"), then the noun that
    /// follows a breakdown verb ("сломался агрегат")
    pub fn equipment_hit(&self, tokens: &[Token]) -> Option<String> {
        if let Some(key) = self.matcher.first_match(ConceptClass::Equipment, tokens) {
            return Some(capitalize(key));
        }
        let converted = self.noun_converted(tokens);
        if let Some(key) = self.matcher.first_match(ConceptClass::Equipment, &converted) {
            return Some(capitalize(key));
        }
        let context_verbs = self.matcher.dictionary().equipment_context_verbs();
        tokens.windows(2).find_map(|pair| {
            let (verb, next) = (&pair[0], &pair[1]);
            let introduces = context_verbs.iter().any(|v| *v == verb.lemma);
            (introduces && next.pos.is_nominal() && !next.has_digit()).then(|| capitalize(&next.lemma))
        })
    }

    /// Asset-tag candidates in text order
    ///
    /// A nominal token carrying digits ("KUKA-5"), or an equipment word
    /// followed by a number ("станка 2", "пресс №3"). Tokens inside
    /// `claimed` spans (error codes, dates, times) are ignored.
    pub fn equipment_mentions(&self, tokens: &[Token], claimed: &[Span]) -> Vec<String> {
        let is_claimed = |t: &Token| claimed.iter().any(|s| s.overlaps(t.start, t.end));
        let mut mentions = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if is_claimed(token) {
                continue;
            }
            if token.pos.is_nominal() && token.has_digit() {
                mentions.push(token.text.clone());
                continue;
            }
            if self.matcher.lookup(ConceptClass::Equipment, &token.lemma).is_none() {
                continue;
            }
            let mut j = i + 1;
            if tokens.get(j).is_some_and(|t| t.text == "№" || t.text == "#") {
                j += 1;
            }
            if let Some(number) = tokens.get(j).filter(|t| t.is_number() && !is_claimed(t)) {
                mentions.push(format!("{} {}", token.text, number.text));
            }
        }
        mentions
    }

    /// Digits of the first mention containing any, or the not-specified sentinel
    pub fn extract_equipment_id(&self, mentions: &[String]) -> String {
        equipment_id_from(mentions).unwrap_or_else(|| self.sentinels().no_equipment_id.clone())
    }

    // ========================================================================
    // Components, actions, symptoms
    // ========================================================================

    pub fn extract_components(&self, tokens: &[Token]) -> BTreeSet<String> {
        or_sentinel(self.component_hits(tokens), &self.sentinels().no_components)
    }

    pub fn component_hits(&self, tokens: &[Token]) -> BTreeSet<String> {
        self.class_hits(ConceptClass::Component, tokens)
    }

    pub fn extract_actions(&self, tokens: &[Token]) -> BTreeSet<String> {
        or_sentinel(self.action_hits(tokens), &self.sentinels().no_actions)
    }

    pub fn action_hits(&self, tokens: &[Token]) -> BTreeSet<String> {
        self.class_hits(ConceptClass::Action, tokens)
    }

    /// Union of every symptom layer, or the no-symptoms sentinel
    pub fn extract_symptoms(&self, tokens: &[Token], sentences: &[Sentence], spans: &[Span]) -> BTreeSet<String> {
        let mut found = self.span_hits(ConceptClass::Symptom, EntityLabel::Symptom, spans);
        found.extend(self.symptom_hits(tokens, sentences));
        or_sentinel(found, &self.sentinels().no_symptoms)
    }

    /// Symptom layers that need no tagger: lemma match, noun-converted
    /// match, compound match, sentence substring scan, then triggers.
    /// Scanned phrases must start on a word boundary ("гул" is not in "регулировка").
    pub fn symptom_hits(&self, tokens: &[Token], sentences: &[Sentence]) -> BTreeSet<String> {
        let mut found = self.class_hits(ConceptClass::Symptom, tokens);

        for sentence in sentences {
            let haystack = fold(&sentence.text);
            for entry in self.matcher.dictionary().entries(ConceptClass::Symptom) {
                let mentioned = std::iter::once(&entry.key)
                    .chain(entry.variants.iter())
                    .any(|phrase| mentions_at_word_start(&haystack, &fold(phrase)));
                if mentioned {
                    found.insert(capitalize(&entry.key));
                }
            }
        }

        let whole = fold(&sentences.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" "));
        for trigger in self.matcher.dictionary().triggers() {
            if trigger.phrases.iter().any(|p| mentions_at_word_start(&whole, &fold(p))) {
                found.insert(capitalize(&trigger.concept));
            }
        }
        found
    }

    /// Tagged spans of `label`, resolved to canonical keys when possible
    pub fn span_hits(&self, class: ConceptClass, label: EntityLabel, spans: &[Span]) -> BTreeSet<String> {
        spans
            .iter()
            .filter(|s| s.label == label)
            .filter_map(|s| {
                let text = s.text.trim();
                if text.is_empty() {
                    return None;
                }
                let resolved = self
                    .matcher
                    .match_term(class, text)
                    .or_else(|| {
                        let noun = self.matcher.normalizer().noun_form(text);
                        self.matcher.match_term(class, &noun)
                    })
                    .map(str::to_string)
                    .unwrap_or_else(|| text.to_lowercase());
                Some(capitalize(&resolved))
            })
            .collect()
    }

    /// Direct, compound and noun-converted matches of one class
    fn class_hits(&self, class: ConceptClass, tokens: &[Token]) -> BTreeSet<String> {
        let converted = self.noun_converted(tokens);
        self.matcher
            .match_tokens(class, tokens)
            .into_iter()
            .chain(self.matcher.single_matches(class, &converted))
            .map(capitalize)
            .collect()
    }

    /// Tokens with verbs, participles and adjectives replaced by a related noun
    fn noun_converted(&self, tokens: &[Token]) -> Vec<Token> {
        let normalizer = self.matcher.normalizer();
        tokens
            .iter()
            .map(|t| {
                if !t.pos.is_derivable() {
                    return t.clone();
                }
                let noun = normalizer.noun_form(&t.text);
                Token {
                    lemma: normalizer.normalize(&noun),
                    ..t.clone()
                }
            })
            .collect()
    }

    // ========================================================================
    // Urgency, timestamps, regex rules
    // ========================================================================

    /// Keyword scan; high-urgency words are checked before low-urgency ones
    pub fn detect_urgency(&self, text: &str) -> Urgency {
        let text = fold(text);
        let rules = self.matcher.dictionary().urgency();
        if rules.high.iter().any(|w| text.contains(w.as_str())) {
            Urgency::High
        } else if rules.low.iter().any(|w| text.contains(w.as_str())) {
            Urgency::Low
        } else {
            Urgency::Medium
        }
    }

    /// First DATE span, or the current local time
    pub fn extract_timestamp(&self, spans: &[Span]) -> String {
        spans
            .iter()
            .find(|s| s.label == EntityLabel::Date)
            .map(|s| s.text.clone())
            .unwrap_or_else(|| Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn extract_error_codes(&self, text: &str) -> Vec<Span> {
        apply_rules(self.matcher.dictionary().error_code_rules(), text)
    }

    pub fn extract_dates(&self, text: &str) -> Vec<Span> {
        apply_rules(self.matcher.dictionary().date_rules(), text)
    }

    pub fn extract_times(&self, text: &str) -> Vec<Span> {
        apply_rules(self.matcher.dictionary().time_rules(), text)
    }

    // ========================================================================
    // Whole-text passes
    // ========================================================================

    /// Every rule-based category for one annotated text, without sentinels
    pub fn findings(&self, annotated: &AnnotatedText) -> RuleFindings {
        let text = annotated.text.as_str();
        let error_codes = self.extract_error_codes(text);
        let dates = self.extract_dates(text);
        let times = self.extract_times(text);

        let claimed: Vec<Span> = error_codes
            .iter()
            .chain(&dates)
            .chain(&times)
            .cloned()
            .collect();

        RuleFindings {
            equipment: self.equipment_hit(&annotated.tokens),
            equipment_mentions: self.equipment_mentions(&annotated.tokens, &claimed),
            components: self.component_hits(&annotated.tokens),
            symptoms: self.symptom_hits(&annotated.tokens, &annotated.sentences),
            actions: self.action_hits(&annotated.tokens),
            error_codes,
            dates,
            times,
            urgency: self.detect_urgency(text),
        }
    }

    /// Rules-only report, with tagged spans (if any) feeding the symptom and
    /// timestamp layers
    pub fn extract(&self, annotated: &AnnotatedText, spans: &[Span]) -> ExtractionResult {
        let findings = self.findings(annotated);
        let mut symptoms = self.span_hits(ConceptClass::Symptom, EntityLabel::Symptom, spans);
        symptoms.extend(findings.symptoms.iter().cloned());

        let date_spans: Vec<Span> = spans
            .iter()
            .filter(|s| s.label == EntityLabel::Date)
            .chain(&findings.dates)
            .cloned()
            .collect();

        let equipment = findings
            .equipment
            .clone()
            .unwrap_or_else(|| self.sentinels().unknown_equipment.clone());
        let covered: Vec<Span> = findings.claimed_spans().chain(spans.iter().cloned()).collect();

        ExtractionResult {
            unknown_terms: self.unknown_terms(&annotated.tokens, &covered, &equipment),
            equipment_type: equipment,
            equipment_id: self.extract_equipment_id(&findings.equipment_mentions),
            components: or_sentinel(findings.components, &self.sentinels().no_components),
            symptoms: or_sentinel(symptoms, &self.sentinels().no_symptoms),
            actions: or_sentinel(findings.actions, &self.sentinels().no_actions),
            urgency: findings.urgency,
            timestamp: self.extract_timestamp(&date_spans),
        }
    }

    /// Nouns no span covers and no concept class knows, by lemma, deduplicated
    pub fn unknown_terms(&self, tokens: &[Token], covered: &[Span], equipment: &str) -> Vec<String> {
        let mut unknown: Vec<String> = Vec::new();
        for token in tokens {
            if !token.pos.is_nominal() || token.has_digit() {
                continue;
            }
            if covered.iter().any(|s| s.overlaps(token.start, token.end)) {
                continue;
            }
            if capitalize(&token.lemma) == equipment {
                continue;
            }
            let known = ConceptClass::ALL
                .into_iter()
                .any(|class| self.matcher.lookup(class, &token.lemma).is_some());
            if !known && !unknown.contains(&token.lemma) {
                unknown.push(token.lemma.clone());
            }
        }
        unknown
    }

    fn sentinels(&self) -> &crate::lexical::Sentinels {
        self.matcher.dictionary().sentinels()
    }
}

/// Digits of the first string containing any
pub fn equipment_id_from<S: AsRef<str>>(mentions: &[S]) -> Option<String> {
    mentions.iter().find_map(|m| {
        let digits: String = m.as_ref().chars().filter(|c| c.is_ascii_digit()).collect();
        (!digits.is_empty()).then_some(digits)
    })
}

/// Replace an empty set with the single-sentinel set
pub fn or_sentinel(found: BTreeSet<String>, sentinel: &str) -> BTreeSet<String> {
    if found.is_empty() {
        BTreeSet::from([sentinel.to_string()])
    } else {
        found
    }
}

fn apply_rules(rules: &[PatternRule], text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for span in rules.iter().flat_map(|r| r.find_spans(text)) {
        if !spans.iter().any(|s| s.overlaps(span.start, span.end)) {
            spans.push(span);
        }
    }
    spans.sort_by_key(|s| s.start);
    spans
}

/// `phrase` occurs in `haystack` starting at a word boundary
fn mentions_at_word_start(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack
        .match_indices(phrase)
        .any(|(idx, _)| !haystack[..idx].chars().next_back().is_some_and(char::is_alphanumeric))
}
