//! Morphological normalization.
//!
//! The `Morphology` trait is the capability seam: anything that can reduce
//! a Russian word form to its citation form, tag its part of speech and map
//! verbs/adjectives onto a related noun. `LexiconMorphology` is the built-in
//! implementation; tests substitute stubs.
//!
//! `Normalizer` wraps a `Morphology` and applies the failure policy: analysis
//! never fails from the caller's point of view, it degrades to the
//! lowercased input.

pub mod lexicon;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::PosTag;

pub use lexicon::LexiconMorphology;

/// Errors raised by a morphology backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MorphologyError {
    #[error("Word cannot be analyzed: {0:?}")]
    Unanalyzable(String),

    #[error("Morphology backend failure: {0}")]
    Backend(String),
}

/// Word-level morphological analysis
pub trait Morphology: Send + Sync {
    /// Reduce a word form to its citation form (lowercased)
    fn normalize(&self, word: &str) -> Result<String, MorphologyError>;

    /// Noun of the same lexeme family, in citation form
    ///
    /// Returns `Ok(None)` when no such noun is known.
    fn derive_noun_form(&self, word: &str) -> Result<Option<String>, MorphologyError>;

    /// Coarse part of speech of a word form
    fn part_of_speech(&self, word: &str) -> PosTag;
}

/// Infallible front-end over a `Morphology` backend
#[derive(Clone)]
pub struct Normalizer {
    morph: Arc<dyn Morphology>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(morph: Arc<dyn Morphology>) -> Self {
        Self { morph }
    }

    /// Normalizer backed by the embedded Russian lexicon
    pub fn builtin() -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(LexiconMorphology::builtin_russian()?)))
    }

    /// Citation form of `word`, or `word` lowercased when it cannot be analyzed
    pub fn normalize(&self, word: &str) -> String {
        if word.is_empty() {
            return String::new();
        }
        match self.morph.normalize(word) {
            Ok(lemma) => lemma,
            Err(e) => {
                debug!(word, error = %e, "normalization fell back to lowercase");
                word.to_lowercase()
            }
        }
    }

    /// Normalize every whitespace-separated word and re-join with single spaces
    pub fn normalize_phrase(&self, phrase: &str) -> String {
        phrase
            .split_whitespace()
            .map(|w| self.normalize(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Verb, participle or adjective → related noun citation form
    ///
    /// Any other word, and any word without a known noun form, is returned
    /// unchanged.
    pub fn noun_form(&self, word: &str) -> String {
        if word.is_empty() || !self.morph.part_of_speech(word).is_derivable() {
            return word.to_string();
        }
        match self.morph.derive_noun_form(word) {
            Ok(Some(noun)) => noun,
            Ok(None) => word.to_string(),
            Err(e) => {
                debug!(word, error = %e, "noun derivation failed");
                word.to_string()
            }
        }
    }

    pub fn part_of_speech(&self, word: &str) -> PosTag {
        self.morph.part_of_speech(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails on everything
    struct Broken;

    impl Morphology for Broken {
        fn normalize(&self, word: &str) -> Result<String, MorphologyError> {
            Err(MorphologyError::Backend(word.to_string()))
        }

        fn derive_noun_form(&self, word: &str) -> Result<Option<String>, MorphologyError> {
            Err(MorphologyError::Backend(word.to_string()))
        }

        fn part_of_speech(&self, _word: &str) -> PosTag {
            PosTag::Verb
        }
    }

    fn builtin() -> Normalizer {
        Normalizer::builtin().unwrap()
    }

    #[test]
    fn test_failure_falls_back_to_lowercase() {
        let normalizer = Normalizer::new(Arc::new(Broken));
        assert_eq!(normalizer.normalize("Вибрирует"), "вибрирует");
        assert_eq!(normalizer.noun_form("Вибрирует"), "Вибрирует");
        assert_eq!(normalizer.normalize(""), "");
    }

    #[test]
    fn test_inflected_nouns_reduce_to_citation_form() {
        let n = builtin();
        assert_eq!(n.normalize("станка"), "станок");
        assert_eq!(n.normalize("Шпинделя"), "шпиндель");
        assert_eq!(n.normalize("подшипники"), "подшипник");
        assert_eq!(n.normalize("линией"), "линия");
        assert_eq!(n.normalize("печью"), "печь");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = builtin();
        for word in ["станка", "вибрирует", "фрезерного", "ремня", "ёлка", "E15", "12"] {
            let once = n.normalize(word);
            assert_eq!(n.normalize(&once), once, "not idempotent for {word}");
        }
    }

    #[test]
    fn test_noun_form_for_verbs_and_adjectives() {
        let n = builtin();
        assert_eq!(n.noun_form("вибрирует"), "вибрация");
        assert_eq!(n.noun_form("перегревается"), "перегрев");
        assert_eq!(n.noun_form("фрезерный"), "фрезер");
        // nouns pass through untouched
        assert_eq!(n.noun_form("Станок"), "Станок");
        // no known derivation
        assert_eq!(n.noun_form("заморожен"), "заморожен");
    }

    #[test]
    fn test_normalize_phrase() {
        let n = builtin();
        assert_eq!(n.normalize_phrase("Фрезерного  станка"), "фрезерный станок");
        assert_eq!(n.normalize_phrase("упаковочной линии"), "упаковочный линия");
    }
}
