//! Lexicon-driven morphology.
//!
//! Resolution order for a word form (after lowercasing and folding `ё`):
//!
//! 1. the form is itself a known lemma
//! 2. irregular form table
//! 3. suffix rewrite rules, longest surface ending first; a rewrite is
//!    accepted only when it lands on a known lemma
//! 4. Snowball stem index (stem of the form == stem of a lemma)
//!
//! Anything that survives all four is returned as-is, which keeps
//! normalization idempotent.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_stemmers::{Algorithm, Stemmer};
use serde::Deserialize;
use tracing::debug;

use super::{Morphology, MorphologyError};
use crate::domain::PosTag;

const BUILTIN_RU: &str = include_str!("../../resources/lexicon.ru.yaml");

const PARTICIPLE_ENDINGS: &[&str] = &[
    "ющий", "ющая", "ющее", "ющие", "ящий", "ящая", "вший", "вшая", "нный", "нная", "нное", "нные",
];

const VERB_ENDINGS: &[&str] = &[
    "ться", "тся", "ть", "ует", "уют", "ает", "ают", "яет", "яют", "еет", "еют", "ался", "ился",
    "ялся", "алась", "илась",
];

const ADJ_ENDINGS: &[&str] = &[
    "ый", "ий", "ая", "яя", "ое", "ые", "ого", "его", "ому", "ему", "ым", "ых", "их",
];

/// On-disk lexicon format
#[derive(Debug, Clone, Deserialize)]
pub struct LexiconFile {
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub nouns: Vec<String>,

    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub participles: Vec<String>,

    #[serde(default)]
    pub adjectives: Vec<String>,

    #[serde(default)]
    pub function_words: Vec<String>,

    /// Irregular surface form → lemma
    #[serde(default)]
    pub forms: HashMap<String, String>,

    /// Lemma → noun lemma of the same lexeme family
    #[serde(default)]
    pub derivations: HashMap<String, String>,

    /// (surface ending, lemma ending)
    #[serde(default)]
    pub suffix_rules: Vec<(String, String)>,
}

fn default_language() -> String {
    "ru".to_string()
}

/// Morphology backed by a YAML lexicon plus a Snowball stemmer
pub struct LexiconMorphology {
    lemmas: HashMap<String, PosTag>,
    function_words: HashSet<String>,
    forms: HashMap<String, String>,
    derivations: HashMap<String, String>,
    suffix_rules: Vec<(String, String)>,
    stem_index: HashMap<String, String>,
    stemmer: Stemmer,
}

impl fmt::Debug for LexiconMorphology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconMorphology")
            .field("lemmas", &self.lemmas.len())
            .field("suffix_rules", &self.suffix_rules.len())
            .finish()
    }
}

impl LexiconMorphology {
    /// The embedded Russian lexicon
    pub fn builtin_russian() -> Result<Self> {
        Self::from_yaml(BUILTIN_RU).context("Failed to load built-in Russian lexicon")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid lexicon: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: LexiconFile = serde_yaml::from_str(yaml).context("Failed to parse lexicon YAML")?;
        Self::from_lexicon(file)
    }

    pub fn from_lexicon(file: LexiconFile) -> Result<Self> {
        let algorithm = match file.language.as_str() {
            "ru" | "russian" => Algorithm::Russian,
            "en" | "english" => Algorithm::English,
            other => bail!("Unsupported lexicon language: {}", other),
        };
        let stemmer = Stemmer::create(algorithm);

        // First class listed wins when a lemma appears twice
        let classes = [
            (PosTag::Noun, &file.nouns),
            (PosTag::Verb, &file.verbs),
            (PosTag::Participle, &file.participles),
            (PosTag::Adj, &file.adjectives),
        ];
        let mut lemmas = HashMap::new();
        let mut stem_index = HashMap::new();
        for (pos, words) in classes {
            for word in words {
                let lemma = fold(word);
                stem_index
                    .entry(stemmer.stem(&lemma).into_owned())
                    .or_insert_with(|| lemma.clone());
                lemmas.entry(lemma).or_insert(pos);
            }
        }

        let forms = file.forms.iter().map(|(k, v)| (fold(k), fold(v))).collect();
        let derivations = file
            .derivations
            .iter()
            .map(|(k, v)| (fold(k), fold(v)))
            .collect();

        let mut suffix_rules: Vec<(String, String)> = file
            .suffix_rules
            .iter()
            .filter(|(surface, _)| !surface.is_empty())
            .map(|(surface, ending)| (fold(surface), fold(ending)))
            .collect();
        // Stable: rules with equal-length endings keep file order
        suffix_rules.sort_by_key(|(surface, _)| std::cmp::Reverse(surface.chars().count()));

        debug!(
            lemmas = lemmas.len(),
            rules = suffix_rules.len(),
            language = %file.language,
            "lexicon loaded"
        );

        Ok(Self {
            lemmas,
            function_words: file.function_words.iter().map(|w| fold(w)).collect(),
            forms,
            derivations,
            suffix_rules,
            stem_index,
            stemmer,
        })
    }

    /// Part of speech recorded for a lemma
    pub fn lemma_pos(&self, lemma: &str) -> Option<PosTag> {
        self.lemmas.get(lemma).copied()
    }

    pub fn lemma_count(&self) -> usize {
        self.lemmas.len()
    }

    fn resolve(&self, word: &str) -> Option<String> {
        if self.lemmas.contains_key(word) {
            return Some(word.to_string());
        }
        if let Some(lemma) = self.forms.get(word) {
            return Some(lemma.clone());
        }
        for (surface, ending) in &self.suffix_rules {
            if let Some(stem) = word.strip_suffix(surface.as_str()) {
                if stem.is_empty() {
                    continue;
                }
                let candidate = format!("{stem}{ending}");
                if self.lemmas.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
        }
        if word.chars().count() < 3 {
            return None;
        }
        let stem = self.stemmer.stem(word);
        self.stem_index.get(stem.as_ref()).cloned()
    }
}

impl Morphology for LexiconMorphology {
    fn normalize(&self, word: &str) -> Result<String, MorphologyError> {
        let folded = analyzable(word)?;
        Ok(self.resolve(&folded).unwrap_or(folded))
    }

    fn derive_noun_form(&self, word: &str) -> Result<Option<String>, MorphologyError> {
        let folded = analyzable(word)?;
        let lemma = self.resolve(&folded).unwrap_or(folded);
        match self.lemmas.get(&lemma) {
            Some(PosTag::Noun) => Ok(Some(lemma)),
            _ => Ok(self.derivations.get(&lemma).cloned()),
        }
    }

    fn part_of_speech(&self, word: &str) -> PosTag {
        let folded = fold(word);
        if folded.is_empty() {
            return PosTag::Other;
        }
        if !folded.chars().any(char::is_alphabetic) {
            if folded.chars().any(|c| c.is_ascii_digit()) {
                return PosTag::Num;
            }
            if folded.chars().all(|c| c.is_ascii_punctuation() || is_dash(c)) {
                return PosTag::Punct;
            }
            return PosTag::Other;
        }
        // Asset tags and Latin identifiers: "E15", "KUKA-5", "А7"
        if folded.chars().any(|c| c.is_ascii_digit() || c.is_ascii_alphabetic()) {
            return PosTag::Propn;
        }
        if self.function_words.contains(&folded) {
            return PosTag::Other;
        }
        if let Some(pos) = self.resolve(&folded).and_then(|l| self.lemma_pos(&l)) {
            return pos;
        }
        guess_pos(&folded)
    }
}

/// Lowercase and fold `ё` to `е`
fn fold(word: &str) -> String {
    word.trim().to_lowercase().replace('ё', "е")
}

fn analyzable(word: &str) -> Result<String, MorphologyError> {
    let folded = fold(word);
    if !folded.chars().any(char::is_alphabetic) {
        return Err(MorphologyError::Unanalyzable(word.to_string()));
    }
    Ok(folded)
}

fn is_dash(c: char) -> bool {
    matches!(c, '–' | '—' | '«' | '»' | '…')
}

fn guess_pos(word: &str) -> PosTag {
    let ends = |endings: &[&str]| endings.iter().any(|e| word.ends_with(e) && word != *e);
    if ends(PARTICIPLE_ENDINGS) {
        PosTag::Participle
    } else if ends(VERB_ENDINGS) {
        PosTag::Verb
    } else if ends(ADJ_ENDINGS) {
        PosTag::Adj
    } else {
        PosTag::Noun
    }
}
