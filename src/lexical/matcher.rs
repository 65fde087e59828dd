//! Lexical matcher: surface forms → canonical keys.
//!
//! Every key and variant is normalized once at construction, so inflected
//! input and inflected dictionary entries meet on the same citation form.
//!
//! Precedence when a normalized form is claimed more than once:
//! 1. a two-token (compound) match beats any single-token match
//! 2. equality with a canonical key beats equality with a variant
//! 3. among variants, the earliest entry in definition order wins

use std::collections::HashMap;
use std::sync::Arc;

use super::{ConceptClass, TermDictionary};
use crate::domain::{PosTag, Token};
use crate::morphology::Normalizer;

/// How a form matched its concept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Key,
    Variant,
}

#[derive(Debug, Default)]
struct ClassIndex {
    /// normalized key → entry index
    keys: HashMap<String, usize>,
    /// normalized variant → entry index of the first entry listing it
    variants: HashMap<String, usize>,
}

/// Dictionary lookup over normalized forms
#[derive(Debug, Clone)]
pub struct LexicalMatcher {
    dictionary: Arc<TermDictionary>,
    normalizer: Normalizer,
    indexes: Arc<HashMap<ConceptClass, ClassIndex>>,
}

impl LexicalMatcher {
    pub fn new(dictionary: Arc<TermDictionary>, normalizer: Normalizer) -> Self {
        let mut indexes = HashMap::new();
        for class in ConceptClass::ALL {
            let mut index = ClassIndex::default();
            for (i, entry) in dictionary.entries(class).iter().enumerate() {
                index
                    .keys
                    .entry(normalizer.normalize_phrase(&entry.key))
                    .or_insert(i);
                for variant in &entry.variants {
                    index
                        .variants
                        .entry(normalizer.normalize_phrase(variant))
                        .or_insert(i);
                }
            }
            indexes.insert(class, index);
        }
        Self {
            dictionary,
            normalizer,
            indexes: Arc::new(indexes),
        }
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Canonical key for arbitrary surface text (one or more words)
    pub fn match_term(&self, class: ConceptClass, text: &str) -> Option<&str> {
        self.lookup(class, &self.normalizer.normalize_phrase(text))
    }

    /// Canonical key for an already-normalized form
    pub fn lookup(&self, class: ConceptClass, normalized: &str) -> Option<&str> {
        self.lookup_with_kind(class, normalized).map(|(key, _)| key)
    }

    pub fn lookup_with_kind(&self, class: ConceptClass, normalized: &str) -> Option<(&str, MatchKind)> {
        if normalized.is_empty() {
            return None;
        }
        let index = self.indexes.get(&class)?;
        let entries = self.dictionary.entries(class);
        if let Some(&i) = index.keys.get(normalized) {
            return Some((entries[i].key.as_str(), MatchKind::Key));
        }
        index
            .variants
            .get(normalized)
            .map(|&i| (entries[i].key.as_str(), MatchKind::Variant))
    }

    /// First class (in `ConceptClass::ALL` order) that knows this text
    pub fn resolve_any(&self, text: &str) -> Option<(ConceptClass, &str)> {
        let normalized = self.normalizer.normalize_phrase(text);
        ConceptClass::ALL
            .into_iter()
            .find_map(|class| self.lookup(class, &normalized).map(|key| (class, key)))
    }

    /// Best single match over a token sequence: compounds first, then
    /// single tokens, each in text order
    pub fn first_match(&self, class: ConceptClass, tokens: &[Token]) -> Option<&str> {
        self.compound_matches(class, tokens)
            .into_iter()
            .next()
            .or_else(|| self.single_matches(class, tokens).into_iter().next())
    }

    /// Every concept matched by a token pair or a single token, compounds
    /// first, without duplicates
    pub fn match_tokens(&self, class: ConceptClass, tokens: &[Token]) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for key in self
            .compound_matches(class, tokens)
            .into_iter()
            .chain(self.single_matches(class, tokens))
        {
            if !found.contains(&key) {
                found.push(key);
            }
        }
        found
    }

    /// Concepts matched by adjacent word pairs, in text order
    pub fn compound_matches(&self, class: ConceptClass, tokens: &[Token]) -> Vec<&str> {
        tokens
            .windows(2)
            .filter(|pair| is_word(&pair[0]) && is_word(&pair[1]))
            .filter_map(|pair| {
                let joined = format!("{} {}", pair[0].lemma, pair[1].lemma);
                self.lookup(class, &joined)
            })
            .collect()
    }

    /// Concepts matched by single tokens (by lemma), in text order
    pub fn single_matches(&self, class: ConceptClass, tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .filter(|t| is_word(t))
            .filter_map(|t| self.lookup(class, &t.lemma))
            .collect()
    }
}

fn is_word(token: &Token) -> bool {
    !matches!(token.pos, PosTag::Punct | PosTag::Num)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_from(yaml: &str) -> LexicalMatcher {
        let dictionary = Arc::new(TermDictionary::from_yaml(yaml).unwrap());
        LexicalMatcher::new(dictionary, Normalizer::builtin().unwrap())
    }

    fn builtin() -> LexicalMatcher {
        let dictionary = Arc::new(TermDictionary::builtin_russian().unwrap());
        LexicalMatcher::new(dictionary, Normalizer::builtin().unwrap())
    }

    fn tokens(words: &[(&str, &str)]) -> Vec<Token> {
        let mut offset = 0;
        words
            .iter()
            .map(|(text, lemma)| {
                let len = text.chars().count();
                let token = Token {
                    text: text.to_string(),
                    pos: PosTag::Noun,
                    lemma: lemma.to_string(),
                    start: offset,
                    end: offset + len,
                };
                offset += len + 1;
                token
            })
            .collect()
    }

    #[test]
    fn test_inflected_input_matches_key() {
        let m = builtin();
        assert_eq!(m.match_term(ConceptClass::Equipment, "станка"), Some("станок"));
        assert_eq!(m.match_term(ConceptClass::Component, "Шпинделем"), Some("шпиндель"));
        assert_eq!(m.match_term(ConceptClass::Symptom, "колебания"), Some("вибрация"));
        assert_eq!(m.match_term(ConceptClass::Equipment, "слон"), None);
    }

    #[test]
    fn test_inflected_multiword_variant() {
        let m = builtin();
        assert_eq!(
            m.match_term(ConceptClass::Equipment, "упаковочной линии"),
            Some("линия")
        );
        assert_eq!(
            m.match_term(ConceptClass::Equipment, "гидравлического пресса"),
            Some("пресс")
        );
    }

    #[test]
    fn test_key_beats_earlier_variant() {
        let m = builtin();
        // "ремонт" is a variant of "замена" (listed first) and a key of its own
        assert_eq!(
            m.lookup_with_kind(ConceptClass::Action, "ремонт"),
            Some(("ремонт", MatchKind::Key))
        );
        assert_eq!(m.match_term(ConceptClass::Action, "замену"), Some("замена"));
    }

    #[test]
    fn test_definition_order_among_variants() {
        let m = builtin();
        // "фрезер" is a variant of both "станок" and "фрезерный станок"
        assert_eq!(
            m.lookup_with_kind(ConceptClass::Equipment, "фрезер"),
            Some(("станок", MatchKind::Variant))
        );
    }

    #[test]
    fn test_compound_beats_single() {
        let m = builtin();
        let toks = tokens(&[("фрезерный", "фрезерный"), ("станок", "станок")]);
        assert_eq!(m.first_match(ConceptClass::Equipment, &toks), Some("фрезерный станок"));
        assert_eq!(
            m.match_tokens(ConceptClass::Equipment, &toks),
            vec!["фрезерный станок", "станок"]
        );
    }

    #[test]
    fn test_resolve_any() {
        let m = builtin();
        assert_eq!(m.resolve_any("подшипника"), Some((ConceptClass::Component, "подшипник")));
        assert_eq!(m.resolve_any("участок"), None);
    }

    #[test]
    fn test_custom_dictionary() {
        let m = matcher_from(
            r#"
equipment:
  - key: станок
    variants: [фрезер]
"#,
        );
        assert_eq!(m.match_term(ConceptClass::Equipment, "фрезера"), Some("станок"));
        assert_eq!(m.match_term(ConceptClass::Component, "фрезера"), None);
    }
}
