//! Annotated tokens.
//!
//! Tokens are produced once per input text by the annotator and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

/// Coarse part-of-speech class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosTag {
    Noun,
    /// Proper noun (asset tags, vendor names, Latin identifiers)
    Propn,
    Verb,
    /// Full or short participle
    Participle,
    Adj,
    Num,
    Punct,
    Other,
}

impl PosTag {
    /// Noun-like classes that may name equipment or assets
    pub fn is_nominal(&self) -> bool {
        matches!(self, PosTag::Noun | PosTag::Propn)
    }

    /// Classes the normalizer tries to convert into a noun form
    pub fn is_derivable(&self) -> bool {
        matches!(self, PosTag::Verb | PosTag::Participle | PosTag::Adj)
    }
}

/// A single annotated token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Surface text as it appears in the input
    pub text: String,
    /// Coarse part of speech
    pub pos: PosTag,
    /// Citation form
    pub lemma: String,
    /// Character offset of the first char
    pub start: usize,
    /// Character offset one past the last char
    pub end: usize,
}

impl Token {
    pub fn has_digit(&self) -> bool {
        self.text.chars().any(|c| c.is_ascii_digit())
    }

    pub fn is_number(&self) -> bool {
        !self.text.is_empty() && self.text.chars().all(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, pos: PosTag) -> Token {
        Token {
            text: text.to_string(),
            pos,
            lemma: text.to_lowercase(),
            start: 0,
            end: text.chars().count(),
        }
    }

    #[test]
    fn test_digit_predicates() {
        assert!(token("KUKA-5", PosTag::Propn).has_digit());
        assert!(!token("KUKA-5", PosTag::Propn).is_number());
        assert!(token("12", PosTag::Num).is_number());
        assert!(!token("станок", PosTag::Noun).has_digit());
    }

    #[test]
    fn test_pos_classes() {
        assert!(PosTag::Propn.is_nominal());
        assert!(!PosTag::Verb.is_nominal());
        assert!(PosTag::Participle.is_derivable());
        assert!(!PosTag::Noun.is_derivable());
    }
}
