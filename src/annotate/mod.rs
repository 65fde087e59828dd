//! Tokenization and annotation.
//!
//! Splits text into word, number and punctuation tokens with character
//! offsets, groups them into sentences and attaches a lemma and a coarse
//! part of speech to each token.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::{PosTag, Token};
use crate::morphology::Normalizer;

/// Clock times stay one token; hyphenated identifiers ("KUKA-5") too
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}|\w+(?:-\w+)*|[^\s\w]").expect("token regex"));

/// A sentence of the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentence {
    pub text: String,
    /// Character offset of the first char
    pub start: usize,
    pub end: usize,
    /// Index range into `AnnotatedText::tokens`
    pub first_token: usize,
    pub last_token: usize,
}

/// Annotated input text
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedText {
    pub text: String,
    pub tokens: Vec<Token>,
    pub sentences: Vec<Sentence>,
}

impl AnnotatedText {
    pub fn sentence_tokens(&self, sentence: &Sentence) -> &[Token] {
        &self.tokens[sentence.first_token..sentence.last_token]
    }
}

/// Raw token: surface text plus char offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Split text into tokens with character offsets
pub fn tokenize(text: &str) -> Vec<RawToken<'_>> {
    let mut tokens = Vec::new();
    let mut chars_seen = 0;
    let mut bytes_seen = 0;
    for m in TOKEN_PATTERN.find_iter(text) {
        chars_seen += text[bytes_seen..m.start()].chars().count();
        let len = m.as_str().chars().count();
        tokens.push(RawToken {
            text: m.as_str(),
            start: chars_seen,
            end: chars_seen + len,
        });
        chars_seen += len;
        bytes_seen = m.end();
    }
    tokens
}

fn is_sentence_end(token: &str) -> bool {
    matches!(token, "." | "!" | "?" | "…")
}

/// Annotates text against a normalizer
#[derive(Debug, Clone)]
pub struct Annotator {
    normalizer: Normalizer,
}

impl Annotator {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn annotate(&self, text: &str) -> AnnotatedText {
        let tokens: Vec<Token> = tokenize(text)
            .into_iter()
            .map(|raw| {
                let pos = self.normalizer.part_of_speech(raw.text);
                let lemma = match pos {
                    PosTag::Punct | PosTag::Num => raw.text.to_string(),
                    _ => self.normalizer.normalize(raw.text),
                };
                Token {
                    text: raw.text.to_string(),
                    pos,
                    lemma,
                    start: raw.start,
                    end: raw.end,
                }
            })
            .collect();

        let sentences = split_sentences(text, &tokens);
        AnnotatedText {
            text: text.to_string(),
            tokens,
            sentences,
        }
    }
}

fn split_sentences(text: &str, tokens: &[Token]) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut first = 0;
    for (i, token) in tokens.iter().enumerate() {
        let last = i + 1 == tokens.len();
        if is_sentence_end(&token.text) || last {
            let start = tokens[first].start;
            let end = token.end;
            sentences.push(Sentence {
                text: text.chars().skip(start).take(end - start).collect(),
                start,
                end,
                first_token: first,
                last_token: i + 1,
            });
            first = i + 1;
        }
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotator() -> Annotator {
        Annotator::new(Normalizer::builtin().unwrap())
    }

    #[test]
    fn test_tokenize_offsets_are_chars() {
        let tokens = tokenize("Шпиндель станка 2 вибрирует");
        let spans: Vec<(&str, usize, usize)> =
            tokens.iter().map(|t| (t.text, t.start, t.end)).collect();
        assert_eq!(
            spans,
            vec![
                ("Шпиндель", 0, 8),
                ("станка", 9, 15),
                ("2", 16, 17),
                ("вибрирует", 18, 27)
            ]
        );
    }

    #[test]
    fn test_tokenize_keeps_times_and_tags() {
        let tokens: Vec<&str> = tokenize("В 14:30 робот KUKA-5 встал.")
            .iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(tokens, vec!["В", "14:30", "робот", "KUKA-5", "встал", "."]);
    }

    #[test]
    fn test_annotate_lemmas_and_pos() {
        let annotated = annotator().annotate("Шпиндель станка 2 вибрирует");
        let lemmas: Vec<&str> = annotated.tokens.iter().map(|t| t.lemma.as_str()).collect();
        assert_eq!(lemmas, vec!["шпиндель", "станок", "2", "вибрировать"]);
        let pos: Vec<PosTag> = annotated.tokens.iter().map(|t| t.pos).collect();
        assert_eq!(pos, vec![PosTag::Noun, PosTag::Noun, PosTag::Num, PosTag::Verb]);
    }

    #[test]
    fn test_sentence_split() {
        let annotated = annotator().annotate("Пресс шумит. Срочно проверить!  Конвейер стоит");
        let texts: Vec<&str> = annotated.sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Пресс шумит.", "Срочно проверить!", "Конвейер стоит"]);
        let second = &annotated.sentences[1];
        assert_eq!(annotated.sentence_tokens(second).len(), 3);
    }

    #[test]
    fn test_empty_text() {
        let annotated = annotator().annotate("");
        assert!(annotated.tokens.is_empty());
        assert!(annotated.sentences.is_empty());
    }
}
