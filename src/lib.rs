//! istok - entity resolution for equipment fault reports
//!
//! Turns a free-text Russian fault report into a structured record:
//! equipment type and identifier, affected components, symptoms, required
//! actions, urgency and timestamp.
//!
//! # Architecture
//!
//! Two extractors run side by side and are reconciled:
//! - a deterministic pass: morphology-aware dictionary matching plus rules
//! - a trainable BIO sequence tagger
//!
//! The fusion policy prefers tagger spans per category and backfills from
//! the rules, then renders sentinels for anything still missing.
//!
//! # Modules
//!
//! - `domain`: Data structures (Token, Span, ExtractionResult, Analysis)
//! - `morphology`: Lemmatisation, POS guessing, noun derivation
//! - `lexical`: Term dictionary and lexical matcher
//! - `annotate`: Tokenizer, sentence splitter, annotation
//! - `extract`: Rule-based extractor
//! - `tagger`: Sequence tagger, training and persistence
//! - `fusion`: Fusion policy and the analysis pipeline
//! - `adapters`: Remote LLM annotator and dashboard links
//! - `ingest`: Speech-to-text input
//! - `config`, `cli`: Configuration and command-line interface
//!
//! # Usage
//!
//! ```bash
//! istok analyze "Шпиндель станка 2 вибрирует"
//! istok train --corpus 'data/*.json'
//! ```

pub mod adapters;
pub mod annotate;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod fusion;
pub mod ingest;
pub mod lexical;
pub mod morphology;
pub mod tagger;

// Re-export main types at crate root for convenience
pub use domain::{Analysis, EntityLabel, EntityReport, ExtractionResult, PosTag, Source, Span, Token, Urgency};
pub use fusion::{FaultAnalyzer, FusionPolicy};
pub use lexical::{ConceptClass, LexicalMatcher, TermDictionary};
pub use morphology::{LexiconMorphology, Morphology, Normalizer};
pub use tagger::{EntityTagger, TaggerAdapter, TrainingCorpus};
