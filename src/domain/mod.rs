//! Domain types for fault-report extraction.
//!
//! This module contains the core data structures:
//! - Token: annotated word with part of speech and lemma
//! - Span: labeled character range emitted by taggers and rules
//! - ExtractionResult / Analysis: the structured output

pub mod report;
pub mod span;
pub mod token;

// Re-export commonly used types
pub use report::{capitalize, Analysis, EntityReport, ExtractionResult, Source, Urgency};
pub use span::{byte_to_char_offset, EntityLabel, Span, UnknownLabel};
pub use token::{PosTag, Token};
