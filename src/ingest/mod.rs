//! Input sources for fault reports.
//!
//! Reports arrive as text. Voice reports are transcribed first by a local
//! speech-to-text binary; the transcript then goes through the regular
//! analysis pipeline.

pub mod transcriber;

pub use transcriber::{transcribe, TranscriberSettings, TranscriptResult};
