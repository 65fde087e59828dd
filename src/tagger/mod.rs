//! Sequence tagging.
//!
//! `EntityTagger` is the seam the fusion step consumes: `predict(text)`
//! returns labeled character spans. `TaggerAdapter` owns a trainable
//! `SequenceTagger` plus the metadata of the model it was loaded from.

pub mod corpus;
pub mod perceptron;
pub mod store;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::Span;

pub use corpus::{AlignmentStats, Annotations, Bio, TrainingCorpus, TrainingExample};
pub use perceptron::{IterationStats, SequenceTagger, TrainingConfig, TrainingReport};
pub use store::{load_model, save_model, ModelMeta};

/// Errors that reject a training corpus
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Training corpus is empty")]
    EmptyCorpus,

    #[error("Span {start}..{end} is out of range in {text:?}")]
    InvalidSpan { text: String, start: usize, end: usize },

    #[error("Span {start}..{end} overlaps another span in {text:?}")]
    OverlappingSpans { text: String, start: usize, end: usize },
}

/// Errors reading or writing a persisted model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No model found in {0}")]
    NotFound(PathBuf),

    #[error("Weights checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unsupported model format version: {0}")]
    UnsupportedFormat(u32),

    #[error("Failed to lock model directory: {0}")]
    Lock(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Anything that labels entity spans in raw text
pub trait EntityTagger: Send + Sync {
    fn predict(&self, text: &str) -> Vec<Span>;
}

/// Trainable tagger with load/save support
#[derive(Debug, Clone, Default)]
pub struct TaggerAdapter {
    model: SequenceTagger,
    meta: Option<ModelMeta>,
    last_report: Option<TrainingReport>,
}

impl TaggerAdapter {
    /// Untrained adapter; predicts nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_model(model: SequenceTagger) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let (model, meta) = load_model(dir)?;
        info!(dir = %dir.display(), model_id = %meta.model_id, "tagger model loaded");
        Ok(Self {
            model,
            meta: Some(meta),
            last_report: None,
        })
    }

    /// Load `dir`, or fall back to the empty model
    pub fn load_or_empty(dir: &Path) -> Self {
        match Self::load(dir) {
            Ok(adapter) => adapter,
            Err(ModelError::NotFound(_)) => {
                info!(dir = %dir.display(), "no tagger model, rules only");
                Self::empty()
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unusable tagger model, falling back to empty");
                Self::empty()
            }
        }
    }

    /// Train a fresh model and swap it in only if training succeeds
    #[instrument(skip_all, fields(examples = corpus.len()))]
    pub fn fit(&mut self, corpus: &TrainingCorpus, config: &TrainingConfig) -> Result<&TrainingReport, TrainingError> {
        match SequenceTagger::train(corpus, config) {
            Ok((model, report)) => {
                self.model = model;
                self.meta = None;
                Ok(self.last_report.insert(report))
            }
            Err(e) => {
                warn!(error = %e, "training failed, keeping previous model");
                Err(e)
            }
        }
    }

    pub fn save(&mut self, dir: &Path) -> Result<&ModelMeta, ModelError> {
        let meta = save_model(dir, &self.model, self.last_report.as_ref())?;
        Ok(self.meta.insert(meta))
    }

    pub fn model(&self) -> &SequenceTagger {
        &self.model
    }

    pub fn meta(&self) -> Option<&ModelMeta> {
        self.meta.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        !self.model.is_empty()
    }
}

impl EntityTagger for TaggerAdapter {
    fn predict(&self, text: &str) -> Vec<Span> {
        self.model.predict(text)
    }
}
