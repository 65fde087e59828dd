//! Model persistence.
//!
//! A model directory holds `weights.json`, `meta.json` and a `.lock` file.
//! Writers take an exclusive lock and replace each file atomically; readers
//! take a shared lock and verify the weights checksum recorded in the meta.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;
use uuid::Uuid;

use super::perceptron::{SequenceTagger, TrainingReport};
use super::ModelError;
use crate::domain::EntityLabel;

pub const WEIGHTS_FILE: &str = "weights.json";
pub const META_FILE: &str = "meta.json";
pub const LOCK_FILE: &str = ".lock";

const FORMAT_VERSION: u32 = 1;

/// Metadata stored next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub format_version: u32,
    pub labels: Vec<EntityLabel>,
    pub iterations: usize,
    pub examples: usize,
    pub final_accuracy: f64,
    /// "sha256:<hex>" of `weights.json`
    pub weights_sha256: String,
}

/// Compute SHA256 of bytes as "sha256:<hex>"
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn open_lock(dir: &Path) -> Result<File, ModelError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dir.join(LOCK_FILE))
        .map_err(ModelError::Lock)
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), ModelError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| ModelError::Io(e.error))?;
    Ok(())
}

/// Write a model and its metadata into `dir`
pub fn save_model(
    dir: &Path,
    model: &SequenceTagger,
    report: Option<&TrainingReport>,
) -> Result<ModelMeta, ModelError> {
    fs::create_dir_all(dir)?;
    let lock = open_lock(dir)?;
    lock.lock_exclusive().map_err(ModelError::Lock)?;

    let weights = serde_json::to_vec(model)?;
    let meta = ModelMeta {
        model_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        format_version: FORMAT_VERSION,
        labels: model.labels(),
        iterations: report.map(|r| r.iterations.len()).unwrap_or(0),
        examples: report.map(|r| r.examples).unwrap_or(0),
        final_accuracy: report.map(|r| r.final_accuracy).unwrap_or(0.0),
        weights_sha256: compute_hash(&weights),
    };

    write_atomic(dir, WEIGHTS_FILE, &weights)?;
    write_atomic(dir, META_FILE, &serde_json::to_vec_pretty(&meta)?)?;

    info!(dir = %dir.display(), model_id = %meta.model_id, "model saved");
    // Lock is released when the file is dropped
    Ok(meta)
}

/// Read and verify a model from `dir`
pub fn load_model(dir: &Path) -> Result<(SequenceTagger, ModelMeta), ModelError> {
    let weights_path: PathBuf = dir.join(WEIGHTS_FILE);
    let meta_path = dir.join(META_FILE);
    if !weights_path.exists() || !meta_path.exists() {
        return Err(ModelError::NotFound(dir.to_path_buf()));
    }

    let lock = open_lock(dir)?;
    lock.lock_shared().map_err(ModelError::Lock)?;

    let meta: ModelMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
    if meta.format_version != FORMAT_VERSION {
        return Err(ModelError::UnsupportedFormat(meta.format_version));
    }
    let weights = fs::read(&weights_path)?;
    let actual = compute_hash(&weights);
    if actual != meta.weights_sha256 {
        return Err(ModelError::ChecksumMismatch {
            expected: meta.weights_sha256,
            actual,
        });
    }
    let model: SequenceTagger = serde_json::from_slice(&weights)?;
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compute_hash_format() {
        let hash = compute_hash(b"weights");
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), 7 + 64);
    }

    #[test]
    fn test_save_then_load_empty_model() {
        let dir = TempDir::new().unwrap();
        let meta = save_model(dir.path(), &SequenceTagger::empty(), None).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());

        let (model, loaded) = load_model(dir.path()).unwrap();
        assert_eq!(model, SequenceTagger::empty());
        assert_eq!(loaded, meta);
    }

    #[test]
    fn test_missing_model() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(load_model(dir.path()), Err(ModelError::NotFound(_))));
    }
}
