//! Whisper transcription backend.
//!
//! Shells out to local whisper binary for transcription.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Result of transcription
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
    pub duration_seconds: f64,
}

/// How to invoke whisper
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriberSettings {
    pub whisper_path: String,
    pub model: String,
    pub language: String,
    pub timeout: Duration,
}

impl Default for TranscriberSettings {
    fn default() -> Self {
        Self {
            whisper_path: std::env::var("WHISPER_PATH").unwrap_or_else(|_| "whisper".to_string()),
            model: "base".to_string(),
            language: "ru".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

/// Transcribe audio using local Whisper binary
#[instrument(skip(settings), fields(model = %settings.model))]
pub async fn transcribe(audio_path: &Path, settings: &TranscriberSettings) -> Result<TranscriptResult> {
    if !audio_path.exists() {
        anyhow::bail!("Audio file not found: {}", audio_path.display());
    }

    let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

    let run = Command::new(&settings.whisper_path)
        .arg(audio_path)
        .arg("--model")
        .arg(&settings.model)
        .arg("--output_dir")
        .arg(temp_dir.path())
        .arg("--output_format")
        .arg("json")
        .arg("--language")
        .arg(&settings.language)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(settings.timeout, run)
        .await
        .with_context(|| format!("Whisper timed out after {:?}", settings.timeout))?
        .with_context(|| format!("Failed to run whisper at {}", settings.whisper_path))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Whisper failed: {}", stderr);
    }

    let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
    let json_path = temp_dir.path().join(format!("{}.json", stem));

    let json_content = tokio::fs::read_to_string(&json_path)
        .await
        .context("Failed to read whisper output")?;

    let result = parse_whisper_output(&json_content, &settings.language)?;
    debug!(chars = result.text.chars().count(), "transcript ready");
    Ok(result)
}

fn parse_whisper_output(json: &str, default_language: &str) -> Result<TranscriptResult> {
    let whisper: WhisperOutput = serde_json::from_str(json).context("Failed to parse whisper JSON")?;

    let duration = whisper.segments.last().map(|s| s.end).unwrap_or(0.0);

    Ok(TranscriptResult {
        text: whisper.text.trim().to_string(),
        language: if whisper.language.is_empty() {
            default_language.to_string()
        } else {
            whisper.language
        },
        duration_seconds: duration,
    })
}
