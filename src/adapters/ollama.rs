//! Ollama-style text generation annotator.
//!
//! POST `{model, prompt, stream: false}` to the generate endpoint; the
//! generated text is in the `response` field of the reply.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{parse_generation, AnnotatorError, RemoteAnnotator, RemoteExtraction};

pub const DEFAULT_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_MODEL: &str = "phi3";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Build the extraction prompt with a one-shot example
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Ты — система анализа промышленного оборудования. Извлеки данные из текста в формате JSON, приводя все сущности к начальной форме (единственное число, именительный падеж).

Текст: "{text}"

Правила:
1. equipment: тип оборудования (электродвигатель, пресс, насос и т.д.)
2. number: идентификатор оборудования
3. symptom: проблема в начальной форме
4. action: требуемое действие (инфинитив)
5. urgency: нормальный/срочный/критичный (срочный при словах "срочно", "авария")

Пример вывода:
{{
  "equipment": "электродвигатель",
  "number": "12",
  "symptom": "коррозия",
  "action": "проверить",
  "urgency": "нормальный"
}}

Выведи ТОЛЬКО JSON, без других слов или комментариев."#
    )
}

/// Annotator backed by an Ollama generate endpoint
#[derive(Debug, Clone)]
pub struct OllamaAnnotator {
    url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl Default for OllamaAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_URL, DEFAULT_MODEL, Duration::from_secs(60))
    }
}

impl OllamaAnnotator {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, text: &str) -> Result<RemoteExtraction, AnnotatorError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(text),
            stream: false,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, "remote annotator returned an error status");
            return Ok(RemoteExtraction::Raw { raw_response: body });
        }

        match serde_json::from_str::<GenerateResponse>(&body) {
            Ok(generated) => Ok(parse_generation(&generated.response)),
            Err(e) => {
                debug!(error = %e, "generate reply is not JSON");
                Ok(RemoteExtraction::Raw { raw_response: body })
            }
        }
    }
}

#[async_trait]
impl RemoteAnnotator for OllamaAnnotator {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn annotate(&self, text: &str) -> Result<RemoteExtraction, AnnotatorError> {
        timeout(self.timeout, self.request(text))
            .await
            .map_err(|_| AnnotatorError::Timeout(self.timeout))?
    }
}
