use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::VisionConfig;
use crate::errors::AnalysisError;
use crate::meals::dto::{CorrelationId, ImagePayload};
use crate::meals::prompt::Prompt;

/// A multimodal model that can describe an image given a prompt.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Whether a credential is available. Checked before any request.
    fn is_configured(&self) -> bool;

    async fn generate(
        &self,
        prompt: &Prompt,
        image: &ImagePayload,
        correlation_id: &CorrelationId,
    ) -> Result<String, AnalysisError>;
}

#[derive(Clone)]
pub struct GeminiVision {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiVision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiVision")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiVision {
    pub fn new(cfg: &VisionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build vision http client")?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

fn invocation(e: anyhow::Error) -> AnalysisError {
    AnalysisError::Invocation(e)
}

#[async_trait]
impl VisionClient for GeminiVision {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, prompt, image, correlation_id), fields(%correlation_id))]
    async fn generate(
        &self,
        prompt: &Prompt,
        image: &ImagePayload,
        correlation_id: &CorrelationId,
    ) -> Result<String, AnalysisError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AnalysisError::Configuration(
                "GEMINI_API_KEY is not set".into(),
            ));
        };

        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text { text: &prompt.system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: &image.content_type,
                            data: STANDARD.encode(&image.body),
                        },
                    },
                    Part::Text { text: &prompt.user },
                ],
            }],
        };

        debug!(model = %self.model, bytes = image.body.len(), "sending generateContent");
        let res = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .header("x-correlation-id", correlation_id.as_str())
            .json(&body)
            .send()
            .await
            .context("send generateContent")
            .map_err(invocation)?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("read generateContent body")
            .map_err(invocation)?;

        if !status.is_success() {
            error!(%status, "vision model returned an error status");
            let detail = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(invocation(anyhow!("{} returned {}: {}", self.model, status, detail)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .context("decode generateContent response")
            .map_err(invocation)?;

        if let Some(e) = parsed.error {
            return Err(invocation(anyhow!("{} error: {}", self.model, e.message)));
        }

        let out: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if out.is_empty() {
            return Err(invocation(anyhow!("{} returned no text", self.model)));
        }
        debug!(chars = out.len(), "vision model answered");
        Ok(out)
    }
}
