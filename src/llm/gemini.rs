//! Gemini backend - `models/{model}:generateContent` over HTTPS
//!
//! One `reqwest::Client` is built per backend and reused for every stage of
//! every invocation; the client pools connections internally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::{InferenceBackend, InferenceRequest};
use crate::config::InferenceConfig;
use crate::error::{PipelineError, UpstreamError};

/// Longest upstream error body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// `ErrorInfo.reason` the service attaches to a 400 for a bad credential.
const INVALID_KEY_REASON: &str = "API_KEY_INVALID";

// ============================================================================
// Wire Types
// ============================================================================

/// Request body for `generateContent`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// Content container used in both requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part. Responses may carry part kinds this client does not
/// use (function calls, thoughts); those decode with `text: None` or
/// `thought: Some(true)` and are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

/// Base64 inline payload used for image requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl From<&InferenceRequest> for GenerateContentRequest {
    /// Image part first, then the instruction text.
    fn from(request: &InferenceRequest) -> Self {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            parts.push(Part {
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                }),
                ..Part::default()
            });
        }
        parts.push(Part {
            text: Some(request.prompt.clone()),
            ..Part::default()
        });
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        }
    }
}

impl GenerateContentResponse {
    /// Concatenated answer text of the first candidate.
    ///
    /// Returns an empty string when the candidate has no text parts; a
    /// prompt the service refused to answer is reported as `Blocked`.
    pub fn into_text(self) -> Result<String, UpstreamError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return match self.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => Err(UpstreamError::Blocked(reason)),
                None => Ok(String::new()),
            };
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.thought != Some(true))
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            if let Some(reason) = candidate
                .finish_reason
                .filter(|r| r == "SAFETY" || r == "PROHIBITED_CONTENT" || r == "BLOCKLIST")
            {
                return Err(UpstreamError::Blocked(reason));
            }
        }
        Ok(text)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Gemini REST backend.
#[derive(Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Create a backend with an explicit API key.
    pub fn new(config: &InferenceConfig, api_key: &str) -> Result<Self, PipelineError> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "inference API key is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            model: config.model.trim().to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Create a backend reading the key from `config.api_key_env`.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, PipelineError> {
        let api_key = config.api_key_from_env()?;
        Self::new(config, &api_key)
    }

    /// Endpoint URL for the configured model.
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    async fn generate(&self, request: &InferenceRequest) -> Result<String, UpstreamError> {
        let body = GenerateContentRequest::from(request);
        let start = Instant::now();

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        debug!(
            model = %self.model,
            status = status.as_u16(),
            bytes = bytes.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "generateContent returned"
        );

        if !status.is_success() {
            let message = error_message(&bytes);
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    UpstreamError::Rejected {
                        status: status.as_u16(),
                        message,
                    }
                }
                // A malformed or unknown key comes back as 400 INVALID_ARGUMENT.
                reqwest::StatusCode::BAD_REQUEST if names_invalid_key(&bytes) => {
                    UpstreamError::Rejected {
                        status: status.as_u16(),
                        message,
                    }
                }
                _ => UpstreamError::Status {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        parsed.into_text()
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Whether an error body carries the `API_KEY_INVALID` reason.
fn names_invalid_key(body: &[u8]) -> bool {
    serde_json::from_slice::<ErrorEnvelope>(body).is_ok_and(|envelope| {
        envelope
            .error
            .details
            .iter()
            .any(|d| d.reason.as_deref() == Some(INVALID_KEY_REASON))
    })
}

/// Best-effort human message from an error body.
fn error_message(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        return match envelope.error.status {
            Some(status) if !envelope.error.message.is_empty() => {
                format!("{status}: {}", envelope.error.message)
            }
            Some(status) => status,
            None => envelope.error.message,
        };
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".to_string();
    }
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
