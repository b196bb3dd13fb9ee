//! Inference Backend Module
//!
//! Provides a unified interface to the external text-and-image inference
//! service. The pipeline only ever sees [`InferenceBackend`]; the concrete
//! backend is created once at startup and shared behind an `Arc`.
//!
//! ## Backends
//!
//! - **GeminiBackend**: Google Gemini `generateContent` REST API over `reqwest`

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::types::ImagePayload;

mod gemini;

pub use gemini::{GeminiBackend, GenerateContentRequest, GenerateContentResponse};

/// Image data attached to a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl From<&ImagePayload> for InlineImage {
    fn from(payload: &ImagePayload) -> Self {
        Self {
            mime_type: payload.mime_type().to_string(),
            data: payload.to_base64(),
        }
    }
}

/// One prompt, optionally with an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl InferenceRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }

    pub fn is_multimodal(&self) -> bool {
        self.image.is_some()
    }
}

/// Unified trait for inference backends
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Submit a request and return the model's free-form text answer
    async fn generate(&self, request: &InferenceRequest) -> Result<String, UpstreamError>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &'static str;

    /// Model identifier addressed by this backend
    fn model(&self) -> &str;
}
