//! Image payload: the unit of input for one pipeline invocation.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// SHA-256 digest of the image bytes, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageFingerprint(String);

impl ImageFingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary image data plus its MIME type.
///
/// Construction rejects empty data and non-`image/*` types, so a value of
/// this type is always a plausible image. It is never mutated after creation.
#[derive(Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: String,
    fingerprint: ImageFingerprint,
}

impl ImagePayload {
    /// Build a payload, validating the MIME type and size.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self, PipelineError> {
        let mime_type = normalize_mime(&mime_type.into());
        validate(&bytes, &mime_type)?;
        let fingerprint = ImageFingerprint::of(&bytes);
        Ok(Self {
            bytes,
            mime_type,
            fingerprint,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn fingerprint(&self) -> &ImageFingerprint {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 encoding of the bytes, as sent inline to the inference service.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// Re-check the construction invariants.
    ///
    /// The pipeline calls this before any network request.
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate(&self.bytes, &self.mime_type)
    }
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Whether a MIME type names an image (`image/*`).
pub fn is_image_mime(mime_type: &str) -> bool {
    normalize_mime(mime_type)
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Lowercase, drop parameters (`image/png; charset=x` -> `image/png`).
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn validate(bytes: &[u8], mime_type: &str) -> Result<(), PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Input("image payload is empty".to_string()));
    }
    if !is_image_mime(mime_type) {
        return Err(PipelineError::Input(format!(
            "expected an image MIME type, got '{mime_type}'"
        )));
    }
    Ok(())
}
