//! Error taxonomy for the analysis pipeline.
//!
//! Every failure a caller can observe is a [`PipelineError`]. Its `Display`
//! output is the message shown to the end user after an `Error: ` prefix, and
//! [`PipelineError::code`] is the stable identifier used by the HTTP envelope.

use std::time::Duration;

use crate::types::Stage;

/// Failures of the external inference service.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("inference service unreachable: {0}")]
    Transport(String),

    #[error("inference service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// 401/403, or a 400 naming an invalid key. Promoted to a configuration
    /// error at the pipeline boundary.
    #[error("inference service rejected the credential (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("inference service blocked the request: {0}")]
    Blocked(String),

    #[error("inference service returned no text for the {stage} stage")]
    EmptyResponse { stage: Stage },

    #[error("could not decode inference service response: {0}")]
    Decode(String),

    #[error("malformed {stage} response: {reason}")]
    MalformedResponse { stage: Stage, reason: String },
}

/// Any failure of one pipeline invocation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Upstream(UpstreamError),

    #[error("{stage} stage timed out after {}s", .after.as_secs_f64())]
    Timeout { stage: Stage, after: Duration },
}

impl PipelineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::Input(_) => "INPUT_ERROR",
            PipelineError::Upstream(_) => "UPSTREAM_ERROR",
            PipelineError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Text shown to the end user in place of a result.
    pub fn display_text(&self) -> String {
        format!("Error: {self}")
    }
}

impl From<UpstreamError> for PipelineError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Rejected { .. } => PipelineError::Configuration(err.to_string()),
            other => PipelineError::Upstream(other),
        }
    }
}
