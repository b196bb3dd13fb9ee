//! material-origin: Image to Material Origin Analysis
//!
//! Identifies the object in an image, the materials it is made of, where
//! those materials are most likely produced, and the coordinates of those
//! places, by chaining three requests to a generative-AI service.
//!
//! ## Architecture
//!
//! - **Pipeline**: three strictly ordered stages (description, materials,
//!   geocoding) with parsed inter-stage contracts
//! - **Session**: in-progress signal, duplicate suppression and stale-result
//!   discarding across invocations
//! - **LLM Module**: inference backend trait and the Gemini REST client
//! - **Ingest**: images from files, uploads, URLs and dropped HTML
//! - **API**: axum HTTP surface over the session

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, UpstreamError};
pub use llm::{GeminiBackend, InferenceBackend, InferenceRequest};
pub use pipeline::{
    AnalysisPipeline, AnalysisSession, AnalysisState, ParseMode, PipelineSettings, Submission,
};
pub use types::{
    AnalysisOutcome, CoordinateEntry, ImageFingerprint, ImagePayload, MaterialEntry,
    PipelineResult, Stage,
};
