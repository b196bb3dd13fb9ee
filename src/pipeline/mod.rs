//! Analysis Pipeline Module
//!
//! ## 3-Stage Pipeline Architecture
//!
//! ```text
//! STAGE 1: Description  image + instruction -> short free-text description
//! STAGE 2: Materials    description         -> [[material, likely origin], ...]
//! STAGE 3: Geocoding    stage 2 reply       -> [[place, latitude, longitude], ...]
//! ```
//!
//! CRITICAL GUARANTEE: a stage only starts after the previous stage's reply
//! has been received and parsed. Any failure ends the invocation.
//!
//! [`AnalysisSession`] wraps the pipeline for callers: state machine,
//! in-progress signal and stale-result discarding.

mod coordinator;
pub mod parsing;
pub mod prompts;
mod state;

pub use coordinator::{AnalysisPipeline, PipelineSettings, PipelineStats};
pub use parsing::ParseMode;
pub use state::*;
