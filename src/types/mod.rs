//! Shared data structures for the material-origin analysis pipeline
//!
//! This module defines the values that flow between pipeline stages:
//! - Input: ImagePayload (bytes + MIME type, fingerprinted)
//! - Stage 1: description text
//! - Stage 2: MaterialEntry list (material, likely production place)
//! - Stage 3: CoordinateEntry list (place, latitude, longitude)
//! - Output: AnalysisOutcome / PipelineResult

mod image;
mod analysis;

pub use image::*;
pub use analysis::*;
