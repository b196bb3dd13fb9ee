//! Analysis Pipeline - three-stage image to coordinates sequence
//!
//! ```text
//! STAGE 1: Description  (image + instruction  -> short description)
//! STAGE 2: Materials    (description          -> [[material, place], ...])
//! STAGE 3: Geocoding    (stage 2 reply        -> [[place, lat, lon], ...])
//! ```
//!
//! Stages run strictly in order; each awaits the previous reply. The first
//! failure ends the invocation and nothing from earlier stages is returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::parsing::{parse_coordinates, parse_materials, ParseMode};
use super::prompts;
use crate::config::AppConfig;
use crate::error::{PipelineError, UpstreamError};
use crate::llm::{InferenceBackend, InferenceRequest, InlineImage};
use crate::types::{AnalysisOutcome, ImagePayload, PipelineResult, Stage};

/// Tunables the pipeline reads on every invocation.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub stage_timeout: Duration,
    pub parse_mode: ParseMode,
    pub validate_coordinate_ranges: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            stage_timeout: config.inference.stage_timeout(),
            parse_mode: config.parsing.mode,
            validate_coordinate_ranges: config.parsing.validate_coordinate_ranges,
        }
    }
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PipelineStats {
    pub invocations: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub requests_sent: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    invocations: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    requests_sent: AtomicU64,
}

/// Runs the three stages against a shared inference backend.
///
/// Holds no per-invocation state, so one instance may serve overlapping
/// invocations.
pub struct AnalysisPipeline {
    backend: Arc<dyn InferenceBackend>,
    settings: PipelineSettings,
    stats: StatsCounters,
}

impl AnalysisPipeline {
    pub fn new(backend: Arc<dyn InferenceBackend>, settings: PipelineSettings) -> Self {
        Self {
            backend,
            settings,
            stats: StatsCounters::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            invocations: self.stats.invocations.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            requests_sent: self.stats.requests_sent.load(Ordering::Relaxed),
        }
    }

    /// Run one invocation for `image`.
    pub async fn analyze(&self, image: &ImagePayload) -> PipelineResult {
        self.stats.invocations.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = self.run_stages(image).await;

        match &result {
            Ok(outcome) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    fingerprint = %image.fingerprint(),
                    places = outcome.coordinates.len(),
                    total_ms = start.elapsed().as_millis() as u64,
                    "Analysis complete"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    fingerprint = %image.fingerprint(),
                    code = e.code(),
                    error = %e,
                    total_ms = start.elapsed().as_millis() as u64,
                    "Analysis failed"
                );
            }
        }
        result
    }

    async fn run_stages(&self, image: &ImagePayload) -> PipelineResult {
        image.validate()?;

        // Stage 1: Description
        let request =
            InferenceRequest::with_image(prompts::DESCRIPTION_PROMPT, InlineImage::from(image));
        let description = self.exchange(Stage::Description, &request).await?;
        let description = description.trim().to_string();

        // Stage 2: Materials
        let request = InferenceRequest::text(prompts::materials_prompt(&description));
        let materials_raw = self.exchange(Stage::Materials, &request).await?;
        let materials = parse_materials(&materials_raw, self.settings.parse_mode)
            .map_err(|e| malformed(Stage::Materials, e.reason))?;

        // Stage 3: Geocoding
        let request = InferenceRequest::text(prompts::coordinates_prompt(&materials_raw));
        let raw = self.exchange(Stage::Geocoding, &request).await?;
        let coordinates = parse_coordinates(
            &raw,
            self.settings.parse_mode,
            self.settings.validate_coordinate_ranges,
        )
        .map_err(|e| malformed(Stage::Geocoding, e.reason))?;

        Ok(AnalysisOutcome {
            raw,
            coordinates,
            materials,
            materials_raw,
            description,
        })
    }

    /// One bounded request/response exchange. Empty replies are errors.
    async fn exchange(
        &self,
        stage: Stage,
        request: &InferenceRequest,
    ) -> Result<String, PipelineError> {
        let start = Instant::now();
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);

        let reply = tokio::time::timeout(self.settings.stage_timeout, self.backend.generate(request))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage,
                after: self.settings.stage_timeout,
            })??;

        debug!(
            stage = %stage,
            backend = self.backend.backend_name(),
            model = self.backend.model(),
            multimodal = request.is_multimodal(),
            reply_chars = reply.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Stage reply received"
        );

        if reply.trim().is_empty() {
            return Err(UpstreamError::EmptyResponse { stage }.into());
        }
        Ok(reply)
    }
}

fn malformed(stage: Stage, reason: String) -> PipelineError {
    UpstreamError::MalformedResponse { stage, reason }.into()
}
