//! Invocation Session and Analysis State
//!
//! The caller-facing wrapper around [`AnalysisPipeline`]. It turns "a new
//! image was supplied" events into pipeline invocations and tracks:
//!
//! - the state machine `Idle -> Running -> Done | Failed` (and back to
//!   `Running` on the next distinct image),
//! - the in-progress signal a UI renders as a loading indicator,
//! - invocation identifiers, so a late result from a superseded invocation
//!   is discarded instead of overwriting a newer one,
//! - the fingerprint of the last image, so the same image is analyzed once
//!   (a failed image may be resubmitted).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::coordinator::AnalysisPipeline;
use crate::types::{AnalysisOutcome, ImageFingerprint, ImagePayload, PipelineResult};

/// Identifier of one invocation; strictly increasing per session.
pub type InvocationId = u64;

/// Serializable error summary kept in [`AnalysisState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub code: String,
    pub message: String,
}

/// Where the session is.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisState {
    /// No image has been supplied yet.
    #[default]
    Idle,
    Running {
        invocation: InvocationId,
        fingerprint: ImageFingerprint,
        started_at: DateTime<Utc>,
    },
    Done {
        invocation: InvocationId,
        fingerprint: ImageFingerprint,
        completed_at: DateTime<Utc>,
        outcome: AnalysisOutcome,
    },
    Failed {
        invocation: InvocationId,
        fingerprint: ImageFingerprint,
        completed_at: DateTime<Utc>,
        error: FailureSummary,
    },
}

impl AnalysisState {
    pub fn invocation(&self) -> Option<InvocationId> {
        match self {
            AnalysisState::Idle => None,
            AnalysisState::Running { invocation, .. }
            | AnalysisState::Done { invocation, .. }
            | AnalysisState::Failed { invocation, .. } => Some(*invocation),
        }
    }

    pub fn fingerprint(&self) -> Option<&ImageFingerprint> {
        match self {
            AnalysisState::Idle => None,
            AnalysisState::Running { fingerprint, .. }
            | AnalysisState::Done { fingerprint, .. }
            | AnalysisState::Failed { fingerprint, .. } => Some(fingerprint),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AnalysisState::Running { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Running { .. } => "running",
            AnalysisState::Done { .. } => "done",
            AnalysisState::Failed { .. } => "failed",
        }
    }
}

/// What happened to one `submit` call.
#[derive(Debug)]
pub enum Submission {
    /// No image; the pipeline was not invoked.
    NoImage,
    /// Same image as the running or last successful invocation; not
    /// invoked again.
    Duplicate { invocation: InvocationId },
    /// The invocation finished and is still the latest.
    Completed {
        invocation: InvocationId,
        result: PipelineResult,
    },
    /// A newer invocation started first; this result was discarded.
    Stale { invocation: InvocationId },
}

impl Submission {
    pub fn status(&self) -> &'static str {
        match self {
            Submission::NoImage => "no_image",
            Submission::Duplicate { .. } => "duplicate",
            Submission::Completed { .. } => "completed",
            Submission::Stale { .. } => "stale",
        }
    }
}

/// Caller-facing entry point; cheap to clone and share.
#[derive(Clone)]
pub struct AnalysisSession {
    pipeline: Arc<AnalysisPipeline>,
    state: Arc<Mutex<AnalysisState>>,
    in_progress: Arc<watch::Sender<bool>>,
    next_invocation: Arc<AtomicU64>,
}

impl AnalysisSession {
    pub fn new(pipeline: Arc<AnalysisPipeline>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            pipeline,
            state: Arc::new(Mutex::new(AnalysisState::Idle)),
            in_progress: Arc::new(tx),
            next_invocation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn pipeline(&self) -> &Arc<AnalysisPipeline> {
        &self.pipeline
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AnalysisState {
        self.lock_state().clone()
    }

    /// True while the latest invocation is running.
    pub fn in_progress(&self) -> bool {
        *self.in_progress.borrow()
    }

    /// Observe the in-progress signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    /// Handle a "new image supplied" event.
    ///
    /// The in-progress signal is raised before the first await and lowered
    /// on every exit path of the latest invocation.
    pub async fn submit(&self, image: Option<ImagePayload>) -> Submission {
        let Some(image) = image else {
            debug!("Submission without image ignored");
            return Submission::NoImage;
        };

        let invocation = {
            let mut state = self.lock_state();
            // A failed image may be retried; a running or finished one may not.
            if let Some(current) = state.invocation() {
                let repeat = state.fingerprint() == Some(image.fingerprint());
                if repeat && !matches!(*state, AnalysisState::Failed { .. }) {
                    debug!(invocation = current, fingerprint = %image.fingerprint(), "Duplicate image ignored");
                    return Submission::Duplicate {
                        invocation: current,
                    };
                }
            }

            let invocation = self.next_invocation.fetch_add(1, Ordering::SeqCst);
            if let Some(previous) = state.invocation().filter(|_| state.is_running()) {
                info!(previous, invocation, "Superseding running invocation");
            }
            *state = AnalysisState::Running {
                invocation,
                fingerprint: image.fingerprint().clone(),
                started_at: Utc::now(),
            };
            self.in_progress.send_replace(true);
            invocation
        };

        let mut guard = ProgressGuard {
            session: self,
            invocation,
            armed: true,
        };
        let result = self.pipeline.analyze(&image).await;
        guard.armed = false;

        let mut state = self.lock_state();
        if state.invocation() != Some(invocation) {
            warn!(invocation, latest = ?state.invocation(), "Discarding stale result");
            return Submission::Stale { invocation };
        }

        let completed_at = Utc::now();
        let fingerprint = image.fingerprint().clone();
        *state = match &result {
            Ok(outcome) => AnalysisState::Done {
                invocation,
                fingerprint,
                completed_at,
                outcome: outcome.clone(),
            },
            Err(e) => AnalysisState::Failed {
                invocation,
                fingerprint,
                completed_at,
                error: FailureSummary {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
            },
        };
        self.in_progress.send_replace(false);

        Submission::Completed { invocation, result }
    }

    fn lock_state(&self) -> MutexGuard<'_, AnalysisState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Analysis state mutex poisoned, recovering");
            e.into_inner()
        })
    }
}

/// Restores `Idle` and lowers the signal if a submit future is dropped
/// mid-flight while it is still the latest invocation.
struct ProgressGuard<'a> {
    session: &'a AnalysisSession,
    invocation: InvocationId,
    armed: bool,
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.session.lock_state();
        if state.invocation() == Some(self.invocation) && state.is_running() {
            warn!(invocation = self.invocation, "Invocation abandoned before completion");
            *state = AnalysisState::Idle;
            self.session.in_progress.send_replace(false);
        }
    }
}
