//! Shared fixtures for integration tests: a scripted inference backend that
//! records every request and answers per stage.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use material_origin::error::UpstreamError;
use material_origin::llm::{InferenceBackend, InferenceRequest};
use material_origin::pipeline::{AnalysisPipeline, AnalysisSession, PipelineSettings};
use material_origin::types::ImagePayload;

pub const CHAIR_DESCRIPTION: &str = "A wooden dining chair.";
pub const CHAIR_MATERIALS: &str = r#"[["oak wood","Vermont"]]"#;
pub const CHAIR_COORDINATES: &str = r#"[["Vermont",44.26,-72.58]]"#;

/// How the backend answers one stage.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    /// Transport failure with this message
    Fail(String),
    /// HTTP status failure
    Status(u16, String),
    /// Wait this long, then reply
    Delay(Duration, String),
}

impl Step {
    pub fn reply(text: &str) -> Self {
        Step::Reply(text.to_string())
    }
}

/// Backend that answers by stage: multimodal requests are the description
/// stage, text prompts are told apart by their opening words.
pub struct ScriptedBackend {
    description: Mutex<Step>,
    materials: Mutex<Step>,
    coordinates: Mutex<Step>,
    requests: Mutex<Vec<InferenceRequest>>,
    /// Description-stage requests carrying this base64 image wait on the
    /// paired notifier before answering.
    hold: Mutex<Option<(String, Arc<Notify>)>>,
}

impl ScriptedBackend {
    pub fn new(description: Step, materials: Step, coordinates: Step) -> Self {
        Self {
            description: Mutex::new(description),
            materials: Mutex::new(materials),
            coordinates: Mutex::new(coordinates),
            requests: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    /// Answers for the wooden chair example.
    pub fn chair() -> Self {
        Self::new(
            Step::reply(CHAIR_DESCRIPTION),
            Step::reply(CHAIR_MATERIALS),
            Step::reply(CHAIR_COORDINATES),
        )
    }

    pub fn set_description(&self, step: Step) {
        *self.description.lock().unwrap() = step;
    }

    pub fn set_materials(&self, step: Step) {
        *self.materials.lock().unwrap() = step;
    }

    pub fn set_coordinates(&self, step: Step) {
        *self.coordinates.lock().unwrap() = step;
    }

    /// Block the description stage for `image` until the returned notifier
    /// fires.
    pub fn hold_image(&self, image: &ImagePayload) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some((image.to_base64(), notify.clone()));
        notify
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn step_for(&self, request: &InferenceRequest) -> Step {
        let slot = if request.is_multimodal() {
            &self.description
        } else if request.prompt.starts_with("What are the materials") {
            &self.materials
        } else {
            &self.coordinates
        };
        slot.lock().unwrap().clone()
    }

    fn held_notifier(&self, request: &InferenceRequest) -> Option<Arc<Notify>> {
        let image = request.image.as_ref()?;
        let hold = self.hold.lock().unwrap();
        match hold.as_ref() {
            Some((data, notify)) if *data == image.data => Some(notify.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(&self, request: &InferenceRequest) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(notify) = self.held_notifier(request) {
            notify.notified().await;
        }

        match self.step_for(request) {
            Step::Reply(text) => Ok(text),
            Step::Fail(message) => Err(UpstreamError::Transport(message)),
            Step::Status(status, message) => Err(UpstreamError::Status { status, message }),
            Step::Delay(after, text) => {
                tokio::time::sleep(after).await;
                Ok(text)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

pub fn session_with(backend: Arc<ScriptedBackend>, settings: PipelineSettings) -> AnalysisSession {
    let pipeline = AnalysisPipeline::new(backend, settings);
    AnalysisSession::new(Arc::new(pipeline))
}

pub fn chair_session() -> (Arc<ScriptedBackend>, AnalysisSession) {
    let backend = Arc::new(ScriptedBackend::chair());
    let session = session_with(backend.clone(), PipelineSettings::default());
    (backend, session)
}

pub fn png(bytes: &[u8]) -> ImagePayload {
    ImagePayload::new(bytes.to_vec(), "image/png").unwrap()
}
