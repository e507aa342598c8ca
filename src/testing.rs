use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    errors::GenerationFailure,
    providers::{GenerationModel, GenerationRequest},
};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, GenerationFailure> + Send + Sync;

/// In-process model that records every request and answers through a closure.
pub(crate) struct RecordingModel {
    responder: Box<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingModel {
    pub(crate) fn new(
        responder: impl Fn(&GenerationRequest) -> Result<String, GenerationFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &'static str) -> Self {
        Self::new(move |_| Ok(text.to_string()))
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationModel for RecordingModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationFailure> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}
