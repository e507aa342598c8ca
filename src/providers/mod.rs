pub mod openai;
pub mod retry;

pub use openai::OpenAiChatModel;
pub use retry::{RetryPolicy, RetryingModel};

use async_trait::async_trait;

use crate::{capabilities::EncodedImage, errors::GenerationFailure};

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// System-role text, if any.
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<EncodedImage>,
    /// Upper bound on output tokens.
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            image: None,
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: EncodedImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// The remote vision/text model: prompt (and optional image) in, text out.
///
/// Implementations are constructed once and shared read-only across runs.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationFailure>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Accept any text with visible content, verbatim. Blank output is a failure.
pub fn require_text(text: String) -> Result<String, GenerationFailure> {
    if text.trim().is_empty() {
        Err(GenerationFailure::EmptyResponse)
    } else {
        Ok(text)
    }
}
