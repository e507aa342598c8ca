use std::{sync::Arc, time::Instant};

use tracing::{debug, info};

use crate::{
    capabilities::encode,
    errors::Result,
    models::{Caption, ImageAsset},
    providers::{GenerationModel, GenerationRequest, require_text},
};

pub const CAPTION_INSTRUCTION: &str = "Describe this image in 2–3 sentences. Focus on: who is in the scene, what they are doing, the mood or emotion, and the setting.";

/// Turns one image into a short description using a vision-capable model.
pub struct Captioner {
    model: Arc<dyn GenerationModel>,
    max_tokens: u32,
}

impl Captioner {
    pub fn new(model: Arc<dyn GenerationModel>, max_tokens: u32) -> Self {
        Self { model, max_tokens }
    }

    pub fn request_for(&self, asset: &ImageAsset) -> Result<GenerationRequest> {
        let image = encode(asset)?;
        Ok(GenerationRequest::new(CAPTION_INSTRUCTION, self.max_tokens).with_image(image))
    }

    /// Caption the image at 1-based position `index`. The model's text is
    /// returned as-is; blank output is a failure.
    pub async fn caption(&self, index: usize, asset: &ImageAsset) -> Result<Caption> {
        let request = self.request_for(asset)?;
        let started = Instant::now();

        debug!(
            target: "captioner",
            image = index,
            name = asset.name(),
            bytes = asset.len(),
            mime = asset.mime_type(),
            "requesting caption"
        );

        let text = self.model.generate(&request).await?;
        let text = require_text(text)?;

        info!(
            target: "captioner",
            image = index,
            model = self.model.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "caption ready"
        );

        Ok(Caption::new(index, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{GenerationFailure, StoryError},
        testing::RecordingModel,
    };

    #[tokio::test]
    async fn sends_instruction_image_and_token_bound() {
        let model = Arc::new(RecordingModel::replying("A dog naps on a porch."));
        let captioner = Captioner::new(model.clone(), 200);
        let asset = ImageAsset::new("dog.png", b"png-bytes".to_vec(), "image/png");

        let caption = captioner.caption(1, &asset).await.unwrap();
        assert_eq!(caption, Caption::new(1, "A dog naps on a porch."));

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, CAPTION_INSTRUCTION);
        assert_eq!(requests[0].max_tokens, 200);
        assert!(requests[0].system.is_none());
        assert_eq!(
            requests[0].image.as_ref().map(|image| image.mime_type()),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn blank_caption_is_a_generation_failure() {
        let model = Arc::new(RecordingModel::replying("  \n"));
        let captioner = Captioner::new(model, 200);
        let asset = ImageAsset::new("a.jpg", b"jpeg".to_vec(), "image/jpeg");

        let err = captioner.caption(1, &asset).await.unwrap_err();
        assert!(matches!(
            err,
            StoryError::Generation(GenerationFailure::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn empty_image_never_reaches_the_model() {
        let model = Arc::new(RecordingModel::replying("unused"));
        let captioner = Captioner::new(model.clone(), 200);
        let asset = ImageAsset::new("empty.png", Vec::new(), "image/png");

        let err = captioner.caption(1, &asset).await.unwrap_err();
        assert!(matches!(err, StoryError::Encoding(_)));
        assert!(model.requests().is_empty());
    }
}
