use std::{sync::Arc, time::Instant};

use tracing::info;

use crate::{
    capabilities::render_caption_list,
    errors::Result,
    models::{Caption, Outline, Story, StoryParameters},
    providers::{GenerationModel, GenerationRequest, require_text},
};

pub const WRITER_ROLE: &str = "You are a creative story writer.";

/// Second writing pass: expands the outline into prose.
///
/// Length and content requirements are advisory; the returned text is not
/// checked against them.
pub struct StoryComposer {
    model: Arc<dyn GenerationModel>,
    max_tokens: u32,
}

impl StoryComposer {
    pub fn new(model: Arc<dyn GenerationModel>, max_tokens: u32) -> Self {
        Self { model, max_tokens }
    }

    pub fn render_prompt(captions: &[Caption], outline: &Outline, params: &StoryParameters) -> String {
        let caption_list = render_caption_list(captions);

        format!(
            "You are a creative story writer.\n\
             \n\
             You will be given:\n\
             1) A sequence of image descriptions\n\
             2) A story outline created by a planner model\n\
             3) Desired tone, audience, and length\n\
             \n\
             IMAGE DESCRIPTIONS:\n\
             {caption_list}\
             \n\
             OUTLINE (from planner model):\n\
             {outline}\n\
             \n\
             Write a single coherent story that:\n\
             - Follows the OUTLINE closely\n\
             - Uses the images in order as beginning, middle, and end\n\
             - Introduces characters and setting clearly\n\
             - Creates a problem or adventure in the middle\n\
             - Resolves it nicely at the end\n\
             - Includes some dialogue and emotions\n\
             - Feels like a short storybook.\n\
             \n\
             Tone: {tone}\n\
             Audience: {audience}\n\
             Target length: about {words}\n",
            outline = outline.as_str(),
            tone = params.tone,
            audience = params.audience,
            words = params.length.target_words(),
        )
    }

    pub fn request_for(
        &self,
        captions: &[Caption],
        outline: &Outline,
        params: &StoryParameters,
    ) -> GenerationRequest {
        GenerationRequest::new(Self::render_prompt(captions, outline, params), self.max_tokens)
            .with_system(WRITER_ROLE)
    }

    pub async fn compose(
        &self,
        captions: &[Caption],
        outline: &Outline,
        params: &StoryParameters,
    ) -> Result<Story> {
        let request = self.request_for(captions, outline, params);
        let started = Instant::now();

        let text = require_text(self.model.generate(&request).await?)?;

        info!(
            target: "composer",
            model = self.model.model_name(),
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "story ready"
        );

        Ok(Story::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::{GenerationFailure, StoryError},
        models::{Audience, LengthBucket, Tone},
        testing::RecordingModel,
    };

    #[test]
    fn prompt_embeds_outline_verbatim_and_word_target() {
        let captions = vec![Caption::new(1, "A cat on a fence."), Caption::new(2, "The cat asleep.")];
        let outline = Outline::new("characters: [Mog]\nsetting: a garden\ntheme: rest");
        let params = StoryParameters::new(Tone::Funny, Audience::Adults, LengthBucket::Medium);

        let prompt = StoryComposer::render_prompt(&captions, &outline, &params);
        assert!(prompt.contains("1. A cat on a fence.\n2. The cat asleep.\n"));
        assert!(prompt.contains("OUTLINE (from planner model):\ncharacters: [Mog]\nsetting: a garden\ntheme: rest\n"));
        assert!(prompt.contains("Tone: Funny\n"));
        assert!(prompt.contains("Audience: Adults\n"));
        assert!(prompt.contains("Target length: about 500–800 words\n"));
        assert!(prompt.contains("Includes some dialogue and emotions"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let captions = vec![Caption::new(1, "A fox at dawn."), Caption::new(2, "The fox at dusk.")];
        let outline = Outline::new("characters: [Fen]\ntheme: home");
        let params = StoryParameters::new(Tone::Fantasy, Audience::General, LengthBucket::Long);

        let first = StoryComposer::render_prompt(&captions, &outline, &params);
        let second = StoryComposer::render_prompt(&captions, &outline, &params);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[tokio::test]
    async fn compose_uses_writer_role_and_larger_bound() {
        let model = Arc::new(RecordingModel::replying("Once upon a time..."));
        let composer = StoryComposer::new(model.clone(), 1600);
        let captions = vec![Caption::new(1, "A kite.")];

        let story = composer
            .compose(&captions, &Outline::new("plan"), &StoryParameters::default())
            .await
            .unwrap();
        assert_eq!(story.as_str(), "Once upon a time...");

        let requests = model.requests();
        assert_eq!(requests[0].system.as_deref(), Some(WRITER_ROLE));
        assert_eq!(requests[0].max_tokens, 1600);
    }

    #[tokio::test]
    async fn provider_failure_propagates_unchanged() {
        let model = Arc::new(RecordingModel::new(|_| {
            Err(GenerationFailure::Quota("insufficient_quota".into()))
        }));
        let composer = StoryComposer::new(model, 1600);

        let err = composer
            .compose(&[Caption::new(1, "x")], &Outline::new("plan"), &StoryParameters::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoryError::Generation(GenerationFailure::Quota(_))
        ));
    }
}
