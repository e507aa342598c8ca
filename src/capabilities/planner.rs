use std::{sync::Arc, time::Instant};

use tracing::info;

use crate::{
    capabilities::render_caption_list,
    errors::Result,
    models::{Caption, Outline, StoryParameters},
    providers::{GenerationModel, GenerationRequest, require_text},
};

pub const PLANNER_ROLE: &str = "You are an expert story planner.";

/// First writing pass: asks for an outline, never for prose.
pub struct OutlinePlanner {
    model: Arc<dyn GenerationModel>,
    max_tokens: u32,
}

impl OutlinePlanner {
    pub fn new(model: Arc<dyn GenerationModel>, max_tokens: u32) -> Self {
        Self { model, max_tokens }
    }

    pub fn render_prompt(captions: &[Caption], params: &StoryParameters) -> String {
        let caption_list = render_caption_list(captions);
        let plot_beats: String = (1..=captions.len())
            .map(|image| format!("  - one sentence for what happens in image {image}\n"))
            .collect();

        format!(
            "You are a story planner (not the final writer).\n\
             \n\
             The user has a sequence of images with these descriptions:\n\
             \n\
             {caption_list}\
             \n\
             The final story should be:\n\
             - Tone: {tone}\n\
             - Audience: {audience}\n\
             - Length: {length}\n\
             \n\
             Your job is to plan a story outline, NOT to write the full story.\n\
             Return a structured outline in this JSON-like format:\n\
             \n\
             characters: [list of main character names]\n\
             setting: a short description of time and place\n\
             plot_beats:\n\
             {plot_beats}\
             theme: a short sentence about the main theme or message\n",
            tone = params.tone,
            audience = params.audience,
            length = params.length.planner_instruction(),
        )
    }

    pub fn request_for(&self, captions: &[Caption], params: &StoryParameters) -> GenerationRequest {
        GenerationRequest::new(Self::render_prompt(captions, params), self.max_tokens)
            .with_system(PLANNER_ROLE)
    }

    pub async fn plan(&self, captions: &[Caption], params: &StoryParameters) -> Result<Outline> {
        let request = self.request_for(captions, params);
        let started = Instant::now();

        let text = require_text(self.model.generate(&request).await?)?;

        info!(
            target: "planner",
            captions = captions.len(),
            model = self.model.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "outline ready"
        );

        Ok(Outline::new(text))
    }
}
