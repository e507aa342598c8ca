use std::{sync::Arc, time::Instant};

use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{
    capabilities::{Captioner, OutlinePlanner, StoryComposer},
    config::{AppConfig, PipelineConfig},
    errors::{Result, RunFailure, Stage, StoryError},
    models::{Caption, ImageAsset, Outline, PartialRun, StoryParameters, StoryRun},
    providers::{GenerationModel, OpenAiChatModel, RetryingModel},
};

pub type ProgressSender = mpsc::UnboundedSender<PipelineEvent>;

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    CaptionReady(Caption),
    OutlineReady(Outline),
    StoryReady,
}

/// Captioner → planner → composer, in that order, once per run.
pub struct StoryPipeline {
    captioner: Captioner,
    planner: OutlinePlanner,
    composer: StoryComposer,
    caption_concurrency: usize,
}

impl StoryPipeline {
    pub fn new(
        vision: Arc<dyn GenerationModel>,
        text: Arc<dyn GenerationModel>,
        options: &PipelineConfig,
    ) -> Self {
        Self {
            captioner: Captioner::new(vision, options.caption_max_tokens),
            planner: OutlinePlanner::new(text.clone(), options.outline_max_tokens),
            composer: StoryComposer::new(text, options.story_max_tokens),
            caption_concurrency: options.caption_concurrency.max(1),
        }
    }

    /// Same model for captioning and writing.
    pub fn with_model(model: Arc<dyn GenerationModel>, options: &PipelineConfig) -> Self {
        Self::new(model.clone(), model, options)
    }

    /// Builds the OpenAI-backed pipeline. Both models share one connection
    /// pool and are wrapped in the configured retry policy.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http_client = OpenAiChatModel::http_client(&config.openai)?;
        let policy = config.pipeline.retry.clone();

        let vision: Arc<dyn GenerationModel> = Arc::new(RetryingModel::new(
            Arc::new(OpenAiChatModel::with_http_client(
                http_client.clone(),
                &config.openai,
                &config.openai.vision_model,
            )),
            policy.clone(),
        ));
        let text: Arc<dyn GenerationModel> = Arc::new(RetryingModel::new(
            Arc::new(OpenAiChatModel::with_http_client(
                http_client,
                &config.openai,
                &config.openai.text_model,
            )),
            policy,
        ));

        info!(
            target: "pipeline",
            vision_model = %config.openai.vision_model,
            text_model = %config.openai.text_model,
            caption_concurrency = config.pipeline.caption_concurrency,
            max_retries = config.pipeline.retry.max_retries,
            "story pipeline initialized"
        );

        Ok(Self::new(vision, text, &config.pipeline))
    }

    pub async fn run(
        &self,
        assets: &[ImageAsset],
        params: &StoryParameters,
    ) -> std::result::Result<StoryRun, RunFailure> {
        self.run_with_progress(assets, params, None).await
    }

    /// Runs the whole pipeline. Any failure aborts the run; no story is
    /// produced, but finished captions (and outline) travel with the error.
    pub async fn run_with_progress(
        &self,
        assets: &[ImageAsset],
        params: &StoryParameters,
        progress: Option<&ProgressSender>,
    ) -> std::result::Result<StoryRun, RunFailure> {
        if assets.is_empty() {
            return Err(RunFailure::rejected(StoryError::validation(
                "at least one image is required",
            )));
        }

        let started = Instant::now();
        info!(
            target: "pipeline",
            images = assets.len(),
            tone = %params.tone,
            audience = %params.audience,
            length = %params.length,
            "run started"
        );

        let captions = self.caption_all(assets, progress).await?;

        let outline = self
            .planner
            .plan(&captions, params)
            .await
            .map_err(|err| {
                let partial = PartialRun {
                    captions: captions.clone(),
                    outline: None,
                };
                failed(Stage::Planning, None, partial, err)
            })?;
        notify(progress, PipelineEvent::OutlineReady(outline.clone()));

        let story = self
            .composer
            .compose(&captions, &outline, params)
            .await
            .map_err(|err| {
                let partial = PartialRun {
                    captions: captions.clone(),
                    outline: Some(outline.clone()),
                };
                failed(Stage::Composing, None, partial, err)
            })?;
        notify(progress, PipelineEvent::StoryReady);

        info!(
            target: "pipeline",
            images = assets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );

        Ok(StoryRun {
            parameters: params.clone(),
            captions,
            outline,
            story,
        })
    }

    /// One captioning task per image, at most `caption_concurrency` in flight.
    /// Results land in their input position regardless of completion order.
    async fn caption_all(
        &self,
        assets: &[ImageAsset],
        progress: Option<&ProgressSender>,
    ) -> std::result::Result<Vec<Caption>, RunFailure> {
        let mut slots: Vec<Option<Caption>> = vec![None; assets.len()];

        // Built eagerly: the run future must stay `Send`.
        let captioner = &self.captioner;
        let pending: Vec<_> = assets
            .iter()
            .enumerate()
            .map(|(pos, asset)| async move { (pos, captioner.caption(pos + 1, asset).await) })
            .collect();
        let mut tasks = stream::iter(pending).buffer_unordered(self.caption_concurrency);

        while let Some((pos, result)) = tasks.next().await {
            match result {
                Ok(caption) => {
                    notify(progress, PipelineEvent::CaptionReady(caption.clone()));
                    slots[pos] = Some(caption);
                }
                Err(err) => {
                    let partial = PartialRun {
                        captions: slots.iter().flatten().cloned().collect(),
                        outline: None,
                    };
                    return Err(failed(Stage::Captioning, Some(pos + 1), partial, err));
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

fn failed(stage: Stage, image: Option<usize>, partial: PartialRun, err: StoryError) -> RunFailure {
    error!(
        target: "pipeline",
        %stage,
        image = ?image,
        error = %err,
        "run aborted"
    );
    RunFailure::at(stage, image, partial, err)
}

fn notify(progress: Option<&ProgressSender>, event: PipelineEvent) {
    if let Some(sender) = progress {
        let _ = sender.send(event);
    }
}
