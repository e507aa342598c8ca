pub mod assets;
pub mod capabilities;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod util;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use errors::{GenerationFailure, Result, RunFailure, Stage, StoryError};
pub use models::{Audience, Caption, ImageAsset, LengthBucket, Outline, Story, StoryParameters, StoryRun, Tone};
pub use orchestrator::{PipelineEvent, StoryPipeline};
pub use providers::{GenerationModel, GenerationRequest};
