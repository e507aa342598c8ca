use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::PartialRun;

pub type Result<T> = std::result::Result<T, StoryError>;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("missing or invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("image could not be encoded: {0}")]
    Encoding(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationFailure),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Other(String),
}

impl StoryError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Short machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            StoryError::Configuration(_) => "configuration",
            StoryError::Validation(_) => "validation",
            StoryError::Encoding(_) => "encoding",
            StoryError::Generation(_) => "generation",
            StoryError::Io(_) => "io",
            StoryError::SerdeJson(_) => "json",
            StoryError::Other(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for StoryError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(format!("{value:#}"))
    }
}

/// Failure reported by the remote generation service.
///
/// Transient variants are worth retrying; the rest fail the run immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("authentication rejected ({status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("request rejected ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl GenerationFailure {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationFailure::Transport(_)
                | GenerationFailure::RateLimited(_)
                | GenerationFailure::Server { .. }
        )
    }
}

/// Pipeline step in which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Captioning,
    Planning,
    Composing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Captioning => "captioning",
            Stage::Planning => "planning",
            Stage::Composing => "composing",
        };
        f.write_str(name)
    }
}

/// A failed run: the underlying error, where it happened, and whatever
/// artifacts were finished before it.
#[derive(Debug)]
pub struct RunFailure {
    pub stage: Option<Stage>,
    /// 1-based position of the image being captioned, if any.
    pub image: Option<usize>,
    pub partial: PartialRun,
    pub error: StoryError,
}

impl RunFailure {
    pub fn rejected(error: StoryError) -> Self {
        Self {
            stage: None,
            image: None,
            partial: PartialRun::default(),
            error,
        }
    }

    pub fn at(stage: Stage, image: Option<usize>, partial: PartialRun, error: StoryError) -> Self {
        Self {
            stage: Some(stage),
            image,
            partial,
            error,
        }
    }

    pub fn into_error(self) -> StoryError {
        self.error
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.stage, self.image) {
            (Some(stage), Some(image)) => write!(f, "{stage} image {image} failed: {}", self.error),
            (Some(stage), None) => write!(f, "{stage} failed: {}", self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_classified() {
        assert!(GenerationFailure::Transport("reset".into()).is_transient());
        assert!(GenerationFailure::RateLimited("slow down".into()).is_transient());
        assert!(
            GenerationFailure::Server {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );

        assert!(
            !GenerationFailure::Authentication {
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!GenerationFailure::Quota("insufficient_quota".into()).is_transient());
        assert!(!GenerationFailure::EmptyResponse.is_transient());
    }

    #[test]
    fn run_failure_message_names_stage_and_image() {
        let failure = RunFailure::at(
            Stage::Captioning,
            Some(3),
            PartialRun::default(),
            GenerationFailure::EmptyResponse.into(),
        );
        assert_eq!(
            failure.to_string(),
            "captioning image 3 failed: generation failed: provider returned an empty response"
        );

        let failure = RunFailure::rejected(StoryError::validation("no images"));
        assert_eq!(failure.to_string(), "invalid input: no images");
    }
}
