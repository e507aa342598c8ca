use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::{
    errors::{Result, StoryError},
    providers::RetryPolicy,
};

const DEFAULT_CONFIG_PATH: &str = "config/pictory.toml";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub caption_concurrency: usize,
    pub retry: RetryPolicy,
    pub caption_max_tokens: u32,
    pub outline_max_tokens: u32,
    pub story_max_tokens: u32,
    pub min_images: usize,
    pub max_images: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            caption_concurrency: 1,
            retry: RetryPolicy::default(),
            caption_max_tokens: 200,
            outline_max_tokens: 600,
            story_max_tokens: 1600,
            min_images: 2,
            max_images: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub output_dir: PathBuf,
}

impl AppConfig {
    /// Reads `PICTORY_CONFIG_PATH` (or `config/pictory.toml`) if present and
    /// fills the credential from `OPENAI_API_KEY`. A missing credential is an
    /// error here, before any generation call is attempted.
    pub fn load() -> Result<Self> {
        let config_path =
            env::var("PICTORY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let env_api_key = env::var("OPENAI_API_KEY").ok();
        Self::load_from(Path::new(&config_path), env_api_key)
    }

    pub fn load_from(path: &Path, env_api_key: Option<String>) -> Result<Self> {
        let contents = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path:?}"))
                .map_err(configuration_error)?
        } else {
            String::new()
        };

        Self::from_toml_str(&contents, env_api_key)
            .with_context(|| format!("invalid config file {path:?}"))
            .map_err(configuration_error)
    }

    pub fn from_toml_str(contents: &str, env_api_key: Option<String>) -> anyhow::Result<Self> {
        let file_config: FileConfig =
            toml::from_str(contents).context("failed to parse TOML")?;

        let openai = file_config
            .openai
            .unwrap_or_default()
            .into_domain(env_api_key)?;
        let pipeline = file_config.pipeline.unwrap_or_default().into_domain()?;
        let server = file_config.server.unwrap_or_default().into_domain()?;

        let output_dir = match file_config.output_dir {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir()?,
        };

        Ok(Self {
            openai,
            pipeline,
            server,
            output_dir,
        })
    }
}

fn configuration_error(err: anyhow::Error) -> StoryError {
    StoryError::configuration(format!("{err:#}"))
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    openai: Option<FileOpenAiConfig>,
    #[serde(default)]
    pipeline: Option<FilePipelineConfig>,
    #[serde(default)]
    server: Option<FileServerConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileOpenAiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    vision_model: Option<String>,
    #[serde(default)]
    text_model: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl FileOpenAiConfig {
    fn into_domain(self, env_api_key: Option<String>) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or(env_api_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set (or openai.api_key in the config file)"))?;

        let timeout_seconds = self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS).max(1);

        Ok(OpenAiConfig {
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            vision_model: self
                .vision_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            text_model: self.text_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FilePipelineConfig {
    #[serde(default)]
    caption_concurrency: Option<usize>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    initial_backoff_ms: Option<u64>,
    #[serde(default)]
    max_backoff_ms: Option<u64>,
    #[serde(default)]
    caption_max_tokens: Option<u32>,
    #[serde(default)]
    outline_max_tokens: Option<u32>,
    #[serde(default)]
    story_max_tokens: Option<u32>,
    #[serde(default)]
    min_images: Option<usize>,
    #[serde(default)]
    max_images: Option<usize>,
}

impl FilePipelineConfig {
    fn into_domain(self) -> anyhow::Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let min_images = self.min_images.unwrap_or(defaults.min_images).max(1);
        let max_images = self.max_images.unwrap_or(defaults.max_images);
        if max_images < min_images {
            return Err(anyhow!(
                "pipeline.max_images ({max_images}) is smaller than pipeline.min_images ({min_images})"
            ));
        }

        let retry = RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.retry.max_retries),
            initial_backoff: self
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_backoff),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_backoff),
            backoff_multiplier: defaults.retry.backoff_multiplier,
        };

        Ok(PipelineConfig {
            caption_concurrency: self
                .caption_concurrency
                .unwrap_or(defaults.caption_concurrency)
                .max(1),
            retry,
            caption_max_tokens: self.caption_max_tokens.unwrap_or(defaults.caption_max_tokens),
            outline_max_tokens: self.outline_max_tokens.unwrap_or(defaults.outline_max_tokens),
            story_max_tokens: self.story_max_tokens.unwrap_or(defaults.story_max_tokens),
            min_images,
            max_images,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    max_upload_bytes: Option<usize>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("failed to parse server.bind_addr: {bind_addr_str}"))?;

        Ok(ServerConfig {
            bind_addr,
            max_upload_bytes: self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}
