use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::OpenAiConfig,
    errors::{GenerationFailure, Result, StoryError},
    providers::{GenerationModel, GenerationRequest},
};

const USER_AGENT: &str = concat!("Pictory/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Chat-completions client for OpenAI and OpenAI-compatible endpoints.
///
/// Images travel inline as `data:` URLs inside an `image_url` content part,
/// so one client serves both the captioning and the writing calls.
#[derive(Clone)]
pub struct OpenAiChatModel {
    http_client: HttpClient,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiChatModel {
    pub fn from_config(config: &OpenAiConfig, model: &str) -> Result<Self> {
        let http_client = Self::http_client(config)?;
        Ok(Self::with_http_client(http_client, config, model))
    }

    /// Reuse an existing connection pool, e.g. between the vision and text models.
    pub fn with_http_client(http_client: HttpClient, config: &OpenAiConfig, model: &str) -> Self {
        Self {
            http_client,
            api_key: config.api_key.clone(),
            model: model.to_string(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
        }
    }

    pub fn http_client(config: &OpenAiConfig) -> Result<HttpClient> {
        HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoryError::configuration(format!("failed to build HTTP client: {e}")))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);

        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: ChatContent::Text(system),
            });
        }

        let content = match &request.image {
            Some(image) => ChatContent::Parts(vec![
                ContentPart::Text {
                    text: &request.prompt,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ]),
            None => ChatContent::Text(&request.prompt),
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl GenerationModel for OpenAiChatModel {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationFailure> {
        let payload = self.payload(request);

        debug!(
            target: "provider",
            model = %self.model,
            with_image = request.image.is_some(),
            max_tokens = request.max_tokens,
            "sending chat completion request"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GenerationFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationFailure::Malformed(format!("failed to parse response: {e}")))?;

        parsed.extract_text().ok_or(GenerationFailure::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: StatusCode, body: &str) -> GenerationFailure {
    let code = status.as_u16();
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error);
    let message = detail
        .as_ref()
        .and_then(|err| err.message.clone())
        .unwrap_or_else(|| truncate(body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationFailure::Authentication {
            status: code,
            body: message,
        },
        StatusCode::TOO_MANY_REQUESTS => {
            let quota = detail.as_ref().is_some_and(|err| {
                err.code.as_deref() == Some("insufficient_quota")
                    || err.kind.as_deref() == Some("insufficient_quota")
            });
            if quota {
                GenerationFailure::Quota(message)
            } else {
                GenerationFailure::RateLimited(message)
            }
        }
        s if s.is_server_error() => GenerationFailure::Server {
            status: code,
            body: message,
        },
        _ => GenerationFailure::BadRequest {
            status: code,
            body: message,
        },
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let mut short: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        short.push('…');
        short
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: ChatContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn extract_text(&self) -> Option<String> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref()?.extract_text())
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

impl ResponseMessage {
    fn extract_text(&self) -> Option<String> {
        self.content.as_ref()?.extract_text()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Segments(Vec<MessageSegment>),
}

impl MessageContent {
    fn extract_text(&self) -> Option<String> {
        let text = match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Segments(segments) => segments
                .iter()
                .filter_map(|segment| segment.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        };
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

#[derive(Deserialize)]
struct MessageSegment {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
