use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    assets::{check_image_count, resolve_upload_mime},
    errors::{Result, RunFailure, StoryError},
    models::{Audience, ImageAsset, LengthBucket, StoryParameters, StoryRun, Tone},
    orchestrator::StoryPipeline,
};

const INDEX_HTML: &str = include_str!("index.html");
const DOWNLOAD_FILE_NAME: &str = "pictory_story.txt";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<StoryPipeline>,
    min_images: usize,
    max_images: usize,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        pipeline: Arc<StoryPipeline>,
        min_images: usize,
        max_images: usize,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            pipeline,
            min_images,
            max_images,
            max_upload_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/api/options", get(options_handler))
        .route("/api/stories", post(create_story_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "web", %addr, "story form listening");

    axum::serve(listener, app)
        .await
        .map_err(|err| StoryError::other(format!("web server error: {err}")))?;

    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn options_handler(State(state): State<AppState>) -> Json<Value> {
    let tones: Vec<String> = Tone::PRESETS.iter().map(|tone| tone.as_str().to_string()).collect();
    let audiences: Vec<_> = Audience::ALL.iter().map(Audience::as_str).collect();
    let lengths: Vec<_> = LengthBucket::ALL
        .iter()
        .map(|bucket| json!({ "value": bucket.as_str(), "label": bucket.label() }))
        .collect();

    Json(json!({
        "tones": tones,
        "audiences": audiences,
        "lengths": lengths,
        "min_images": state.min_images,
        "max_images": state.max_images,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct StoryQuery {
    #[serde(default)]
    format: Option<String>,
}

async fn create_story_handler(
    State(state): State<AppState>,
    Query(query): Query<StoryQuery>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let (assets, params) = read_upload(multipart).await?;
    check_image_count(assets.len(), state.min_images, state.max_images)?;

    info!(
        target: "web",
        images = assets.len(),
        tone = %params.tone,
        audience = %params.audience,
        length = %params.length,
        "story requested"
    );

    let run = state.pipeline.run(&assets, &params).await?;

    let response = match query.format.as_deref() {
        Some("text") | Some("txt") => download_response(&run),
        _ => Json(story_body(&run)).into_response(),
    };
    Ok(response)
}

/// Images in upload order plus the form's story parameters.
async fn read_upload(mut multipart: Multipart) -> Result<(Vec<ImageAsset>, StoryParameters)> {
    let mut assets = Vec::new();
    let mut params = StoryParameters::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" | "image" => {
                let file_name = field.file_name().map(str::to_string);
                let declared = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                let label = file_name
                    .clone()
                    .unwrap_or_else(|| format!("image {}", assets.len() + 1));

                if data.is_empty() {
                    return Err(StoryError::validation(format!("`{label}` is empty")));
                }

                let mime = resolve_upload_mime(declared.as_deref(), file_name.as_deref(), &data)?;
                assets.push(ImageAsset::new(label, data, mime));
            }
            "tone" => params.tone = field.text().await.map_err(multipart_error)?.parse()?,
            "audience" => params.audience = field.text().await.map_err(multipart_error)?.parse()?,
            "length" => {
                params.length = LengthBucket::from_label(&field.text().await.map_err(multipart_error)?)
            }
            other => {
                warn!(target: "web", field = other, "ignoring unknown form field");
            }
        }
    }

    Ok((assets, params))
}

fn multipart_error(err: MultipartError) -> StoryError {
    StoryError::validation(format!("malformed upload: {}", err.body_text()))
}

fn story_body(run: &StoryRun) -> Value {
    json!({
        "captions": run.captions,
        "outline": run.outline,
        "story": run.story,
        "parameters": run.parameters,
    })
}

fn download_response(run: &StoryRun) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
            ),
        ],
        run.story.to_text_blob(),
    )
        .into_response()
}

/// Error body returned to the form. Partial artifacts are flagged incomplete.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

fn status_for(error: &StoryError) -> StatusCode {
    match error {
        StoryError::Validation(_) | StoryError::Encoding(_) => StatusCode::BAD_REQUEST,
        StoryError::Generation(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoryError> for ApiError {
    fn from(error: StoryError) -> Self {
        Self {
            status: status_for(&error),
            body: json!({
                "error": error.to_string(),
                "kind": error.kind(),
            }),
        }
    }
}

impl From<RunFailure> for ApiError {
    fn from(failure: RunFailure) -> Self {
        let partial = if failure.partial.is_empty() {
            Value::Null
        } else {
            json!({
                "incomplete": true,
                "captions": failure.partial.captions,
                "outline": failure.partial.outline,
            })
        };

        Self {
            status: status_for(&failure.error),
            body: json!({
                "error": failure.to_string(),
                "kind": failure.error.kind(),
                "stage": failure.stage,
                "image": failure.image,
                "partial": partial,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(target: "web", status = %self.status, body = %self.body, "story request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
