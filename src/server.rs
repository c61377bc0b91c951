//! HTTP surfaces consumed by the browser client.
//!
//! - `POST /generate` composes and submits a job (client-driven or bounded-sync).
//! - `GET /status?taskId=` is the idempotent status check the client polls.
//! - `GET /credits` reports the provider balance.
//! - `POST /image` runs a synchronous image generation.
//! - `GET /health`.
//!
//! Errors are returned as `{ "error": <localized message> }`; upstream details are
//! logged only.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::client::{ImageClient, JobApi, ProviderClient};
use crate::collaborators::{ImageStore, StreamingRewriter, VisionDescriber};
use crate::compose::{PromptComposer, PromptOverrides};
use crate::config::Config;
use crate::error::VidgenError;
use crate::orchestrator::{ClientPollPlan, Orchestrator, PollSchedule};
use crate::types::{GenerationRequest, TaskSnapshot, VideoDuration};

/// Shared, immutable router state.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub provider: ProviderClient,
    pub images: Option<ImageClient>,
    pub image_store: Option<Arc<dyn ImageStore>>,
    pub poll_plan: ClientPollPlan,
}

impl AppState {
    /// Wires every client from configuration.
    pub fn from_config(config: &Config) -> Result<Self, VidgenError> {
        let provider = ProviderClient::new(&config.provider)?;
        let describer = VisionDescriber::new(&config.vision, Some(&config.vision_fallback))?
            .with_backoff(config.fallback_backoff);
        let rewriter = StreamingRewriter::new(&config.rewrite)?;
        let composer = PromptComposer::new(Arc::new(describer), Arc::new(rewriter));
        let jobs: Arc<dyn JobApi> = Arc::new(provider.clone());
        let orchestrator = Orchestrator::new(jobs, composer, config.models.clone())
            .with_fallback_backoff(config.fallback_backoff)
            .with_poll_schedule(PollSchedule {
                attempts: config.poll_attempts,
                interval: config.poll_interval,
            });
        let images = if config.image.api_key.is_some() {
            Some(ImageClient::new(&config.image)?)
        } else {
            None
        };
        Ok(Self {
            orchestrator,
            provider,
            images,
            image_store: None,
            poll_plan: ClientPollPlan::default(),
        })
    }

    pub fn with_image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.image_store = Some(store);
        self
    }
}

/// Error wrapper that renders as `{ "error": ... }`.
pub struct ApiError(VidgenError);

impl From<VidgenError> for ApiError {
    fn from(e: VidgenError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            info!(error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.user_message() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/status", get(status))
        .route("/credits", get(credits))
        .route("/image", post(generate_image))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves until the process exits.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum GenerateMode {
    #[default]
    Async,
    Sync,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, rename = "imageBase64")]
    image_base64: Option<String>,
    #[serde(default)]
    duration: Option<VideoDuration>,
    #[serde(default)]
    negative_prompt: Option<String>,
    #[serde(default)]
    cfg_scale: Option<f32>,
    #[serde(default, rename = "callBackUrl")]
    callback_url: Option<String>,
    #[serde(default)]
    mode: GenerateMode,
    #[serde(default, rename = "describerKey")]
    describer_key: Option<String>,
    #[serde(default, rename = "rewriterKey")]
    rewriter_key: Option<String>,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) =
        body.map_err(|e| VidgenError::validation(format!("invalid request body: {}", e.body_text())))?;

    let image_url = match (body.image_url.filter(|u| !u.trim().is_empty()), body.image_base64) {
        (Some(url), _) => Some(url),
        (None, Some(data)) if !data.trim().is_empty() => {
            let store = state
                .image_store
                .as_ref()
                .ok_or_else(|| VidgenError::validation("inline images are not supported, send image_url"))?;
            Some(store.upload(&data).await?)
        }
        _ => None,
    };

    let request = GenerationRequest {
        prompt: body.prompt.unwrap_or_default(),
        image_url,
        duration: body.duration.unwrap_or_default(),
        negative_prompt: body.negative_prompt,
        cfg_scale: body.cfg_scale,
        callback_url: body.callback_url,
    };
    let overrides = PromptOverrides {
        describer_key: body.describer_key,
        rewriter_key: body.rewriter_key,
    };

    match body.mode {
        GenerateMode::Async => {
            let submission = state.orchestrator.start(&request, &overrides).await?;
            Ok(Json(submission).into_response())
        }
        GenerateMode::Sync => {
            let snapshot = state.orchestrator.run_to_completion(&request, &overrides).await?;
            Ok(Json(json!({
                "taskId": snapshot.task_id,
                "state": snapshot.state,
                "resultUrls": snapshot.result_urls,
                "failReason": snapshot.fail_reason,
            }))
            .into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    task_id: Option<String>,
    /// Milliseconds since submission, used to compute the next poll hint.
    elapsed_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    snapshot: TaskSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_poll_ms: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    give_up: bool,
}

async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let task_id = query
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| VidgenError::validation("taskId is required"))?;

    let snapshot = state.orchestrator.poll(task_id.trim()).await?;

    let (next_poll_ms, give_up) = match query.elapsed_ms {
        Some(elapsed) if !snapshot.is_terminal() => {
            match state.poll_plan.next_delay(Duration::from_millis(elapsed)) {
                Some(delay) => (Some(delay.as_millis() as u64), false),
                None => (None, true),
            }
        }
        _ => (None, false),
    };

    Ok(Json(StatusResponse {
        snapshot,
        next_poll_ms,
        give_up,
    }))
}

async fn credits(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let balance = state.provider.credits().await?;
    Ok(Json(balance).into_response())
}

#[derive(Debug, Deserialize)]
struct ImageBody {
    #[serde(default)]
    prompt: String,
}

async fn generate_image(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ImageBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) =
        body.map_err(|e| VidgenError::validation(format!("invalid request body: {}", e.body_text())))?;
    let images = state
        .images
        .as_ref()
        .ok_or_else(|| VidgenError::validation("image generation is not configured"))?;
    let urls = images.generate(&body.prompt).await?;
    Ok(Json(json!({ "urls": urls })).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
