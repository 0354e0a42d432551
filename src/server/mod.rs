//! HTTP surface.
//!
//! Two entry points over the pipeline plus a health check:
//!
//! - `GET  /api/health`
//! - `POST /api/order/process` (one dialogue turn, text or base64 audio)
//! - `POST /api/order/place` (confident lines into the cart)

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::automation::AutomationSession;
use crate::config::SpeechConfig;
use crate::error::{AutomationError, PipelineError};
use crate::order::{ConfidentMatch, OrderPlacementResult};
use crate::pipeline::{OrderPipeline, PipelineInput, PipelineResponse};
use crate::speech::AudioInput;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<OrderPipeline>,
    /// Used when an upload does not say how its audio is encoded.
    pub default_encoding: String,
    pub default_sample_rate_hz: u32,
}

impl AppState {
    pub fn new(pipeline: Arc<OrderPipeline>, speech: &SpeechConfig) -> Self {
        Self {
            pipeline,
            default_encoding: speech.google.encoding.clone(),
            default_sample_rate_hz: speech.google.sample_rate_hz,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/order/process", post(process_order))
        .route("/api/order/place", post(place_order))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the task is cancelled.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}

// ── Errors ──────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(PipelineError::EmptyInput) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(PipelineError::Transcription(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Pipeline(PipelineError::Automation(e)) => match e {
                AutomationError::RestaurantNotFound(_) | AutomationError::EmptyMenu(_) => {
                    StatusCode::NOT_FOUND
                }
                AutomationError::Busy => StatusCode::CONFLICT,
                AutomationError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
                AutomationError::PageLoadTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                AutomationError::ElementNotFound(_) | AutomationError::Driver(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Pipeline(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.message();
        if status.is_server_error() {
            warn!(status = status.as_u16(), "Request failed: {}", error);
        }
        (status, Json(ErrorBody { error })).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub browser_ready: bool,
    pub active_sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        browser_ready: state.pipeline.automation().is_ready(),
        active_sessions: state.pipeline.sessions().len(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate_hz: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub restaurant: Option<String>,
}

impl ProcessRequest {
    fn into_input(self, state: &AppState) -> Result<PipelineInput, ApiError> {
        let audio = match self.audio_base64.as_deref().map(str::trim) {
            Some(encoded) if !encoded.is_empty() => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| ApiError::BadRequest(format!("invalid audio_base64: {e}")))?;
                Some(AudioInput {
                    bytes,
                    encoding: self
                        .encoding
                        .unwrap_or_else(|| state.default_encoding.clone()),
                    sample_rate_hz: self.sample_rate_hz.unwrap_or(state.default_sample_rate_hz),
                })
            }
            _ => None,
        };
        Ok(PipelineInput {
            text: self.text,
            audio,
            session_id: self
                .session_id
                .filter(|s| !s.trim().is_empty())
                .map(Into::into),
            restaurant: self.restaurant,
        })
    }
}

async fn process_order(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let input = request.into_input(&state)?;
    let response = state.pipeline.process(input).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct PlaceRequest {
    pub restaurant: String,
    #[serde(default)]
    pub items: Vec<ConfidentMatch>,
}

async fn place_order(
    State(state): State<AppState>,
    Json(request): Json<PlaceRequest>,
) -> Result<Json<OrderPlacementResult>, ApiError> {
    if request.restaurant.trim().is_empty() {
        return Err(ApiError::BadRequest("restaurant is required".to_string()));
    }
    let result = state
        .pipeline
        .place_order(request.restaurant.trim(), &request.items)
        .await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::rules::RulesOracle;
    use crate::pipeline::tests::{demo_browser, diner, pipeline_with};
    use crate::speech::mock::MockSpeechProvider;

    async fn state() -> AppState {
        let site = diner();
        let pipeline = pipeline_with(
            MockSpeechProvider::with_texts(["a coffee from Diner"]),
            Arc::new(RulesOracle::new()),
            demo_browser(site).await,
        );
        AppState::new(Arc::new(pipeline), &SpeechConfig::default())
    }

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn error_statuses() {
        let auto = |e| ApiError::Pipeline(PipelineError::Automation(e));
        assert_eq!(status_of(ApiError::Pipeline(PipelineError::EmptyInput)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ApiError::Pipeline(PipelineError::Transcription(anyhow::anyhow!("down")))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_of(auto(AutomationError::RestaurantNotFound("x".into()))), StatusCode::NOT_FOUND);
        assert_eq!(status_of(auto(AutomationError::EmptyMenu("x".into()))), StatusCode::NOT_FOUND);
        assert_eq!(status_of(auto(AutomationError::Busy)), StatusCode::CONFLICT);
        assert_eq!(status_of(auto(AutomationError::NotReady)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(auto(AutomationError::PageLoadTimeout("search box".into()))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(auto(AutomationError::Driver("crashed".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn health_reports_browser_and_sessions() {
        let Json(body) = health(State(state().await)).await;
        assert_eq!(body.status, "ok");
        assert!(body.browser_ready);
        assert_eq!(body.active_sessions, 0);
    }

    #[tokio::test]
    async fn process_text_turn() {
        let request = ProcessRequest {
            text: Some("two pancakes from Diner".into()),
            ..Default::default()
        };
        let Json(body) = process_order(State(state().await), Json(request)).await.unwrap();
        assert!(!body.needs_clarification);
        assert_eq!(body.resolution.confident[0].matched_menu_item, "Pancakes");
        assert_eq!(body.resolution.confident[0].quantity, 2);
    }

    #[tokio::test]
    async fn process_base64_audio() {
        let request = ProcessRequest {
            audio_base64: Some(BASE64.encode(b"fake opus frames")),
            ..Default::default()
        };
        let Json(body) = process_order(State(state().await), Json(request)).await.unwrap();
        assert_eq!(body.transcript, "a coffee from Diner");
        assert_eq!(body.resolution.confident[0].matched_menu_item, "Coffee");
    }

    #[tokio::test]
    async fn bad_base64_is_rejected() {
        let request = ProcessRequest {
            audio_base64: Some("not base64!!".into()),
            ..Default::default()
        };
        let err = process_order(State(state().await), Json(request)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_process_request_is_400() {
        let err = process_order(State(state().await), Json(ProcessRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_restaurant_is_404() {
        let request = ProcessRequest {
            text: Some("a taco from Taco Bell".into()),
            ..Default::default()
        };
        let err = process_order(State(state().await), Json(request)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn place_adds_items() {
        let request = PlaceRequest {
            restaurant: "Diner".into(),
            items: vec![ConfidentMatch {
                requested_item: "coffee".into(),
                quantity: 1,
                matched_menu_item: "Coffee".into(),
                price: "$2.00".into(),
                size: None,
                confidence_reason: None,
            }],
        };
        let Json(result) = place_order(State(state().await), Json(request)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "All 1 items added to cart");
    }

    #[tokio::test]
    async fn place_requires_restaurant() {
        let request = PlaceRequest {
            restaurant: " ".into(),
            items: vec![],
        };
        let err = place_order(State(state().await), Json(request)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}
