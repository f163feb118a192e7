//! HTTP routes for the Alice skill.
//!
//! - `POST /` - platform webhook, one dialog turn per request
//! - `GET /health` - liveness
//! - `GET /ready` - readiness with the number of tracked sessions

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use alice_common::logging::generate_trace_id;
use alice_common::Error;

use crate::message::{AliceRequest, AliceResponse};
use crate::orchestrator::TurnOrchestrator;

// ============================================================================
// State
// ============================================================================

/// Shared state for the skill HTTP server.
pub struct SkillState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl SkillState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>) -> Arc<Self> {
        Arc::new(Self { orchestrator })
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    sessions: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(err: Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::warn!(status = status.as_u16(), error = %err, "Rejected webhook request");
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "alice-skill",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<SkillState>>) -> impl IntoResponse {
    Json(ReadyResponse {
        status: "ready",
        sessions: state.orchestrator.store().len(),
    })
}

// ============================================================================
// Webhook
// ============================================================================

fn parse_request(body: &[u8]) -> alice_common::Result<AliceRequest> {
    let request: AliceRequest = serde_json::from_slice(body)?;
    if request.session_id().trim().is_empty() {
        return Err(Error::InvalidInput("session.session_id is required".into()));
    }
    Ok(request)
}

async fn webhook(State(state): State<Arc<SkillState>>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    let trace_id = generate_trace_id();
    let span = alice_common::turn_span!(trace_id, request.session_id());

    let reply = state
        .orchestrator
        .handle_turn(request.session_id(), request.utterance())
        .instrument(span)
        .await;

    Json(AliceResponse::from_turn(&request, &reply)).into_response()
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the skill HTTP router. `request_timeout` is the platform's hard
/// response deadline.
pub fn build_router(state: Arc<SkillState>, request_timeout: Duration) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Platform webhook
        .route("/", post(webhook))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
