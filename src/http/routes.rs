//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PublicState, SessionCommand};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions", get(sessions_handler))
        .route(
            "/sessions/:session_id/players/:player_id",
            get(player_state_handler),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS for one or more comma-separated origins, or `*` for any
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
        active_players: state.sessions.total_players(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Serialize)]
struct SessionSummary {
    session_id: Uuid,
    player_count: usize,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

async fn sessions_handler(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state
        .sessions
        .list()
        .into_iter()
        .map(|(session_id, player_count)| SessionSummary {
            session_id,
            player_count,
        })
        .collect();

    Json(SessionsResponse { sessions })
}

async fn player_state_handler(
    State(state): State<AppState>,
    Path((session_id, player_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PublicState>, AppError> {
    let handle = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

    let (reply, rx) = oneshot::channel();
    handle
        .input_tx
        .send(SessionCommand::Query { player_id, reply })
        .await
        .map_err(|_| AppError::NotFound(format!("session {}", session_id)))?;

    let public_state = rx
        .await
        .map_err(|_| AppError::Internal("session dropped query".to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("player {}", player_id)))?;

    Ok(Json(public_state))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
