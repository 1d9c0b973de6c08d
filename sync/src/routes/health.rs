//! Health, status and connectivity endpoints.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::service::SyncStatus;
use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Per-service sync state.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub online: bool,
    pub events: SyncStatus,
    pub tasks: SyncStatus,
    pub members: SyncStatus,
    pub setlists: SyncStatus,
}

#[derive(Deserialize)]
pub struct NetworkRequest {
    pub online: bool,
}

#[derive(Serialize)]
pub struct NetworkResponse {
    pub online: bool,
    /// Whether the report flipped connectivity
    pub changed: bool,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/network", post(set_network))
        .route("/session/clear", post(clear_session))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - busy, last error and offline flag of every service.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let context = &state.context;
    Json(StatusResponse {
        online: context.network.is_online(),
        events: context.events.status(),
        tasks: context.tasks.status(),
        members: context.members.status(),
        setlists: context.setlists.status(),
    })
}

/// POST /network - report connectivity from the host platform.
async fn set_network(
    State(state): State<AppState>,
    Json(request): Json<NetworkRequest>,
) -> Json<NetworkResponse> {
    let changed = state.context.network.set_online(request.online);
    Json(NetworkResponse {
        online: request.online,
        changed,
    })
}

/// POST /session/clear - drop all lists, e.g. on logout.
async fn clear_session(State(state): State<AppState>) -> axum::http::StatusCode {
    state.context.clear_all();
    axum::http::StatusCode::NO_CONTENT
}

/// Root handler.
async fn root() -> &'static str {
    "BandSync Sync Host"
}
