//! Health check handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub session_store: bool,
    pub backend: bool,
}

/// Readiness health check endpoint.
///
/// The session store is probed on each call; backend connectivity comes
/// from the heartbeat. Returns 503 unless both are up.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = Readiness {
        session_store: crate::db::is_reachable(state.pool()).await,
        backend: state.heartbeat().is_reachable(),
    };
    let status = if readiness.session_store && readiness.backend {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
