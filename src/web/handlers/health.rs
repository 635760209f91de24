//! Health check handlers

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

use crate::web::AppState;

/// Full health report: store reachability, version, uptime.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.store.ping().await.is_ok();
    let uptime = Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds();

    let body = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "store": if store_healthy { "connected" } else { "unreachable" },
        "timestamp": Utc::now(),
    });

    let status = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Liveness probe: the process is up and serving requests.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

/// Readiness probe: fails while the shared store is unreachable, so a
/// worker without session state never receives traffic.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "error": e.to_string() })),
        ),
    }
}
