pub mod auth;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{db, AppState};

/// Liveness, plus a round trip to the directory database when there is one.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(pool) = state.database.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "ok", "directory": "memory" })),
        );
    };

    match db::ping(pool).await {
        Ok(latency) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "directory": "postgres",
                "latency_ms": latency.as_millis() as u64
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Directory database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "directory": "postgres" })),
            )
        }
    }
}
