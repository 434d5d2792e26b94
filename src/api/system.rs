// System endpoints
// This file provides the database liveness probe; the metrics exposition
// handler lives with the registry in the metrics module

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

use crate::db;

/// Liveness probe: one round trip to the database.
pub async fn health(State(pool): State<PgPool>) -> Response {
    match db::ping(&pool).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(err) => {
            error!(error = %err, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Database unavailable" })),
            )
                .into_response()
        }
    }
}
