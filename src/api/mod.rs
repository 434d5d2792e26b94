// HTTP API assembly
// This file wires the system and business routes into one axum router
// with CORS, request tracing, and the metrics middleware

pub mod expenses;
pub mod groups;
pub mod system;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::{self, Metrics, RequestTracker};

/// Shared handler state. Substates are pulled out per handler, so business
/// endpoints see only the pool and the exposition endpoint only the metrics.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: PgPool,
    pub metrics: Metrics,
}

/// Build the full API router. The metrics middleware is layered outermost so
/// every route, including the 404 fallback, is measured.
pub fn create_api_router(
    state: AppState,
    tracker: RequestTracker,
    frontend_origins: &[String],
) -> Result<AxumRouter> {
    let cors = cors_layer(frontend_origins)?;

    Ok(AxumRouter::new()
        .route("/health", get(system::health))
        .route("/metrics", get(metrics::serve_metrics))
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/:id", get(groups::get_group))
        .route("/groups/:id/members", post(groups::add_member))
        .route("/groups/:id/balances", get(groups::get_balances))
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(from_fn_with_state(tracker, metrics::track_requests)))
}

/// Credentialed CORS for the configured frontend origins. Browsers reject a
/// wildcard combined with credentials, so methods and headers are explicit.
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid frontend origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}
