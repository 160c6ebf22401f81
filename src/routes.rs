// Read-only HTTP query surface polled by the dashboard

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::metrics_repo::MetricsRepo;
use crate::models::{MetricKind, WindowDuration};
use crate::version::{NAME, VERSION};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) repo: Arc<MetricsRepo>,
}

pub fn app(repo: Arc<MetricsRepo>) -> Router {
    let state = AppState { repo };
    Router::new()
        .route("/", get(|| async { "netscope collector" })) // GET /
        .route("/version", get(version_handler)) // GET /version
        .route("/api/window/{kind}", get(window_handler)) // GET /api/window/{kind}?duration=5m
        .route("/api/speedtests", get(speed_tests_handler)) // GET /api/speedtests?limit=20
        .route("/api/events", get(events_handler)) // GET /api/events?limit=100
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// GET /version: service name and version, baked in at build time.
async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Deserialize)]
struct WindowQuery {
    duration: Option<String>,
}

#[derive(Serialize)]
struct WindowPoint {
    timestamp: i64,
    value: f64,
}

/// GET /api/window/{kind}: (timestamp, value) pairs for the trailing
/// duration (default 1h), ascending.
async fn window_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<WindowPoint>>, (StatusCode, String)> {
    let kind = MetricKind::from_str(&kind).map_err(bad_request)?;
    let duration =
        WindowDuration::from_str(query.duration.as_deref().unwrap_or("1h")).map_err(bad_request)?;
    let points = state
        .repo
        .get_window(kind, duration)
        .await
        .map_err(internal)?;
    Ok(Json(
        points
            .into_iter()
            .map(|(timestamp, value)| WindowPoint { timestamp, value })
            .collect(),
    ))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

/// GET /api/speedtests: most recent speed tests, newest first.
async fn speed_tests_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(20).min(500);
    let results = state
        .repo
        .recent_speed_tests(limit)
        .await
        .map_err(internal)?;
    Ok(Json(results))
}

/// GET /api/events: most recent system events, newest first.
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(100).min(1000);
    let events = state.repo.recent_events(limit).await.map_err(internal)?;
    Ok(Json(events))
}

fn bad_request(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!(error = %e, "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "query failed".into())
}
