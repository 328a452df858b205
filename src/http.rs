use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::StreamExt as _;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::app::manager::JobManager;
use crate::app::model::JobParams;
use crate::error::{CrawlError, ErrorKind};

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Clone)]
struct AppState {
    manager: Arc<JobManager>,
}

pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/daily-crawl/jobs", post(create_job).get(list_jobs))
        .route("/daily-crawl/jobs/:job_id", get(get_job))
        .route("/daily-crawl/jobs/:job_id/stream", get(stream_job))
        .route("/daily-crawl/jobs/:job_id/cancel", post(cancel_job))
        .route("/daily-crawl/stats", get(catalog_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn parse_job_id(job_id: &str) -> Result<String, Response> {
    uuid::Uuid::parse_str(job_id.trim())
        .map(|id| id.to_string())
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid job id"))
}

async fn create_job(
    State(state): State<AppState>,
    Json(params): Json<JobParams>,
) -> Result<Response, Response> {
    match state.manager.create(params).await {
        Ok(created) => Ok((StatusCode::ACCEPTED, Json(created)).into_response()),
        Err(err) => {
            let status = match err.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::StorageFailed => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if !matches!(err, CrawlError::InvalidInput(_)) {
                tracing::error!(error = %err, "job submission failed");
            }
            Err(error_response(status, err.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Json(state.manager.list(limit)).into_response()
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, Response> {
    let job_id = parse_job_id(&job_id)?;
    let Some(job) = state.manager.get(&job_id) else {
        return Err(error_response(StatusCode::NOT_FOUND, "job not found"));
    };
    Ok(Json(job).into_response())
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, Response> {
    let job_id = parse_job_id(&job_id)?;
    let Some(job) = state.manager.cancel(&job_id) else {
        return Err(error_response(StatusCode::NOT_FOUND, "job not found"));
    };
    if job.status.is_terminal() {
        return Err(error_response(StatusCode::CONFLICT, "job already finished"));
    }
    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

/// One data-only frame per event; the JSON carries its own `type`.
async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, Response> {
    let job_id = parse_job_id(&job_id)?;
    let events = state
        .manager
        .subscribe(&job_id)
        .map(|event| Event::default().json_data(event));

    let mut resp = Sse::new(events).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    resp.headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(resp)
}

async fn catalog_stats(State(state): State<AppState>) -> Result<Response, Response> {
    let stats = state.manager.stats().await.map_err(|err| {
        tracing::error!(error = %err, "catalog stats failed");
        error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
    })?;
    Ok(Json(stats).into_response())
}
