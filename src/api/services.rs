use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::debug;

use super::{
    error::ApiError,
    models::{HealthResponse, IngestResponse},
    state::AppState,
    utils::{BodyFormat, parse_content_type, split_lines},
};

/// Event ingestion endpoint (POST /events)
///
/// The body is one event, or one event per non-empty line when sent as
/// `application/x-ndjson`. Gzip bodies arrive already decompressed by the
/// middleware, so the size limit applies to the decompressed payload.
///
/// Answers 202 once every event is queued. Queued is not persisted: writers
/// flush when they go idle or the archiver shuts down.
pub async fn ingest_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let format = parse_content_type(content_type)?;

    let body = read_body(body, state.max_body_bytes()).await?;

    let events = match format {
        BodyFormat::Single if body.is_empty() => Vec::new(),
        BodyFormat::Single => vec![body],
        BodyFormat::Lines => split_lines(&body),
    };
    if events.is_empty() {
        return Err(ApiError::InvalidPayload("no events in request body".into()));
    }

    let accepted = events.len();
    for event in events {
        state.submitter.submit(event).await?;
    }

    debug!(accepted, ?format, "Events queued");

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}

/// Reads the request body, failing once it grows past `limit`
async fn read_body(body: axum::body::Body, limit: u64) -> Result<Bytes, ApiError> {
    let limit_usize = usize::try_from(limit).unwrap_or(usize::MAX);

    let collected = Limited::new(body, limit_usize)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(limit)
            } else {
                ApiError::InvalidPayload(format!("failed to read body: {}", err))
            }
        })?;

    Ok(collected.to_bytes())
}

/// Archiver counters (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.submitter.metrics())
}

/// Health check endpoint (GET /health)
///
/// 503 once the archiver has started shutting down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status_code, status) = if state.submitter.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "healthy")
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
