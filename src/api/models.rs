//! Response bodies of the ingestion API
//!
//! - `POST /events` answers [`IngestResponse`]
//! - `GET /metrics` answers [`crate::observability::MetricsSnapshot`]
//! - `GET /health` answers [`HealthResponse`]
//! - errors answer [`ErrorResponse`]

use serde::{Deserialize, Serialize};

/// Events queued by one `POST /events` request
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    pub accepted: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
