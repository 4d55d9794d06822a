use std::future::Future;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{health, ingest_events, metrics},
    state::AppState,
};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Routes of the ingestion API
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(ingest_events))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        // Decompresses gzip request bodies based on Content-Encoding
        .layer(RequestDecompressionLayer::new())
}

/// Serve the API until `shutdown` resolves, then finish in-flight requests
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    let app = router(state);

    info!(%address, "laozi API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
