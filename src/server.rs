use std::net::SocketAddr;
use std::sync::Arc;

use laozi::api::{self, state::AppState};
use laozi::archiver::{Archiver, ShutdownReport};
use laozi::config::{Config, StorageProvider};
use laozi::storage::{ObjectStoreWriterFactory, StorageClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run the HTTP ingestion server until a shutdown signal arrives
pub async fn run(address: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;

    let address = address.unwrap_or(config.server.bind_addr);
    let listener = TcpListener::bind(address).await?;

    let archiver = start_archiver(&config)?;
    let state = AppState::new(config, archiver.submitter());

    let served = api::serve(listener, state, shutdown_signal()).await;

    // Runs even when the server failed, buffered events are otherwise lost
    finish(archiver.shutdown().await)?;
    served
}

/// Archive newline-delimited events from stdin until EOF or a shutdown signal
pub async fn pipe() -> Result<(), AnyError> {
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let archiver = start_archiver(&config)?;
    let submitter = archiver.submitter();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut submitted: u64 = 0;
    let result: Result<(), AnyError> = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if let Err(e) = submitter.submit(line.into_bytes()).await {
                        break Err(e.into());
                    }
                    submitted += 1;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
        }
    };

    info!(submitted, "Stopped reading stdin");

    finish(archiver.shutdown().await)?;
    result
}

fn start_archiver(config: &Config) -> Result<Archiver, AnyError> {
    if config.storage.provider == StorageProvider::Memory {
        warn!("Storage provider is memory, archived events are lost on exit");
    }
    let storage = StorageClient::from_config(&config.storage)?;
    info!(
        provider = ?config.storage.provider,
        bucket = %storage.bucket,
        prefix = %config.storage.prefix,
        "Storage initialized"
    );

    let factory = Arc::new(ObjectStoreWriterFactory::from_config(storage, &config.storage));
    let archiver = Archiver::start(config.archiver_config(factory))?;
    Ok(archiver)
}

/// Writers that failed to flush mean lost data, surfaced as a failed exit
fn finish(report: ShutdownReport) -> Result<(), AnyError> {
    if report.failed.is_empty() {
        return Ok(());
    }
    warn!(keys = ?report.failed, "Some partitions were not persisted");
    Err(format!("{} writer(s) failed to flush", report.failed.len()).into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
