//! Partition router and writer lifecycle manager
//!
//! Producers hand events to an [`Archiver`]. A single router task computes
//! each event's partition key and forwards it to the writer cached for that
//! key, creating one on first sight. A reaper task closes writers that have
//! been idle longer than the configured timeout. Both tasks share only the
//! [`LoggerRegistry`].
//!
//! ```text
//! submit ──> bounded channel ──> router ──> registry (get or create) ──> writer.accept
//!                                              ^
//!                               reaper ────────┘ (close + evict idle writers)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use laozi::archiver::{Archiver, ArchiverConfig};
//! use laozi::partition::json_field;
//!
//! let config = ArchiverConfig::new(factory, json_field("type", false))
//!     .with_idle_timeout(Duration::from_secs(60));
//! let archiver = Archiver::start(config)?;
//!
//! archiver.submit(br#"{"type":"click"}"#.to_vec()).await?;
//!
//! // Must run before the process exits, otherwise buffered data is lost
//! let report = archiver.shutdown().await;
//! ```

mod error;
mod reaper;
mod registry;
mod router;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{ArchiverConfigError, SubmitError};
pub use reaper::{MIN_SWEEP_PERIOD, sweep_period};
pub use registry::{LoggerRegistry, Reaped, WriterHandle, WriterLease};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::observability::{Metrics, MetricsSnapshot};
use crate::partition::PartitionKeyFn;
use crate::writer::WriterFactory;

use reaper::IdleReaper;
use router::PartitionRouter;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on the idle timeout; the reaper schedules its first sweep at
/// `now + idle_timeout / 2`, which must stay representable as an `Instant`
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);
pub const DEFAULT_INGESTION_CAPACITY: usize = 1024;

/// Archiver configuration, fixed once the archiver starts
#[derive(Clone)]
pub struct ArchiverConfig {
    pub writer_factory: Option<Arc<dyn WriterFactory>>,
    /// Writers idle for at least this long are closed and evicted
    pub idle_timeout: Duration,
    pub partition_key: Option<PartitionKeyFn>,
    /// Bound of the ingestion channel; 0 is treated as 1
    pub ingestion_capacity: usize,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            writer_factory: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            partition_key: None,
            ingestion_capacity: DEFAULT_INGESTION_CAPACITY,
        }
    }
}

impl ArchiverConfig {
    pub fn new(writer_factory: Arc<dyn WriterFactory>, partition_key: PartitionKeyFn) -> Self {
        Self {
            writer_factory: Some(writer_factory),
            partition_key: Some(partition_key),
            ..Self::default()
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_ingestion_capacity(mut self, capacity: usize) -> Self {
        self.ingestion_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ArchiverConfigError> {
        if self.idle_timeout.is_zero() {
            return Err(ArchiverConfigError::ZeroIdleTimeout);
        }
        if self.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(ArchiverConfigError::IdleTimeoutTooLarge {
                max: MAX_IDLE_TIMEOUT,
            });
        }
        if self.partition_key.is_none() {
            return Err(ArchiverConfigError::MissingPartitionKey);
        }
        if self.writer_factory.is_none() {
            return Err(ArchiverConfigError::MissingWriterFactory);
        }
        Ok(())
    }
}

impl fmt::Debug for ArchiverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiverConfig")
            .field("writer_factory", &self.writer_factory.is_some())
            .field("idle_timeout", &self.idle_timeout)
            .field("partition_key", &self.partition_key.is_some())
            .field("ingestion_capacity", &self.ingestion_capacity)
            .finish()
    }
}

/// Cloneable producer handle onto the ingestion channel
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::Sender<Bytes>,
    closed: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
}

impl Submitter {
    /// Enqueue an event, waiting while the channel is full
    ///
    /// Returning `Ok` means the event is queued, not that it is persisted.
    pub async fn submit(&self, event: impl Into<Bytes>) -> Result<(), SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed);
        }
        self.tx
            .send(event.into())
            .await
            .map_err(|_| SubmitError::Closed)?;
        self.metrics.event_submitted();
        Ok(())
    }

    /// Enqueue without waiting; fails with [`SubmitError::Full`] at capacity
    pub fn try_submit(&self, event: impl Into<Bytes>) -> Result<(), SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed);
        }
        self.tx.try_send(event.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })?;
        self.metrics.event_submitted();
        Ok(())
    }

    /// Blocking enqueue for producer threads outside the async runtime
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_submit(&self, event: impl Into<Bytes>) -> Result<(), SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed);
        }
        self.tx
            .blocking_send(event.into())
            .map_err(|_| SubmitError::Closed)?;
        self.metrics.event_submitted();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Counters of the archiver this handle feeds
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Result of closing the writers that were live at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub closed: usize,
    /// Partition keys whose writer failed to flush (possible data loss)
    pub failed: Vec<String>,
}

/// Event archiver facade
pub struct Archiver {
    submitter: Submitter,
    registry: Arc<LoggerRegistry>,
    metrics: Arc<Metrics>,
    shutdown_tx: watch::Sender<bool>,
    router: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl Archiver {
    /// Validate the configuration and spawn the router and reaper tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ArchiverConfig) -> Result<Self, ArchiverConfigError> {
        config.validate()?;
        let ArchiverConfig {
            writer_factory,
            idle_timeout,
            partition_key,
            ingestion_capacity,
        } = config;
        let writer_factory = writer_factory.ok_or(ArchiverConfigError::MissingWriterFactory)?;
        let partition_key = partition_key.ok_or(ArchiverConfigError::MissingPartitionKey)?;

        let capacity = ingestion_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(LoggerRegistry::new());
        let metrics = Arc::new(Metrics::new());

        let router = PartitionRouter::new(
            rx,
            registry.clone(),
            writer_factory,
            partition_key,
            metrics.clone(),
            shutdown_rx.clone(),
        );
        let reaper = IdleReaper::new(registry.clone(), idle_timeout, metrics.clone(), shutdown_rx);

        let router = tokio::spawn(router.run());
        let reaper = tokio::spawn(reaper.run());

        info!(?idle_timeout, capacity, "Archiver started");

        Ok(Self {
            submitter: Submitter {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
                metrics: metrics.clone(),
            },
            registry,
            metrics,
            shutdown_tx,
            router,
            reaper,
        })
    }

    /// See [`Submitter::submit`]
    pub async fn submit(&self, event: impl Into<Bytes>) -> Result<(), SubmitError> {
        self.submitter.submit(event).await
    }

    /// See [`Submitter::try_submit`]
    pub fn try_submit(&self, event: impl Into<Bytes>) -> Result<(), SubmitError> {
        self.submitter.try_submit(event)
    }

    /// Handle for producers on other tasks or threads
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Partition keys with a live writer, sorted
    pub async fn live_partitions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys
    }

    /// Stop ingestion and close every live writer
    ///
    /// Events already queued are routed first. Every writer still in the
    /// registry is then closed regardless of idle state. Submits issued after
    /// this begins fail with [`SubmitError::Closed`] and never create writers.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("Archiver shutting down");

        self.submitter.closed.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.router.await {
            warn!(error = %e, "Router task ended abnormally");
        }
        if let Err(e) = self.reaper.await {
            warn!(error = %e, "Reaper task ended abnormally");
        }

        let mut report = ShutdownReport::default();
        for (key, handle) in self.registry.drain().await {
            match handle.close().await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not close writer (possible data loss)");
                    self.metrics.close_failed();
                    report.failed.push(key);
                }
            }
        }
        report.failed.sort();

        info!(
            closed = report.closed,
            failed = report.failed.len(),
            "Archiver shut down"
        );
        report
    }
}
