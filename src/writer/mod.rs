//! Writer capability consumed by the archiver core
//!
//! A writer is the per-partition durable logger. The archiver never looks
//! inside one: it only hands it events, asks when it was last used, and tells
//! it to close. Concrete implementations live elsewhere (see
//! [`crate::storage::ObjectStoreWriter`]).
//!
//! ## Contract
//!
//! - [`EventWriter::accept`] may be called any number of times. Failures are
//!   the writer's own concern and never reach the router.
//! - [`EventWriter::last_active`] must be monotonic and safe to read while
//!   `accept` runs on another task.
//! - [`EventWriter::close`] flushes buffered state. The archiver calls it at
//!   most once per handle, and never while one of its accepts is running.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("recovery failed for partition '{key}': {reason}")]
    Recovery { key: String, reason: String },

    #[error("flush failed for partition '{key}': {reason}")]
    Flush { key: String, reason: String },

    #[error("writer for partition '{0}' is already closed")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, WriterError>;

/// Per-partition durable logger
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Buffer or persist one event
    async fn accept(&self, event: Bytes);

    /// Time of the most recent successful accept (creation time before any)
    fn last_active(&self) -> Instant;

    /// Flush all buffered state and release resources
    async fn close(&self) -> Result<()>;
}

/// Builds a new writer for a partition key, recovering any prior state
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn create(&self, key: &str) -> Result<Arc<dyn EventWriter>>;
}
