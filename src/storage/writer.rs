//! Buffered per-partition writer persisting to one object per key
//!
//! Events accumulate in memory, each followed by the delimiter. On creation
//! the previously persisted object for the key is loaded into the buffer, so
//! a writer re-created after eviction appends instead of overwriting. Close
//! uploads the whole buffer as the object body.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::StorageClient;
use crate::config::StorageConfig;
use crate::writer::{EventWriter, Result, WriterError, WriterFactory};

struct Buffer {
    data: BytesMut,
    dirty: bool,
    closed: bool,
}

pub struct ObjectStoreWriter {
    key: String,
    object_key: String,
    storage: StorageClient,
    delimiter: Bytes,
    buffer: Mutex<Buffer>,
    last_active: Mutex<Instant>,
}

impl ObjectStoreWriter {
    pub fn new(
        key: impl Into<String>,
        object_key: impl Into<String>,
        storage: StorageClient,
        delimiter: Bytes,
        recovered: Option<Bytes>,
    ) -> Self {
        let mut data = BytesMut::new();
        if let Some(previous) = recovered {
            data.extend_from_slice(&previous);
        }

        Self {
            key: key.into(),
            object_key: object_key.into(),
            storage,
            delimiter,
            buffer: Mutex::new(Buffer {
                data,
                dirty: false,
                closed: false,
            }),
            last_active: Mutex::new(Instant::now()),
        }
    }

    /// Bytes currently buffered, including recovered data
    pub fn buffered_len(&self) -> usize {
        self.lock_buffer().data.len()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventWriter for ObjectStoreWriter {
    async fn accept(&self, event: Bytes) {
        {
            let mut buffer = self.lock_buffer();
            if buffer.closed {
                warn!(key = %self.key, size = event.len(), "Event arrived after writer closed, dropped");
                return;
            }
            buffer.data.extend_from_slice(&event);
            buffer.data.extend_from_slice(&self.delimiter);
            buffer.dirty = true;
        }

        let mut last_active = self
            .last_active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last_active = Instant::now();
    }

    fn last_active(&self) -> Instant {
        *self
            .last_active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn close(&self) -> Result<()> {
        let body = {
            let mut buffer = self.lock_buffer();
            if buffer.closed {
                return Err(WriterError::Closed(self.key.clone()));
            }
            buffer.closed = true;
            if !buffer.dirty {
                debug!(key = %self.key, "Nothing new to flush");
                return Ok(());
            }
            buffer.dirty = false;
            std::mem::take(&mut buffer.data).freeze()
        };

        self.storage
            .upload(&self.object_key, body)
            .await
            .map_err(|e| WriterError::Flush {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// Creates [`ObjectStoreWriter`]s under `{prefix}{key}`
#[derive(Clone)]
pub struct ObjectStoreWriterFactory {
    storage: StorageClient,
    prefix: String,
    delimiter: Bytes,
}

impl ObjectStoreWriterFactory {
    pub fn new(storage: StorageClient, prefix: impl Into<String>, delimiter: Bytes) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            delimiter,
        }
    }

    pub fn from_config(storage: StorageClient, config: &StorageConfig) -> Self {
        Self::new(
            storage,
            config.prefix.clone(),
            Bytes::from(config.delimiter.clone().into_bytes()),
        )
    }

    pub fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl WriterFactory for ObjectStoreWriterFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn EventWriter>> {
        let object_key = self.object_key(key);

        let recovered = self
            .storage
            .download_if_exists(&object_key)
            .await
            .map_err(|e| WriterError::Recovery {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(previous) = &recovered {
            debug!(key, object_key = %object_key, size = previous.len(), "Recovered previous data");
        }

        Ok(Arc::new(ObjectStoreWriter::new(
            key,
            object_key,
            self.storage.clone(),
            self.delimiter.clone(),
            recovered,
        )))
    }
}
