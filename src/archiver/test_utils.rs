//! In-memory writers for archiver tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::writer::{EventWriter, Result, WriterError, WriterFactory};

/// Writer that remembers every event and close call
pub struct RecordingWriter {
    key: String,
    events: Mutex<Vec<Bytes>>,
    last_active: Mutex<Instant>,
    close_calls: AtomicUsize,
    accepts_after_close: AtomicUsize,
    fail_close: bool,
    /// When set, each accept waits for one permit before recording
    gate: Option<Arc<Semaphore>>,
}

impl RecordingWriter {
    pub fn new(key: &str, fail_close: bool) -> Self {
        Self {
            key: key.to_string(),
            events: Mutex::new(Vec::new()),
            last_active: Mutex::new(Instant::now()),
            close_calls: AtomicUsize::new(0),
            accepts_after_close: AtomicUsize::new(0),
            fail_close,
            gate: None,
        }
    }

    pub fn events(&self) -> Vec<Bytes> {
        self.events.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Accepts that finished on a writer which had already been closed
    pub fn accepts_after_close(&self) -> usize {
        self.accepts_after_close.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventWriter for RecordingWriter {
    async fn accept(&self, event: Bytes) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.close_calls() > 0 {
            self.accepts_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().unwrap().push(event);
        *self.last_active.lock().unwrap() = Instant::now();
    }

    fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(WriterError::Flush {
                key: self.key.clone(),
                reason: "simulated flush failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Factory that keeps every writer it hands out, per key, in creation order
#[derive(Default)]
pub struct RecordingFactory {
    writers: Mutex<HashMap<String, Vec<Arc<RecordingWriter>>>>,
    created: AtomicUsize,
    fail_every_close: bool,
    failing_keys: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_close() -> Self {
        Self {
            fail_every_close: true,
            ..Self::default()
        }
    }

    /// Writers for the listed keys fail to close, the rest succeed
    pub fn failing_close_for(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|key| key.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Every accept blocks until [`open_gate`](Self::open_gate) lets it through
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `accepts` more gated accepts complete
    pub fn open_gate(&self, accepts: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(accepts);
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Most recently created writer for `key`
    pub fn writer(&self, key: &str) -> Option<Arc<RecordingWriter>> {
        self.writers
            .lock()
            .unwrap()
            .get(key)
            .and_then(|all| all.last().cloned())
    }

    pub fn writers_for(&self, key: &str) -> Vec<Arc<RecordingWriter>> {
        self.writers
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WriterFactory for RecordingFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn EventWriter>> {
        let fail_close = self.fail_every_close || self.failing_keys.contains(key);
        let writer = Arc::new(RecordingWriter {
            gate: self.gate.clone(),
            ..RecordingWriter::new(key, fail_close)
        });
        self.writers
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(writer.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(writer)
    }
}

/// Factory whose recovery step always fails
pub struct FailingFactory;

#[async_trait]
impl WriterFactory for FailingFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn EventWriter>> {
        Err(WriterError::Recovery {
            key: key.to_string(),
            reason: "simulated recovery failure".to_string(),
        })
    }
}
