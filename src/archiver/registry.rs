use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::writer::{self, EventWriter, WriterFactory};

/// Writer handle as stored in the registry
pub type WriterHandle = Arc<dyn EventWriter>;

/// Outcome of closing one idle writer during a sweep
#[derive(Debug)]
pub struct Reaped {
    pub key: String,
    pub result: writer::Result<()>,
}

struct Entry {
    handle: WriterHandle,
    /// One clone per outstanding [`WriterLease`]
    leases: Arc<()>,
}

impl Entry {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.leases) > 1
    }
}

/// A writer checked out of the registry for one `accept`
///
/// The reaper leaves a writer alone while any lease on it is alive, so the
/// handle cannot be closed underneath the holder.
pub struct WriterLease {
    handle: WriterHandle,
    _lease: Arc<()>,
}

impl WriterLease {
    pub fn handle(&self) -> &WriterHandle {
        &self.handle
    }
}

impl Deref for WriterLease {
    type Target = dyn EventWriter;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

/// Partition key -> live writer, shared by the router and the reaper
///
/// Every operation takes the same lock, so neither side can observe a
/// half-inserted or half-removed entry. There is at most one handle per key.
/// Handles leave the map only through [`reap_idle`](Self::reap_idle) or
/// [`drain`](Self::drain), both of which hand back or close the handle
/// before it is dropped.
#[derive(Default)]
pub struct LoggerRegistry {
    writers: Mutex<HashMap<String, Entry>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<WriterHandle> {
        self.writers
            .lock()
            .await
            .get(key)
            .map(|entry| entry.handle.clone())
    }

    /// Look up the writer for `key`, creating and inserting one if absent
    ///
    /// The factory runs while the lock is held. A slow factory stalls other
    /// routing and the reaper, but two handles for one key can never exist.
    /// Returns a lease on the handle and whether it was freshly created. A
    /// factory error leaves the registry untouched.
    pub async fn get_or_create(
        &self,
        key: &str,
        factory: &dyn WriterFactory,
    ) -> writer::Result<(WriterLease, bool)> {
        let mut writers = self.writers.lock().await;

        if let Some(existing) = writers.get(key) {
            return Ok((lease(existing), false));
        }

        let created = factory.create(key).await?;
        let entry = Entry {
            handle: created,
            leases: Arc::new(()),
        };
        let leased = lease(&entry);
        writers.insert(key.to_string(), entry);
        debug!(key, "Writer registered");

        Ok((leased, true))
    }

    /// Remove an entry whose handle has already been closed
    pub async fn delete(&self, key: &str) -> Option<WriterHandle> {
        self.writers
            .lock()
            .await
            .remove(key)
            .map(|entry| entry.handle)
    }

    /// Point-in-time copy of all entries
    pub async fn snapshot(&self) -> Vec<(String, WriterHandle)> {
        self.writers
            .lock()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), entry.handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.writers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.writers.lock().await.is_empty()
    }

    /// Close and evict every writer idle for at least `idle_timeout`
    ///
    /// The lock is held for the whole scan. Writers with an outstanding lease
    /// are skipped and looked at again on the next sweep. Entries are removed
    /// whatever the close outcome; the caller decides how to report failures.
    pub async fn reap_idle(&self, now: Instant, idle_timeout: Duration) -> Vec<Reaped> {
        let mut writers = self.writers.lock().await;

        let mut stale = Vec::new();
        for (key, entry) in writers.iter() {
            if now.saturating_duration_since(entry.handle.last_active()) < idle_timeout {
                continue;
            }
            if entry.in_use() {
                debug!(key = %key, "Idle writer still has an accept in flight, skipped");
                continue;
            }
            stale.push(key.clone());
        }

        let mut reaped = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(entry) = writers.get(&key) {
                let result = entry.handle.close().await;
                writers.remove(&key);
                reaped.push(Reaped { key, result });
            }
        }

        reaped
    }

    /// Take every entry out of the registry, leaving it empty
    pub async fn drain(&self) -> Vec<(String, WriterHandle)> {
        self.writers
            .lock()
            .await
            .drain()
            .map(|(key, entry)| (key, entry.handle))
            .collect()
    }
}

fn lease(entry: &Entry) -> WriterLease {
    WriterLease {
        handle: entry.handle.clone(),
        _lease: entry.leases.clone(),
    }
}
