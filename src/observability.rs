//! Archiver counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by the facade, router and reaper
#[derive(Debug, Default)]
pub struct Metrics {
    events_submitted: AtomicU64,
    events_routed: AtomicU64,
    events_dropped: AtomicU64,
    writers_created: AtomicU64,
    writer_create_failures: AtomicU64,
    writers_reaped: AtomicU64,
    close_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_submitted(&self) {
        self.events_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Event accepted by a writer that was live for the whole accept
    pub fn event_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// Event discarded because its partition key could not be computed
    /// or its writer could not be created
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "events_dropped", "Metric incremented");
    }

    pub fn writer_created(&self) {
        self.writers_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "writers_created", "Metric incremented");
    }

    pub fn writer_create_failed(&self) {
        self.writer_create_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "writer_create_failures", "Metric incremented");
    }

    pub fn writer_reaped(&self) {
        self.writers_reaped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "writers_reaped", "Metric incremented");
    }

    pub fn close_failed(&self) {
        self.close_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "close_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            writers_created: self.writers_created.load(Ordering::Relaxed),
            writer_create_failures: self.writer_create_failures.load(Ordering::Relaxed),
            writers_reaped: self.writers_reaped.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_submitted: u64,
    pub events_routed: u64,
    pub events_dropped: u64,
    pub writers_created: u64,
    pub writer_create_failures: u64,
    pub writers_reaped: u64,
    pub close_failures: u64,
}
