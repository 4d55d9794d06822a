use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::registry::LoggerRegistry;
use crate::observability::Metrics;
use crate::partition::PartitionKeyFn;
use crate::writer::WriterFactory;

/// Single consumer of the ingestion channel
///
/// Routing order equals enqueue order, so events sharing a partition key
/// reach their writer in the order they were submitted.
pub(crate) struct PartitionRouter {
    rx: mpsc::Receiver<Bytes>,
    registry: Arc<LoggerRegistry>,
    factory: Arc<dyn WriterFactory>,
    partition_key: PartitionKeyFn,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
}

impl PartitionRouter {
    pub(crate) fn new(
        rx: mpsc::Receiver<Bytes>,
        registry: Arc<LoggerRegistry>,
        factory: Arc<dyn WriterFactory>,
        partition_key: PartitionKeyFn,
        metrics: Arc<Metrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rx,
            registry,
            factory,
            partition_key,
            metrics,
            shutdown,
        }
    }

    /// Route events until shutdown is signalled or every sender is gone
    ///
    /// On shutdown the channel is closed to new sends and whatever is already
    /// buffered is still routed before returning.
    pub(crate) async fn run(mut self) {
        info!("Partition router started");

        loop {
            tokio::select! {
                biased;
                next = self.rx.recv() => match next {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        debug!("All ingestion senders dropped");
                        break;
                    }
                },
                _ = self.shutdown.changed() => {
                    debug!("Router received shutdown signal");
                    break;
                }
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Some(event) = self.rx.recv().await {
            self.dispatch(event).await;
            drained += 1;
        }

        info!(drained, "Partition router stopped");
    }

    /// Route one event to the writer for its partition
    pub(crate) async fn dispatch(&self, event: Bytes) {
        let key = match (self.partition_key)(&event) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, size = event.len(), "Dropping event, partition key failed");
                self.metrics.event_dropped();
                return;
            }
        };

        let writer = match self.registry.get_or_create(&key, self.factory.as_ref()).await {
            Ok((lease, created)) => {
                if created {
                    info!(key = %key, "Writer created");
                    self.metrics.writer_created();
                }
                lease
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping event, writer could not be created");
                self.metrics.writer_create_failed();
                self.metrics.event_dropped();
                return;
            }
        };

        // Registry lock is released here, the lease keeps the reaper off this
        // writer until accept returns
        writer.accept(event).await;
        self.metrics.event_routed();
    }
}
