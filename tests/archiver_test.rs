use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use laozi::archiver::{Archiver, ArchiverConfig, SubmitError};
use laozi::partition::{PartitionKeyError, PartitionKeyFn, json_field, static_key};
use laozi::storage::{ObjectStoreWriterFactory, StorageClient};
use laozi::writer::{self, EventWriter, WriterFactory};

/// Writer remembering what it was given
struct MockWriter {
    events: Mutex<Vec<Bytes>>,
    last_active: Mutex<Instant>,
    close_calls: AtomicUsize,
}

impl MockWriter {
    fn events(&self) -> Vec<Bytes> {
        self.events.lock().unwrap().clone()
    }

    fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventWriter for MockWriter {
    async fn accept(&self, event: Bytes) {
        self.events.lock().unwrap().push(event);
        *self.last_active.lock().unwrap() = Instant::now();
    }

    fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap()
    }

    async fn close(&self) -> writer::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockFactory {
    writers: Mutex<HashMap<String, Vec<Arc<MockWriter>>>>,
}

impl MockFactory {
    fn writers_for(&self, key: &str) -> Vec<Arc<MockWriter>> {
        self.writers
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn created(&self) -> usize {
        self.writers.lock().unwrap().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl WriterFactory for MockFactory {
    async fn create(&self, key: &str) -> writer::Result<Arc<dyn EventWriter>> {
        let writer = Arc::new(MockWriter {
            events: Mutex::new(Vec::new()),
            last_active: Mutex::new(Instant::now()),
            close_calls: AtomicUsize::new(0),
        });
        self.writers
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(writer.clone());
        Ok(writer)
    }
}

/// Let the router and reaper tasks run on the current-thread runtime
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn event(json: &str) -> Bytes {
    Bytes::copy_from_slice(json.as_bytes())
}

#[tokio::test]
async fn test_events_for_one_key_arrive_in_order() {
    let factory = Arc::new(MockFactory::default());
    let archiver = Archiver::start(ArchiverConfig::new(factory.clone(), json_field("k", false)))
        .unwrap();

    for seq in 0..50 {
        let key = if seq % 2 == 0 { "A" } else { "B" };
        archiver
            .submit(event(&format!(r#"{{"k":"{key}","seq":{seq}}}"#)))
            .await
            .unwrap();
    }

    let report = archiver.shutdown().await;
    assert_eq!(report.closed, 2);

    for (key, parity) in [("A", 0), ("B", 1)] {
        let writers = factory.writers_for(key);
        assert_eq!(writers.len(), 1);

        let seqs: Vec<u64> = writers[0]
            .events()
            .iter()
            .map(|e| serde_json::from_slice::<serde_json::Value>(e).unwrap()["seq"]
                .as_u64()
                .unwrap())
            .collect();
        let expected: Vec<u64> = (0..50).filter(|s| s % 2 == parity).collect();
        assert_eq!(seqs, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_producers_share_one_writer() {
    let factory = Arc::new(MockFactory::default());
    let archiver = Archiver::start(
        ArchiverConfig::new(factory.clone(), static_key("X")).with_ingestion_capacity(16),
    )
    .unwrap();

    let producers: Vec<_> = (0..10)
        .map(|thread| {
            let submitter = archiver.submitter();
            std::thread::spawn(move || {
                for i in 0..100 {
                    submitter
                        .blocking_submit(format!("{thread}-{i}").into_bytes())
                        .unwrap();
                }
            })
        })
        .collect();

    tokio::task::spawn_blocking(move || {
        for producer in producers {
            producer.join().unwrap();
        }
    })
    .await
    .unwrap();

    let report = archiver.shutdown().await;
    assert_eq!(report.closed, 1);

    let writers = factory.writers_for("X");
    assert_eq!(writers.len(), 1);
    assert_eq!(writers[0].events().len(), 1000);
    assert_eq!(writers[0].close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_writer_is_closed_within_one_and_a_half_timeouts() {
    let factory = Arc::new(MockFactory::default());
    let archiver = Archiver::start(
        ArchiverConfig::new(factory.clone(), static_key("A"))
            .with_idle_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let started = Instant::now();

    archiver.submit(event("first")).await.unwrap();
    settle().await;
    tokio::time::advance(Duration::from_millis(50)).await;
    archiver.submit(event("second")).await.unwrap();
    settle().await;

    let mut evicted_at = None;
    while started.elapsed() < Duration::from_millis(500) {
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        if archiver.live_partitions().await.is_empty() {
            evicted_at = Some(started.elapsed());
            break;
        }
    }

    let evicted_at = evicted_at.expect("writer was never evicted");
    assert!(evicted_at >= Duration::from_millis(200), "evicted at {evicted_at:?}");
    assert!(evicted_at <= Duration::from_millis(350), "evicted at {evicted_at:?}");

    let writers = factory.writers_for("A");
    assert_eq!(writers.len(), 1);
    assert_eq!(writers[0].events(), vec![event("first"), event("second")]);
    assert_eq!(writers[0].close_calls(), 1);

    // A later event gets a fresh writer
    archiver.submit(event("third")).await.unwrap();
    settle().await;
    assert_eq!(factory.writers_for("A").len(), 2);
    assert_eq!(archiver.metrics().writers_reaped, 1);

    let report = archiver.shutdown().await;
    assert_eq!(report.closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_active_writer_is_not_evicted() {
    let factory = Arc::new(MockFactory::default());
    let archiver = Archiver::start(
        ArchiverConfig::new(factory.clone(), static_key("busy"))
            .with_idle_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    for _ in 0..20 {
        archiver.submit(event("tick")).await.unwrap();
        settle().await;
        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;
    }

    assert_eq!(archiver.live_partitions().await, vec!["busy".to_string()]);
    assert_eq!(factory.created(), 1);
    assert_eq!(archiver.metrics().writers_reaped, 0);

    archiver.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_writer_once() {
    let factory = Arc::new(MockFactory::default());
    let archiver = Archiver::start(ArchiverConfig::new(factory.clone(), json_field("k", false)))
        .unwrap();
    let submitter = archiver.submitter();

    archiver.submit(event(r#"{"k":"A"}"#)).await.unwrap();
    archiver.submit(event(r#"{"k":"B"}"#)).await.unwrap();

    let report = archiver.shutdown().await;
    assert_eq!(report.closed, 2);
    assert!(report.failed.is_empty());

    assert_eq!(
        submitter.submit(event(r#"{"k":"C"}"#)).await,
        Err(SubmitError::Closed)
    );
    assert_eq!(
        submitter.try_submit(event(r#"{"k":"A"}"#)),
        Err(SubmitError::Closed)
    );

    assert_eq!(factory.created(), 2);
    assert!(factory.writers_for("C").is_empty());
    for key in ["A", "B"] {
        let writers = factory.writers_for(key);
        assert_eq!(writers.len(), 1);
        assert_eq!(writers[0].close_calls(), 1);
    }
}

#[tokio::test]
async fn test_failing_key_function_drops_only_that_event() {
    let factory = Arc::new(MockFactory::default());
    let key_fn: PartitionKeyFn = Arc::new(|event: &[u8]| {
        if event.starts_with(b"bad") {
            Err(PartitionKeyError::Custom("rejected".to_string()))
        } else {
            Ok("good".to_string())
        }
    });
    let archiver = Archiver::start(ArchiverConfig::new(factory.clone(), key_fn)).unwrap();

    archiver.submit(event("bad event")).await.unwrap();
    archiver.submit(event("fine event")).await.unwrap();

    let submitter = archiver.submitter();
    let report = archiver.shutdown().await;
    assert_eq!(report.closed, 1);

    let metrics = submitter.metrics();
    assert_eq!(metrics.events_submitted, 2);
    assert_eq!(metrics.events_routed, 1);
    assert_eq!(metrics.events_dropped, 1);

    assert_eq!(factory.writers_for("good")[0].events(), vec![event("fine event")]);
}

#[tokio::test]
async fn test_archives_to_object_store() {
    let storage = StorageClient::in_memory();
    let factory = Arc::new(ObjectStoreWriterFactory::new(
        storage.clone(),
        "logs/",
        Bytes::from_static(b"\n"),
    ));

    let archiver =
        Archiver::start(ArchiverConfig::new(factory.clone(), json_field("type", false))).unwrap();
    archiver.submit(event(r#"{"type":"click","n":1}"#)).await.unwrap();
    archiver.submit(event(r#"{"type":"view","n":2}"#)).await.unwrap();
    archiver.submit(event(r#"{"type":"click","n":3}"#)).await.unwrap();
    archiver.shutdown().await;

    let clicks = storage.download("logs/click").await.unwrap();
    assert_eq!(
        &clicks[..],
        b"{\"type\":\"click\",\"n\":1}\n{\"type\":\"click\",\"n\":3}\n"
    );

    // A restarted archiver appends to what is already stored
    let archiver =
        Archiver::start(ArchiverConfig::new(factory, json_field("type", false))).unwrap();
    archiver.submit(event(r#"{"type":"view","n":4}"#)).await.unwrap();
    archiver.shutdown().await;

    let views = storage.download("logs/view").await.unwrap();
    assert_eq!(
        &views[..],
        b"{\"type\":\"view\",\"n\":2}\n{\"type\":\"view\",\"n\":4}\n"
    );
}
