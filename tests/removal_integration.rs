//! End-to-end removal runs against the in-memory queue.
//!
//! Each test publishes messages, starts a run with `remove_messages`, drives
//! it the way the binary does, and inspects what the queue saw.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;

use amqp_message_remover::config::{DEFAULT_DSN, MatchTarget, RemovalMode, RemoverConfig};
use amqp_message_remover::error::{Error, TransportError};
use amqp_message_remover::observer::{Observer, ProgressSink, StopPolicy, StopReason};
use amqp_message_remover::queue::{
    DispositionKind, DispositionRecord, HeaderValue, Headers, MemoryQueue,
};
use amqp_message_remover::remover::{Status, remove_messages};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const QUEUE: &str = "orders";

#[derive(Default)]
struct Values(Vec<u64>);

impl ProgressSink for Values {
    fn update(&mut self, value: u64, _status: &Status) {
        self.0.push(value);
    }
}

fn config(pattern: &str, prefetch: u32) -> RemoverConfig {
    RemoverConfig::new(DEFAULT_DSN, QUEUE, pattern, prefetch).unwrap()
}

async fn publish_all(queue: &MemoryQueue, bodies: &[&str]) {
    for body in bodies {
        queue.publish(*body, Headers::new()).await;
    }
}

fn record(message_id: u64, kind: DispositionKind) -> DispositionRecord {
    DispositionRecord { message_id, kind }
}

#[tokio::test]
async fn bounded_scan_leaves_non_matching_unacked() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        publish_all(&queue, &["good data", "more good data", "this is bad data"]).await;

        let mut run = remove_messages(queue.clone(), &config("bad", 2)).await.unwrap();

        let first = run.status().next().await.unwrap();
        let second = run.status().next().await.unwrap();
        assert_eq!(first, Status { processed: 1, removed: 0, finished: false });
        assert_eq!(second, Status { processed: 2, removed: 0, finished: false });

        // The window is full of left messages: nothing more arrives and the
        // run does not finish on its own.
        let idle = timeout(Duration::from_millis(100), run.status().next()).await;
        assert!(idle.is_err());
        assert!(queue.records().await.is_empty());
        assert_eq!(queue.unacked_len().await, 2);

        let last = run.shutdown().await.unwrap();
        assert_eq!(last, Status { processed: 2, removed: 0, finished: true });

        // Closing returned the left messages to the queue untouched.
        assert_eq!(queue.ready_len().await, 3);
        assert!(queue.records().await.is_empty());
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn bounded_scan_stops_at_prefetch_via_observer() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        publish_all(&queue, &["bad 1", "ok", "ok", "ok", "bad 2"]).await;

        let config = config("bad", 3);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();
        let mut observer = Observer::new(StopPolicy::for_config(&config), Values::default());
        let observation = observer
            .observe(run.status(), std::future::pending::<()>())
            .await;

        assert_eq!(observation.reason, StopReason::LimitReached);
        assert_eq!(observation.last.map(|s| s.processed), Some(3));
        assert_eq!(observer.into_progress().0, vec![1, 2, 3]);

        // The ack freed one slot, so the worker takes one more message
        // before the window fills with left messages.
        while queue.unacked_len().await < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let last = run.shutdown().await.unwrap();
        assert_eq!(last, Status { processed: 4, removed: 1, finished: true });
        assert_eq!(queue.records().await, vec![record(0, DispositionKind::Acked)]);

        // Left messages went back on close; the last one was never dispatched.
        assert_eq!(queue.ready_len().await, 4);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn continuous_requeues_and_removes() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        publish_all(&queue, &["first", "this is bad data", "third"]).await;

        let config = config("bad", 3).with_continuous(true);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();

        let mut snapshots = Vec::new();
        while let Some(status) = run.status().next().await {
            snapshots.push(status);
            if status.processed >= 3 {
                break;
            }
        }
        assert_eq!(snapshots[2], Status { processed: 3, removed: 1, finished: false });

        run.shutdown().await.unwrap();

        let records = queue.records().await;
        assert_eq!(
            &records[..3],
            &[
                record(0, DispositionKind::Requeued),
                record(1, DispositionKind::Acked),
                record(2, DispositionKind::Requeued),
            ]
        );
        // Only the matching message ever left the queue.
        assert!(
            records
                .iter()
                .filter(|r| r.kind == DispositionKind::Acked)
                .all(|r| r.message_id == 1)
        );
        assert_eq!(queue.ready_len().await, 2);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn header_patterns_see_encoded_bytes_and_timestamps() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        let mut flagged = Headers::new();
        flagged.insert("raw".into(), HeaderValue::Bytes(b"bad".to_vec()));
        flagged.insert("sent".into(), HeaderValue::Timestamp(0));
        let mut clean = Headers::new();
        clean.insert("raw".into(), HeaderValue::Bytes(b"ok".to_vec()));
        clean.insert("sent".into(), HeaderValue::Timestamp(0));
        queue.publish("a", flagged).await;
        queue.publish("b", clean).await;

        let config = config(r#""raw":"YmFk","sent":"1970-01-01T00:00:00Z""#, 2)
            .with_match_target(MatchTarget::Headers);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();

        run.status().next().await.unwrap();
        let second = run.status().next().await.unwrap();
        assert_eq!(second.processed, 2);
        assert_eq!(second.removed, 1);

        run.shutdown().await.unwrap();
        assert_eq!(queue.records().await, vec![record(0, DispositionKind::Acked)]);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn nack_mode_on_headers_discards_matches() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        let mut urgent = Headers::new();
        urgent.insert("urgent".into(), HeaderValue::Bool(true));
        let mut calm = Headers::new();
        calm.insert("urgent".into(), HeaderValue::Bool(false));
        queue.publish("a", urgent).await;
        queue.publish("b", calm).await;

        let config = config(r#""urgent":true"#, 2)
            .with_match_target(MatchTarget::Headers)
            .with_removal_mode(RemovalMode::Nack);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();

        run.status().next().await.unwrap();
        let second = run.status().next().await.unwrap();
        assert_eq!(second.removed, 1);

        run.shutdown().await.unwrap();
        assert_eq!(queue.records().await, vec![record(0, DispositionKind::Discarded)]);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn interrupt_shuts_down_cleanly() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        let config = config("bad", 10).with_continuous(true);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();

        let (interrupt_tx, interrupt_rx) = tokio::sync::oneshot::channel::<()>();
        interrupt_tx.send(()).unwrap();

        let mut observer = Observer::new(StopPolicy::for_config(&config), Values::default());
        let observation = observer.observe(run.status(), interrupt_rx).await;
        assert_eq!(observation.reason, StopReason::Interrupted);

        let last = run.shutdown().await.unwrap();
        assert_eq!(last, Status { processed: 0, removed: 0, finished: true });
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn unknown_queue_fails_before_worker_starts() {
    let queue = MemoryQueue::new(QUEUE);
    let config = RemoverConfig::new(DEFAULT_DSN, "missing", "bad", 1).unwrap();

    match remove_messages(queue, &config).await {
        Err(Error::Transport(TransportError::Consume { queue, .. })) => assert_eq!(queue, "missing"),
        Err(other) => panic!("Expected consume error, got {other}"),
        Ok(_) => panic!("Expected consume error, got a running removal"),
    }
}

#[tokio::test]
async fn unserializable_header_aborts_run() {
    timeout(TEST_TIMEOUT, async {
        let queue = MemoryQueue::new(QUEUE);
        let mut headers = Headers::new();
        headers.insert("score".into(), HeaderValue::Float(f64::NAN));
        queue.publish("x", headers).await;

        let config = config("x", 1).with_match_target(MatchTarget::Headers);
        let mut run = remove_messages(queue.clone(), &config).await.unwrap();

        let mut observer = Observer::new(StopPolicy::for_config(&config), Values::default());
        let observation = observer
            .observe(run.status(), std::future::pending::<()>())
            .await;
        assert_eq!(observation.reason, StopReason::WorkerExited);
        assert_eq!(observation.last, None);

        let err = run.shutdown().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    })
    .await
    .unwrap();
}
