//! Delivery engine: chunks a composed document against the endpoint's
//! payload ceiling, rate-limits sends against the persisted marker, retries
//! with backoff, and tolerates per-chunk failure.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use shelfwatch_common::{DeliveryError, StoreError};
use shelfwatch_store::SendMarker;

use crate::chunk::{plan_chunks, Document};
use crate::notify::NotifySink;

/// Base backoff; actual delay is base * 2^attempt plus random jitter.
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_JITTER_MS: u64 = 250;

/// Outcome of delivering one document. Partial failure is expected: failed
/// chunks are logged and counted, never propagated.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    pub sent_chunks: usize,
    pub failed_chunks: usize,
}

impl std::fmt::Display for DeliveryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sent={} failed={}", self.sent_chunks, self.failed_chunks)
    }
}

pub struct Deliverer<'a> {
    sink: &'a dyn NotifySink,
    marker: &'a SendMarker,
    ceiling: usize,
    min_interval: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl<'a> Deliverer<'a> {
    pub fn new(
        sink: &'a dyn NotifySink,
        marker: &'a SendMarker,
        ceiling: usize,
        min_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            sink,
            marker,
            ceiling,
            min_interval,
            max_attempts: max_attempts.max(1),
            backoff_base: RETRY_BASE,
        }
    }

    /// Shrink retry backoff. Test hook.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Chunk and transmit `doc`. Marker reads/writes are the only fatal
    /// errors here; send failures degrade to `failed_chunks`.
    pub async fn deliver(&self, doc: &Document) -> Result<DeliveryResult, StoreError> {
        let chunks = plan_chunks(doc, self.ceiling, |content| self.sink.measure(content));
        info!(
            sink = self.sink.name(),
            chunks = chunks.len(),
            ceiling = self.ceiling,
            "Delivering document"
        );

        let mut result = DeliveryResult::default();
        for (index, content) in chunks.iter().enumerate() {
            self.wait_for_send_slot().await?;

            match self.send_with_retry(index, content).await {
                Ok(()) => {
                    result.sent_chunks += 1;
                    self.marker.record_sent_at(Utc::now()).await?;
                }
                Err(e) => {
                    warn!(chunk = index, error = %e, "Chunk delivery failed, continuing");
                    result.failed_chunks += 1;
                }
            }
        }

        Ok(result)
    }

    /// Block until the minimum interval since the last successful send has
    /// elapsed.
    async fn wait_for_send_slot(&self) -> Result<(), StoreError> {
        let Some(last) = self.marker.last_sent_at().await? else {
            return Ok(());
        };
        let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.min_interval {
            let wait = self.min_interval - elapsed;
            info!(wait_ms = wait.as_millis() as u64, "Rate limiting next send");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn send_with_retry(&self, index: usize, content: &str) -> Result<(), DeliveryError> {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                let jitter = Duration::from_millis(rand::rng().random_range(0..RETRY_JITTER_MS));
                warn!(
                    chunk = index,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying chunk send after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
            }

            match self.sink.post(content).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }

        Err(DeliveryError::RetriesExhausted {
            index,
            attempts: self.max_attempts,
            last: Box::new(last_err.expect("at least one attempt was made")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;

    use crate::chunk::Section;
    use shelfwatch_store::{connect, migrate};

    /// Sink that fails its first `fail_first` posts, recording call times.
    struct MockSink {
        fail_first: u32,
        calls: AtomicU32,
        posted: Mutex<Vec<(Instant, String)>>,
    }

    impl MockSink {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
                posted: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotifySink for MockSink {
        async fn post(&self, content: &str) -> Result<(), DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(DeliveryError::Rejected {
                    errcode: 45009,
                    errmsg: "freq limit".to_string(),
                });
            }
            self.posted
                .lock()
                .unwrap()
                .push((Instant::now(), content.to_string()));
            Ok(())
        }

        fn measure(&self, content: &str) -> usize {
            serde_json::to_vec(&serde_json::json!({
                "msgtype": "markdown",
                "markdown": { "content": content },
            }))
            .unwrap()
            .len()
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    async fn marker() -> SendMarker {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        SendMarker::new(pool)
    }

    fn two_chunk_doc() -> Document {
        Document {
            title: "t".to_string(),
            sections: (0..2)
                .map(|i| Section {
                    heading: format!("## s{i}"),
                    items: (0..20).map(|j| format!("{j}. item line with some width")).collect(),
                })
                .collect(),
            footer: ">".to_string(),
        }
    }

    #[tokio::test]
    async fn failed_chunk_does_not_block_remaining_chunks() {
        let sink = MockSink::new(3); // chunk 0 exhausts 3 attempts, chunk 1 succeeds
        let marker = marker().await;
        let deliverer = Deliverer::new(&sink, &marker, 760, Duration::ZERO, 3)
            .with_backoff_base(Duration::from_millis(1));

        let result = deliverer.deliver(&two_chunk_doc()).await.unwrap();
        assert_eq!(result.sent_chunks, 1);
        assert_eq!(result.failed_chunks, 1);
        assert_eq!(sink.call_count(), 4);
    }

    #[tokio::test]
    async fn all_attempts_failing_never_propagates() {
        let sink = MockSink::new(u32::MAX);
        let marker = marker().await;
        let deliverer = Deliverer::new(&sink, &marker, 4096, Duration::ZERO, 3)
            .with_backoff_base(Duration::from_millis(1));

        let result = deliverer.deliver(&two_chunk_doc()).await.unwrap();
        assert_eq!(result.sent_chunks, 0);
        assert!(result.failed_chunks >= 1);
        assert!(marker.last_sent_at().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marker_updated_after_first_success() {
        let sink = MockSink::new(0);
        let marker = marker().await;
        let deliverer = Deliverer::new(&sink, &marker, 4096, Duration::ZERO, 3);

        let result = deliverer.deliver(&two_chunk_doc()).await.unwrap();
        assert!(result.sent_chunks >= 1);
        assert!(marker.last_sent_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn consecutive_sends_respect_min_interval() {
        let sink = MockSink::new(0);
        let marker = marker().await;
        let interval = Duration::from_millis(120);
        let deliverer = Deliverer::new(&sink, &marker, 760, interval, 3);

        let result = deliverer.deliver(&two_chunk_doc()).await.unwrap();
        assert_eq!(result.sent_chunks, 2);

        let posted = sink.posted.lock().unwrap();
        let gap = posted[1].0.duration_since(posted[0].0);
        // Marker stores millisecond-ish precision, allow a little slack.
        assert!(gap >= Duration::from_millis(100), "gap was {gap:?}");
    }

    #[tokio::test]
    async fn first_send_throttled_against_previous_run_marker() {
        let sink = MockSink::new(0);
        let marker = marker().await;
        marker.record_sent_at(Utc::now()).await.unwrap();

        let deliverer = Deliverer::new(&sink, &marker, 4096, Duration::from_millis(120), 3);
        let start = Instant::now();
        let small = Document {
            title: "t".to_string(),
            sections: vec![Section {
                heading: "## s".to_string(),
                items: vec!["1. x".to_string()],
            }],
            footer: ">".to_string(),
        };
        deliverer.deliver(&small).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
