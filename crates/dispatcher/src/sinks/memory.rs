//! MemorySink - in-process stream with scriptable behaviour
//!
//! Backs the `memory` sink type and the engine tests: records land in a
//! shared [`MemoryStream`] that can be paused, slowed down or told to fail.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, instrument};

use contracts::{ContractError, PutReceipt, RetryPolicy, StreamSink, StreamStatus};

use super::retry::with_retry;

/// A record accepted by a [`MemoryStream`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub sequence_number: u64,
    pub partition_key: String,
    pub payload: Bytes,
}

/// Shared state behind a [`MemorySink`]
#[derive(Debug)]
pub struct MemoryStream {
    records: Mutex<Vec<MemoryRecord>>,
    status: Mutex<StreamStatus>,
    latency: Mutex<Duration>,
    paused: watch::Sender<bool>,
    failing: AtomicBool,
    transient_failures: AtomicU32,
    next_sequence: AtomicU64,
    attempts: AtomicU64,
    release_count: AtomicUsize,
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            status: Mutex::new(StreamStatus::Active),
            latency: Mutex::new(Duration::ZERO),
            paused: watch::Sender::new(false),
            failing: AtomicBool::new(false),
            transient_failures: AtomicU32::new(0),
            next_sequence: AtomicU64::new(1),
            attempts: AtomicU64::new(0),
            release_count: AtomicUsize::new(0),
        }
    }
}

impl MemoryStream {
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Payloads decoded as UTF-8, in acceptance order
    pub fn payload_texts(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|r| String::from_utf8_lossy(&r.payload).into_owned())
            .collect()
    }

    pub fn set_status(&self, status: StreamStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Delay every put by `latency`
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// Reject every record permanently (no retry)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Fail the next `n` attempts with a retryable error
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::Release);
    }

    /// Hold every put until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Attempts made, including retries
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::Acquire)
    }

    fn status(&self) -> StreamStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| StreamStatus::Error(e.to_string()))
    }

    fn latency(&self) -> Duration {
        self.latency.lock().map(|l| *l).unwrap_or_default()
    }

    async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // Sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    fn try_append(
        &self,
        sink_name: &str,
        partition_key: &str,
        payload: &Bytes,
    ) -> Result<u64, ContractError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        if self.release_count() > 0 {
            return Err(ContractError::SinkReleased {
                sink_name: sink_name.to_string(),
            });
        }
        if self.failing.load(Ordering::Acquire) {
            return Err(ContractError::Other(format!(
                "stream behind '{sink_name}' refused the record"
            )));
        }
        let transient = self
            .transient_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(ContractError::sink_write(sink_name, "throughput exceeded"));
        }

        let sequence_number = self.next_sequence.fetch_add(1, Ordering::AcqRel);
        let mut records = self
            .records
            .lock()
            .map_err(|e| ContractError::sink_write(sink_name, e.to_string()))?;
        records.push(MemoryRecord {
            sequence_number,
            partition_key: partition_key.to_string(),
            payload: payload.clone(),
        });
        Ok(sequence_number)
    }
}

/// Sink writing into a [`MemoryStream`]
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    stream: Arc<MemoryStream>,
    retry: RetryPolicy,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_stream(name, Arc::new(MemoryStream::default()))
    }

    /// Sink over an existing stream (several engines may share one)
    pub fn with_stream(name: impl Into<String>, stream: Arc<MemoryStream>) -> Self {
        Self {
            name: name.into(),
            stream,
            retry: RetryPolicy::default(),
        }
    }

    /// Handle for inspecting and scripting the stream
    pub fn stream(&self) -> Arc<MemoryStream> {
        Arc::clone(&self.stream)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl StreamSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    async fn health_check(&self, stream_id: &str) -> StreamStatus {
        let status = self.stream.status();
        debug!(sink = %self.name, stream = %stream_id, status = %status, "Health check");
        status
    }

    #[instrument(
        name = "memory_sink_put",
        skip(self, payload),
        fields(sink = %self.name, bytes = payload.len())
    )]
    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError> {
        self.stream.wait_until_resumed().await;

        let latency = self.stream.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (sequence_number, attempts) = with_retry(&self.name, &self.retry, || async {
            self.stream.try_append(&self.name, partition_key, &payload)
        })
        .await?;

        Ok(PutReceipt {
            sequence_number: sequence_number.to_string(),
            attempts,
        })
    }

    async fn release(&self) -> Result<(), ContractError> {
        self.stream.release_count.fetch_add(1, Ordering::AcqRel);
        debug!(sink = %self.name, "MemorySink released");
        Ok(())
    }
}
