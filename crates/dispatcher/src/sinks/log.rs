//! LogSink - emits records via tracing

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use contracts::{ContractError, PutReceipt, RetryPolicy, StreamSink, StreamStatus};
use tracing::{info, instrument};

/// Sink that logs each record, for dry runs and debugging
pub struct LogSink {
    name: String,
    next_sequence: AtomicU64,
    released: AtomicBool,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_sequence: AtomicU64::new(1),
            released: AtomicBool::new(false),
        }
    }
}

impl StreamSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    // Logging never fails, nothing to retry
    fn set_retry_policy(&mut self, _policy: RetryPolicy) {}

    async fn health_check(&self, _stream_id: &str) -> StreamStatus {
        StreamStatus::Active
    }

    #[instrument(
        name = "log_sink_put",
        skip(self, payload),
        fields(sink = %self.name)
    )]
    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ContractError::SinkReleased {
                sink_name: self.name.clone(),
            });
        }

        let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        info!(
            sink = %self.name,
            sequence_number,
            bytes = payload.len(),
            record = %String::from_utf8_lossy(&payload),
            "Record shipped"
        );

        Ok(PutReceipt {
            sequence_number: sequence_number.to_string(),
            attempts: 1,
        })
    }

    #[instrument(name = "log_sink_release", skip(self))]
    async fn release(&self) -> Result<(), ContractError> {
        self.released.store(true, Ordering::Release);
        info!(sink = %self.name, "LogSink released");
        Ok(())
    }
}
