//! StreamSink trait - Dispatcher output interface
//!
//! Defines the abstract interface of the remote append-only stream.
//! Implementations own their connections, retries and backoff; the dispatch
//! engine only observes the final outcome of each call.

use std::fmt;

use bytes::Bytes;

use crate::{ContractError, RetryPolicy};

/// Status reported by a stream health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Accepting records
    Active,
    /// Being resharded / reconfigured, still accepting records
    Updating,
    /// Stream does not exist
    Missing,
    /// Status could not be determined
    Error(String),
}

impl StreamStatus {
    /// Whether records may be published in this status
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Active | Self::Updating)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Updating => f.write_str("UPDATING"),
            Self::Missing => f.write_str("MISSING"),
            Self::Error(cause) => write!(f, "ERROR ({cause})"),
        }
    }
}

/// Acknowledgement of a published record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Sink-assigned position of the record
    pub sequence_number: String,
    /// Attempts spent, including the first
    pub attempts: u32,
}

/// Remote stream trait
///
/// A single sink instance is shared by every worker, so all calls take `&self`.
#[trait_variant::make(StreamSink: Send)]
pub trait LocalStreamSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Receive the retry policy configured on the engine
    ///
    /// Called once, before the health check.
    fn set_retry_policy(&mut self, policy: RetryPolicy);

    /// Check that the stream exists and accepts records
    async fn health_check(&self, stream_id: &str) -> StreamStatus;

    /// Publish one record
    ///
    /// # Errors
    /// The final error after the sink's own retries are exhausted
    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError>;

    /// Release connections and other resources
    async fn release(&self) -> Result<(), ContractError>;
}
