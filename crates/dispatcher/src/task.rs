//! PublishTask - one record waiting for a worker

use bytes::Bytes;
use uuid::Uuid;

/// A formatted record plus its partition key
///
/// Consumed exactly once by a worker.
#[derive(Debug)]
pub struct PublishTask {
    pub partition_key: String,
    pub payload: Bytes,
}

impl PublishTask {
    /// Wrap a payload under a fresh random partition key
    pub fn new(payload: Bytes) -> Self {
        Self {
            partition_key: Uuid::new_v4().to_string(),
            payload,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
