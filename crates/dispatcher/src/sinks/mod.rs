//! Sink implementations and the config-driven factory

mod file;
mod log;
mod memory;
mod network;
mod retry;

pub use file::{FileRecord, FileSink, FileSinkConfig};
pub use log::LogSink;
pub use memory::{MemoryRecord, MemorySink, MemoryStream};
pub use network::{NetworkFormat, NetworkSink, NetworkSinkConfig, RecordEnvelope, USER_AGENT};

use bytes::Bytes;
use tracing::instrument;

use contracts::{
    ContractError, CredentialsProvider, PutReceipt, RetryPolicy, SinkConfig, SinkType, StreamSink,
    StreamStatus,
};

/// Any sink a [`SinkConfig`] can describe
pub enum ConfiguredSink {
    Log(LogSink),
    File(FileSink),
    Network(NetworkSink),
    Memory(MemorySink),
}

impl ConfiguredSink {
    pub fn sink_type(&self) -> SinkType {
        match self {
            Self::Log(_) => SinkType::Log,
            Self::File(_) => SinkType::File,
            Self::Network(_) => SinkType::Network,
            Self::Memory(_) => SinkType::Memory,
        }
    }
}

impl StreamSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Log(s) => s.name(),
            Self::File(s) => s.name(),
            Self::Network(s) => s.name(),
            Self::Memory(s) => s.name(),
        }
    }

    fn set_retry_policy(&mut self, policy: RetryPolicy) {
        match self {
            Self::Log(s) => s.set_retry_policy(policy),
            Self::File(s) => s.set_retry_policy(policy),
            Self::Network(s) => s.set_retry_policy(policy),
            Self::Memory(s) => s.set_retry_policy(policy),
        }
    }

    async fn health_check(&self, stream_id: &str) -> StreamStatus {
        match self {
            Self::Log(s) => s.health_check(stream_id).await,
            Self::File(s) => s.health_check(stream_id).await,
            Self::Network(s) => s.health_check(stream_id).await,
            Self::Memory(s) => s.health_check(stream_id).await,
        }
    }

    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError> {
        match self {
            Self::Log(s) => s.put(partition_key, payload).await,
            Self::File(s) => s.put(partition_key, payload).await,
            Self::Network(s) => s.put(partition_key, payload).await,
            Self::Memory(s) => s.put(partition_key, payload).await,
        }
    }

    async fn release(&self) -> Result<(), ContractError> {
        match self {
            Self::Log(s) => s.release().await,
            Self::File(s) => s.release().await,
            Self::Network(s) => s.release().await,
            Self::Memory(s) => s.release().await,
        }
    }
}

/// Create a sink from configuration
///
/// Credentials are only consulted by sinks that authenticate.
#[instrument(name = "create_sink", skip(config, credentials), fields(sink = %config.name))]
pub async fn create_sink(
    config: &SinkConfig,
    credentials: &dyn CredentialsProvider,
) -> Result<ConfiguredSink, ContractError> {
    match config.sink_type {
        SinkType::Log => Ok(ConfiguredSink::Log(LogSink::new(&config.name))),
        SinkType::File => FileSink::from_params(&config.name, &config.params).map(ConfiguredSink::File),
        SinkType::Network => NetworkSink::from_params(&config.name, &config.params, credentials)
            .await
            .map(ConfiguredSink::Network),
        SinkType::Memory => Ok(ConfiguredSink::Memory(MemorySink::new(&config.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::NoCredentialsProvider;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_create_log_sink() {
        let config = SinkConfig::default();
        let sink = create_sink(&config, &NoCredentialsProvider).await.unwrap();
        assert_eq!(sink.sink_type(), SinkType::Log);
        assert_eq!(sink.name(), "default");
    }

    #[tokio::test]
    async fn test_create_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            name: "disk".to_string(),
            sink_type: SinkType::File,
            params: HashMap::from([(
                "base_path".to_string(),
                dir.path().display().to_string(),
            )]),
        };
        let sink = create_sink(&config, &NoCredentialsProvider).await.unwrap();
        assert_eq!(sink.sink_type(), SinkType::File);
        assert_eq!(sink.health_check("s").await, StreamStatus::Active);
    }

    #[tokio::test]
    async fn test_network_sink_requires_addr() {
        let config = SinkConfig {
            name: "net".to_string(),
            sink_type: SinkType::Network,
            params: HashMap::new(),
        };
        let result = create_sink(&config, &NoCredentialsProvider).await;
        assert!(matches!(result, Err(ContractError::ConfigValidation { .. })));
    }
}
