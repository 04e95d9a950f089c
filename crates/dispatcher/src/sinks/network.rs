//! NetworkSink - ships record envelopes to a collector over UDP

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, instrument, warn};

use contracts::{
    ContractError, CredentialsProvider, PutReceipt, RetryPolicy, StreamSink, StreamStatus,
};

use super::retry::with_retry;

/// `User-Agent` carried by every envelope
pub const USER_AGENT: &str = concat!("log-shipper/", env!("CARGO_PKG_VERSION"));

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Collector address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max datagram size (UDP tops out at 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(s) => s
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{}': {}", s, e))?,
            None => 65000,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Datagram sent for each record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub stream: String,
    pub partition_key: String,
    pub sequence_number: u64,
    /// Unix millis at send time
    pub sent_at_ms: i64,
    pub user_agent: String,
    /// Empty when the sink runs without credentials
    pub access_key_id: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl RecordEnvelope {
    pub fn encode(&self, format: NetworkFormat) -> Result<Vec<u8>, String> {
        match format {
            NetworkFormat::Json => serde_json::to_vec(self).map_err(|e| format!("json error: {}", e)),
            NetworkFormat::Bincode => {
                bincode::serialize(self).map_err(|e| format!("bincode error: {}", e))
            }
        }
    }

    pub fn decode(bytes: &[u8], format: NetworkFormat) -> Result<Self, String> {
        match format {
            NetworkFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| format!("json error: {}", e))
            }
            NetworkFormat::Bincode => {
                bincode::deserialize(bytes).map_err(|e| format!("bincode error: {}", e))
            }
        }
    }
}

/// Sink that sends envelopes over UDP
///
/// UDP gives no acknowledgement: the health check only proves the local socket
/// is connected, and a put succeeds once the datagram leaves the host.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: UdpSocket,
    access_key_id: String,
    retry: RetryPolicy,
    stream_id: OnceLock<String>,
    next_sequence: AtomicU64,
    released: AtomicBool,
}

impl NetworkSink {
    /// Create a new NetworkSink, resolving credentials once
    #[instrument(name = "network_sink_new", skip(name, config, credentials))]
    pub async fn new(
        name: impl Into<String>,
        config: NetworkSinkConfig,
        credentials: &dyn CredentialsProvider,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let access_key_id = if credentials.is_anonymous() {
            String::new()
        } else {
            credentials.credentials()?.access_key_id
        };

        let socket = Self::connect(&config.addr)
            .await
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))?;

        debug!(
            sink = %name,
            target = %config.addr,
            credentials = credentials.name(),
            "NetworkSink connected"
        );

        Ok(Self {
            name,
            config,
            socket,
            access_key_id,
            retry: RetryPolicy::default(),
            stream_id: OnceLock::new(),
            next_sequence: AtomicU64::new(1),
            released: AtomicBool::new(false),
        })
    }

    /// Create from params (for factory)
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
        credentials: &dyn CredentialsProvider,
    ) -> Result<Self, ContractError> {
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation("sink.params", e))?;
        Self::new(name, config, credentials).await
    }

    async fn connect(addr: &SocketAddr) -> std::io::Result<UdpSocket> {
        let bind: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(addr).await?;
        Ok(socket)
    }

    fn prepare_datagram(
        &self,
        partition_key: &str,
        sequence_number: u64,
        payload: &Bytes,
    ) -> Result<Vec<u8>, ContractError> {
        let envelope = RecordEnvelope {
            stream: self.stream_id.get().cloned().unwrap_or_default(),
            partition_key: partition_key.to_string(),
            sequence_number,
            sent_at_ms: chrono::Utc::now().timestamp_millis(),
            user_agent: USER_AGENT.to_string(),
            access_key_id: self.access_key_id.clone(),
            data: payload.to_vec(),
        };
        let data = envelope
            .encode(self.config.format)
            .map_err(ContractError::Other)?;

        if data.len() > self.config.max_packet_size {
            warn!(
                sink = %self.name,
                size = data.len(),
                max = self.config.max_packet_size,
                "Packet too large, dropping record"
            );
            return Err(ContractError::Other(format!(
                "datagram of {} bytes exceeds max_packet_size {}",
                data.len(),
                self.config.max_packet_size
            )));
        }

        Ok(data)
    }

    async fn transmit(&self, data: &[u8]) -> Result<usize, ContractError> {
        self.socket
            .send(data)
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }
}

impl StreamSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    async fn health_check(&self, stream_id: &str) -> StreamStatus {
        if self.stream_id.set(stream_id.to_string()).is_err() {
            debug!(sink = %self.name, "Stream already bound");
        }
        match self.socket.peer_addr() {
            Ok(_) => StreamStatus::Active,
            Err(e) => StreamStatus::Error(e.to_string()),
        }
    }

    #[instrument(
        name = "network_sink_put",
        skip(self, payload),
        fields(sink = %self.name, bytes = payload.len())
    )]
    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ContractError::SinkReleased {
                sink_name: self.name.clone(),
            });
        }

        let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let data = self.prepare_datagram(partition_key, sequence_number, &payload)?;
        let (sent, attempts) = with_retry(&self.name, &self.retry, || self.transmit(&data)).await?;
        debug!(sink = %self.name, sequence_number, bytes = sent, "Sent");

        Ok(PutReceipt {
            sequence_number: sequence_number.to_string(),
            attempts,
        })
    }

    #[instrument(name = "network_sink_release", skip(self))]
    async fn release(&self) -> Result<(), ContractError> {
        self.released.store(true, Ordering::Release);
        debug!(sink = %self.name, "NetworkSink released");
        Ok(())
    }
}
