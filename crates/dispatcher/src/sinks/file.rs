//! FileSink - appends records as JSON lines, one file per stream

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use contracts::{ContractError, PutReceipt, RetryPolicy, StreamSink, StreamStatus};

use super::retry::with_retry;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Directory holding one `<stream>.jsonl` file per stream
    pub base_path: PathBuf,
    /// Create missing stream files on health check instead of reporting `Missing`
    pub create_streams: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        let create_streams = match params.get("create_streams").map(String::as_str) {
            Some("true") | None => true,
            Some("false") => false,
            Some(other) => return Err(format!("invalid create_streams '{}'", other)),
        };

        Ok(Self {
            base_path,
            create_streams,
        })
    }

    /// Path of the file backing `stream_id`
    pub fn stream_path(&self, stream_id: &str) -> PathBuf {
        self.base_path.join(format!("{stream_id}.jsonl"))
    }

    /// Check that `stream_id` names a file directly under `base_path`
    pub fn check_stream_id(stream_id: &str) -> Result<(), String> {
        if stream_id.is_empty() || stream_id.contains(['/', '\\']) || stream_id.contains("..") {
            return Err(format!("invalid stream id '{stream_id}'"));
        }
        match Path::new(stream_id).components().next() {
            Some(Component::Normal(_)) => Ok(()),
            _ => Err(format!("invalid stream id '{stream_id}'")),
        }
    }
}

/// One line in a stream file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub sequence_number: u64,
    pub partition_key: String,
    pub received_at: DateTime<Utc>,
    /// Payload decoded as UTF-8 (lossy for other charsets)
    pub data: String,
}

struct OpenStream {
    path: PathBuf,
    file: File,
}

/// Writer whose end can be cut back after a failed append
trait AppendTarget: AsyncWrite + Unpin + Send {
    fn end_offset(&mut self) -> impl Future<Output = io::Result<u64>> + Send;

    fn truncate(&mut self, len: u64) -> impl Future<Output = io::Result<()>> + Send;
}

impl AppendTarget for File {
    fn end_offset(&mut self) -> impl Future<Output = io::Result<u64>> + Send {
        async move { self.metadata().await.map(|meta| meta.len()) }
    }

    fn truncate(&mut self, len: u64) -> impl Future<Output = io::Result<()>> + Send {
        self.set_len(len)
    }
}

#[derive(Debug)]
enum AppendFailure {
    /// Nothing of the line is left behind
    RolledBack(io::Error),
    /// Part of the line may remain in the file
    Torn { write: io::Error, rollback: io::Error },
}

/// Append `line` whole or not at all
async fn append_whole_line<W: AppendTarget>(
    target: &mut W,
    line: &[u8],
) -> Result<(), AppendFailure> {
    let start = target.end_offset().await.map_err(AppendFailure::RolledBack)?;
    let written = async {
        target.write_all(line).await?;
        target.flush().await
    }
    .await;

    match written {
        Ok(()) => Ok(()),
        Err(write) => match target.truncate(start).await {
            Ok(()) => Err(AppendFailure::RolledBack(write)),
            Err(rollback) => Err(AppendFailure::Torn { write, rollback }),
        },
    }
}

/// Sink that appends records to local files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    retry: RetryPolicy,
    stream: Mutex<Option<OpenStream>>,
    next_sequence: AtomicU64,
}

impl FileSink {
    /// Create a new FileSink, creating the base directory if needed
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            retry: RetryPolicy::default(),
            stream: Mutex::new(None),
            next_sequence: AtomicU64::new(1),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation("sink.params", e))?;
        Self::new(name.clone(), config).map_err(|e| ContractError::sink_connection(name, e.to_string()))
    }

    async fn open(path: &Path, create: bool) -> std::io::Result<File> {
        OpenOptions::new()
            .append(true)
            .create(create)
            .open(path)
            .await
    }

    async fn append_line(&self, line: &[u8]) -> Result<(), ContractError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| ContractError::SinkReleased {
            sink_name: self.name.clone(),
        })?;

        match append_whole_line(&mut stream.file, line).await {
            Ok(()) => Ok(()),
            Err(AppendFailure::RolledBack(e)) => {
                error!(sink = %self.name, path = %stream.path.display(), error = %e, "Append failed");
                Err(ContractError::sink_write(&self.name, e.to_string()))
            }
            // A retry would land after the partial line
            Err(AppendFailure::Torn { write, rollback }) => {
                error!(
                    sink = %self.name,
                    path = %stream.path.display(),
                    error = %write,
                    rollback_error = %rollback,
                    "Append failed and could not be rolled back"
                );
                Err(ContractError::Other(format!(
                    "{}: partial append to {} left in place: {write}",
                    self.name,
                    stream.path.display()
                )))
            }
        }
    }
}

impl StreamSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    #[instrument(name = "file_sink_health_check", skip(self), fields(sink = %self.name))]
    async fn health_check(&self, stream_id: &str) -> StreamStatus {
        if let Err(e) = FileSinkConfig::check_stream_id(stream_id) {
            return StreamStatus::Error(e);
        }
        let path = self.config.stream_path(stream_id);
        let exists = fs::try_exists(&path).await.unwrap_or(false);
        if !exists && !self.config.create_streams {
            return StreamStatus::Missing;
        }

        match Self::open(&path, self.config.create_streams).await {
            Ok(file) => {
                debug!(sink = %self.name, path = %path.display(), "Stream file opened");
                *self.stream.lock().await = Some(OpenStream { path, file });
                StreamStatus::Active
            }
            Err(e) => StreamStatus::Error(e.to_string()),
        }
    }

    #[instrument(
        name = "file_sink_put",
        skip(self, payload),
        fields(sink = %self.name, bytes = payload.len())
    )]
    async fn put(&self, partition_key: &str, payload: Bytes) -> Result<PutReceipt, ContractError> {
        let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let record = FileRecord {
            sequence_number,
            partition_key: partition_key.to_string(),
            received_at: Utc::now(),
            data: String::from_utf8_lossy(&payload).into_owned(),
        };
        let mut line =
            serde_json::to_vec(&record).map_err(|e| ContractError::Other(e.to_string()))?;
        line.push(b'\n');

        let ((), attempts) = with_retry(&self.name, &self.retry, || self.append_line(&line)).await?;

        Ok(PutReceipt {
            sequence_number: sequence_number.to_string(),
            attempts,
        })
    }

    #[instrument(name = "file_sink_release", skip(self))]
    async fn release(&self) -> Result<(), ContractError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream
            .file
            .sync_all()
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, path = %stream.path.display(), "FileSink released");
        Ok(())
    }
}
