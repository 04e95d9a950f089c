//! ShipperBlueprint - Config Loader output
//!
//! Describes the complete shipper configuration: engine bounds, the target
//! sink and how its credentials are resolved.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{Charset, ContractError, Region};

pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_QUEUE_CAPACITY: usize = 2000;
pub const DEFAULT_WORKER_COUNT: usize = 20;
pub const DEFAULT_SHUTDOWN_DEADLINE_SECS: u64 = 30;
pub const DEFAULT_CREDENTIALS_FILE: &str = "shipper-credentials.properties";

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete shipper configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatch engine settings
    pub engine: EngineConfig,

    /// Target sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// How sink credentials are resolved
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// What a producer does when the task queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    /// Suspend the producer until a worker frees a slot
    #[default]
    BlockUntilSpace,
    /// Reject the record immediately
    FailFast,
}

/// Dispatch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Target stream identifier
    #[serde(default)]
    #[validate(custom(function = "validate_not_blank"))]
    pub stream_id: String,

    /// Region the stream lives in
    #[serde(default)]
    #[validate(custom(function = "validate_region"))]
    pub region: String,

    /// Payload charset
    #[serde(default = "default_encoding")]
    #[validate(custom(function = "validate_charset"))]
    pub encoding: String,

    /// Retries the sink performs before reporting a failure
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1, message = "must be > 0"))]
    pub max_retries: u32,

    /// Bounded queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "must be > 0"))]
    pub queue_capacity: usize,

    /// Number of publishing workers
    #[serde(default = "default_worker_count")]
    #[validate(range(min = 1, message = "must be > 0"))]
    pub worker_count: usize,

    /// Upper bound on the drain wait during shutdown
    #[serde(default = "default_shutdown_deadline_secs")]
    #[validate(range(min = 1, message = "must be > 0"))]
    pub shutdown_deadline_secs: u64,

    /// Producer behavior on a full queue
    #[serde(default)]
    pub backpressure: BackpressureMode,
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_shutdown_deadline_secs() -> u64 {
    DEFAULT_SHUTDOWN_DEADLINE_SECS
}

fn validation_error(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validation_error("blank", "cannot be blank".to_string()));
    }
    Ok(())
}

fn validate_region(value: &str) -> Result<(), ValidationError> {
    validate_not_blank(value)?;
    if Region::resolve(value).is_none() {
        return Err(validation_error(
            "unknown_region",
            format!("'{}' is not a known region", value.trim()),
        ));
    }
    Ok(())
}

fn validate_charset(value: &str) -> Result<(), ValidationError> {
    validate_not_blank(value)?;
    if Charset::from_name(value).is_none() {
        return Err(validation_error(
            "unknown_charset",
            format!("unsupported charset '{}'", value.trim()),
        ));
    }
    Ok(())
}

/// Flatten validator output into a single contract error.
///
/// Fields are reported in sorted order so messages are stable.
fn into_contract_error(errors: ValidationErrors) -> ContractError {
    let mut entries: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.clone(), message)
            })
        })
        .collect();
    entries.sort();

    let field = entries
        .iter()
        .map(|(f, _)| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let message = entries
        .iter()
        .map(|(f, m)| format!("{f} {m}"))
        .collect::<Vec<_>>()
        .join("; ");
    ContractError::config_validation(field, message)
}

impl EngineConfig {
    /// Create a configuration with defaults for everything but the stream
    pub fn new(stream_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            region: region.into(),
            encoding: default_encoding(),
            max_retries: DEFAULT_MAX_RETRIES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            shutdown_deadline_secs: DEFAULT_SHUTDOWN_DEADLINE_SECS,
            backpressure: BackpressureMode::default(),
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_shutdown_deadline_secs(mut self, secs: u64) -> Self {
        self.shutdown_deadline_secs = secs;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureMode) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Validate and resolve into the immutable form the engine runs with
    ///
    /// # Errors
    /// `ConfigValidation` naming every offending field
    pub fn resolve(&self) -> Result<ResolvedEngineConfig, ContractError> {
        self.validate().map_err(into_contract_error)?;

        let region = Region::resolve(&self.region)
            .ok_or_else(|| ContractError::config_validation("region", "unknown region"))?;
        let charset = Charset::from_name(&self.encoding)
            .ok_or_else(|| ContractError::config_validation("encoding", "unsupported charset"))?;

        Ok(ResolvedEngineConfig {
            stream_id: self.stream_id.trim().to_string(),
            region,
            charset,
            max_retries: self.max_retries,
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            shutdown_deadline: Duration::from_secs(self.shutdown_deadline_secs),
            backpressure: self.backpressure,
        })
    }
}

/// Validated engine configuration; never mutated once the engine runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEngineConfig {
    pub stream_id: String,
    pub region: Region,
    pub charset: Charset,
    pub max_retries: u32,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub shutdown_deadline: Duration,
    pub backpressure: BackpressureMode,
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name (used in logs and metrics)
    #[serde(default = "default_sink_name")]
    pub name: String,

    /// Sink type
    #[serde(default)]
    pub sink_type: SinkType,

    /// Sink-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_sink_name() -> String {
    "default".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: default_sink_name(),
            sink_type: SinkType::default(),
            params: HashMap::new(),
        }
    }
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Emit records through tracing
    #[default]
    Log,
    /// Append JSON lines to a local file per stream
    File,
    /// Send datagram envelopes to a collector
    Network,
    /// In-process stream
    Memory,
}

/// Credentials resolution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// No credentials
    None,
    /// Inline key pair
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    /// `SHIPPER_ACCESS_KEY_ID` / `SHIPPER_SECRET_ACCESS_KEY`
    Env,
    /// Properties file with `accessKey` / `secretKey`
    PropertiesFile {
        #[serde(default = "default_credentials_path")]
        path: PathBuf,
    },
    /// Environment, then the default properties file
    #[default]
    DefaultChain,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIALS_FILE)
}
