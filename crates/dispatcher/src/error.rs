//! Dispatch engine error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::EngineState;

/// Why a record was refused at submit time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Engine is draining or stopped
    ShuttingDown,
    /// Queue full under the fail-fast policy
    QueueFull,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShuttingDown => "shutting_down",
            Self::QueueFull => "queue_full",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShuttingDown => f.write_str("engine is shutting down"),
            Self::QueueFull => f.write_str("queue is full"),
        }
    }
}

/// Error category, used by reporters and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    HealthCheck,
    State,
    Rejected,
    Format,
    Publish,
    ShutdownIncomplete,
    Release,
}

/// Dispatch engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration (fatal, pre-start)
    #[error("invalid configuration for engine '{engine}': {source}")]
    Config {
        engine: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Stream not usable (fatal, pre-start)
    #[error("stream '{stream_id}' is not ready for engine '{engine}': status {status}")]
    HealthCheck {
        engine: String,
        stream_id: String,
        status: contracts::StreamStatus,
    },

    /// Operation not legal in the current state
    #[error("cannot {operation} engine '{engine}' in state {state}")]
    State {
        engine: String,
        operation: &'static str,
        state: EngineState,
    },

    /// Record refused at submit time
    #[error("record rejected by engine '{engine}': {reason}")]
    Rejected { engine: String, reason: RejectReason },

    /// Formatter failed for a single record
    #[error("failed to format record for stream '{stream_id}': {source}")]
    Format {
        stream_id: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Sink gave up on a record after its own retries
    #[error("failed to publish record {partition_key} to stream '{stream_id}': {source}")]
    Publish {
        stream_id: String,
        partition_key: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Deadline elapsed with undelivered records
    #[error(
        "engine '{engine}' waited {deadline:?} before terminating but failed to send \
         {residual} queued and {in_flight} in-flight records"
    )]
    ShutdownIncomplete {
        engine: String,
        deadline: Duration,
        residual: usize,
        in_flight: usize,
    },

    /// Sink teardown failed
    #[error("failed to release sink for engine '{engine}': {source}")]
    Release {
        engine: String,
        #[source]
        source: contracts::ContractError,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::HealthCheck { .. } => ErrorKind::HealthCheck,
            Self::State { .. } => ErrorKind::State,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Format { .. } => ErrorKind::Format,
            Self::Publish { .. } => ErrorKind::Publish,
            Self::ShutdownIncomplete { .. } => ErrorKind::ShutdownIncomplete,
            Self::Release { .. } => ErrorKind::Release,
        }
    }

    /// Fatal errors keep the engine from ever accepting work
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config | ErrorKind::HealthCheck)
    }

    pub(crate) fn state(engine: &str, operation: &'static str, state: EngineState) -> Self {
        Self::State {
            engine: engine.to_string(),
            operation,
            state,
        }
    }

    pub(crate) fn rejected(engine: &str, reason: RejectReason) -> Self {
        Self::Rejected {
            engine: engine.to_string(),
            reason,
        }
    }
}
