//! LogEvent and the formatter collaborator contract.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// A raw log event as produced by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Logger / target name
    pub logger: String,
    /// Producing thread name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            thread: std::thread::current().name().map(str::to_string),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Formatter collaborator: a pure function event → text
///
/// Implementations return an error for events they cannot render; they must
/// not panic, but a panic is still contained by [`format_guarded`].
pub trait EventFormatter<E>: Send + Sync {
    fn format(&self, event: &E) -> Result<String, ContractError>;
}

impl<E, F> EventFormatter<E> for F
where
    F: Fn(&E) -> Result<String, ContractError> + Send + Sync,
{
    fn format(&self, event: &E) -> Result<String, ContractError> {
        self(event)
    }
}

/// Run a formatter, turning a panic into a per-record format error
pub fn format_guarded<E>(
    formatter: &dyn EventFormatter<E>,
    event: &E,
) -> Result<String, ContractError> {
    match catch_unwind(AssertUnwindSafe(|| formatter.format(event))) {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ContractError::format(format!("formatter panicked: {reason}")))
        }
    }
}

/// `<timestamp> <LEVEL> [<thread>] <logger> - <message> k=v ...`
#[derive(Debug, Clone, Default)]
pub struct PatternFormatter;

impl EventFormatter<LogEvent> for PatternFormatter {
    fn format(&self, event: &LogEvent) -> Result<String, ContractError> {
        let mut line = format!(
            "{} {:<5} [{}] {} - {}",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.level,
            event.thread.as_deref().unwrap_or("-"),
            event.logger,
            event.message
        );
        for (key, value) in &event.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        Ok(line)
    }
}

/// One JSON object per event
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl<E: Serialize> EventFormatter<E> for JsonFormatter {
    fn format(&self, event: &E) -> Result<String, ContractError> {
        serde_json::to_string(event).map_err(|e| ContractError::format(e.to_string()))
    }
}

/// Plain text events formatted as-is
#[derive(Debug, Clone, Default)]
pub struct RawFormatter;

impl EventFormatter<String> for RawFormatter {
    fn format(&self, event: &String) -> Result<String, ContractError> {
        Ok(event.clone())
    }
}
