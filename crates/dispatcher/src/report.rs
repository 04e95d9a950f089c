//! Host error-reporting channel
//!
//! Everything except state and rejection errors ends up here instead of
//! being returned from `append`/`stop`.

use std::sync::Mutex;

use tracing::{error, warn};

use crate::error::{EngineError, ErrorKind};

/// Receives non-fatal and fatal engine errors
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &EngineError);
}

/// Default reporter: emits each error as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &EngineError) {
        match err.kind() {
            ErrorKind::Config
            | ErrorKind::HealthCheck
            | ErrorKind::ShutdownIncomplete
            | ErrorKind::Release => {
                error!(kind = ?err.kind(), error = %err, "Engine error");
            }
            ErrorKind::State | ErrorKind::Rejected | ErrorKind::Format | ErrorKind::Publish => {
                warn!(kind = ?err.kind(), error = %err, "Record not shipped");
            }
        }
    }
}

/// One captured report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reporter that keeps every error in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Mutex<Vec<ReportedError>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<ReportedError> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors
            .lock()
            .map(|errors| errors.iter().filter(|e| e.kind == kind).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, err: &EngineError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(ReportedError {
                kind: err.kind(),
                message: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;

    #[test]
    fn test_collecting_reporter_counts_by_kind() {
        let reporter = CollectingReporter::new();
        reporter.report(&EngineError::rejected("e", RejectReason::QueueFull));
        reporter.report(&EngineError::rejected("e", RejectReason::ShuttingDown));

        assert_eq!(reporter.count(ErrorKind::Rejected), 2);
        assert_eq!(reporter.count(ErrorKind::Publish), 0);
        assert!(reporter.errors()[0].message.contains("queue is full"));
    }
}
