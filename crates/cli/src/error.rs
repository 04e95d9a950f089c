//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Sink could not be built from configuration
    #[error("Failed to create sink '{sink}': {message}")]
    SinkSetup { sink: String, message: String },

    /// Reading the input stream failed
    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),

    /// Shutdown finished with records left behind
    #[error("Shutdown incomplete: {residual} records never sent, {in_flight} sends abandoned")]
    ShutdownIncomplete { residual: usize, in_flight: usize },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn sink_setup(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkSetup {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn shutdown_incomplete(residual: usize, in_flight: usize) -> Self {
        Self::ShutdownIncomplete {
            residual,
            in_flight,
        }
    }
}
