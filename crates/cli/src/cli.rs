//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log Shipper - ships log records to a remote stream with bounded backpressure
#[derive(Parser, Debug)]
#[command(
    name = "log-shipper",
    author,
    version,
    about = "Backpressured asynchronous log-record shipper",
    long_about = "Reads log lines from a file or stdin and ships them to the configured \n\
                  stream through a bounded queue and a fixed pool of publishing workers.\n\n\
                  On EOF or Ctrl+C the queue is drained up to the shutdown deadline and \n\
                  anything left behind is reported."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOG_SHIPPER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "LOG_SHIPPER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ship log lines until EOF or a shutdown signal
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "shipper.toml",
        env = "LOG_SHIPPER_CONFIG"
    )]
    pub config: PathBuf,

    /// Read log lines from this file instead of stdin
    #[arg(short, long, env = "LOG_SHIPPER_INPUT")]
    pub input: Option<PathBuf>,

    /// How each input line becomes a record payload
    #[arg(long, value_enum, default_value = "raw", env = "LOG_SHIPPER_EVENT_FORMAT")]
    pub event_format: EventFormat,

    /// Override the target stream
    #[arg(long, env = "LOG_SHIPPER_STREAM")]
    pub stream: Option<String>,

    /// Override the stream region
    #[arg(long, env = "LOG_SHIPPER_REGION")]
    pub region: Option<String>,

    /// Override the number of publishing workers
    #[arg(long, env = "LOG_SHIPPER_WORKERS")]
    pub workers: Option<usize>,

    /// Override the task queue capacity
    #[arg(long, env = "LOG_SHIPPER_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Override the shutdown drain deadline in seconds
    #[arg(long, env = "LOG_SHIPPER_SHUTDOWN_DEADLINE")]
    pub shutdown_deadline: Option<u64>,

    /// Validate configuration and exit without shipping
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOG_SHIPPER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Input line handling
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventFormat {
    /// Ship the line as-is
    #[default]
    Raw,
    /// Wrap in an INFO event, render `timestamp LEVEL [thread] logger - message`
    Pattern,
    /// Wrap in an INFO event, render as JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides_parse() {
        let cli = Cli::try_parse_from([
            "log-shipper",
            "-v",
            "run",
            "--config",
            "custom.toml",
            "--stream",
            "audit",
            "--workers",
            "4",
            "--event-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("custom.toml"));
        assert_eq!(args.stream.as_deref(), Some("audit"));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.event_format, EventFormat::Json);
        assert!(args.queue_capacity.is_none());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["log-shipper", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }
}
