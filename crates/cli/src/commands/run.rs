//! `run` command implementation.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use config_loader::ShipperBlueprint;
use contracts::{
    provider_from_config, EventFormatter, JsonFormatter, LogEvent, LogLevel, PatternFormatter,
    RawFormatter,
};
use dispatcher::{create_sink, ConfiguredSink, DispatchEngine, EngineError, RejectReason};
use observability::ShipperMetricsAggregator;

use super::load_blueprint;
use crate::cli::{EventFormat, RunArgs};
use crate::error::CliError;
use crate::stats::RunStats;

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

/// Logger name stamped on wrapped input lines
const INPUT_LOGGER: &str = "log-shipper.input";

/// Execute the `run` command
pub async fn run_shipper(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;
    apply_overrides(&mut blueprint, args);
    blueprint
        .engine
        .resolve()
        .context("Configuration invalid after CLI overrides")?;

    info!(
        stream = %blueprint.engine.stream_id,
        region = %blueprint.engine.region,
        sink = %blueprint.sink.name,
        sink_type = ?blueprint.sink.sink_type,
        workers = blueprint.engine.worker_count,
        queue_capacity = blueprint.engine.queue_capacity,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let credentials = provider_from_config(&blueprint.credentials);
    let sink = create_sink(&blueprint.sink, credentials.as_ref())
        .await
        .map_err(|e| CliError::sink_setup(&blueprint.sink.name, e.to_string()))?;

    let input = open_input(args.input.as_deref()).await?;

    let stats = match args.event_format {
        EventFormat::Raw => ship(&blueprint, sink, RawFormatter, input, |line| line).await?,
        EventFormat::Pattern => ship(&blueprint, sink, PatternFormatter, input, wrap_line).await?,
        EventFormat::Json => ship(&blueprint, sink, JsonFormatter, input, wrap_line).await?,
    };

    stats.print_summary();

    if !stats.report.is_complete() {
        return Err(
            CliError::shutdown_incomplete(stats.report.residual, stats.report.in_flight).into(),
        );
    }

    info!("Log Shipper finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut ShipperBlueprint, args: &RunArgs) {
    let engine = &mut blueprint.engine;
    if let Some(ref stream) = args.stream {
        info!(stream = %stream, "Overriding stream from CLI");
        engine.stream_id = stream.clone();
    }
    if let Some(ref region) = args.region {
        info!(region = %region, "Overriding region from CLI");
        engine.region = region.clone();
    }
    if let Some(workers) = args.workers {
        engine.worker_count = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        engine.queue_capacity = capacity;
    }
    if let Some(secs) = args.shutdown_deadline {
        engine.shutdown_deadline_secs = secs;
    }
}

async fn open_input(path: Option<&Path>) -> Result<Input> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            info!(input = %path.display(), "Reading records from file");
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading records from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

fn wrap_line(line: String) -> LogEvent {
    LogEvent::new(LogLevel::Info, INPUT_LOGGER, line)
}

/// Start the engine, feed it every input line, then shut it down
async fn ship<E, F>(
    blueprint: &ShipperBlueprint,
    sink: ConfiguredSink,
    formatter: F,
    input: Input,
    to_event: impl Fn(String) -> E,
) -> Result<RunStats>
where
    E: 'static,
    F: EventFormatter<E> + 'static,
{
    let engine: DispatchEngine<E, ConfiguredSink> = DispatchEngine::new("log-shipper");
    engine
        .start(&blueprint.engine, sink, formatter)
        .await
        .context("Failed to start dispatch engine")?;

    let started = Instant::now();
    let mut producer = ShipperMetricsAggregator::new();
    let mut interrupted = false;
    let mut lines = input.lines();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
            line = lines.next_line() => line.map_err(CliError::from)?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let event = to_event(line);
        let wait = Instant::now();
        // A producer parked on a full queue must still see the signal
        let result = tokio::select! {
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
            result = engine.append(&event) => result,
        };
        let wait_ms = wait.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(()) => producer.update(true, wait_ms),
            Err(EngineError::Rejected {
                reason: RejectReason::QueueFull,
                ..
            }) => producer.update(false, wait_ms),
            Err(e) => {
                producer.update(false, wait_ms);
                warn!(error = %e, "Engine stopped accepting records");
                break;
            }
        }
    }

    if interrupted {
        warn!("Received shutdown signal, draining queue...");
    } else {
        info!(lines = producer.lines_read, "Input exhausted, draining queue...");
    }

    let report = engine.shutdown().await.context("Engine shutdown failed")?;

    Ok(RunStats {
        duration: started.elapsed(),
        report,
        producer,
        interrupted,
    })
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ShipperBlueprint) {
    let engine = &blueprint.engine;
    println!("\n=== Configuration Summary ===\n");
    println!("Engine:");
    println!("  Stream: {} ({})", engine.stream_id, engine.region);
    println!("  Encoding: {}", engine.encoding);
    println!(
        "  Workers: {}, queue capacity: {}, backpressure: {:?}",
        engine.worker_count, engine.queue_capacity, engine.backpressure
    );
    println!(
        "  Retries: {}, shutdown deadline: {}s",
        engine.max_retries, engine.shutdown_deadline_secs
    );
    println!("\nSink:");
    println!("  {} ({:?})", blueprint.sink.name, blueprint.sink.sink_type);
    println!();
}
