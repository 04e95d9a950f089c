//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::ShipperBlueprint;
use contracts::CredentialsConfig;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    engine: EngineInfo,
    sink: SinkInfo,
    credentials: String,
}

#[derive(Serialize)]
struct EngineInfo {
    stream_id: String,
    region: String,
    encoding: String,
    max_retries: u32,
    queue_capacity: usize,
    worker_count: usize,
    shutdown_deadline_secs: u64,
    backpressure: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;
    let info = build_config_info(&blueprint);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Describe the credentials source without exposing secrets
fn describe_credentials(credentials: &CredentialsConfig) -> String {
    match credentials {
        CredentialsConfig::None => "none".to_string(),
        CredentialsConfig::Static { access_key_id, .. } => format!("static ({access_key_id})"),
        CredentialsConfig::Env => "environment".to_string(),
        CredentialsConfig::PropertiesFile { path } => {
            format!("properties file ({})", path.display())
        }
        CredentialsConfig::DefaultChain => "default chain (environment, properties file)".to_string(),
    }
}

fn build_config_info(blueprint: &ShipperBlueprint) -> ConfigInfo {
    let engine = &blueprint.engine;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        engine: EngineInfo {
            stream_id: engine.stream_id.clone(),
            region: engine.region.clone(),
            encoding: engine.encoding.clone(),
            max_retries: engine.max_retries,
            queue_capacity: engine.queue_capacity,
            worker_count: engine.worker_count,
            shutdown_deadline_secs: engine.shutdown_deadline_secs,
            backpressure: format!("{:?}", engine.backpressure),
        },
        sink: SinkInfo {
            name: blueprint.sink.name.clone(),
            sink_type: format!("{:?}", blueprint.sink.sink_type),
            params: blueprint
                .sink
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        },
        credentials: describe_credentials(&blueprint.credentials),
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== Log Shipper Configuration ===\n");

    let engine = &info.engine;
    println!("Engine");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Stream: {}", engine.stream_id);
    println!("   ├─ Region: {}", engine.region);
    println!("   ├─ Encoding: {}", engine.encoding);
    println!("   ├─ Max retries: {}", engine.max_retries);
    println!("   ├─ Queue capacity: {}", engine.queue_capacity);
    println!("   ├─ Workers: {}", engine.worker_count);
    println!("   ├─ Backpressure: {}", engine.backpressure);
    println!("   └─ Shutdown deadline: {}s", engine.shutdown_deadline_secs);

    println!("\nSink");
    println!("   ├─ Name: {}", info.sink.name);
    if info.sink.params.is_empty() {
        println!("   └─ Type: {}", info.sink.sink_type);
    } else {
        println!("   ├─ Type: {}", info.sink.sink_type);
        let last = info.sink.params.len() - 1;
        for (i, (key, value)) in info.sink.params.iter().enumerate() {
            let prefix = if i == last { "└─" } else { "├─" };
            println!("   {} {} = {}", prefix, key, value);
        }
    }

    println!("\nCredentials: {}", info.credentials);
    println!();
}
