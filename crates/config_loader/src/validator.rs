//! 配置校验模块
//!
//! 校验规则:
//! - engine: 由 `EngineConfig::resolve` 统一校验 (stream_id / region / encoding / 各上限)
//! - sink: name 非空, 各类型参数合法
//! - credentials: 静态密钥非空, 文件路径非空

use std::net::SocketAddr;

use contracts::{ContractError, CredentialsConfig, ShipperBlueprint, SinkConfig, SinkType};

/// UDP 数据报上限 (IPv4)
const MAX_DATAGRAM_SIZE: usize = 65507;

/// 校验 ShipperBlueprint
pub fn validate(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    validate_engine(blueprint)?;
    validate_sink(&blueprint.sink)?;
    validate_credentials(&blueprint.credentials)?;
    Ok(())
}

fn validate_engine(blueprint: &ShipperBlueprint) -> Result<(), ContractError> {
    blueprint.engine.resolve().map(|_| ())
}

fn validate_sink(sink: &SinkConfig) -> Result<(), ContractError> {
    if sink.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "sink.name",
            "sink name cannot be empty",
        ));
    }

    match sink.sink_type {
        SinkType::Network => validate_network_params(sink),
        SinkType::File => validate_file_params(sink),
        SinkType::Log | SinkType::Memory => Ok(()),
    }
}

fn validate_network_params(sink: &SinkConfig) -> Result<(), ContractError> {
    let addr = sink.params.get("addr").ok_or_else(|| {
        ContractError::config_validation("sink.params.addr", "network sink requires 'addr'")
    })?;
    addr.parse::<SocketAddr>().map_err(|e| {
        ContractError::config_validation("sink.params.addr", format!("'{addr}': {e}"))
    })?;

    if let Some(format) = sink.params.get("format") {
        if format != "json" && format != "bincode" {
            return Err(ContractError::config_validation(
                "sink.params.format",
                format!("unknown format '{format}', expected json or bincode"),
            ));
        }
    }

    if let Some(size) = sink.params.get("max_packet_size") {
        match size.parse::<usize>() {
            Ok(n) if (1..=MAX_DATAGRAM_SIZE).contains(&n) => {}
            _ => {
                return Err(ContractError::config_validation(
                    "sink.params.max_packet_size",
                    format!("'{size}' must be in 1..={MAX_DATAGRAM_SIZE}"),
                ));
            }
        }
    }

    Ok(())
}

fn validate_file_params(sink: &SinkConfig) -> Result<(), ContractError> {
    if let Some(base) = sink.params.get("base_path") {
        if base.trim().is_empty() {
            return Err(ContractError::config_validation(
                "sink.params.base_path",
                "base_path cannot be empty",
            ));
        }
    }

    match sink.params.get("create_streams").map(String::as_str) {
        None | Some("true") | Some("false") => Ok(()),
        Some(other) => Err(ContractError::config_validation(
            "sink.params.create_streams",
            format!("'{other}' is not a boolean"),
        )),
    }
}

fn validate_credentials(credentials: &CredentialsConfig) -> Result<(), ContractError> {
    match credentials {
        CredentialsConfig::Static {
            access_key_id,
            secret_access_key,
        } => {
            if access_key_id.trim().is_empty() || secret_access_key.trim().is_empty() {
                return Err(ContractError::config_validation(
                    "credentials",
                    "static access_key_id and secret_access_key cannot be empty",
                ));
            }
            Ok(())
        }
        CredentialsConfig::PropertiesFile { path } => {
            if path.as_os_str().is_empty() {
                return Err(ContractError::config_validation(
                    "credentials.path",
                    "properties file path cannot be empty",
                ));
            }
            Ok(())
        }
        CredentialsConfig::None | CredentialsConfig::Env | CredentialsConfig::DefaultChain => {
            Ok(())
        }
    }
}
