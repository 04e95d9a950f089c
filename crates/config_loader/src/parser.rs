//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, ShipperBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ShipperBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ShipperBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ShipperBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BackpressureMode, CredentialsConfig, SinkType};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[engine]
stream_id = "app-logs"
region = "ap-northeast-2"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.engine.stream_id, "app-logs");
        assert_eq!(bp.engine.queue_capacity, 2000);
        assert_eq!(bp.sink.sink_type, SinkType::Log);
        assert_eq!(bp.credentials, CredentialsConfig::DefaultChain);
    }

    #[test]
    fn test_parse_json_full() {
        let content = r#"{
            "engine": {
                "stream_id": "app-logs",
                "region": "us-east-1",
                "encoding": "ISO-8859-1",
                "max_retries": 5,
                "queue_capacity": 64,
                "worker_count": 4,
                "shutdown_deadline_secs": 10,
                "backpressure": "fail_fast"
            },
            "sink": {
                "name": "collector",
                "sink_type": "network",
                "params": { "addr": "127.0.0.1:9000", "format": "bincode" }
            },
            "credentials": { "provider": "env" }
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.engine.worker_count, 4);
        assert_eq!(bp.engine.backpressure, BackpressureMode::FailFast);
        assert_eq!(bp.sink.params.get("format").map(String::as_str), Some("bincode"));
        assert_eq!(bp.credentials, CredentialsConfig::Env);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
