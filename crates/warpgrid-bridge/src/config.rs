//! Bridge configuration (`warpbridge.toml`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::DEFAULT_MAX_BODY_BYTES;
use crate::context::DEFAULT_MAX_CONTEXT_BYTES;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub invoker: InvokerConfig,
    pub retry: RetryConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvokerConfig {
    /// Base URI of the Lambda-compatible invoke API.
    pub endpoint: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_body_bytes: usize,
    pub max_context_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9001".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl InvokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: 3 }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_context_bytes: DEFAULT_MAX_CONTEXT_BYTES,
        }
    }
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }
        if self.invoker.timeout_ms == 0 {
            return Err(ConfigError::Invalid("invoker.timeout_ms must be positive".into()));
        }
        if self.limits.max_body_bytes == 0 || self.limits.max_context_bytes == 0 {
            return Err(ConfigError::Invalid("limits must be positive".into()));
        }
        let endpoint: http::Uri = self
            .invoker
            .endpoint
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invoker.endpoint: {e}")))?;
        if endpoint.scheme_str() != Some("http") || endpoint.authority().is_none() {
            return Err(ConfigError::Invalid(
                "invoker.endpoint must be an absolute http:// URI".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.limits.max_context_bytes, 3583);
        assert_eq!(config.invoker.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:9000"

[invoker]
endpoint = "http://lambda.local:9001"
timeout_ms = 5000

[retry]
attempts = 1

[limits]
max_body_bytes = 1024
max_context_bytes = 512
"#;
        let config = BridgeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.invoker.endpoint, "http://lambda.local:9001");
        assert_eq!(config.invoker.timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.attempts, 1);
        assert_eq!(config.limits.max_body_bytes, 1024);
        assert_eq!(config.limits.max_context_bytes, 512);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = BridgeConfig::from_toml_str("[invoker]\ntimeout_ms = 100\n").unwrap();
        assert_eq!(config.invoker.timeout_ms, 100);
        assert_eq!(config.invoker.endpoint, "http://127.0.0.1:9001");
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = BridgeConfig::from_toml_str("[retry]\nattempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_https_endpoint() {
        let err = BridgeConfig::from_toml_str("[invoker]\nendpoint = \"https://x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = BridgeConfig::from_toml_str("[server]\nport = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip_of_defaults() {
        let text = BridgeConfig::default().to_toml_string().unwrap();
        assert!(text.contains("listen"));
        assert_eq!(
            BridgeConfig::from_toml_str(&text).unwrap(),
            BridgeConfig::default()
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = BridgeConfig::from_file(Path::new("/nonexistent/warpbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
