//! Configuration types for Rift Mock.
//!
//! - `MockServerConfig`: listener address and signal defaults
//! - `MockFile`: declarative expectations served by the `rift-mock` binary

mod file;

pub use file::{ExpectationSpec, MockFile, ReplyConfig};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of one mock server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind; unset or 0 picks an ephemeral port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Timeout of `wait` calls that do not pass one
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_wait_timeout_ms() -> u64 {
    2000
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl MockServerConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// `host:port` to bind, with port 0 when none is configured.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: MockServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MockServerConfig::default());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, None);
        assert_eq!(config.wait_timeout(), Duration::from_millis(2000));
        assert_eq!(config.bind_address(), "127.0.0.1:0");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = "host: 0.0.0.0\nport: 9000\nwaitTimeoutMs: 500\n";
        let config: MockServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.wait_timeout(), Duration::from_millis(500));
    }
}
