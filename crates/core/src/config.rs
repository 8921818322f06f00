//! Uploader configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and protocol settings for one uploader.
///
/// Chunk size and retry parameters default to the protocol constants; both
/// sides must agree on the chunk size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Server host name or IP address.
    pub server_host: String,
    /// Server port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Device identifier sent when a session starts.
    pub device_id: String,
    /// Use HTTPS instead of plain HTTP.
    #[serde(default)]
    pub tls: bool,
    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Attempts per chunk before the transfer is aborted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between chunk attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Connect timeout, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-exchange timeout, in milliseconds (default: none).
    /// Without it a stalled server blocks until the OS gives up on the socket.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Sample free memory around session start, each chunk and finalize.
    #[serde(default = "default_memory_diagnostics")]
    pub memory_diagnostics: bool,
}

fn default_server_port() -> u16 {
    80
}

fn default_chunk_size() -> usize {
    crate::CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    crate::MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    crate::RETRY_DELAY_MS
}

fn default_connect_timeout_ms() -> u64 {
    crate::CONNECT_TIMEOUT_MS
}

fn default_memory_diagnostics() -> bool {
    true
}

impl UploaderConfig {
    /// Configuration for `host:port` with protocol defaults.
    pub fn new(server_host: impl Into<String>, server_port: u16, device_id: impl Into<String>) -> Self {
        Self {
            server_host: server_host.into(),
            server_port,
            device_id: device_id.into(),
            tls: false,
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
            memory_diagnostics: default_memory_diagnostics(),
        }
    }

    /// Base URL of the upload API, e.g. `http://10.0.0.5:8080/`.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}/", self.server_host, self.server_port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server_host.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "server_host must not be empty".to_string(),
            ));
        }
        if self.device_id.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "device_id must not be empty".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = UploaderConfig::new("10.0.0.5", 8080, "cam-01");
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.base_url(), "http://10.0.0.5:8080/");
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: UploaderConfig = toml::from_str(
            r#"
            server_host = "uploads.example.com"
            server_port = 443
            device_id = "cam-07"
            tls = true
            retry_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url(), "https://uploads.example.com:443/");
        assert_eq!(config.chunk_size, crate::CHUNK_SIZE);
        assert_eq!(config.retry_delay_ms, 250);
        assert!(config.memory_diagnostics);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = UploaderConfig::new("host", 80, "cam");
        for config in [
            UploaderConfig {
                server_host: " ".to_string(),
                ..base.clone()
            },
            UploaderConfig {
                device_id: String::new(),
                ..base.clone()
            },
            UploaderConfig {
                chunk_size: 0,
                ..base.clone()
            },
            UploaderConfig {
                max_attempts: 0,
                ..base.clone()
            },
            UploaderConfig {
                connect_timeout_ms: 0,
                ..base.clone()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(crate::Error::InvalidConfig(_))
            ));
        }
    }
}
