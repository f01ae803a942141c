// ELMetrics Exporter - Configuration file
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON configuration file.
//!
//! ```json
//! {
//!   "server": { "address": "127.0.0.1", "port": 3000 },
//!   "discovery": { "timeout_secs": 5, "supported_only": false },
//!   "poll": { "concurrency": 4, "fetch_timeout_ms": 2000 }
//! }
//! ```
//!
//! Every section and field is optional.

use elmetrics::{ExporterConfig, PollerConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub discovery: DiscoveryConfig,
    pub poll: PollConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub timeout_secs: u64,
    pub supported_only: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: elmetrics::DEFAULT_DISCOVERY_SECS,
            supported_only: false,
        }
    }
}

/// Poll settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub concurrency: usize,
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            concurrency: PollerConfig::default().concurrency,
            fetch_timeout_ms: None,
        }
    }
}

/// Command line overrides. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub discovery_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub fetch_timeout_ms: Option<u64>,
}

impl FileConfig {
    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigFileError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse configuration JSON.
    pub fn parse(text: &str) -> Result<Self, ConfigFileError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of file values.
    pub fn merge(mut self, overrides: Overrides) -> Result<Self, ConfigFileError> {
        if let Some(address) = overrides.address {
            self.server.address = address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(secs) = overrides.discovery_secs {
            self.discovery.timeout_secs = secs;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.poll.concurrency = concurrency;
        }
        if let Some(ms) = overrides.fetch_timeout_ms {
            self.poll.fetch_timeout_ms = Some(ms);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigFileError> {
        if self.poll.concurrency == 0 {
            return Err(ConfigFileError::Invalid(
                "poll.concurrency must be at least 1".to_string(),
            ));
        }
        if self.poll.fetch_timeout_ms == Some(0) {
            return Err(ConfigFileError::Invalid(
                "poll.fetch_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Listen address as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    /// Core exporter settings.
    pub fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            discovery_window: Duration::from_secs(self.discovery.timeout_secs),
            supported_only: self.discovery.supported_only,
            poller: PollerConfig {
                concurrency: self.poll.concurrency,
                fetch_timeout: self.poll.fetch_timeout_ms.map(Duration::from_millis),
            },
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = FileConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:3000");
        assert_eq!(
            config.exporter_config().discovery_window,
            Duration::from_secs(5)
        );
        assert_eq!(config.exporter_config().poller.fetch_timeout, None);
    }

    #[test]
    fn test_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "server": {{ "port": 9464 }} }}"#).unwrap();
        file.flush().unwrap();

        let config = FileConfig::load(file.path()).expect("Failed to load config");
        assert_eq!(config.server.port, 9464);
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn test_overrides_win() {
        let config = FileConfig::parse(r#"{ "poll": { "concurrency": 2, "fetch_timeout_ms": 500 } }"#)
            .unwrap()
            .merge(Overrides {
                address: Some("0.0.0.0".to_string()),
                concurrency: Some(8),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:3000");
        let exporter = config.exporter_config();
        assert_eq!(exporter.poller.concurrency, 8);
        assert_eq!(exporter.poller.fetch_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            FileConfig::parse(r#"{ "poll": { "concurrency": 0 } }"#),
            Err(ConfigFileError::Invalid(_))
        ));
        assert!(matches!(
            FileConfig::parse("{ not json"),
            Err(ConfigFileError::Json(_))
        ));
        assert!(matches!(
            FileConfig::load("/nonexistent/elmetrics.json"),
            Err(ConfigFileError::FileNotFound(_))
        ));
    }
}
