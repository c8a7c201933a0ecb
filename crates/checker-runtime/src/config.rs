//! Checker configuration
//!
//! Loaded from a TOML file, then overridden from `DG_*` environment
//! variables, then validated. Every field has a default, so an empty file
//! is a valid configuration.
//!
//! ```toml
//! beacon_url = "http://localhost:5052"
//! db_path = "data/doppelganger.db"
//! validators_dir = "validators"
//! vc_doppelganger_epochs_down = 2
//! checker_port = 8080
//! metrics_port = 9100
//! ```

use dg_detection::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("checker_port and metrics_port must differ (both {0})")]
    DuplicatePorts(u16),
}

/// Persisted state backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Rocksdb,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub beacon_url: String,
    pub db_path: PathBuf,
    pub storage_backend: StorageBackend,
    /// Directory holding one comma-separated pubkey file per group
    pub validators_dir: PathBuf,
    /// Cooldown, in epochs, before an opened window may be evaluated
    pub vc_doppelganger_epochs_down: u64,
    pub window_margin_epochs: u64,
    pub not_found_threshold: f64,
    pub listen_address: IpAddr,
    pub checker_port: u16,
    pub metrics_port: u16,
    pub request_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            beacon_url: "http://localhost:5052".to_string(),
            db_path: PathBuf::from("data/doppelganger.db"),
            storage_backend: StorageBackend::File,
            validators_dir: PathBuf::from("validators"),
            vc_doppelganger_epochs_down: 2,
            window_margin_epochs: 2,
            not_found_threshold: 0.3,
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            checker_port: 8080,
            metrics_port: 9100,
            request_timeout_secs: 10,
            sweep_interval_secs: 60,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl CheckerConfig {
    /// Read, override from the environment, and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `DG_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DG_BEACON_URL") {
            self.beacon_url = url;
        }
        if let Some(path) = lookup("DG_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("DG_VALIDATORS_DIR") {
            self.validators_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("DG_CHECKER_PORT") {
            self.checker_port = parse_env("DG_CHECKER_PORT", &port)?;
        }
        if let Some(port) = lookup("DG_METRICS_PORT") {
            self.metrics_port = parse_env("DG_METRICS_PORT", &port)?;
        }
        if let Some(level) = lookup("DG_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.beacon_url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("http") | Some("https")) {
            return Err(ConfigError::Invalid {
                key: "beacon_url",
                reason: format!("'{}' is not an http(s) URL", self.beacon_url),
            });
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "db_path",
                reason: "cannot be empty".into(),
            });
        }

        if self.checker_port == 0 || self.metrics_port == 0 {
            return Err(ConfigError::Invalid {
                key: "checker_port/metrics_port",
                reason: "port 0 is not allowed".into(),
            });
        }
        if self.checker_port == self.metrics_port {
            return Err(ConfigError::DuplicatePorts(self.checker_port));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_secs",
                reason: "cannot be 0".into(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "sweep_interval_secs",
                reason: "cannot be 0".into(),
            });
        }

        self.detection_config()
            .validate()
            .map_err(|e| ConfigError::Invalid {
                key: "detection",
                reason: e.to_string(),
            })
    }

    pub fn detection_config(&self) -> DetectionConfig {
        DetectionConfig {
            cooldown_epochs: self.vc_doppelganger_epochs_down,
            window_margin_epochs: self.window_margin_epochs,
            not_found_threshold: self.not_found_threshold,
            fetch_timeout: self.request_timeout(),
            ..DetectionConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn checker_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.checker_port)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.metrics_port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("'{value}' is not a valid number"),
    })
}
