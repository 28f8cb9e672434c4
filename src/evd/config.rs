//! Client configuration from the environment
//!
//! | variable               | meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `EVD_CLIENT_LOG_PATH`  | append client logs to this file           |
//! | `EVD_SEC_KEY_PATH`     | secret key file, created on first use     |
//! | `EVD_PAYLOAD_KEY_PATH` | payload sealing key, created on first use |
//! | `EVD_SERVER_URL`       | base URL of `evd-server`                  |
//! | `EVD_TIMEOUT_MS`       | HTTP timeout                              |
//! | `EVD_LOG`              | `tracing` filter directives               |

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::error::{resource_err, validation_err, Result};

/// Default HTTP timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Settings of an [`super::EvdClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvdConfig {
    /// Log file; stderr when unset
    pub log_path: Option<PathBuf>,
    /// Where the secret key is kept; in memory only when unset
    pub secret_key_path: Option<PathBuf>,
    /// Where the payload sealing key is kept; in memory only when unset
    pub payload_key_path: Option<PathBuf>,
    /// Server base URL for the HTTP transport
    pub server_url: Option<String>,
    /// HTTP timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for EvdConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            secret_key_path: None,
            payload_key_path: None,
            server_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl EvdConfig {
    /// Reads the `EVD_*` variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EvdConfig::from_env`] over an arbitrary lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let timeout_ms = match non_empty("EVD_TIMEOUT_MS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| validation_err!("EVD_TIMEOUT_MS is not a number: {:?}", v))?,
            None => DEFAULT_TIMEOUT_MS,
        };
        Ok(Self {
            log_path: non_empty("EVD_CLIENT_LOG_PATH").map(PathBuf::from),
            secret_key_path: non_empty("EVD_SEC_KEY_PATH").map(PathBuf::from),
            payload_key_path: non_empty("EVD_PAYLOAD_KEY_PATH").map(PathBuf::from),
            server_url: non_empty("EVD_SERVER_URL"),
            timeout_ms,
        })
    }

    /// HTTP timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Installs the global client subscriber.
///
/// Filter directives come from `EVD_LOG`, defaulting to `info`. Fails if a
/// subscriber is already installed.
pub fn init_client_logging(config: &EvdConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env("EVD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = match &config.log_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| resource_err!("logging already initialized: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("EVD_SEC_KEY_PATH", "/tmp/evd/sk.bin"),
            ("EVD_SERVER_URL", "http://127.0.0.1:3000"),
            ("EVD_TIMEOUT_MS", "500"),
            ("EVD_CLIENT_LOG_PATH", ""),
        ]
        .into_iter()
        .collect();
        let config = EvdConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.secret_key_path, Some(PathBuf::from("/tmp/evd/sk.bin")));
        assert_eq!(config.server_url.as_deref(), Some("http://127.0.0.1:3000"));
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert!(config.log_path.is_none());
        assert!(config.payload_key_path.is_none());
    }

    #[test]
    fn test_bad_timeout() {
        let err = EvdConfig::from_lookup(|k| (k == "EVD_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(EvdConfig::from_lookup(|_| None).unwrap(), EvdConfig::default());
    }
}
