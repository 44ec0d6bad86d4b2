//! Declarative configuration loading from TOML and environment variables.
//!
//! # Supported Sources
//!
//! - **TOML** (requires `config-file` feature): `TransactionManagerConfig::from_toml("xa.toml")`
//! - **Environment Variables** (always available): `TransactionManagerConfig::from_env()`
//!
//! # Example TOML
//!
//! ```toml
//! default-timeout-seconds = 30
//! event-buffer-capacity = 256
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, TransactionManagerConfig, TransactionManagerConfigBuilder};

/// Environment variable holding the default timeout in seconds.
pub const ENV_DEFAULT_TIMEOUT_SECONDS: &str = "XA_DEFAULT_TIMEOUT_SECONDS";
/// Environment variable holding the subscriber buffer capacity.
pub const ENV_EVENT_BUFFER_CAPACITY: &str = "XA_EVENT_BUFFER_CAPACITY";

/// File-based mirror of [`TransactionManagerConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Timeout for new root transactions in seconds.
    pub default_timeout_seconds: Option<u64>,
    /// Events buffered per subscriber.
    pub event_buffer_capacity: Option<usize>,
}

impl TryFrom<FileConfig> for TransactionManagerConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = TransactionManagerConfigBuilder::new();
        if let Some(secs) = file.default_timeout_seconds {
            builder = builder.default_timeout(Duration::from_secs(secs));
        }
        if let Some(capacity) = file.event_buffer_capacity {
            builder = builder.event_buffer_capacity(capacity);
        }
        builder.build()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::new(format!("invalid value for {name}: {value:?}"))),
        Err(_) => Ok(None),
    }
}

impl TransactionManagerConfig {
    /// Parses configuration from TOML text.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = toml_crate::from_str(content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `XA_DEFAULT_TIMEOUT_SECONDS` | timeout for new root transactions |
    /// | `XA_EVENT_BUFFER_CAPACITY` | events buffered per subscriber |
    ///
    /// Unset variables keep their defaults; unparsable values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        FileConfig {
            default_timeout_seconds: parse_env(ENV_DEFAULT_TIMEOUT_SECONDS)?,
            event_buffer_capacity: parse_env(ENV_EVENT_BUFFER_CAPACITY)?,
        }
        .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_conversion() {
        let config: TransactionManagerConfig = FileConfig {
            default_timeout_seconds: Some(15),
            event_buffer_capacity: None,
        }
        .try_into()
        .unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(15));
        assert_eq!(config.event_buffer_capacity(), 1024);
    }

    #[test]
    fn test_file_config_validation() {
        let result: Result<TransactionManagerConfig, _> = FileConfig {
            default_timeout_seconds: Some(0),
            event_buffer_capacity: None,
        }
        .try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_DEFAULT_TIMEOUT_SECONDS, "45");
        std::env::set_var(ENV_EVENT_BUFFER_CAPACITY, "64");
        let config = TransactionManagerConfig::from_env().unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(45));
        assert_eq!(config.event_buffer_capacity(), 64);

        std::env::set_var(ENV_EVENT_BUFFER_CAPACITY, "lots");
        assert!(TransactionManagerConfig::from_env().is_err());

        std::env::remove_var(ENV_DEFAULT_TIMEOUT_SECONDS);
        std::env::remove_var(ENV_EVENT_BUFFER_CAPACITY);
        assert_eq!(
            TransactionManagerConfig::from_env().unwrap(),
            TransactionManagerConfig::default()
        );
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_from_toml_str() {
        let config = TransactionManagerConfig::from_toml_str(
            "default-timeout-seconds = 30\nevent-buffer-capacity = 256\n",
        )
        .unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.event_buffer_capacity(), 256);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_from_toml_rejects_unknown_types() {
        let err = TransactionManagerConfig::from_toml_str("default-timeout-seconds = \"soon\"")
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse TOML config"));
    }
}
