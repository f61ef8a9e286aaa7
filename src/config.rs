//! Node configuration via TOML
//!
//! One file configures both halves of a node: the `[store]` table feeds the
//! command executor and the `[coordinator]` table feeds the transaction
//! coordinator. Every field has a default, so an empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::{StrataError, StrataResult};
use strata_executor::StoreConfig;
use strata_kv::CoordinatorConfig;

/// Node configuration
///
/// # Example
///
/// ```toml
/// [store]
/// max_offset_ms = 250
/// txn_expiration_ms = 10000
///
/// [store.retry]
/// backoff_ms = 50
/// max_attempts = 10
///
/// [coordinator]
/// heartbeat_interval_ms = 5000
/// client_timeout_ms = 10000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command executor settings
    pub store: StoreConfig,
    /// Transaction coordinator settings
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the text is not valid TOML for this schema.
    pub fn from_toml_str(content: &str) -> StrataResult<Self> {
        toml::from_str(content)
            .map_err(|e| StrataError::invalid_argument(format!("failed to parse config: {}", e)))
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the file cannot be read and `InvalidArgument`
    /// if it cannot be parsed.
    pub fn load(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::internal(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StrataError::InvalidArgument { reason } => {
                StrataError::invalid_argument(format!("{} ({})", reason, path.display()))
            }
            other => other,
        })
    }

    /// Serialize this configuration and write it to `path`
    pub fn write_to_file(&self, path: &Path) -> StrataResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrataError::internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StrataError::internal(format!("failed to write config file '{}': {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_text_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_tables() {
        let config = Config::from_toml_str(
            r#"
            [store]
            max_offset_ms = 10

            [store.retry]
            max_attempts = 0

            [coordinator]
            heartbeat_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.store.max_offset_ms, 10);
        assert_eq!(config.store.txn_expiration_ms, StoreConfig::default().txn_expiration_ms);
        assert_eq!(config.store.retry.max_attempts, 0);
        assert_eq!(config.coordinator.heartbeat_interval_ms, 100);
        assert_eq!(config.coordinator.gc_interval().as_millis(), 100);
        assert_eq!(config.coordinator.client_timeout_ms, CoordinatorConfig::default().client_timeout_ms);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let err = Config::from_toml_str("[store]\nmax_offset_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument { .. }));
    }

    #[test]
    fn test_load_and_write_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.toml");

        let mut config = Config::default();
        config.coordinator.client_timeout_ms = 42;
        config.store.proposal_timeout_ms = 7;
        config.write_to_file(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, StrataError::Internal { .. }));
    }
}
