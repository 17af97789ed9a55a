//! Store configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! database = "~/.local/share/vtfs/vtfs.db"
//! busy_timeout_ms = 5000
//! overlap_policy = "discard"   # or "splice"
//! max_read_len = 16777216
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default clamp for a single read, in bytes.
pub const DEFAULT_MAX_READ_LEN: u64 = 16 * 1024 * 1024;

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What a write does with the parts of existing chunks it only partially
/// covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Remove every intersecting chunk in full. Bytes of those chunks
    /// outside the write range are lost and read back as zero.
    #[default]
    Discard,
    /// Keep the head and tail of intersecting chunks as separate chunks.
    Splice,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. `~` is expanded.
    pub database: PathBuf,

    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,

    /// Overlap handling for writes.
    pub overlap_policy: OverlapPolicy,

    /// Reads longer than this are shortened.
    pub max_read_len: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            overlap_policy: OverlapPolicy::default(),
            max_read_len: DEFAULT_MAX_READ_LEN,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Set the database path.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = path.into();
        self
    }

    /// Set the overlap policy.
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Set the read clamp.
    pub fn with_max_read_len(mut self, len: u64) -> Self {
        self.max_read_len = len;
        self
    }

    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        let raw = self.database.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&raw).as_ref())
    }
}

/// Get the default database path.
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vtfs")
        .join("vtfs.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.overlap_policy, OverlapPolicy::Discard);
        assert_eq!(config.max_read_len, DEFAULT_MAX_READ_LEN);
    }

    #[test]
    fn test_parse_full_config() {
        let config = StoreConfig::from_toml_str(
            r#"
            database = "/var/lib/vtfs/store.db"
            busy_timeout_ms = 250
            overlap_policy = "splice"
            max_read_len = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/vtfs/store.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.overlap_policy, OverlapPolicy::Splice);
        assert_eq!(config.max_read_len, 4096);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = StoreConfig::from_toml_str(r#"overlap_policy = "merge""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_tilde_expansion() {
        let config = StoreConfig::default().with_database("~/vtfs.db");
        assert!(!config.database_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoreConfig::load("/nonexistent/vtfs.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = StoreConfig::default().with_overlap_policy(OverlapPolicy::Splice);
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }
}
