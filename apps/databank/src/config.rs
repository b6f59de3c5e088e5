//! # Configuration
//!
//! Optional `databank.toml`:
//!
//! ```toml
//! data_dir = "databank-data"
//! backend = "json"          # json | json-split | redb | memory
//! drop_strategy = "disable" # disable | delete
//! id_start = 1
//! auto_create = true
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use crate::AppError;
use clap::ValueEnum;
use databank_core::DropStrategy;
use databank_core::primitives::DEFAULT_START_ID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "databank.toml";

/// Data directory used when neither the file nor the flags name one.
pub const DEFAULT_DATA_DIR: &str = "databank-data";

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// One JSON array file per bank.
    #[default]
    Json,
    /// One JSON file per record.
    JsonSplit,
    /// redb embedded database.
    Redb,
    /// Process memory only.
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::JsonSplit => "json-split",
            Self::Redb => "redb",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    pub drop_strategy: DropStrategy,
    pub id_start: i64,
    /// Create missing storage on first read instead of failing.
    pub auto_create: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            backend: BackendKind::default(),
            drop_strategy: DropStrategy::default(),
            id_start: DEFAULT_START_ID,
            auto_create: true,
        }
    }
}

impl Config {
    /// Parse a config document.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::Config {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `databank.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    tracing::debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|e| AppError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml(&text, &path)?;
        tracing::debug!(path = %path.display(), backend = %config.backend, "config loaded");
        Ok(config)
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, backend: Option<BackendKind>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        if let Some(kind) = backend {
            self.backend = kind;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = Config::from_toml("", Path::new("test.toml")).expect("parse");
        assert_eq!(config, Config::default());
        assert!(config.auto_create);
    }

    #[test]
    fn keys_use_kebab_and_lowercase_names() {
        let text = r#"
            data_dir = "/tmp/bank"
            backend = "json-split"
            drop_strategy = "delete"
            id_start = 100
            auto_create = false
        "#;
        let config = Config::from_toml(text, Path::new("test.toml")).expect("parse");
        assert_eq!(config.backend, BackendKind::JsonSplit);
        assert_eq!(config.drop_strategy, DropStrategy::Delete);
        assert_eq!(config.id_start, 100);
        assert!(!config.auto_create);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::from_toml("colour = \"blue\"", Path::new("bad.toml"));
        assert!(matches!(result, Err(AppError::Config { path, .. }) if path == "bad.toml"));
    }

    #[test]
    fn overrides_win() {
        let config = Config::default().with_overrides(None, Some(BackendKind::Redb));
        assert_eq!(config.backend, BackendKind::Redb);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }
}
