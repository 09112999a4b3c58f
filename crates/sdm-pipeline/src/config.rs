//! Engine configuration
//!
//! Loaded from YAML or JSON (chosen by file extension); every key is optional
//! and falls back to [`EngineConfig::default`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sdm_csv::GoldenMode;
use sdm_schema::{HeaderStyle, KeyCatalog, MergeMode};
use sdm_store::{AnyStore, ConnectionConfig, FsVersionStore, MemoryVersionStore, SqlVersionStore};

use crate::{Error, Result};

/// Where published metadata versions live
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local; lost on exit
    #[default]
    Memory,
    Filesystem {
        root: PathBuf,
    },
    /// libsql database: a file path, `:memory:` or a `libsql://` URL
    Sql {
        url: String,
    },
}

impl StoreConfig {
    /// Open the configured backend
    ///
    /// # Errors
    ///
    /// Returns a store error when the SQL database cannot be opened.
    pub async fn open(&self) -> Result<AnyStore> {
        let store = match self {
            Self::Memory => AnyStore::Memory(MemoryVersionStore::new()),
            Self::Filesystem { root } => AnyStore::Filesystem(FsVersionStore::new(root)),
            Self::Sql { url } => {
                AnyStore::Sql(SqlVersionStore::connect(ConnectionConfig::from_url(url.as_str())).await?)
            }
        };
        debug!(backend = store_name(self), "Opened version store");
        Ok(store)
    }
}

fn store_name(config: &StoreConfig) -> &'static str {
    match config {
        StoreConfig::Memory => "memory",
        StoreConfig::Filesystem { .. } => "filesystem",
        StoreConfig::Sql { .. } => "sql",
    }
}

impl FromStr for StoreConfig {
    type Err = Error;

    /// `memory`, `fs:<dir>`, `sql:<path-or-url>`, a `libsql://`/`http(s)://`
    /// URL, or a bare directory path
    fn from_str(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(Error::config("store value is empty"));
        }
        if spec.eq_ignore_ascii_case("memory") {
            return Ok(Self::Memory);
        }
        if let Some(root) = spec.strip_prefix("fs:") {
            return Ok(Self::Filesystem { root: root.into() });
        }
        if let Some(url) = spec.strip_prefix("sql:") {
            return Ok(Self::Sql {
                url: url.to_string(),
            });
        }
        if ["libsql://", "http://", "https://"]
            .iter()
            .any(|scheme| spec.starts_with(scheme))
        {
            return Ok(Self::Sql {
                url: spec.to_string(),
            });
        }
        Ok(Self::Filesystem { root: spec.into() })
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Fallback language for labels
    pub default_language: String,
    pub header_style: HeaderStyle,
    pub golden_mode: GoldenMode,
    pub sample_rows: usize,
    pub merge_mode: MergeMode,
    /// Publish attempts when a version slot is lost to a concurrent writer
    pub publish_attempts: u32,
    /// Seconds a validation report stays exportable
    pub report_ttl_secs: u64,
    /// Data rows per validation chunk
    pub chunk_size: usize,
    /// Field names or `{element}_{field}` ids left out of every merge
    pub excluded_fields: Vec<String>,
    /// YAML or JSON business-key catalog
    pub key_catalog: Option<PathBuf>,
    pub store: StoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_language: "en-us".to_string(),
            header_style: HeaderStyle::IdsAndLabels,
            golden_mode: GoldenMode::HeaderWithSamples,
            sample_rows: 3,
            merge_mode: MergeMode::Combined,
            publish_attempts: 5,
            report_ttl_secs: 3600,
            chunk_size: 5_000,
            excluded_fields: Vec::new(),
            key_catalog: None,
            store: StoreConfig::Memory,
        }
    }
}

impl EngineConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file is unreadable, does not parse or
    /// holds out-of-range values.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&raw)
                .map_err(|e| Error::config(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| Error::config(format!("{}: {e}", path.display())))?
        };
        config.validate()?;
        debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.publish_attempts == 0 {
            return Err(Error::config("publish_attempts must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be at least 1"));
        }
        if self.default_language.trim().is_empty() {
            return Err(Error::config("default_language must not be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Business-key catalog, empty when none is configured
    ///
    /// # Errors
    ///
    /// Returns the catalog error when the configured file cannot be loaded.
    pub fn load_catalog(&self) -> Result<KeyCatalog> {
        match &self.key_catalog {
            Some(path) => Ok(KeyCatalog::from_path(path)?),
            None => Ok(KeyCatalog::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.publish_attempts, 5);
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str(
            "sample_rows: 10\nstore:\n  backend: sql\n  url: target/sdm.db\n",
        )
        .unwrap();
        assert_eq!(config.sample_rows, 10);
        assert_eq!(config.chunk_size, 5_000);
        assert_eq!(
            config.store,
            StoreConfig::Sql {
                url: "target/sdm.db".to_string()
            }
        );
    }

    #[test]
    fn test_json_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"merge_mode": "per_country", "header_style": "labels"}}"#).unwrap();

        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.merge_mode, MergeMode::PerCountry);
        assert_eq!(config.header_style, HeaderStyle::Labels);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "sample_row: 3").unwrap();
        let err = EngineConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = EngineConfig {
            publish_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_spec() {
        assert_eq!("memory".parse::<StoreConfig>().unwrap(), StoreConfig::Memory);
        assert_eq!(
            "fs:/var/sdm".parse::<StoreConfig>().unwrap(),
            StoreConfig::Filesystem {
                root: "/var/sdm".into()
            }
        );
        assert_eq!(
            "sql::memory:".parse::<StoreConfig>().unwrap(),
            StoreConfig::Sql {
                url: ":memory:".to_string()
            }
        );
        assert!(matches!(
            "libsql://db.example.com".parse::<StoreConfig>().unwrap(),
            StoreConfig::Sql { .. }
        ));
        assert!(matches!(
            "target/store".parse::<StoreConfig>().unwrap(),
            StoreConfig::Filesystem { .. }
        ));
    }
}
