//! Configured business keys per element
//!
//! ```yaml
//! personInfo: [person-id-external]
//! jobInfo:
//!   keys: [start-date, seq-number]
//! ```
#![allow(clippy::must_use_candidate)]

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Catalog entry: a bare list, or a table with a `keys` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum CatalogEntry {
    Keys(Vec<String>),
    Table {
        #[serde(default)]
        keys: Vec<String>,
    },
}

impl CatalogEntry {
    fn into_keys(self) -> Vec<String> {
        match self {
            Self::Keys(keys) | Self::Table { keys } => keys,
        }
    }
}

/// Element id to key field names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyCatalog {
    entries: BTreeMap<String, Vec<String>>,
}

impl KeyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register key fields for an element
    #[must_use]
    pub fn with_keys<I, S>(mut self, element: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .entry(element.into())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Parse a YAML catalog
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] when the document is not a map of element ids.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let raw: BTreeMap<String, CatalogEntry> =
            serde_yaml::from_str(input).map_err(|e| Error::catalog("<yaml>", e.to_string()))?;
        Ok(Self::from_entries(raw))
    }

    /// Parse a JSON catalog
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] when the document is not a map of element ids.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let raw: BTreeMap<String, CatalogEntry> =
            serde_json::from_str(input).map_err(|e| Error::catalog("<json>", e.to_string()))?;
        Ok(Self::from_entries(raw))
    }

    /// Load a catalog file, choosing the format by extension
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, [`Error::Catalog`] when
    /// it does not parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        };
        let catalog = parsed.map_err(|e| match e {
            Error::Catalog { message, .. } => Error::catalog(path.display().to_string(), message),
            other => other,
        })?;

        debug!(path = %path.display(), elements = catalog.len(), "Loaded key catalog");
        Ok(catalog)
    }

    fn from_entries(raw: BTreeMap<String, CatalogEntry>) -> Self {
        Self {
            entries: raw
                .into_iter()
                .map(|(element, entry)| (element, entry.into_keys()))
                .collect(),
        }
    }

    /// Whether `field` is listed as a key of `element`
    pub fn is_key(&self, element: &str, field: &str) -> bool {
        self.entries
            .get(element)
            .is_some_and(|keys| keys.iter().any(|k| k == field))
    }

    pub fn keys_for(&self, element: &str) -> &[String] {
        self.entries.get(element).map_or(&[][..], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
