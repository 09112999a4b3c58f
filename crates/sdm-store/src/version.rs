//! Version selectors, stored records and the store contract

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sdm_schema::MetadataDocument;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(feature = "memory")]
use crate::MemoryVersionStore;
use crate::{Error, FsVersionStore, Result, SqlVersionStore};

/// Which published version to read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionSelector {
    /// Highest published version at read time
    #[default]
    Latest,
    /// Version number (`3` or `v3`)
    Number(u32),
    /// Full version label (`20250314_v3`)
    Label(String),
}

impl VersionSelector {
    /// Version number this selector names, if any
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Latest => None,
            Self::Number(n) => Some(*n),
            Self::Label(label) => label
                .rsplit_once("_v")
                .and_then(|(_, n)| n.parse().ok()),
        }
    }

    /// Pick the matching version among published entries
    pub fn select(&self, entries: &[VersionEntry]) -> Option<u32> {
        match self {
            Self::Latest => entries.iter().map(|e| e.version).max(),
            Self::Number(n) => entries.iter().find(|e| e.version == *n).map(|e| e.version),
            Self::Label(label) => entries
                .iter()
                .find(|e| &e.version_label == label)
                .map(|e| e.version),
        }
    }
}

impl FromStr for VersionSelector {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSelector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };
        let value = raw.trim();

        if value.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }

        let number = |digits: &str| -> Result<u32> {
            match digits.parse::<u32>() {
                Ok(0) => Err(invalid("versions start at 1")),
                Ok(n) => Ok(n),
                Err(_) => Err(invalid("expected a version number")),
            }
        };

        if let Some((date, n)) = value.split_once("_v") {
            NaiveDate::parse_from_str(date, "%Y%m%d")
                .map_err(|_| invalid("label date must be YYYYMMDD"))?;
            number(n)?;
            return Ok(Self::Label(value.to_string()));
        }

        let digits = value
            .strip_prefix('v')
            .or_else(|| value.strip_prefix('V'))
            .unwrap_or(value);
        number(digits).map(Self::Number)
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "v{n}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Listing entry for one published version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u32,
    pub version_label: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Both persisted forms of one metadata version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub instance_id: String,
    pub version: u32,
    pub version_label: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    /// Structured JSON document
    pub document: String,
    /// Compact snapshot for fast reload
    pub snapshot: Vec<u8>,
}

impl StoredVersion {
    /// Render both forms from one versioned document
    ///
    /// # Errors
    ///
    /// Fails when the document has no version assigned or cannot be serialized.
    pub fn from_document(document: &MetadataDocument) -> Result<Self> {
        if document.version == 0 {
            return Err(Error::persistence(
                &document.instance_id,
                0,
                "document has no version assigned",
            ));
        }
        Ok(Self {
            instance_id: document.instance_id.clone(),
            version: document.version,
            version_label: document.version_label.clone(),
            content_hash: document.content_hash.clone(),
            created_at: document.provenance.created_at,
            document: document.to_json()?,
            snapshot: document.to_snapshot()?,
        })
    }

    pub fn entry(&self) -> VersionEntry {
        VersionEntry {
            version: self.version,
            version_label: self.version_label.clone(),
            content_hash: self.content_hash.clone(),
            created_at: self.created_at,
        }
    }

    /// Load the document, preferring the snapshot
    ///
    /// A snapshot whose hash disagrees is rejected and the structured document is
    /// used instead, provided its own content still hashes to the recorded value.
    ///
    /// # Errors
    ///
    /// Fails when neither form yields a document matching the recorded hash.
    pub fn load(&self) -> Result<MetadataDocument> {
        match MetadataDocument::from_snapshot(&self.snapshot, Some(&self.content_hash)) {
            Ok(document) => Ok(document),
            Err(err) => {
                warn!(
                    instance_id = %self.instance_id,
                    version = self.version,
                    error = %err,
                    "Rejected snapshot, reading structured document"
                );
                let document = MetadataDocument::from_json(&self.document)?;
                let actual = document.compute_hash()?;
                if actual != self.content_hash {
                    return Err(sdm_schema::Error::SnapshotMismatch {
                        expected: self.content_hash.clone(),
                        actual,
                    }
                    .into());
                }
                Ok(document)
            }
        }
    }
}

/// Append-only store of metadata versions
///
/// Version numbers come from the store's claim history. `put` claims the slot
/// atomically and fails with [`Error::VersionConflict`] when another writer holds
/// it; numbers are never reused, even after `delete`.
pub trait VersionStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Highest claimed version plus one
    fn next_version(&self, instance_id: &str) -> impl Future<Output = Result<u32>> + Send;

    /// Claim the version slot and publish both forms
    fn put(&self, version: &StoredVersion) -> impl Future<Output = Result<()>> + Send;

    /// Read a published version
    fn get(
        &self,
        instance_id: &str,
        selector: &VersionSelector,
    ) -> impl Future<Output = Result<StoredVersion>> + Send;

    /// Published versions, oldest first
    fn list_versions(&self, instance_id: &str) -> impl Future<Output = Result<Vec<VersionEntry>>> + Send;

    /// Remove a published version; its number stays claimed
    fn delete(&self, instance_id: &str, version: u32) -> impl Future<Output = Result<()>> + Send;
}

/// Backend chosen at runtime
#[derive(Debug, Clone)]
pub enum AnyStore {
    #[cfg(feature = "memory")]
    Memory(MemoryVersionStore),
    Filesystem(FsVersionStore),
    Sql(SqlVersionStore),
}

impl VersionStore for AnyStore {
    fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.backend(),
            Self::Filesystem(store) => store.backend(),
            Self::Sql(store) => store.backend(),
        }
    }

    async fn next_version(&self, instance_id: &str) -> Result<u32> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.next_version(instance_id).await,
            Self::Filesystem(store) => store.next_version(instance_id).await,
            Self::Sql(store) => store.next_version(instance_id).await,
        }
    }

    async fn put(&self, version: &StoredVersion) -> Result<()> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.put(version).await,
            Self::Filesystem(store) => store.put(version).await,
            Self::Sql(store) => store.put(version).await,
        }
    }

    async fn get(&self, instance_id: &str, selector: &VersionSelector) -> Result<StoredVersion> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.get(instance_id, selector).await,
            Self::Filesystem(store) => store.get(instance_id, selector).await,
            Self::Sql(store) => store.get(instance_id, selector).await,
        }
    }

    async fn list_versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.list_versions(instance_id).await,
            Self::Filesystem(store) => store.list_versions(instance_id).await,
            Self::Sql(store) => store.list_versions(instance_id).await,
        }
    }

    async fn delete(&self, instance_id: &str, version: u32) -> Result<()> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(store) => store.delete(instance_id, version).await,
            Self::Filesystem(store) => store.delete(instance_id, version).await,
            Self::Sql(store) => store.delete(instance_id, version).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u32, label: &str) -> VersionEntry {
        VersionEntry {
            version,
            version_label: label.to_string(),
            content_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("latest".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
        assert_eq!("LATEST".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
        assert_eq!("3".parse::<VersionSelector>().unwrap(), VersionSelector::Number(3));
        assert_eq!("v3".parse::<VersionSelector>().unwrap(), VersionSelector::Number(3));
        assert_eq!(
            "20250314_v3".parse::<VersionSelector>().unwrap(),
            VersionSelector::Label("20250314_v3".to_string())
        );
    }

    #[test]
    fn test_invalid_selectors() {
        for raw in ["0", "v", "three", "2025_v3", "20251399_v3", "20250314_vx"] {
            let err = raw.parse::<VersionSelector>().unwrap_err();
            assert!(matches!(err, Error::InvalidSelector { .. }), "{raw}");
        }
    }

    #[test]
    fn test_select() {
        let entries = vec![entry(1, "20250101_v1"), entry(3, "20250314_v3")];
        assert_eq!(VersionSelector::Latest.select(&entries), Some(3));
        assert_eq!(VersionSelector::Number(1).select(&entries), Some(1));
        assert_eq!(VersionSelector::Number(2).select(&entries), None);
        assert_eq!(
            VersionSelector::Label("20250314_v3".to_string()).select(&entries),
            Some(3)
        );
        assert_eq!(
            VersionSelector::Label("20250315_v3".to_string()).select(&entries),
            None
        );
        assert_eq!(VersionSelector::Latest.select(&[]), None);
    }

    #[test]
    fn test_selector_number() {
        assert_eq!(VersionSelector::Label("20250314_v12".to_string()).number(), Some(12));
        assert_eq!(VersionSelector::Latest.number(), None);
        assert_eq!(VersionSelector::Number(4).to_string(), "v4");
    }
}
