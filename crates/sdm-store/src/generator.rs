//! Metadata publishing

use sdm_schema::MetadataDocument;
use tracing::{info, warn};

use crate::version::{StoredVersion, VersionEntry, VersionSelector, VersionStore};
use crate::Result;

/// Assigns version numbers and publishes metadata documents to a store
#[derive(Debug, Clone)]
pub struct MetadataGenerator<S> {
    store: S,
}

impl<S: VersionStore> MetadataGenerator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Publish one attempt: claim the next free version and write both forms
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::VersionConflict`] when another writer claimed the same
    /// number first; a retry will see the advanced counter.
    pub async fn publish(&self, mut document: MetadataDocument) -> Result<MetadataDocument> {
        let version = self.store.next_version(&document.instance_id).await?;
        document.assign_version(version);
        let stored = StoredVersion::from_document(&document)?;

        match self.store.put(&stored).await {
            Ok(()) => {
                info!(
                    instance_id = %document.instance_id,
                    version,
                    label = %document.version_label,
                    fields = document.fields.len(),
                    backend = self.store.backend(),
                    "Published metadata version"
                );
                Ok(document)
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(instance_id = %document.instance_id, version, "Lost version slot");
                }
                Err(err)
            }
        }
    }

    /// Load a published document
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MetadataNotFound`] when no version matches the selector.
    pub async fn load(&self, instance_id: &str, selector: &VersionSelector) -> Result<MetadataDocument> {
        let stored = self.store.get(instance_id, selector).await?;
        stored.load()
    }

    /// Published versions, oldest first
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        self.store.list_versions(instance_id).await
    }

    /// Remove a published version
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MetadataNotFound`] when the version is not published.
    pub async fn delete(&self, instance_id: &str, version: u32) -> Result<()> {
        self.store.delete(instance_id, version).await?;
        info!(instance_id, version, "Deleted metadata version");
        Ok(())
    }
}
