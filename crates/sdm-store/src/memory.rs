//! In-memory version store

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::version::{StoredVersion, VersionEntry, VersionSelector, VersionStore};
use crate::{Error, Result, check_instance_id};

#[derive(Debug, Default)]
struct MemoryState {
    /// Every version number ever claimed, per instance
    claims: DashMap<String, BTreeSet<u32>>,
    /// Published versions
    versions: DashMap<(String, u32), StoredVersion>,
}

/// Process-local store; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionStore {
    state: Arc<MemoryState>,
}

impl MemoryVersionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, instance_id: &str) -> Vec<VersionEntry> {
        let mut entries: Vec<VersionEntry> = self
            .state
            .versions
            .iter()
            .filter(|item| item.key().0 == instance_id)
            .map(|item| item.value().entry())
            .collect();
        entries.sort_by_key(|e| e.version);
        entries
    }
}

impl VersionStore for MemoryVersionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn next_version(&self, instance_id: &str) -> Result<u32> {
        check_instance_id(instance_id)?;
        let highest = self
            .state
            .claims
            .get(instance_id)
            .and_then(|claims| claims.iter().next_back().copied())
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn put(&self, version: &StoredVersion) -> Result<()> {
        check_instance_id(&version.instance_id)?;
        {
            // The entry guard holds the shard lock, making check-and-insert atomic.
            let mut claims = self
                .state
                .claims
                .entry(version.instance_id.clone())
                .or_default();
            if !claims.insert(version.version) {
                return Err(Error::conflict(&version.instance_id, version.version));
            }
        }

        self.state.versions.insert(
            (version.instance_id.clone(), version.version),
            version.clone(),
        );
        debug!(
            instance_id = %version.instance_id,
            version = version.version,
            "Published version in memory"
        );
        Ok(())
    }

    async fn get(&self, instance_id: &str, selector: &VersionSelector) -> Result<StoredVersion> {
        let number = selector
            .select(&self.entries(instance_id))
            .ok_or_else(|| Error::not_found(instance_id, selector))?;
        self.state
            .versions
            .get(&(instance_id.to_string(), number))
            .map(|item| item.value().clone())
            .ok_or_else(|| Error::not_found(instance_id, selector))
    }

    async fn list_versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        Ok(self.entries(instance_id))
    }

    async fn delete(&self, instance_id: &str, version: u32) -> Result<()> {
        self.state
            .versions
            .remove(&(instance_id.to_string(), version))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(instance_id, &VersionSelector::Number(version)))
    }
}
