//! Filesystem version store
//!
//! Layout under the root directory:
//!
//! ```text
//! {instance}/claims/000003          create-only claim marker
//! {instance}/versions/000003/       published version
//!     manifest.json  metadata.json  snapshot.bin
//! {instance}/.tmp-{uuid}/           staging, renamed into place on publish
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::version::{StoredVersion, VersionEntry, VersionSelector, VersionStore};
use crate::{Error, Result, check_instance_id};

const CLAIMS_DIR: &str = "claims";
const VERSIONS_DIR: &str = "versions";
const MANIFEST_FILE: &str = "manifest.json";
const DOCUMENT_FILE: &str = "metadata.json";
const SNAPSHOT_FILE: &str = "snapshot.bin";

/// Store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsVersionStore {
    root: PathBuf,
}

fn slot_name(version: u32) -> String {
    format!("{version:06}")
}

fn parse_slot(name: &str) -> Option<u32> {
    if name.len() >= 6 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Version numbers named by the entries of a directory; missing directory is empty
async fn slot_numbers(dir: &Path) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(numbers),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if let Some(number) = entry.file_name().to_str().and_then(parse_slot) {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

impl FsVersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instance_dir(&self, instance_id: &str) -> Result<PathBuf> {
        check_instance_id(instance_id)?;
        Ok(self.root.join(instance_id))
    }

    async fn claim(&self, instance_dir: &Path, version: &StoredVersion) -> Result<()> {
        let claims = instance_dir.join(CLAIMS_DIR);
        fs::create_dir_all(&claims).await?;

        let claim = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(claims.join(slot_name(version.version)))
            .await;
        match claim {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(Error::conflict(&version.instance_id, version.version))
            }
            Err(err) => Err(Error::persistence(
                &version.instance_id,
                version.version,
                format!("cannot write claim: {err}"),
            )),
        }
    }

    async fn stage(&self, staging: &Path, version: &StoredVersion) -> std::io::Result<()> {
        fs::create_dir_all(staging).await?;
        let manifest = serde_json::to_vec_pretty(&version.entry()).map_err(std::io::Error::other)?;
        fs::write(staging.join(MANIFEST_FILE), manifest).await?;
        fs::write(staging.join(DOCUMENT_FILE), version.document.as_bytes()).await?;
        fs::write(staging.join(SNAPSHOT_FILE), &version.snapshot).await?;
        Ok(())
    }

    async fn read_entry(&self, dir: &Path) -> Result<VersionEntry> {
        let manifest = fs::read(dir.join(MANIFEST_FILE)).await?;
        serde_json::from_slice(&manifest).map_err(|e| {
            Error::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("{}: {e}", dir.display()),
            ))
        })
    }
}

impl VersionStore for FsVersionStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    async fn next_version(&self, instance_id: &str) -> Result<u32> {
        let dir = self.instance_dir(instance_id)?;
        let claimed = slot_numbers(&dir.join(CLAIMS_DIR)).await?;
        Ok(claimed.last().copied().unwrap_or(0) + 1)
    }

    async fn put(&self, version: &StoredVersion) -> Result<()> {
        let instance_dir = self.instance_dir(&version.instance_id)?;
        self.claim(&instance_dir, version).await?;

        let staging = instance_dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        let published = instance_dir.join(VERSIONS_DIR).join(slot_name(version.version));

        let outcome = async {
            self.stage(&staging, version).await?;
            fs::create_dir_all(instance_dir.join(VERSIONS_DIR)).await?;
            fs::rename(&staging, &published).await
        }
        .await;

        if let Err(err) = outcome {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
                }
            }
            return Err(Error::persistence(
                &version.instance_id,
                version.version,
                err.to_string(),
            ));
        }

        debug!(
            instance_id = %version.instance_id,
            version = version.version,
            path = %published.display(),
            "Published version on disk"
        );
        Ok(())
    }

    async fn get(&self, instance_id: &str, selector: &VersionSelector) -> Result<StoredVersion> {
        let entries = self.list_versions(instance_id).await?;
        let number = selector
            .select(&entries)
            .ok_or_else(|| Error::not_found(instance_id, selector))?;

        let dir = self
            .instance_dir(instance_id)?
            .join(VERSIONS_DIR)
            .join(slot_name(number));
        let entry = self.read_entry(&dir).await?;
        let document = fs::read_to_string(dir.join(DOCUMENT_FILE)).await?;
        let snapshot = fs::read(dir.join(SNAPSHOT_FILE)).await?;

        Ok(StoredVersion {
            instance_id: instance_id.to_string(),
            version: entry.version,
            version_label: entry.version_label,
            content_hash: entry.content_hash,
            created_at: entry.created_at,
            document,
            snapshot,
        })
    }

    async fn list_versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        let versions = self.instance_dir(instance_id)?.join(VERSIONS_DIR);
        let mut entries = Vec::new();
        for number in slot_numbers(&versions).await? {
            entries.push(self.read_entry(&versions.join(slot_name(number))).await?);
        }
        Ok(entries)
    }

    async fn delete(&self, instance_id: &str, version: u32) -> Result<()> {
        let dir = self
            .instance_dir(instance_id)?
            .join(VERSIONS_DIR)
            .join(slot_name(version));
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::not_found(
                instance_id,
                &VersionSelector::Number(version),
            )),
            Err(err) => Err(err.into()),
        }
    }
}
