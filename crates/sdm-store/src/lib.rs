//! # sdm-store
//!
//! Append-only version stores for metadata documents.
//!
//! Every store hands out version numbers from its own claim history and publishes
//! with an atomic, create-only claim of the `(instance_id, version)` slot. Readers
//! only ever see fully published versions. Three backends share the
//! [`VersionStore`] contract: in-memory, filesystem and libsql.

pub mod connection;
pub mod fs;
pub mod generator;
#[cfg(feature = "memory")]
pub mod memory;
pub mod sql;
pub mod version;

pub use connection::ConnectionConfig;
pub use fs::FsVersionStore;
pub use generator::MetadataGenerator;
#[cfg(feature = "memory")]
pub use memory::MemoryVersionStore;
pub use sql::SqlVersionStore;
pub use version::{AnyStore, StoredVersion, VersionEntry, VersionSelector, VersionStore};

use thiserror::Error;

/// Errors that can occur when persisting or reading metadata versions.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Connection error: {details}")]
    Connection { details: String },

    #[error("Libsql error during {context}: {source}")]
    Libsql {
        context: String,
        #[source]
        source: libsql::Error,
    },

    #[error("SQL error executing `{statement}`: {source}")]
    Sql {
        statement: String,
        #[source]
        source: libsql::Error,
    },

    #[error("Failed to persist version {version} of '{instance_id}': {details}")]
    Persistence {
        instance_id: String,
        version: u32,
        details: String,
    },

    #[error("No metadata for '{instance_id}' matching '{selector}'")]
    MetadataNotFound {
        instance_id: String,
        selector: String,
    },

    #[error("Version {version} of '{instance_id}' was already claimed")]
    VersionConflict { instance_id: String, version: u32 },

    #[error("Invalid version selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid instance id '{instance_id}': {reason}")]
    InvalidInstance { instance_id: String, reason: String },

    #[error("Stored metadata is unreadable: {0}")]
    Document(#[from] sdm_schema::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a persistence error for a version slot.
    pub fn persistence(instance_id: impl Into<String>, version: u32, details: impl Into<String>) -> Self {
        Self::Persistence {
            instance_id: instance_id.into(),
            version,
            details: details.into(),
        }
    }

    /// Build a not-found error for a selector.
    pub fn not_found(instance_id: impl Into<String>, selector: &VersionSelector) -> Self {
        Self::MetadataNotFound {
            instance_id: instance_id.into(),
            selector: selector.to_string(),
        }
    }

    /// Build a conflict error for a lost slot race.
    pub fn conflict(instance_id: impl Into<String>, version: u32) -> Self {
        Self::VersionConflict {
            instance_id: instance_id.into(),
            version,
        }
    }

    /// Whether a retry against a freshly computed version may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject instance ids that cannot be used as a storage path segment
pub(crate) fn check_instance_id(instance_id: &str) -> Result<()> {
    let reason = if instance_id.trim().is_empty() {
        Some("must not be empty")
    } else if instance_id.contains(['/', '\\']) || instance_id.contains("..") {
        Some("must not contain path separators")
    } else if instance_id.starts_with('.') {
        Some("must not start with '.'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidInstance {
            instance_id: instance_id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
