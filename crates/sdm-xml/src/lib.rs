//! # sdm-xml
//!
//! XML loader and normalizer for Succession Data Model documents.
//!
//! The loader turns raw bytes into an immutable element tree and checks that the
//! document really is the kind the caller declared. The normalizer produces a
//! canonical copy of a tree: logical tag names, kebab-case attribute names,
//! `xx-yy` language codes and collapsed whitespace.

pub mod loader;
pub mod normalizer;

pub use loader::{XmlLoader, accept_upload, check_kind, detect_kind};
pub use normalizer::{Normalizer, local_name, normalize_attribute_name, normalize_language};

use sdm_ir::{DocumentKind, Position};
use thiserror::Error;

/// Root tag of a base Succession Data Model document
pub const BASE_ROOT: &str = "succession-data-model";
/// Root tag of a country-specific fields overlay
pub const OVERLAY_ROOT: &str = "country-specific-fields";
/// Grouping container that scopes overlay fields to one country
pub const COUNTRY_TAG: &str = "country";

/// Errors that can occur when loading XML documents
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed {kind} document '{document}' at {position}: {message}")]
    MalformedDocument {
        kind: DocumentKind,
        document: String,
        position: Position,
        message: String,
    },

    #[error("Unexpected document kind for '{document}': expected {expected}, {reason}")]
    UnexpectedDocumentKind {
        expected: DocumentKind,
        detected: Option<DocumentKind>,
        document: String,
        reason: String,
    },
}

impl Error {
    /// Build a malformed-document error with position context.
    pub fn malformed(
        kind: DocumentKind,
        document: impl Into<String>,
        position: Position,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedDocument {
            kind,
            document: document.into(),
            position,
            message: message.into(),
        }
    }

    /// Build an unexpected-kind error.
    pub fn unexpected_kind(
        expected: DocumentKind,
        detected: Option<DocumentKind>,
        document: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnexpectedDocumentKind {
            expected,
            detected,
            document: document.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
