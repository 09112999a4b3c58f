#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sdm-schema
//!
//! Field model, base/overlay merge, categorization and metadata documents.
//!
//! Normalized base and overlay trees go in; ordered, categorized field sets come
//! out. A field set is then frozen into a [`MetadataDocument`], the versioned unit
//! that the store persists and that validation and layout splitting read back.

/// Key catalog: configured business keys per element.
pub mod catalog;
/// Field categorization and business-key resolution.
pub mod categorize;
/// Field extraction from normalized trees.
pub mod extract;
/// Label resolution across languages and country variants.
pub mod language;
/// Base/overlay merge.
pub mod merge;
/// Versioned metadata document and its snapshot form.
pub mod metadata;
/// Core field model.
pub mod model;

pub use catalog::KeyCatalog;
pub use categorize::Categorizer;
pub use extract::{FieldExtractor, declared_languages};
pub use language::{LabelScope, header_label, resolve_label, supports_language};
pub use merge::{CountryInfo, MergeOptions, Merger, extract_countries};
pub use metadata::{HeaderStyle, MetadataDocument, Provenance, Snapshot};
pub use model::{
    ALL_COUNTRIES, Category, CountryVariant, DataType, Field, FieldSet, Label, MergeMode, Warning,
    WarningKind,
};

use thiserror::Error;

/// Errors that can occur while deriving field sets and metadata
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown country '{code}': not present in the overlay (available: {})", available.join(", "))]
    UnknownCountry {
        code: String,
        available: Vec<String>,
    },

    #[error("No country codes requested")]
    EmptyCountrySelection,

    #[error("Expected a {expected} document, got {actual} ('{document}')")]
    WrongDocumentKind {
        expected: sdm_ir::DocumentKind,
        actual: sdm_ir::DocumentKind,
        document: String,
    },

    #[error("Key catalog error in '{source_name}': {message}")]
    Catalog {
        source_name: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot does not match its document: expected hash {expected}, found {actual}")]
    SnapshotMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an unknown-country error.
    pub fn unknown_country(code: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownCountry {
            code: code.into(),
            available,
        }
    }

    /// Build a key-catalog error with source context.
    pub fn catalog(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Catalog {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
