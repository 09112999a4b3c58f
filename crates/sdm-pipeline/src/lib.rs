#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sdm-pipeline
//!
//! Engine orchestration: process, validate, export and split.
//!
//! [`Engine`] wires the loader, merger, categorizer, metadata publisher,
//! Golden Record generator, layout splitter and structural validator into the
//! request-level operations callers use. Every component error is folded into
//! one [`Error`] whose [`ErrorKind`] names the failure class.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sdm_pipeline::{Engine, EngineConfig, ProcessRequest, VersionSelector};
//! # async fn run(base: Vec<u8>, overlay: Vec<u8>) -> sdm_pipeline::Result<()> {
//! let engine = Engine::from_config(EngineConfig::default()).await?;
//! let outcome = engine
//!     .process(
//!         ProcessRequest::new("acme-001", base)
//!             .with_overlay(overlay)
//!             .with_countries(["MEX", "USA"]),
//!     )
//!     .await?;
//! let record = &outcome.records[0];
//! let report = engine
//!     .validate("acme-001", &VersionSelector::Latest, &record.csv)
//!     .await?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod engine;
pub mod policies;

pub use config::{EngineConfig, StoreConfig};
pub use engine::{Engine, ProcessOutcome, ProcessRequest, ProcessedRecord};
pub use policies::PublishPolicy;
pub use sdm_store::VersionSelector;

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Failure class of an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDocument,
    UnexpectedDocumentKind,
    UnknownCountry,
    EmptyCountrySelection,
    PersistenceError,
    UnsupportedLanguage,
    InconsistentMetadata,
    MetadataNotFound,
    VersionConflict,
    ReportNotFound,
    Config,
    InvalidRequest,
    MalformedRecord,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedDocument => "MalformedDocument",
            Self::UnexpectedDocumentKind => "UnexpectedDocumentKind",
            Self::UnknownCountry => "UnknownCountry",
            Self::EmptyCountrySelection => "EmptyCountrySelection",
            Self::PersistenceError => "PersistenceError",
            Self::UnsupportedLanguage => "UnsupportedLanguage",
            Self::InconsistentMetadata => "InconsistentMetadata",
            Self::MetadataNotFound => "MetadataNotFound",
            Self::VersionConflict => "VersionConflict",
            Self::ReportNotFound => "ReportNotFound",
            Self::Config => "Config",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedRecord => "MalformedRecord",
            Self::Io => "Io",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in engine operations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Xml(#[from] sdm_xml::Error),

    #[error(transparent)]
    Schema(#[from] sdm_schema::Error),

    #[error(transparent)]
    Store(#[from] sdm_store::Error),

    #[error(transparent)]
    Csv(#[from] sdm_csv::Error),

    #[error(transparent)]
    Validation(#[from] sdm_validation::Error),

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("No cached validation report '{validation_id}'")]
    ReportNotFound { validation_id: Uuid },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a configuration error.
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }

    /// Failure class, independent of the component that raised it
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Xml(err) => match err {
                sdm_xml::Error::MalformedDocument { .. } => ErrorKind::MalformedDocument,
                sdm_xml::Error::UnexpectedDocumentKind { .. } => ErrorKind::UnexpectedDocumentKind,
            },
            Self::Schema(err) => match err {
                sdm_schema::Error::UnknownCountry { .. } => ErrorKind::UnknownCountry,
                sdm_schema::Error::EmptyCountrySelection => ErrorKind::EmptyCountrySelection,
                sdm_schema::Error::WrongDocumentKind { .. } => ErrorKind::UnexpectedDocumentKind,
                sdm_schema::Error::Catalog { .. } => ErrorKind::Config,
                sdm_schema::Error::Serialization(_) | sdm_schema::Error::SnapshotMismatch { .. } => {
                    ErrorKind::PersistenceError
                }
                sdm_schema::Error::Io(_) => ErrorKind::Io,
            },
            Self::Store(err) => match err {
                sdm_store::Error::MetadataNotFound { .. } => ErrorKind::MetadataNotFound,
                sdm_store::Error::VersionConflict { .. } => ErrorKind::VersionConflict,
                sdm_store::Error::Config { .. } => ErrorKind::Config,
                sdm_store::Error::InvalidSelector { .. } | sdm_store::Error::InvalidInstance { .. } => {
                    ErrorKind::InvalidRequest
                }
                sdm_store::Error::Connection { .. }
                | sdm_store::Error::Libsql { .. }
                | sdm_store::Error::Sql { .. }
                | sdm_store::Error::Persistence { .. }
                | sdm_store::Error::Document(_)
                | sdm_store::Error::Io(_) => ErrorKind::PersistenceError,
            },
            Self::Csv(err) => csv_kind(err),
            Self::Validation(err) => match err {
                sdm_validation::Error::Csv(err) => csv_kind(err),
                sdm_validation::Error::Io(_) => ErrorKind::Io,
                sdm_validation::Error::Pattern(_) | sdm_validation::Error::Serialization(_) => {
                    ErrorKind::Internal
                }
            },
            Self::Config { .. } => ErrorKind::Config,
            Self::ReportNotFound { .. } => ErrorKind::ReportNotFound,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

fn csv_kind(err: &sdm_csv::Error) -> ErrorKind {
    match err {
        sdm_csv::Error::Read { .. } => ErrorKind::MalformedRecord,
        sdm_csv::Error::UnsupportedLanguage { .. } => ErrorKind::UnsupportedLanguage,
        sdm_csv::Error::InconsistentMetadata { .. } => ErrorKind::InconsistentMetadata,
        sdm_csv::Error::Io(_) => ErrorKind::Io,
        sdm_csv::Error::Write(_) | sdm_csv::Error::Archive(_) => ErrorKind::Internal,
    }
}

pub type Result<T> = std::result::Result<T, Error>;
