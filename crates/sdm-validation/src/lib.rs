#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sdm-validation
//!
//! Structural validation of submitted records against published metadata.
//!
//! Findings are collected, never truncated: a report lists every header,
//! row-length, type, missing-value, max-length and duplicate-key error, ordered
//! file-level first and then by row. A report with zero errors is a normal,
//! successful outcome.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sdm_validation::{StructuralValidator, ValidationReporter};
//! # fn run(document: &sdm_schema::MetadataDocument, csv: &[u8]) -> sdm_validation::Result<()> {
//! let report = StructuralValidator::new()?.validate(document, csv)?;
//! if !report.is_valid() {
//!     let export = ValidationReporter::new().to_csv(&report)?;
//!     std::fs::write("report.csv", export)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod reporter;
pub mod rules;

pub use cache::ReportCache;
pub use engine::{StructuralValidator, ValidationConfig, ValidationRun};
pub use reporter::{
    ErrorType, REPORT_HEADER, ReportSummary, RowError, ValidationReport, ValidationReporter,
};
pub use rules::{RuleResult, TypePatterns, validate_data_type, validate_length, validate_required};

use thiserror::Error;

/// Errors that can occur during validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unreadable record: {0}")]
    Csv(#[from] sdm_csv::Error),

    #[error("Invalid type pattern: {0}")]
    Pattern(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Pattern(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
