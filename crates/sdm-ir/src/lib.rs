#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # sdm-ir
//!
//! Element tree structures and traversal APIs for Succession Data Model documents.
//!
//! This crate holds the immutable tree produced by the XML loader. Both the base
//! model and the country-specific overlay are represented with the same types, so
//! the normalizer and merger can treat them uniformly.

/// Document container, document kind and load metadata.
pub mod document;
/// Tree element model.
pub mod element;
/// Source positions for diagnostics.
pub mod metadata;
/// Cursor-based traversal helpers for navigating element trees.
pub mod traversal;

pub use document::{Document, DocumentKind, DocumentMetadata};
pub use element::{Attribute, Element};
pub use metadata::{Position, PositionTracker, SourceInfo};
pub use traversal::{Cursor, Traversal, walk};

use thiserror::Error;

/// Errors raised while interpreting element trees
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown document kind '{0}' (expected 'sdm' or 'csf_sdm')")]
    UnknownKind(String),
}

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, Error>;
