//! # sdm-csv
//!
//! Golden Record rendering and per-country layout splitting.
//!
//! Both operations work from a published [`sdm_schema::MetadataDocument`]: the
//! generator writes the header rows (and optional typed sample rows) of a
//! record, and the splitter cuts a filled-in combined record into one file per
//! country and language, bundled as a zip archive.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sdm_csv::{GoldenMode, GoldenRecordGenerator, LayoutSplitter};
//! # fn run(document: &sdm_schema::MetadataDocument) -> sdm_csv::Result<()> {
//! let csv = GoldenRecordGenerator::new()
//!     .mode(GoldenMode::HeaderWithSamples)
//!     .sample_rows(3)
//!     .render_csv(document)?;
//!
//! let layouts = LayoutSplitter::new().split(&csv, document)?;
//! assert!(!layouts.files.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod golden;
pub mod reader;
pub mod split;
pub mod writer;

pub use config::{CsvConfig, RecordTerminator};
pub use errors::{CsvError, CsvResult};
pub use golden::{GoldenMode, GoldenRecord, GoldenRecordGenerator};
pub use reader::{CsvReader, CsvRecord};
pub use split::{LayoutFile, LayoutSplitter, SplitOutput};
pub use writer::CsvWriter;

pub use errors::CsvError as Error;
pub type Result<T> = CsvResult<T>;
