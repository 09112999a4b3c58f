//! CSV reader

use encoding_rs::{Encoding, WINDOWS_1252};
use tracing::debug;

use crate::config::CsvConfig;
use crate::{Error, Result};

/// One physical CSV record with its source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// Line the record starts on (1-indexed)
    pub line: usize,
    pub fields: Vec<String>,
    /// Set when the record was not UTF-8 and was decoded with this encoding
    pub fallback_encoding: Option<&'static str>,
}

impl CsvRecord {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether every cell is blank
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Reader for record files
#[derive(Debug, Clone, Default)]
pub struct CsvReader {
    config: CsvConfig,
}

impl CsvReader {
    /// Create a new CSV reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect
    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Read every record, header rows included
    ///
    /// Quoted fields may span lines; a record is never split. Records are
    /// decoded one at a time, so a record that is not UTF-8 falls back to
    /// windows-1252 without affecting its neighbours.
    pub fn records(&self, input: &[u8]) -> Result<Vec<CsvRecord>> {
        let input = input.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(input);
        let mut reader = self.config.reader_builder().from_reader(input);
        let mut records = Vec::new();
        let mut fallbacks = 0usize;

        for result in reader.byte_records() {
            let record = result.map_err(|e| {
                let line = e.position().map_or(0, |p| p.line() as usize);
                Error::read_at(line, e.to_string())
            })?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            let decoded = decode_record(&record);
            if decoded.fallback_encoding.is_some() {
                fallbacks += 1;
                debug!(line, "Record is not UTF-8; decoded as windows-1252");
            }
            records.push(CsvRecord { line, ..decoded });
        }

        debug!(record_count = records.len(), fallbacks, "Read CSV records");
        Ok(records)
    }
}

fn decode_record(record: &csv::ByteRecord) -> CsvRecord {
    let utf8: std::result::Result<Vec<String>, _> = record
        .iter()
        .map(|field| std::str::from_utf8(field).map(str::to_string))
        .collect();
    match utf8 {
        Ok(fields) => CsvRecord {
            line: 0,
            fields,
            fallback_encoding: None,
        },
        Err(_) => CsvRecord {
            line: 0,
            fields: record.iter().map(|field| decode_with(WINDOWS_1252, field)).collect(),
            fallback_encoding: Some(WINDOWS_1252.name()),
        },
    }
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}
