//! CSV writer

use crate::config::CsvConfig;
use crate::{Error, Result};
use std::io::Write;
use tracing::{debug, trace};

/// Writer for record files
#[derive(Debug, Clone, Default)]
pub struct CsvWriter {
    config: CsvConfig,
}

impl CsvWriter {
    /// Create a new CSV writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect
    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Write header rows followed by data rows
    pub fn write<W: Write>(
        &self,
        writer: W,
        header_rows: &[Vec<String>],
        records: &[Vec<String>],
    ) -> Result<()> {
        let mut csv_writer = self.config.writer_builder().from_writer(writer);

        for header in header_rows {
            csv_writer
                .write_record(header)
                .map_err(|e| Error::write(e.to_string()))?;
        }

        for record in records {
            csv_writer
                .write_record(record)
                .map_err(|e| Error::write(e.to_string()))?;
            trace!(?record, "Wrote CSV row");
        }

        csv_writer
            .flush()
            .map_err(|e| Error::write(e.to_string()))?;
        debug!(
            header_rows = header_rows.len(),
            record_count = records.len(),
            "Finished writing CSV"
        );
        Ok(())
    }

    /// Render header rows and data rows into a byte buffer
    pub fn to_bytes(&self, header_rows: &[Vec<String>], records: &[Vec<String>]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.write(&mut output, header_rows, records)?;
        Ok(output)
    }
}
