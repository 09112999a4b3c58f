//! Layout splitting
//!
//! A combined Golden Record is cut into one file per (country, language)
//! partition. Each file keeps the shared columns plus that country's columns in
//! their original order, with headers re-rendered for the partition.

use std::io::{Cursor, Write};

use serde::Serialize;
use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use sdm_schema::{ALL_COUNTRIES, Field, LabelScope, MetadataDocument};

use crate::config::CsvConfig;
use crate::reader::CsvReader;
use crate::writer::CsvWriter;
use crate::{Error, Result};

/// One file of the layout archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutFile {
    pub name: String,
    pub country: String,
    pub language: String,
    /// Field ids of the kept columns
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Zip archive bytes plus a listing of its files
#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub archive: Vec<u8>,
    pub files: Vec<LayoutFile>,
}

/// Splits combined records into per-country layouts
#[derive(Debug, Clone, Default)]
pub struct LayoutSplitter {
    config: CsvConfig,
}

impl LayoutSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Split `record` according to `document`
    ///
    /// Fails with [`Error::InconsistentMetadata`] when the record's header rows
    /// do not match the document's fields cell for cell.
    pub fn split(&self, record: &[u8], document: &MetadataDocument) -> Result<SplitOutput> {
        let records = CsvReader::new()
            .with_config(self.config.clone())
            .records(record)?;
        let header_rows = document.header_style.header_rows();
        check_header(&records, header_rows, document)?;
        let data: Vec<&[String]> = records
            .iter()
            .skip(header_rows)
            .filter(|r| !r.is_blank())
            .map(|r| r.fields.as_slice())
            .collect();

        let writer = CsvWriter::new().with_config(self.config.clone());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut files = Vec::new();

        for country in document.field_countries() {
            let kept: Vec<(usize, &Field)> = document
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.is_shared() || f.country == country)
                .collect();
            let fields: Vec<&Field> = kept.iter().map(|(_, f)| *f).collect();
            let scope = if country == ALL_COUNTRIES {
                LabelScope::Combined
            } else {
                LabelScope::Country(country.as_str())
            };
            let rows: Vec<Vec<String>> = data
                .iter()
                .map(|cells| {
                    kept.iter()
                        .map(|(idx, _)| cells.get(*idx).cloned().unwrap_or_default())
                        .collect()
                })
                .collect();

            for language in &document.languages {
                let name = format!("{}_{country}_{language}.csv", document.instance_id);
                let header = document.header_rows(&fields, language, scope);
                let bytes = writer.to_bytes(&header, &rows)?;

                zip.start_file(name.as_str(), SimpleFileOptions::default())?;
                zip.write_all(&bytes)?;
                debug!(file = %name, columns = fields.len(), rows = rows.len(), "Added layout file");

                files.push(LayoutFile {
                    name,
                    country: country.clone(),
                    language: language.clone(),
                    columns: fields.iter().map(|f| f.id.clone()).collect(),
                    rows: rows.len(),
                });
            }
        }

        let archive = zip.finish()?.into_inner();
        info!(
            instance_id = %document.instance_id,
            version = document.version,
            files = files.len(),
            archive_bytes = archive.len(),
            "Split golden record"
        );
        Ok(SplitOutput { archive, files })
    }
}

fn check_header(
    records: &[crate::reader::CsvRecord],
    header_rows: usize,
    document: &MetadataDocument,
) -> Result<()> {
    let expected = document.record_header();
    if records.len() < header_rows {
        return Err(Error::inconsistent(format!(
            "expected {header_rows} header row(s), found {}",
            records.len()
        )));
    }

    for (idx, (actual, expected)) in records.iter().zip(&expected).enumerate() {
        if actual.fields.len() != expected.len() {
            return Err(Error::inconsistent(format!(
                "header row {} has {} cells, metadata has {} fields",
                idx + 1,
                actual.fields.len(),
                expected.len()
            )));
        }
        if let Some((pos, (found, wanted))) = actual
            .fields
            .iter()
            .zip(expected)
            .enumerate()
            .find(|(_, (found, wanted))| found.trim() != wanted.as_str())
        {
            return Err(Error::inconsistent(format!(
                "header row {} column {}: found '{found}', metadata expects '{wanted}'",
                idx + 1,
                pos + 1
            )));
        }
    }
    Ok(())
}
