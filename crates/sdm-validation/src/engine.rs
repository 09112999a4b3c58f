//! Structural validation engine
//!
//! A submitted record is checked against one metadata version in three passes
//! that share a [`ValidationRun`]: the header is aligned once, data rows are
//! checked in chunks, and business-key duplicates are resolved when the run
//! finishes.

use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use sdm_csv::{CsvConfig, CsvReader, CsvRecord};
use sdm_schema::{Field, MetadataDocument, Warning, WarningKind};

use crate::reporter::{ErrorType, ReportSummary, RowError, ValidationReport};
use crate::rules::{TypePatterns, validate_data_type, validate_length, validate_required};
use crate::Result;

/// Validation configuration
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Data rows per chunk
    pub chunk_size: usize,
    /// CSV dialect of submitted records
    pub csv: CsvConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5_000,
            csv: CsvConfig::default(),
        }
    }
}

/// Validates records against a metadata document
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    config: ValidationConfig,
    patterns: TypePatterns,
}

impl StructuralValidator {
    /// Create a validator with default settings
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Pattern`] if the type patterns fail to compile.
    pub fn new() -> Result<Self> {
        Self::with_config(ValidationConfig::default())
    }

    /// Create with specific configuration
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Pattern`] if the type patterns fail to compile.
    pub fn with_config(config: ValidationConfig) -> Result<Self> {
        Ok(Self {
            config,
            patterns: TypePatterns::new()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a whole record file, chunk by chunk
    ///
    /// # Errors
    ///
    /// Fails only when the bytes are not readable CSV; every finding about the
    /// content is collected into the report instead.
    pub fn validate(&self, document: &MetadataDocument, input: &[u8]) -> Result<ValidationReport> {
        let records = CsvReader::new()
            .with_config(self.config.csv.clone())
            .records(input)?;
        let mut run = self.begin(document, &records);

        let total = run.data_rows();
        let chunk = self.config.chunk_size.max(1);
        let mut start = 0;
        while start < total {
            let end = (start + chunk).min(total);
            run.validate_range(start..end);
            start = end;
        }
        Ok(run.finish())
    }

    /// Start a run over already-read records: aligns the header
    #[must_use]
    pub fn begin<'a>(&'a self, document: &'a MetadataDocument, records: &'a [CsvRecord]) -> ValidationRun<'a> {
        ValidationRun::new(self, document, records)
    }
}

/// How one metadata field maps onto the submitted columns
#[derive(Debug, Clone, Copy)]
struct Binding {
    field: usize,
    position: usize,
}

/// Result of comparing the submitted header with the metadata
#[derive(Debug, Default)]
struct HeaderAlignment {
    bindings: Vec<Binding>,
    width: usize,
    mismatch: Option<String>,
}

/// State of an in-progress validation
#[derive(Debug)]
pub struct ValidationRun<'a> {
    validator: &'a StructuralValidator,
    document: &'a MetadataDocument,
    records: &'a [CsvRecord],
    header_rows: usize,
    alignment: HeaderAlignment,
    /// Positions of the business-key columns, when all of them are bound
    key_positions: Option<Vec<(usize, usize)>>,
    /// Key tuple to rows, in first-seen order
    keys: HashMap<Vec<String>, usize>,
    key_groups: Vec<(Vec<String>, Vec<usize>)>,
    errors: Vec<RowError>,
    warnings: Vec<Warning>,
    rows_checked: usize,
    started: Instant,
}

impl<'a> ValidationRun<'a> {
    fn new(validator: &'a StructuralValidator, document: &'a MetadataDocument, records: &'a [CsvRecord]) -> Self {
        let started = Instant::now();
        let header_rows = document.header_style.header_rows().min(records.len());
        let alignment = align_header(document, &records[..header_rows]);

        let mut errors = Vec::new();
        if let Some(message) = &alignment.mismatch {
            errors.push(RowError::file_level(ErrorType::StructureMismatch, message.clone()));
        }

        let mut warnings = Vec::new();
        let key_positions = if document.keyless || document.business_keys.is_empty() {
            warnings.push(Warning::new(
                WarningKind::NoBusinessKey,
                format!(
                    "Metadata {} v{} has no business key; duplicate rows are not checked",
                    document.instance_id, document.version
                ),
            ));
            None
        } else {
            let positions = key_positions(document, &alignment);
            if positions.is_none() {
                warnings.push(Warning::new(
                    WarningKind::UnboundBusinessKey,
                    format!(
                        "Business key ({}) is not fully present in the submitted header; duplicate rows are not checked",
                        document.business_keys.join(", ")
                    ),
                ));
            }
            positions
        };

        debug!(
            instance_id = %document.instance_id,
            version = document.version,
            records = records.len(),
            bound_columns = alignment.bindings.len(),
            header_ok = alignment.mismatch.is_none(),
            "Aligned submitted header"
        );

        Self {
            validator,
            document,
            records,
            header_rows,
            alignment,
            key_positions,
            keys: HashMap::new(),
            key_groups: Vec::new(),
            errors,
            warnings,
            rows_checked: 0,
            started,
        }
    }

    /// Number of data records after the header rows
    #[must_use]
    pub fn data_rows(&self) -> usize {
        self.records.len() - self.header_rows
    }

    /// Check the data rows in `range` (0-based, relative to the first data row)
    ///
    /// Ranges may be given in any order but each row should be checked once.
    pub fn validate_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.data_rows());
        let start = range.start.min(end);
        let records = self.records;
        for idx in start..end {
            let record_idx = self.header_rows + idx;
            let record = &records[record_idx];
            if record.is_blank() {
                continue;
            }
            if let Some(encoding) = record.fallback_encoding {
                self.warnings.push(Warning::new(
                    WarningKind::EncodingFallback,
                    format!("Row {} is not valid UTF-8 and was read as {encoding}", record_idx + 1),
                ));
            }
            self.check_row(record_idx + 1, record);
            self.rows_checked += 1;
        }
    }

    fn check_row(&mut self, row: usize, record: &CsvRecord) {
        if record.len() != self.alignment.width {
            self.errors.push(RowError::at_row(
                row,
                ErrorType::StructureMismatch,
                format!(
                    "Row has {} cells, header has {}",
                    record.len(),
                    self.alignment.width
                ),
            ));
        }

        let patterns = &self.validator.patterns;
        for binding in &self.alignment.bindings {
            let Some(raw) = record.fields.get(binding.position) else {
                continue;
            };
            let field = &self.document.fields[binding.field];
            let value = raw.trim();

            let checks = [
                (ErrorType::MissingValue, validate_required(value, field)),
                (ErrorType::TypeMismatch, validate_data_type(value, field, patterns)),
                (ErrorType::MaxLengthExceeded, validate_length(value, field)),
            ];
            for (error_type, result) in checks {
                if let Some(message) = result.message {
                    self.errors
                        .push(RowError::at_row(row, error_type, message).with_field(&field.id));
                }
            }
        }

        if let Some(positions) = &self.key_positions {
            let key: Vec<String> = positions
                .iter()
                .map(|(_, pos)| record.fields.get(*pos).map_or("", |v| v.trim()).to_string())
                .collect();
            // Empty key parts are reported as missing values
            if key.iter().any(String::is_empty) {
                return;
            }
            match self.keys.get(&key) {
                Some(&group) => self.key_groups[group].1.push(row),
                None => {
                    self.keys.insert(key.clone(), self.key_groups.len());
                    self.key_groups.push((key, vec![row]));
                }
            }
        }
    }

    /// Resolve duplicates and produce the report
    #[must_use]
    pub fn finish(mut self) -> ValidationReport {
        let key_fields: Vec<&Field> = self
            .key_positions
            .iter()
            .flatten()
            .map(|(field, _)| &self.document.fields[*field])
            .collect();
        for (key, rows) in &mut self.key_groups {
            if rows.len() < 2 {
                continue;
            }
            rows.sort_unstable();
            let described: Vec<String> = key_fields
                .iter()
                .zip(key.iter())
                .map(|(f, v)| format!("{}={v}", f.id))
                .collect();
            let rows_list: Vec<String> = rows.iter().map(ToString::to_string).collect();
            self.errors.push(
                RowError::at_row(
                    rows[0],
                    ErrorType::DuplicateKey,
                    format!(
                        "Duplicate business key ({}) in rows {}",
                        described.join(", "),
                        rows_list.join(", ")
                    ),
                )
                .with_field(key_fields.iter().map(|f| f.id.as_str()).collect::<Vec<_>>().join("+"))
                .with_related_rows(rows.clone()),
            );
        }

        // Stable: row errors keep their column order within a row
        self.errors.sort_by_key(|e| e.row.map_or((0, 0), |r| (1, r)));

        let mut error_counts = std::collections::BTreeMap::new();
        for error in &self.errors {
            *error_counts.entry(error.error_type).or_insert(0) += 1;
        }
        let summary = ReportSummary {
            rows: self.rows_checked,
            error_count: self.errors.len(),
            error_counts,
            warning_count: self.warnings.len(),
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            is_valid: self.errors.is_empty(),
        };

        info!(
            instance_id = %self.document.instance_id,
            version = self.document.version,
            rows = summary.rows,
            errors = summary.error_count,
            elapsed_ms = summary.elapsed_ms,
            "Validated record"
        );

        ValidationReport {
            validation_id: Uuid::new_v4(),
            instance_id: self.document.instance_id.clone(),
            version: self.document.version,
            version_label: self.document.version_label.clone(),
            created_at: Utc::now(),
            errors: self.errors,
            warnings: self.warnings,
            summary,
        }
    }
}

fn key_positions(document: &MetadataDocument, alignment: &HeaderAlignment) -> Option<Vec<(usize, usize)>> {
    document
        .business_keys
        .iter()
        .map(|id| {
            let field = document.fields.iter().position(|f| &f.id == id)?;
            alignment
                .bindings
                .iter()
                .find(|b| b.field == field)
                .map(|b| (field, b.position))
        })
        .collect()
}

/// Map header cells to fields: by name where a cell names a field (id or
/// label, in any header row), by position otherwise
fn align_header(document: &MetadataDocument, header: &[CsvRecord]) -> HeaderAlignment {
    let expected = document.record_header();
    let field_count = document.fields.len();

    if header.is_empty() {
        return HeaderAlignment {
            bindings: Vec::new(),
            width: field_count,
            mismatch: Some("Header row is missing".to_string()),
        };
    }

    let exact = header.len() == expected.len()
        && header
            .iter()
            .zip(&expected)
            .all(|(actual, wanted)| cells_equal(&actual.fields, wanted));
    let width = header[0].len();
    if exact {
        return HeaderAlignment {
            bindings: (0..field_count)
                .map(|i| Binding { field: i, position: i })
                .collect(),
            width,
            mismatch: None,
        };
    }

    // Names a field may go by
    let mut names: HashMap<&str, usize> = HashMap::new();
    for (idx, field) in document.fields.iter().enumerate() {
        names.entry(field.id.as_str()).or_insert(idx);
    }
    for row in &expected {
        for (idx, name) in row.iter().enumerate() {
            names.entry(name.as_str()).or_insert(idx);
        }
    }

    let columns = header.iter().map(CsvRecord::len).max().unwrap_or(0);
    let mut resolved: Vec<Option<usize>> = vec![None; columns];
    let mut claimed = vec![false; field_count];
    for (position, slot) in resolved.iter_mut().enumerate() {
        let found = header
            .iter()
            .filter_map(|row| row.fields.get(position))
            .find_map(|cell| names.get(cell.trim()).copied());
        if let Some(field) = found.filter(|f| !claimed[*f]) {
            claimed[field] = true;
            *slot = Some(field);
        }
    }

    let mut bindings: Vec<Binding> = Vec::new();
    for field in 0..field_count {
        let position = resolved.iter().position(|r| *r == Some(field)).or_else(|| {
            // Unnamed column at the field's own position
            (field < columns && resolved[field].is_none()).then_some(field)
        });
        if let Some(position) = position {
            bindings.push(Binding { field, position });
        }
    }

    let id_of = |i: usize| document.fields[i].id.clone();
    let missing: Vec<String> = (0..field_count).filter(|i| !claimed[*i]).map(id_of).collect();
    let extra: Vec<String> = resolved
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_none())
        .map(|(pos, _)| {
            let cell = header
                .iter()
                .filter_map(|row| row.fields.get(pos))
                .map(|c| c.trim())
                .find(|c| !c.is_empty())
                .unwrap_or("");
            format!("{} ('{cell}')", pos + 1)
        })
        .collect();
    let in_header: Vec<usize> = resolved.iter().flatten().copied().collect();
    let in_metadata: Vec<usize> = (0..field_count).filter(|i| claimed[*i]).collect();
    let misordered: Vec<String> = in_header
        .iter()
        .zip(&in_metadata)
        .filter(|(a, b)| a != b)
        .map(|(a, _)| id_of(*a))
        .collect();

    let mut parts = vec![format!(
        "Header does not match metadata: expected {field_count} columns in {} header row(s), found {columns} in {}",
        expected.len(),
        header.len()
    )];
    if !missing.is_empty() {
        parts.push(format!("missing [{}]", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("extra columns [{}]", extra.join(", ")));
    }
    if !misordered.is_empty() {
        parts.push(format!("misordered [{}]", misordered.join(", ")));
    }
    if missing.is_empty() && extra.is_empty() && misordered.is_empty() {
        parts.push("header text differs from the metadata labels".to_string());
    }

    HeaderAlignment {
        bindings,
        width,
        mismatch: Some(parts.join("; ")),
    }
}

fn cells_equal(actual: &[String], expected: &[String]) -> bool {
    actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| a.trim() == e)
}
