//! Validation reports and their CSV export
#![allow(clippy::must_use_candidate)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sdm_csv::{CsvConfig, CsvWriter};
use sdm_schema::Warning;

use crate::Result;

/// Header of the exported report
pub const REPORT_HEADER: [&str; 4] = ["row", "field", "error_type", "message"];

/// Kind of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    StructureMismatch,
    TypeMismatch,
    MissingValue,
    MaxLengthExceeded,
    DuplicateKey,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StructureMismatch => "StructureMismatch",
            Self::TypeMismatch => "TypeMismatch",
            Self::MissingValue => "MissingValue",
            Self::MaxLengthExceeded => "MaxLengthExceeded",
            Self::DuplicateKey => "DuplicateKey",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation error
///
/// `row` is the 1-based physical record number in the submitted file, header
/// rows included; `None` marks a file-level error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: Option<usize>,
    pub field: Option<String>,
    pub error_type: ErrorType,
    pub message: String,
    /// Every row involved, for errors spanning rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_rows: Vec<usize>,
}

impl RowError {
    pub fn file_level(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            row: None,
            field: None,
            error_type,
            message: message.into(),
            related_rows: Vec::new(),
        }
    }

    pub fn at_row(row: usize, error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            field: None,
            error_type,
            message: message.into(),
            related_rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_related_rows(mut self, rows: Vec<usize>) -> Self {
        self.related_rows = rows;
        self
    }
}

/// Totals of a report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Data rows checked
    pub rows: usize,
    pub error_count: usize,
    pub error_counts: BTreeMap<ErrorType, usize>,
    pub warning_count: usize,
    pub elapsed_ms: u64,
    pub is_valid: bool,
}

/// Outcome of validating one record file against one metadata version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validation_id: Uuid,
    pub instance_id: String,
    pub version: u32,
    pub version_label: String,
    pub created_at: DateTime<Utc>,
    /// Top-level errors first, then by row
    pub errors: Vec<RowError>,
    pub warnings: Vec<Warning>,
    pub summary: ReportSummary,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.summary.is_valid
    }

    /// Errors of one kind
    pub fn errors_of(&self, error_type: ErrorType) -> impl Iterator<Item = &RowError> {
        self.errors.iter().filter(move |e| e.error_type == error_type)
    }

    pub fn count_of(&self, error_type: ErrorType) -> usize {
        self.summary.error_counts.get(&error_type).copied().unwrap_or(0)
    }
}

/// Exports reports
#[derive(Debug, Clone, Default)]
pub struct ValidationReporter {
    config: CsvConfig,
}

impl ValidationReporter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// CSV with header `row,field,error_type,message`, one line per error
    ///
    /// # Errors
    ///
    /// Returns the writer error if serialization fails.
    pub fn to_csv(&self, report: &ValidationReport) -> Result<Vec<u8>> {
        let header = vec![REPORT_HEADER.iter().map(ToString::to_string).collect()];
        let rows: Vec<Vec<String>> = report
            .errors
            .iter()
            .map(|e| {
                vec![
                    e.row.map(|r| r.to_string()).unwrap_or_default(),
                    e.field.clone().unwrap_or_default(),
                    e.error_type.to_string(),
                    e.message.clone(),
                ]
            })
            .collect();
        Ok(CsvWriter::new()
            .with_config(self.config.clone())
            .to_bytes(&header, &rows)?)
    }

    /// Pretty JSON form
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_json(&self, report: &ValidationReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdm_csv::RecordTerminator;

    fn report(errors: Vec<RowError>) -> ValidationReport {
        let mut summary = ReportSummary {
            rows: 2,
            error_count: errors.len(),
            ..ReportSummary::default()
        };
        for error in &errors {
            *summary.error_counts.entry(error.error_type).or_default() += 1;
        }
        summary.is_valid = errors.is_empty();
        ValidationReport {
            validation_id: Uuid::new_v4(),
            instance_id: "inst".to_string(),
            version: 1,
            version_label: "20250101_v1".to_string(),
            created_at: Utc::now(),
            errors,
            warnings: Vec::new(),
            summary,
        }
    }

    #[test]
    fn test_csv_export() {
        let report = report(vec![
            RowError::file_level(ErrorType::StructureMismatch, "missing [b]"),
            RowError::at_row(3, ErrorType::TypeMismatch, "Value 'x, y' is not a valid integer")
                .with_field("personInfo_age"),
        ]);
        let reporter =
            ValidationReporter::new().with_config(CsvConfig::new().record_terminator(RecordTerminator::Lf));
        let csv = String::from_utf8(reporter.to_csv(&report).unwrap()).unwrap();

        assert_eq!(
            csv,
            "row,field,error_type,message\n\
             ,,StructureMismatch,missing [b]\n\
             3,personInfo_age,TypeMismatch,\"Value 'x, y' is not a valid integer\"\n"
        );
        assert_eq!(report.count_of(ErrorType::TypeMismatch), 1);
        assert_eq!(report.count_of(ErrorType::DuplicateKey), 0);
    }

    #[test]
    fn test_empty_report_exports_header_only() {
        let report = report(Vec::new());
        assert!(report.is_valid());
        let csv = ValidationReporter::new().to_csv(&report).unwrap();
        assert_eq!(csv, b"row,field,error_type,message\r\n");
    }

    #[test]
    fn test_json_counts_by_type() {
        let report = report(vec![RowError::at_row(2, ErrorType::MissingValue, "empty")]);
        let json = ValidationReporter::new().to_json(&report).unwrap();
        assert!(json.contains("\"MissingValue\": 1"));
    }
}
