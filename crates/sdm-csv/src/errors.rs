//! Error types for record rendering and splitting

use thiserror::Error;

/// Errors that can occur while rendering, reading or splitting records
#[derive(Error, Debug, Clone)]
pub enum CsvError {
    /// CSV read error with context
    #[error("CSV read error at line {line}: {message}")]
    Read { line: usize, message: String },

    /// CSV write error
    #[error("CSV write error: {0}")]
    Write(String),

    /// Requested language was never declared by the source documents
    #[error("Unsupported language '{lang}' (declared: {})", declared.join(", "))]
    UnsupportedLanguage { lang: String, declared: Vec<String> },

    /// Record and metadata disagree
    #[error("Record does not match its metadata: {details}")]
    InconsistentMetadata { details: String },

    /// Layout archive could not be built
    #[error("Archive error: {0}")]
    Archive(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(String),
}

impl CsvError {
    /// Create a read error at a specific line
    pub fn read_at(line: usize, message: impl Into<String>) -> Self {
        Self::Read {
            line,
            message: message.into(),
        }
    }

    /// Create a write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    pub fn unsupported_language(lang: impl Into<String>, declared: &[String]) -> Self {
        Self::UnsupportedLanguage {
            lang: lang.into(),
            declared: declared.to_vec(),
        }
    }

    pub fn inconsistent(details: impl Into<String>) -> Self {
        Self::InconsistentMetadata {
            details: details.into(),
        }
    }

    /// Get the line number if available
    pub fn line_number(&self) -> Option<usize> {
        match self {
            Self::Read { line, .. } if *line > 0 => Some(*line),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CsvError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<zip::result::ZipError> for CsvError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// Result type alias for CSV operations
pub type CsvResult<T> = std::result::Result<T, CsvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_error_read() {
        let err = CsvError::read_at(5, "unterminated quote");
        assert!(err.to_string().contains("line 5"));
        assert!(err.to_string().contains("unterminated quote"));
        assert_eq!(err.line_number(), Some(5));
    }

    #[test]
    fn test_csv_error_no_line() {
        assert_eq!(CsvError::write("disk full").line_number(), None);
        assert_eq!(CsvError::read_at(0, "empty").line_number(), None);
    }

    #[test]
    fn test_unsupported_language_lists_declared() {
        let err = CsvError::unsupported_language("fr-fr", &["en-us".to_string(), "es-mx".to_string()]);
        assert_eq!(
            err.to_string(),
            "Unsupported language 'fr-fr' (declared: en-us, es-mx)"
        );
    }
}
