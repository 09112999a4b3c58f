//! Cell rules
//!
//! Values are trimmed before any rule runs. Empty values only ever trip
//! [`validate_required`]; type and length rules skip them.

use chrono::NaiveDate;
use regex::Regex;

use sdm_schema::{DataType, Field};

/// Validation rule result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    pub is_valid: bool,
    pub message: Option<String>,
}

impl RuleResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }
}

/// Compiled type patterns
#[derive(Debug, Clone)]
pub struct TypePatterns {
    number: Regex,
    integer: Regex,
    boolean: Regex,
    date: Regex,
    datetime: Regex,
    email: Regex,
}

impl TypePatterns {
    /// Compile the patterns
    ///
    /// # Errors
    ///
    /// Returns the regex error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            number: Regex::new(r"^[+-]?\d+(\.\d+)?$")?,
            integer: Regex::new(r"^[+-]?\d+$")?,
            boolean: Regex::new(r"(?i)^(true|false|yes|no|0|1)$")?,
            date: Regex::new(r"^\d{4}-\d{2}-\d{2}$")?,
            datetime: Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}")?,
            email: Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")?,
        })
    }

    /// Whether `value` (non-empty, trimmed) fits `data_type`
    #[must_use]
    pub fn matches(&self, value: &str, data_type: DataType) -> bool {
        match data_type {
            DataType::Text | DataType::Enum => true,
            DataType::Number => self.number.is_match(value),
            DataType::Integer => self.integer.is_match(value),
            DataType::Boolean => self.boolean.is_match(value),
            DataType::Date => {
                self.date.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
            }
            DataType::DateTime => {
                self.datetime.is_match(value)
                    && value
                        .get(..10)
                        .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
            }
            DataType::Email => self.email.is_match(value),
        }
    }
}

/// Required and business-key cells must not be empty
#[must_use]
pub fn validate_required(value: &str, field: &Field) -> RuleResult {
    if value.is_empty() && (field.required || field.is_business_key()) {
        let what = if field.is_business_key() {
            "Business key"
        } else {
            "Required"
        };
        return RuleResult::invalid(format!("{what} field '{}' is empty", field.id));
    }
    RuleResult::valid()
}

/// Validate a value against the field type and its allowed values
#[must_use]
pub fn validate_data_type(value: &str, field: &Field, patterns: &TypePatterns) -> RuleResult {
    if value.is_empty() {
        return RuleResult::valid();
    }
    if !patterns.matches(value, field.data_type) {
        return RuleResult::invalid(format!(
            "Value '{}' is not a valid {} for '{}'",
            preview(value),
            field.data_type,
            field.id
        ));
    }
    if field.data_type == DataType::Enum
        && !field.allowed_values.is_empty()
        && !field.allowed_values.iter().any(|v| v == value)
    {
        return RuleResult::invalid(format!(
            "Value '{}' is not one of the allowed values for '{}': {}",
            preview(value),
            field.id,
            field.allowed_values.join(", ")
        ));
    }
    RuleResult::valid()
}

/// Validate the length in characters
#[must_use]
pub fn validate_length(value: &str, field: &Field) -> RuleResult {
    if let Some(max) = field.max_length {
        let len = value.chars().count();
        if len > max {
            return RuleResult::invalid(format!(
                "Value length {len} exceeds maximum {max} for '{}'",
                field.id
            ));
        }
    }
    RuleResult::valid()
}

/// First 50 characters of a value, for messages
fn preview(value: &str) -> String {
    value.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(data_type: DataType) -> Field {
        let mut field = Field::new("personInfo", "value");
        field.data_type = data_type;
        field
    }

    #[test]
    fn test_type_patterns() {
        let patterns = TypePatterns::new().unwrap();

        assert!(patterns.matches("-12", DataType::Integer));
        assert!(!patterns.matches("1.5", DataType::Integer));
        assert!(patterns.matches("1.5", DataType::Number));
        assert!(!patterns.matches("1,5", DataType::Number));
        assert!(patterns.matches("YES", DataType::Boolean));
        assert!(!patterns.matches("maybe", DataType::Boolean));
        assert!(patterns.matches("user@example.com", DataType::Email));
        assert!(!patterns.matches("user@", DataType::Email));
        assert!(patterns.matches("anything", DataType::Text));
    }

    #[test]
    fn test_dates_are_strict() {
        let patterns = TypePatterns::new().unwrap();

        assert!(patterns.matches("2024-02-29", DataType::Date));
        assert!(!patterns.matches("2023-02-29", DataType::Date));
        assert!(!patterns.matches("02/01/2024", DataType::Date));
        assert!(patterns.matches("2024-01-01T09:30:00Z", DataType::DateTime));
        assert!(patterns.matches("2024-01-01 09:30:00", DataType::DateTime));
        assert!(!patterns.matches("2024-13-01T09:30:00", DataType::DateTime));
    }

    #[test]
    fn test_required_field() {
        let mut required = field(DataType::Text);
        assert!(validate_required("", &required).is_valid);

        required.required = true;
        assert!(!validate_required("", &required).is_valid);
        assert!(validate_required("x", &required).is_valid);
    }

    #[test]
    fn test_enum_values() {
        let patterns = TypePatterns::new().unwrap();
        let mut gender = field(DataType::Enum);
        gender.allowed_values = vec!["M".to_string(), "F".to_string()];

        assert!(validate_data_type("F", &gender, &patterns).is_valid);
        let result = validate_data_type("X", &gender, &patterns);
        assert!(!result.is_valid);
        assert!(result.message.unwrap().contains("M, F"));
    }

    #[test]
    fn test_length_counts_characters() {
        let mut name = field(DataType::Text);
        name.max_length = Some(4);

        assert!(validate_length("Peña", &name).is_valid);
        assert!(!validate_length("Pedro", &name).is_valid);
    }
}
