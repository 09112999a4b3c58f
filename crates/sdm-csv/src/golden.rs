//! Golden Record rendering
//!
//! A Golden Record is the template CSV a client fills in: the header rows of a
//! metadata version, optionally followed by typed sample rows.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sdm_schema::{DataType, Field, MetadataDocument, supports_language};

use crate::config::CsvConfig;
use crate::writer::CsvWriter;
use crate::{Error, Result};

/// Whether sample rows follow the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoldenMode {
    HeaderOnly,
    #[default]
    HeaderWithSamples,
}

/// A rendered record: header rows and data rows, column order = field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenRecord {
    pub language: String,
    /// Field id per column
    pub columns: Vec<String>,
    pub header: Vec<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl GoldenRecord {
    /// Serialize as CSV in the given dialect
    pub fn to_csv(&self, config: &CsvConfig) -> Result<Vec<u8>> {
        CsvWriter::new()
            .with_config(config.clone())
            .to_bytes(&self.header, &self.rows)
    }
}

/// Renders Golden Records from metadata documents
#[derive(Debug, Clone)]
pub struct GoldenRecordGenerator {
    language: Option<String>,
    mode: GoldenMode,
    sample_rows: usize,
    config: CsvConfig,
}

impl Default for GoldenRecordGenerator {
    fn default() -> Self {
        Self {
            language: None,
            mode: GoldenMode::HeaderWithSamples,
            sample_rows: 3,
            config: CsvConfig::default(),
        }
    }
}

impl GoldenRecordGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render headers in `lang` instead of the document's primary language
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    pub fn mode(mut self, mode: GoldenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows;
        self
    }

    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// Build header and sample rows for `document`
    ///
    /// Fails with [`Error::UnsupportedLanguage`] only when the sources declared
    /// languages and the requested one is not among them.
    pub fn render(&self, document: &MetadataDocument) -> Result<GoldenRecord> {
        let language = self
            .language
            .clone()
            .unwrap_or_else(|| document.language().to_string());
        if !supports_language(&document.declared_languages, &language) {
            return Err(Error::unsupported_language(
                language,
                &document.declared_languages,
            ));
        }

        let fields: Vec<&Field> = document.fields.iter().collect();
        let header = document.header_rows(&fields, &language, document.record_scope());
        let keys = SampleKeys::new(&fields, &document.business_keys);
        let requested = match self.mode {
            GoldenMode::HeaderOnly => 0,
            GoldenMode::HeaderWithSamples => self.sample_rows,
        };
        let row_count = keys.capacity.map_or(requested, |capacity| requested.min(capacity));
        if row_count < requested {
            warn!(
                instance_id = %document.instance_id,
                requested,
                rendered = row_count,
                "Business key allows fewer distinct sample rows than requested"
            );
        }
        let rows = (0..row_count)
            .map(|row| {
                fields
                    .iter()
                    .enumerate()
                    .map(|(column, f)| sample_value(f, keys.value_number(column, row)))
                    .collect()
            })
            .collect();

        info!(
            instance_id = %document.instance_id,
            version = document.version,
            language = %language,
            columns = fields.len(),
            sample_rows = row_count,
            "Rendered golden record"
        );

        Ok(GoldenRecord {
            language,
            columns: fields.iter().map(|f| f.id.clone()).collect(),
            header,
            rows,
        })
    }

    /// Render straight to CSV bytes
    pub fn render_csv(&self, document: &MetadataDocument) -> Result<Vec<u8>> {
        self.render(document)?.to_csv(&self.config)
    }
}

/// `prefix` followed by the row number, cut to `max_length` while keeping the number
fn numbered(prefix: &str, row: usize, max_length: Option<usize>) -> String {
    let digits = row.to_string();
    match max_length {
        None => format!("{prefix}{digits}"),
        Some(max) => {
            let keep = max.saturating_sub(digits.len());
            let mut value: String = prefix.chars().take(keep).collect();
            value.push_str(&digits);
            value.chars().take(max).collect()
        }
    }
}

/// Assigns value numbers so that business-key tuples never repeat
///
/// Bounded key columns (booleans, picklists, short numbers) count in mixed radix
/// over the row index; an unbounded key column is distinct on its own.
struct SampleKeys {
    /// Column index and value-space size of every key column
    columns: Vec<(usize, Option<usize>)>,
    /// Distinct key tuples available, `None` when unbounded
    capacity: Option<usize>,
}

impl SampleKeys {
    fn new(fields: &[&Field], business_keys: &[String]) -> Self {
        let columns: Vec<(usize, Option<usize>)> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| business_keys.contains(&f.id))
            .map(|(column, f)| (column, sample_capacity(f)))
            .collect();
        let capacity = if columns.is_empty() || columns.iter().any(|(_, c)| c.is_none()) {
            None
        } else {
            Some(
                columns
                    .iter()
                    .filter_map(|(_, c)| *c)
                    .fold(1usize, usize::saturating_mul),
            )
        };
        Self { columns, capacity }
    }

    /// 1-based value number for `column` on 0-based data row `row`
    fn value_number(&self, column: usize, row: usize) -> usize {
        if self.capacity.is_some() {
            let mut rest = row;
            for (key_column, size) in &self.columns {
                let size = size.unwrap_or(1).max(1);
                if *key_column == column {
                    return rest % size + 1;
                }
                rest /= size;
            }
        }
        row + 1
    }
}

/// Number of distinct samples a field can take, `None` when unbounded
fn sample_capacity(field: &Field) -> Option<usize> {
    match field.data_type {
        DataType::Boolean => Some(2),
        DataType::Enum if !field.allowed_values.is_empty() => Some(field.allowed_values.len()),
        DataType::Integer | DataType::Number | DataType::Enum | DataType::Text => {
            field.max_length.map(digit_capacity)
        }
        DataType::Date | DataType::DateTime | DataType::Email => None,
    }
}

/// Positive integers that fit in `width` digits
fn digit_capacity(width: usize) -> usize {
    u32::try_from(width)
        .ok()
        .and_then(|w| 10usize.checked_pow(w))
        .map_or(usize::MAX, |n| n - 1)
}

/// Sample cell for `field` with value number `n` (1-based)
///
/// Values type-check against the field and stay within its max length. Value
/// numbers past the field's capacity wrap around, so samples are distinct for
/// every `n` up to [`sample_capacity`]. Dates cannot be shortened and are left
/// empty when the max length is below their fixed width.
pub(crate) fn sample_value(field: &Field, n: usize) -> String {
    let n = match sample_capacity(field) {
        Some(capacity) if capacity > 0 => (n.max(1) - 1) % capacity + 1,
        _ => n.max(1),
    };
    let fits = |value: String| match field.max_length {
        Some(max) if value.chars().count() > max => String::new(),
        _ => value,
    };
    match field.data_type {
        DataType::Integer if field.max_length.is_some() => n.to_string(),
        DataType::Integer => (1000 + n).to_string(),
        DataType::Number if field.max_length.is_some() => n.to_string(),
        DataType::Number => format!("{}.50", 100 + n),
        DataType::Boolean => {
            let short = field.max_length.is_some_and(|max| max < "false".len());
            match (n == 1, short) {
                (true, false) => "true".to_string(),
                (false, false) => "false".to_string(),
                (true, true) => "1".to_string(),
                (false, true) => "0".to_string(),
            }
        }
        DataType::Date => fits(sample_date(n).format("%Y-%m-%d").to_string()),
        DataType::DateTime => fits(format!("{}T09:30:00Z", sample_date(n).format("%Y-%m-%d"))),
        DataType::Email => format!("user{n}@example.com"),
        DataType::Enum if !field.allowed_values.is_empty() => field.allowed_values[n - 1].clone(),
        DataType::Enum | DataType::Text => {
            let prefix: String = field
                .name
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_uppercase();
            numbered(&format!("{prefix}-"), n, field.max_length)
        }
    }
}

fn sample_date(row: usize) -> NaiveDate {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    start
        .checked_add_days(Days::new(row as u64 - 1))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdm_schema::{Category, FieldSet, HeaderStyle, Label, MergeMode, Provenance};

    fn field(name: &str, data_type: DataType) -> Field {
        let mut field = Field::new("personInfo", name);
        field.data_type = data_type;
        field.labels = vec![Label::new("en-us", name.to_uppercase())];
        field
    }

    fn document(fields: Vec<Field>, header_style: HeaderStyle) -> MetadataDocument {
        let set = FieldSet {
            countries: Vec::new(),
            language: "en-us".to_string(),
            mode: MergeMode::Combined,
            declared_languages: vec!["en-us".to_string(), "es-mx".to_string()],
            fields,
            business_keys: Vec::new(),
            keyless: true,
            warnings: Vec::new(),
        };
        MetadataDocument::new(set, "inst", Provenance::new("Acme", "jdoe"), header_style, "en-us")
            .unwrap()
    }

    #[test]
    fn test_header_only() {
        let doc = document(vec![field("id", DataType::Text)], HeaderStyle::IdsAndLabels);
        let record = GoldenRecordGenerator::new()
            .mode(GoldenMode::HeaderOnly)
            .render(&doc)
            .unwrap();

        assert_eq!(record.header, vec![vec!["personInfo_id"], vec!["ID"]]);
        assert!(record.rows.is_empty());
    }

    #[test]
    fn test_undeclared_language_rejected() {
        let doc = document(vec![field("id", DataType::Text)], HeaderStyle::Labels);
        let err = GoldenRecordGenerator::new()
            .with_language("fr-FR")
            .render(&doc)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage { .. }));

        // Declared by primary subtag
        assert!(GoldenRecordGenerator::new().with_language("es").render(&doc).is_ok());
    }

    #[test]
    fn test_samples_are_typed() {
        let mut gender = field("gender", DataType::Enum);
        gender.allowed_values = vec!["M".to_string(), "F".to_string()];
        let doc = document(
            vec![
                field("count", DataType::Integer),
                field("amount", DataType::Number),
                field("active", DataType::Boolean),
                field("start", DataType::Date),
                field("stamp", DataType::DateTime),
                field("mail", DataType::Email),
                gender,
            ],
            HeaderStyle::Labels,
        );
        let record = GoldenRecordGenerator::new().sample_rows(2).render(&doc).unwrap();

        assert_eq!(
            record.rows[0],
            vec!["1001", "101.50", "true", "2024-01-01", "2024-01-01T09:30:00Z", "user1@example.com", "M"]
        );
        assert_eq!(record.rows[1][6], "F");
        assert_eq!(record.rows[1][3], "2024-01-02");
    }

    #[test]
    fn test_samples_respect_max_length_and_stay_unique() {
        let mut key = field("person-id-external", DataType::Text);
        key.category = Category::BusinessKey;
        key.max_length = Some(4);

        let values: Vec<String> = (1..=12).map(|row| sample_value(&key, row)).collect();
        assert!(values.iter().all(|v| v.chars().count() <= 4));
        assert_eq!(values[0], "PER1");
        assert_eq!(values[11], "PE12");

        let mut unique = values.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), values.len());
    }

    #[test]
    fn test_numbers_fit_max_length() {
        let mut seq = field("seq", DataType::Integer);
        seq.max_length = Some(2);
        let mut amount = field("amount", DataType::Number);
        amount.max_length = Some(3);
        let mut flag = field("flag", DataType::Boolean);
        flag.max_length = Some(1);
        let mut start = field("start", DataType::Date);
        start.max_length = Some(8);

        assert_eq!(sample_value(&seq, 1), "1");
        assert_eq!(sample_value(&seq, 99), "99");
        assert_eq!(sample_value(&seq, 100), "1");
        assert_eq!(sample_value(&amount, 7), "7");
        assert_eq!((sample_value(&flag, 1).as_str(), sample_value(&flag, 2).as_str()), ("1", "0"));
        assert_eq!(sample_value(&start, 1), "");
    }

    #[test]
    fn test_bounded_keys_cap_sample_rows() {
        let mut kind = field("kind", DataType::Enum);
        kind.allowed_values = vec!["H".to_string(), "W".to_string()];
        let mut doc = document(vec![kind, field("note", DataType::Text)], HeaderStyle::Labels);
        doc.business_keys = vec!["personInfo_kind".to_string()];

        let record = GoldenRecordGenerator::new().sample_rows(5).render(&doc).unwrap();
        let kinds: Vec<&str> = record.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(kinds, vec!["H", "W"]);

        // Without a key the rows are not capped
        doc.business_keys.clear();
        let record = GoldenRecordGenerator::new().sample_rows(5).render(&doc).unwrap();
        assert_eq!(record.rows.len(), 5);
        assert_eq!(record.rows[2][0], "H");
    }

    #[test]
    fn test_csv_output() {
        let doc = document(vec![field("id", DataType::Text)], HeaderStyle::Labels);
        let csv = GoldenRecordGenerator::new()
            .sample_rows(1)
            .render_csv(&doc)
            .unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "ID\r\nID-1\r\n");
    }
}
