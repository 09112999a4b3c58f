//! Field model definitions
#![allow(clippy::must_use_candidate)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved country code: every country present in the overlay, or no country scope
pub const ALL_COUNTRIES: &str = "ALL";

/// Declared data type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Integer,
    Boolean,
    Date,
    DateTime,
    Email,
    Enum,
}

impl DataType {
    /// Map a declared `type` attribute value to a data type
    pub fn from_declared(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "char" | "varchar" | "translatable" => Some(Self::Text),
            "number" | "decimal" | "double" | "float" | "amount" => Some(Self::Number),
            "integer" | "int" | "long" => Some(Self::Integer),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "datetime" | "date-time" | "timestamp" => Some(Self::DateTime),
            "email" => Some(Self::Email),
            "enum" | "picklist" => Some(Self::Enum),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Email => "email",
            Self::Enum => "enum",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field category, resolved once by the categorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Standard,
    BusinessKey,
    CountrySpecific,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::BusinessKey => "business_key",
            Self::CountrySpecific => "country_specific",
        })
    }
}

/// How a multi-country merge is shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// One field set per requested country
    PerCountry,
    /// One field set holding every requested country
    #[default]
    Combined,
}

/// A display label in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub lang: String,
    pub text: String,
}

impl Label {
    pub fn new(lang: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            text: text.into(),
        }
    }
}

/// Country-specific variant attached to a base field by the overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryVariant {
    pub country: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    pub path: String,
}

/// A logical data field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column identifier, unique within a field set
    pub id: String,
    /// Owning element id (overlay `_csf` suffix removed)
    pub element: String,
    /// Field id within its element
    pub name: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub category: Category,
    /// Originating country, or `ALL`
    pub country: String,
    /// Location in the source tree
    pub path: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Carries a structural key marker in the source
    #[serde(default)]
    pub identifying: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<CountryVariant>,
}

impl Field {
    /// Create a base-scoped text field with no labels
    pub fn new(element: impl Into<String>, name: impl Into<String>) -> Self {
        let element = element.into();
        let name = name.into();
        Self {
            id: format!("{element}_{name}"),
            path: format!("{element}/{name}"),
            element,
            name,
            labels: Vec::new(),
            data_type: DataType::Text,
            category: Category::Standard,
            country: ALL_COUNTRIES.to_string(),
            required: false,
            max_length: None,
            allowed_values: Vec::new(),
            identifying: false,
            variants: Vec::new(),
        }
    }

    /// Whether this field belongs to every country partition
    pub fn is_shared(&self) -> bool {
        self.country == ALL_COUNTRIES
    }

    pub fn is_business_key(&self) -> bool {
        self.category == Category::BusinessKey
    }

    /// Variant attached for `country`, if any
    pub fn variant(&self, country: &str) -> Option<&CountryVariant> {
        self.variants.iter().find(|v| v.country == country)
    }
}

/// Kind of a non-fatal finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    NoBusinessKey,
    /// Business key columns are missing from a submitted header
    UnboundBusinessKey,
    /// A submitted row was not UTF-8 and was decoded with a fallback encoding
    EncodingFallback,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBusinessKey => f.write_str("NoBusinessKey"),
            Self::UnboundBusinessKey => f.write_str("UnboundBusinessKey"),
            Self::EncodingFallback => f.write_str("EncodingFallback"),
        }
    }
}

/// A non-fatal finding carried alongside a field set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Ordered fields produced by one merge, for a country and language scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    /// Target countries; empty when only the base model was merged
    pub countries: Vec<String>,
    /// Target language (normalized)
    pub language: String,
    pub mode: MergeMode,
    /// Every language declared by labels in the source documents
    pub declared_languages: Vec<String>,
    pub fields: Vec<Field>,
    /// Resolved business key, in field order
    #[serde(default)]
    pub business_keys: Vec<String>,
    /// Set when no field carries a key marker
    #[serde(default)]
    pub keyless: bool,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl FieldSet {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_ids(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.id.as_str()).collect()
    }

    /// Country label for file names and logs: the single country, or `ALL`
    pub fn scope_name(&self) -> String {
        match self.countries.as_slice() {
            [single] if self.mode == MergeMode::PerCountry => single.clone(),
            [] => ALL_COUNTRIES.to_string(),
            many => many.join("+"),
        }
    }
}
