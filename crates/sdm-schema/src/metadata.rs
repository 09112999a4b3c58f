//! Versioned metadata documents
//!
//! A [`MetadataDocument`] is the persisted description of one categorized field
//! set. It has two serialized forms, both produced from the same value: pretty
//! JSON for humans and tooling, and a compact snapshot that embeds the content
//! hash so a stale or tampered snapshot is rejected on reload.
#![allow(clippy::must_use_candidate)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::language::{LabelScope, header_label};
use crate::model::{ALL_COUNTRIES, Field, FieldSet, MergeMode, Warning};
use crate::{Error, Result};

/// Layout version of the serialized document
pub const SCHEMA_VERSION: &str = "1.0";

/// Who produced a metadata version and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub client: String,
    pub consultant: String,
    pub created_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(client: impl Into<String>, consultant: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            consultant: consultant.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Header layout of a rendered record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStyle {
    /// One row of display labels
    #[default]
    Labels,
    /// A row of field ids followed by a row of display labels
    IdsAndLabels,
}

impl HeaderStyle {
    #[must_use]
    pub fn header_rows(self) -> usize {
        match self {
            Self::Labels => 1,
            Self::IdsAndLabels => 2,
        }
    }
}

/// Persisted, versioned description of a field set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub schema_version: String,
    pub instance_id: String,
    /// Assigned at publish time; zero until then
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub version_label: String,
    pub provenance: Provenance,
    /// Languages the record is rendered in, first is primary
    pub languages: Vec<String>,
    pub default_language: String,
    /// Languages declared by the source documents
    #[serde(default)]
    pub declared_languages: Vec<String>,
    pub countries: Vec<String>,
    pub mode: MergeMode,
    pub header_style: HeaderStyle,
    pub fields: Vec<Field>,
    pub business_keys: Vec<String>,
    pub keyless: bool,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    pub content_hash: String,
}

/// Fields covered by the content hash: everything but version and provenance
#[derive(Serialize)]
struct HashedContent<'a> {
    schema_version: &'a str,
    instance_id: &'a str,
    languages: &'a [String],
    default_language: &'a str,
    declared_languages: &'a [String],
    countries: &'a [String],
    mode: MergeMode,
    header_style: HeaderStyle,
    fields: &'a [Field],
    business_keys: &'a [String],
    keyless: bool,
    warnings: &'a [Warning],
}

/// Compact reload form
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub content_hash: String,
    pub document: MetadataDocument,
}

impl MetadataDocument {
    /// Freeze a categorized field set into an unversioned document
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the content cannot be hashed.
    pub fn new(
        set: FieldSet,
        instance_id: impl Into<String>,
        provenance: Provenance,
        header_style: HeaderStyle,
        default_language: impl Into<String>,
    ) -> Result<Self> {
        let mut document = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            instance_id: instance_id.into(),
            version: 0,
            version_label: String::new(),
            provenance,
            languages: vec![set.language],
            default_language: default_language.into(),
            declared_languages: set.declared_languages,
            countries: set.countries,
            mode: set.mode,
            header_style,
            fields: set.fields,
            business_keys: set.business_keys,
            keyless: set.keyless,
            warnings: set.warnings,
            content_hash: String::new(),
        };
        document.content_hash = document.compute_hash()?;
        Ok(document)
    }

    /// Hex SHA-256 of the hashed content
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the content cannot be serialized.
    pub fn compute_hash(&self) -> Result<String> {
        let content = HashedContent {
            schema_version: &self.schema_version,
            instance_id: &self.instance_id,
            languages: &self.languages,
            default_language: &self.default_language,
            declared_languages: &self.declared_languages,
            countries: &self.countries,
            mode: self.mode,
            header_style: self.header_style,
            fields: &self.fields,
            business_keys: &self.business_keys,
            keyless: self.keyless,
            warnings: &self.warnings,
        };
        let bytes = serde_json::to_vec(&content)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Stamp the version number and its `YYYYMMDD_v{n}` label
    pub fn assign_version(&mut self, version: u32) {
        self.version = version;
        self.version_label = format!(
            "{}_v{version}",
            self.provenance.created_at.format("%Y%m%d")
        );
    }

    /// Primary rendering language
    #[must_use]
    pub fn language(&self) -> &str {
        self.languages
            .first()
            .map_or(self.default_language.as_str(), String::as_str)
    }

    #[must_use]
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Label scope of the record this document describes
    #[must_use]
    pub fn record_scope(&self) -> LabelScope<'_> {
        match (self.mode, self.countries.as_slice()) {
            (MergeMode::PerCountry, [country]) => LabelScope::Country(country.as_str()),
            _ => LabelScope::Combined,
        }
    }

    /// Header rows for `fields` in `lang`, per the header style
    #[must_use]
    pub fn header_rows(&self, fields: &[&Field], lang: &str, scope: LabelScope<'_>) -> Vec<Vec<String>> {
        let labels: Vec<String> = fields
            .iter()
            .map(|f| header_label(f, lang, &self.default_language, scope))
            .collect();
        match self.header_style {
            HeaderStyle::Labels => vec![labels],
            HeaderStyle::IdsAndLabels => {
                vec![fields.iter().map(|f| f.id.clone()).collect(), labels]
            }
        }
    }

    /// Header rows of the full record in its primary language
    #[must_use]
    pub fn record_header(&self) -> Vec<Vec<String>> {
        let fields: Vec<&Field> = self.fields.iter().collect();
        self.header_rows(&fields, self.language(), self.record_scope())
    }

    /// Non-`ALL` countries of the fields in field order, or `ALL` when there are none
    #[must_use]
    pub fn field_countries(&self) -> Vec<String> {
        let mut countries: Vec<String> = Vec::new();
        for field in &self.fields {
            if !field.is_shared() && !countries.contains(&field.country) {
                countries.push(field.country.clone());
            }
        }
        if countries.is_empty() {
            countries.push(ALL_COUNTRIES.to_string());
        }
        countries
    }

    /// The field set this document was built from
    #[must_use]
    pub fn field_set(&self) -> FieldSet {
        FieldSet {
            countries: self.countries.clone(),
            language: self.language().to_string(),
            mode: self.mode,
            declared_languages: self.declared_languages.clone(),
            fields: self.fields.clone(),
            business_keys: self.business_keys.clone(),
            keyless: self.keyless,
            warnings: self.warnings.clone(),
        }
    }

    /// Pretty JSON form
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] on serializer failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the JSON form
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when the input is not a metadata document.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Compact snapshot embedding the content hash
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] on serializer failure.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            content_hash: self.content_hash.clone(),
            document: self.clone(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Reload a snapshot, checking it against its own content and, when given,
    /// against the hash of the structured document
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMismatch`] when any hash disagrees and
    /// [`Error::Serialization`] when the bytes do not parse.
    pub fn from_snapshot(bytes: &[u8], expected_hash: Option<&str>) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        let actual = snapshot.document.compute_hash()?;

        let expected = expected_hash.unwrap_or(snapshot.content_hash.as_str());
        for claimed in [snapshot.content_hash.as_str(), expected] {
            if claimed != actual {
                return Err(Error::SnapshotMismatch {
                    expected: claimed.to_string(),
                    actual,
                });
            }
        }

        debug!(
            instance_id = %snapshot.document.instance_id,
            version = snapshot.document.version,
            "Restored metadata snapshot"
        );
        Ok(snapshot.document)
    }
}
