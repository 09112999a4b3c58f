//! Document representation for loaded XML sources
#![allow(clippy::must_use_candidate)] // Builder/constructor API intentionally omits pervasive #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent builder methods return Self for ergonomics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::metadata::SourceInfo;
use crate::Error;

/// Which kind of source document a tree came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Main Succession Data Model
    #[serde(rename = "sdm")]
    Base,

    /// Country-specific fields overlay
    #[serde(rename = "csf_sdm")]
    Overlay,
}

impl DocumentKind {
    /// Wire label used by upload intake
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "sdm",
            Self::Overlay => "csf_sdm",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sdm" | "base" | "main" => Ok(Self::Base),
            "csf_sdm" | "csf" | "overlay" => Ok(Self::Overlay),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// A loaded document: root element plus load metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Root element of the document
    pub root: Element,

    /// Document-level metadata
    pub metadata: DocumentMetadata,
}

/// Metadata associated with a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Kind confirmed by the structural check
    pub kind: DocumentKind,

    /// Source information (file, position, etc.)
    pub source: Option<SourceInfo>,

    /// XML version from the declaration
    pub xml_version: Option<String>,

    /// Encoding from the declaration
    pub encoding: Option<String>,

    /// Namespace declarations as (prefix, uri); the default namespace has an empty prefix
    pub namespaces: Vec<(String, String)>,

    /// Load timestamp
    pub loaded_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DocumentMetadata {
    /// Empty metadata for a document of the given kind
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            source: None,
            xml_version: None,
            encoding: None,
            namespaces: Vec::new(),
            loaded_at: None,
        }
    }
}

impl Document {
    /// Create a new document with the given root element
    pub fn new(root: Element, kind: DocumentKind) -> Self {
        Self {
            root,
            metadata: DocumentMetadata::new(kind),
        }
    }

    /// Create a new document with metadata
    pub fn with_metadata(root: Element, metadata: DocumentMetadata) -> Self {
        Self { root, metadata }
    }

    /// Kind of this document
    pub fn kind(&self) -> DocumentKind {
        self.metadata.kind
    }

    /// Source name for diagnostics, or the kind label when unknown
    pub fn source_name(&self) -> String {
        self.metadata
            .source
            .as_ref()
            .map_or_else(|| self.kind().to_string(), |s| s.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Position;

    #[test]
    fn test_document_creation() {
        let root = Element::new("succession-data-model", DocumentKind::Base);
        let doc = Document::new(root, DocumentKind::Base);

        assert_eq!(doc.root.tag, "succession-data-model");
        assert_eq!(doc.kind(), DocumentKind::Base);
        assert!(doc.metadata.source.is_none());
        assert_eq!(doc.source_name(), "sdm");
    }

    #[test]
    fn test_document_with_metadata() {
        let root = Element::new("country-specific-fields", DocumentKind::Overlay);
        let mut metadata = DocumentMetadata::new(DocumentKind::Overlay);
        metadata.source = Some(SourceInfo::new("csf.xml", Position::new(1, 1, 0)));
        metadata.encoding = Some("UTF-8".to_string());
        metadata.loaded_at = Some(chrono::DateTime::UNIX_EPOCH);

        let doc = Document::with_metadata(root, metadata);

        assert_eq!(doc.kind(), DocumentKind::Overlay);
        assert_eq!(doc.source_name(), "csf.xml");
        assert_eq!(doc.metadata.encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("sdm".parse::<DocumentKind>().unwrap(), DocumentKind::Base);
        assert_eq!("CSF_SDM".parse::<DocumentKind>().unwrap(), DocumentKind::Overlay);
        assert_eq!("csf-sdm".parse::<DocumentKind>().unwrap(), DocumentKind::Overlay);
        assert!(matches!(
            "xlsx".parse::<DocumentKind>(),
            Err(Error::UnknownKind(_))
        ));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&DocumentKind::Overlay).unwrap();
        assert_eq!(json, "\"csf_sdm\"");
        assert_eq!(DocumentKind::Base.to_string(), "sdm");
    }
}
