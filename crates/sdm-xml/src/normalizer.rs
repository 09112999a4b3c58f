//! Tree normalizer
//!
//! Produces a canonical copy of a loaded tree. Never drops elements, and running
//! it on its own output changes nothing.

use sdm_ir::{Attribute, Document, Element};
use tracing::debug;

/// Attribute that carries a language code after normalization
pub const LANG_ATTRIBUTE: &str = "lang";

/// Strip a namespace prefix (`ns:tag`) or Clark notation (`{uri}tag`)
#[must_use]
pub fn local_name(tag: &str) -> &str {
    let tag = tag.rsplit_once('}').map_or(tag, |(_, local)| local);
    tag.rsplit_once(':').map_or(tag, |(_, local)| local)
}

/// Canonical attribute name: no prefix, lowercase kebab case
///
/// `maxLength`, `max_length` and `MAX-LENGTH` all become `max-length`.
#[must_use]
pub fn normalize_attribute_name(name: &str) -> String {
    let local = local_name(name.trim());
    let mut out = String::with_capacity(local.len() + 4);
    let mut prev: Option<char> = None;

    for ch in local.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        } else if ch.is_uppercase() {
            if prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Canonical language code: trimmed, lowercase, `-` separated (`en_US` -> `en-us`)
#[must_use]
pub fn normalize_language(code: &str) -> String {
    code.trim().to_lowercase().replace('_', "-")
}

/// Trim and collapse internal whitespace runs to a single space
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizer for loaded documents
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Create a new normalizer
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalize a whole document, keeping its metadata
    #[must_use]
    pub fn normalize(&self, document: &Document) -> Document {
        let root = self.normalize_element(&document.root);
        debug!(
            kind = %document.kind(),
            elements = root.element_count(),
            "Normalized document"
        );
        Document::with_metadata(root, document.metadata.clone())
    }

    /// Normalize a single element and its subtree
    #[must_use]
    pub fn normalize_element(&self, element: &Element) -> Element {
        let mut attributes: Vec<Attribute> = Vec::with_capacity(element.attributes.len());
        for attribute in &element.attributes {
            let name = normalize_attribute_name(&attribute.name);
            if name.is_empty() || attributes.iter().any(|a| a.name == name) {
                continue;
            }
            let value = if name == LANG_ATTRIBUTE {
                normalize_language(&attribute.value)
            } else {
                attribute.value.trim().to_string()
            };
            attributes.push(Attribute { name, value });
        }

        let text = element
            .text
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty());

        Element {
            tag: local_name(&element.tag).to_string(),
            attributes,
            children: element
                .children
                .iter()
                .map(|child| self.normalize_element(child))
                .collect(),
            text,
            origin: element.origin,
            position: element.position,
        }
    }
}
