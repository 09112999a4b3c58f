//! Field extraction from normalized trees
//!
//! Both documents describe fields the same way: `hris-element` containers holding
//! `hris-field` definitions with `label` children. This module reads one field
//! definition at a time and knows nothing about base/overlay precedence.
#![allow(clippy::must_use_candidate)]

use std::collections::BTreeSet;

use sdm_ir::{Cursor, Element, Traversal, walk};

use crate::model::{DataType, Field, Label};

pub(crate) const ELEMENT_TAG: &str = "hris-element";
pub(crate) const FIELD_TAG: &str = "hris-field";
pub(crate) const LABEL_TAG: &str = "label";
pub(crate) const KEY_FIELDS_TAG: &str = "key-fields";
pub(crate) const FIELD_REF_TAG: &str = "field-ref";

/// Language assigned to labels that declare none
pub const DEFAULT_LABEL_LANGUAGE: &str = "default";

/// Reads field definitions out of normalized `hris-element` nodes
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    excluded: BTreeSet<String>,
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip fields by field name or by `{element}_{field}` id
    pub fn with_exclusions<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(excluded.into_iter().map(Into::into));
        self
    }

    /// Whether a field definition takes part in the merge at all
    pub fn is_included(&self, element_id: &str, field: &Element) -> bool {
        let Some(name) = field.id() else {
            return false;
        };
        if field
            .attribute("visibility")
            .is_some_and(|v| v.eq_ignore_ascii_case("none"))
        {
            return false;
        }
        !(self.excluded.contains(name) || self.excluded.contains(&format!("{element_id}_{name}")))
    }

    /// Fields of one element, in document order
    ///
    /// Fields are searched through nested containers, but a nested `hris-element`
    /// owns its own fields.
    pub fn fields_of(&self, element_id: &str, element: &Element, path: &str) -> Vec<Field> {
        let key_refs = key_field_refs(element);
        let mut found = Vec::new();
        collect_field_nodes(element, &mut found);

        let mut fields: Vec<Field> = Vec::with_capacity(found.len());
        for node in found {
            if !self.is_included(element_id, node) {
                continue;
            }
            let Some(name) = node.id() else { continue };
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            let mut field = field_from_node(element_id, node, path);
            field.identifying |= key_refs.iter().any(|r| r == name);
            fields.push(field);
        }
        fields
    }
}

/// Build a field from one `hris-field` node
pub(crate) fn field_from_node(element_id: &str, node: &Element, path: &str) -> Field {
    let name = node.id().unwrap_or_default();
    let mut field = Field::new(element_id, name);
    field.path = format!("{path}/{FIELD_TAG}[{name}]");
    field.labels = labels_of(node);
    field.data_type = data_type_of(node);
    field.required = node.flag("required");
    field.max_length = node
        .attribute("max-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0);
    field.allowed_values = allowed_values_of(node);
    field.identifying = node.flag("business-key") || node.flag("key");
    field
}

/// Labels declared directly on a node
pub(crate) fn labels_of(node: &Element) -> Vec<Label> {
    node.find_children(LABEL_TAG)
        .filter_map(|label| {
            let text = label.text.as_deref()?;
            let lang = label.attribute("lang").unwrap_or(DEFAULT_LABEL_LANGUAGE);
            Some(Label::new(lang, text))
        })
        .collect()
}

/// Declared `type`, else enum when options are listed, else text
pub(crate) fn data_type_of(node: &Element) -> DataType {
    if let Some(declared) = node.attribute("type").and_then(DataType::from_declared) {
        return declared;
    }
    if node.find_child("picklist").is_some() || node.find_child("option").is_some() {
        return DataType::Enum;
    }
    DataType::Text
}

fn allowed_values_of(node: &Element) -> Vec<String> {
    let options = node
        .find_child("picklist")
        .map_or(node.children.as_slice(), |p| p.children.as_slice());
    options
        .iter()
        .filter(|o| o.tag == "option")
        .filter_map(|o| o.attribute("value").or(o.text.as_deref()))
        .map(str::to_string)
        .collect()
}

/// Field names referenced by `key-fields/field-ref` entries of an element
fn key_field_refs(element: &Element) -> Vec<String> {
    Cursor::new(element)
        .children(KEY_FIELDS_TAG)
        .iter()
        .flat_map(|keys| keys.children(FIELD_REF_TAG))
        .filter_map(|field_ref| {
            let node = field_ref.element();
            node.attribute("refid").or(node.attribute("ref"))
        })
        .map(str::to_string)
        .collect()
}

fn collect_field_nodes<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        match child.tag.as_str() {
            FIELD_TAG => out.push(child),
            ELEMENT_TAG => {}
            _ => collect_field_nodes(child, out),
        }
    }
}

/// Collect `hris-element` nodes below `root` in document order, stopping at `stop_at`
pub(crate) fn collect_elements<'a>(root: &'a Element, stop_at: Option<&str>) -> Vec<&'a Element> {
    fn recurse<'a>(node: &'a Element, stop_at: Option<&str>, out: &mut Vec<&'a Element>) {
        for child in &node.children {
            if stop_at.is_some_and(|tag| child.tag == tag) {
                continue;
            }
            if child.tag == ELEMENT_TAG {
                out.push(child);
            }
            recurse(child, stop_at, out);
        }
    }

    let mut out = Vec::new();
    recurse(root, stop_at, &mut out);
    out
}

struct LanguageCollector {
    languages: BTreeSet<String>,
}

impl Traversal for LanguageCollector {
    fn visit(&mut self, element: &Element, _path: &[String]) {
        if element.tag != LABEL_TAG {
            return;
        }
        if let Some(lang) = element.attribute("lang").filter(|l| !l.is_empty()) {
            self.languages.insert(lang.to_string());
        }
    }
}

/// Every language declared by a label anywhere in the given trees, sorted
pub fn declared_languages<'a, I>(roots: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut collector = LanguageCollector {
        languages: BTreeSet::new(),
    };
    for root in roots {
        walk(root, &mut collector);
    }
    collector.languages.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdm_ir::DocumentKind;

    fn element() -> Element {
        let kind = DocumentKind::Base;
        Element::new(ELEMENT_TAG, kind)
            .with_attribute("id", "jobInfo")
            .with_child(
                Element::new(KEY_FIELDS_TAG, kind)
                    .with_child(Element::new(FIELD_REF_TAG, kind).with_attribute("refid", "start-date")),
            )
            .with_child(
                Element::new(FIELD_TAG, kind)
                    .with_attribute("id", "start-date")
                    .with_attribute("type", "date")
                    .with_attribute("required", "true")
                    .with_child(
                        Element::new(LABEL_TAG, kind)
                            .with_attribute("lang", "en-us")
                            .with_text("Start Date"),
                    ),
            )
            .with_child(
                Element::new("section", kind).with_child(
                    Element::new(FIELD_TAG, kind)
                        .with_attribute("id", "event-reason")
                        .with_attribute("max-length", "32")
                        .with_child(
                            Element::new("picklist", kind)
                                .with_child(Element::new("option", kind).with_attribute("value", "HIR"))
                                .with_child(Element::new("option", kind).with_text("TER")),
                        ),
                ),
            )
            .with_child(
                Element::new(FIELD_TAG, kind)
                    .with_attribute("id", "timeInJob")
                    .with_attribute("visibility", "none"),
            )
            .with_child(Element::new(FIELD_TAG, kind).with_attribute("id", "notes"))
    }

    #[test]
    fn test_fields_in_document_order() {
        let fields = FieldExtractor::new().fields_of("jobInfo", &element(), "jobInfo");
        let ids: Vec<_> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["jobInfo_start-date", "jobInfo_event-reason", "jobInfo_notes"]
        );
    }

    #[test]
    fn test_field_attributes() {
        let fields = FieldExtractor::new().fields_of("jobInfo", &element(), "jobInfo");

        let start = &fields[0];
        assert_eq!(start.data_type, DataType::Date);
        assert!(start.required);
        assert!(start.identifying);
        assert_eq!(start.labels, vec![Label::new("en-us", "Start Date")]);

        let reason = &fields[1];
        assert_eq!(reason.data_type, DataType::Enum);
        assert_eq!(reason.max_length, Some(32));
        assert_eq!(reason.allowed_values, vec!["HIR", "TER"]);
        assert!(!reason.identifying);
    }

    #[test]
    fn test_exclusions() {
        let extractor = FieldExtractor::new().with_exclusions(["jobInfo_notes", "event-reason"]);
        let fields = extractor.fields_of("jobInfo", &element(), "jobInfo");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "start-date");
    }

    #[test]
    fn test_declared_languages() {
        let root = element().with_child(
            Element::new(LABEL_TAG, DocumentKind::Base)
                .with_attribute("lang", "es-mx")
                .with_text("Puesto"),
        );
        assert_eq!(declared_languages([&root]), vec!["en-us", "es-mx"]);
    }
}
