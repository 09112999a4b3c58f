//! Element types for the document tree
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use serde::{Deserialize, Serialize};

use crate::document::DocumentKind;
use crate::metadata::Position;

/// A single attribute, kept in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A node in the parsed document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Tag name (qualified as read, logical after normalization)
    pub tag: String,

    /// Attributes in document order
    pub attributes: Vec<Attribute>,

    /// Child elements in document order
    pub children: Vec<Element>,

    /// Text content, if any
    pub text: Option<String>,

    /// Which document this element was read from
    pub origin: DocumentKind,

    /// Where the start tag was found
    pub position: Position,
}

impl Element {
    /// Create a new element with no attributes or children
    pub fn new(tag: impl Into<String>, origin: DocumentKind) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
            origin,
            position: Position::default(),
        }
    }

    /// Builder: append an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder: append a child
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder: set the source position
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Set an attribute, replacing the value if the name already exists
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            self.attributes.push(Attribute { name, value });
        }
        self
    }

    /// Look up an attribute value by exact name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Whether an attribute is present and reads as a true flag
    pub fn flag(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1"
            )
        })
    }

    /// The `id` attribute, which names most elements in the model
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// Find the first child with the given tag
    pub fn find_child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Iterate children with the given tag
    pub fn find_children<'a, 't>(
        &'a self,
        tag: &'t str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 't> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Count this element and all of its descendants
    pub fn element_count(&self) -> usize {
        1 + self.children.iter().map(Element::element_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str) -> Element {
        Element::new("hris-field", DocumentKind::Base).with_attribute("id", id)
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let element = Element::new("hris-field", DocumentKind::Base)
            .with_attribute("id", "firstName")
            .with_attribute("visibility", "both")
            .with_attribute("required", "true");

        let names: Vec<&str> = element.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "visibility", "required"]);
    }

    #[test]
    fn test_set_attribute_replaces_in_place() {
        let mut element = field("firstName").with_attribute("required", "false");
        element.set_attribute("id", "lastName");

        assert_eq!(element.id(), Some("lastName"));
        assert_eq!(element.attributes[0].name, "id");
        assert_eq!(element.attributes.len(), 2);
    }

    #[test]
    fn test_flag_parsing() {
        let element = field("x")
            .with_attribute("required", "TRUE")
            .with_attribute("business-key", "no");

        assert!(element.flag("required"));
        assert!(!element.flag("business-key"));
        assert!(!element.flag("missing"));
    }

    #[test]
    fn test_find_children_by_tag() {
        let element = Element::new("hris-element", DocumentKind::Base)
            .with_child(field("a"))
            .with_child(Element::new("label", DocumentKind::Base).with_text("Person"))
            .with_child(field("b"));

        let ids: Vec<&str> = element
            .find_children("hris-field")
            .filter_map(Element::id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            element.find_child("label").and_then(|l| l.text.as_deref()),
            Some("Person")
        );
        assert_eq!(element.element_count(), 4);
    }

    #[test]
    fn test_element_serialization() {
        let element = field("a").with_text("value");
        let json = serde_json::to_string(&element).unwrap();
        let back: Element = serde_json::from_str(&json).unwrap();
        assert_eq!(back, element);
    }
}
