//! Traversal and cursor APIs for navigating element trees

use crate::element::Element;

/// A cursor for navigating the element tree while tracking a readable path
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    /// Current element
    element: &'a Element,

    /// Path to current element (for error reporting and traceability)
    path: Vec<String>,
}

/// Trait for traversing the element tree
pub trait Traversal {
    /// Visit an element
    fn visit(&mut self, element: &Element, path: &[String]);

    /// Called when entering an element with children
    fn enter(&mut self, _element: &Element, _path: &[String]) {}

    /// Called when leaving an element with children
    fn leave(&mut self, _element: &Element, _path: &[String]) {}

    /// Returns true if traversal should continue
    fn should_continue(&self) -> bool {
        true
    }
}

/// Path segment for an element: `tag[id]` when it has an id, bare `tag` otherwise
fn segment_for(element: &Element) -> String {
    match element.id() {
        Some(id) => format!("{}[{}]", element.tag, id),
        None => element.tag.clone(),
    }
}

impl<'a> Cursor<'a> {
    /// Create a new cursor at the given element
    #[must_use]
    pub fn new(element: &'a Element) -> Self {
        Self {
            element,
            path: vec![segment_for(element)],
        }
    }

    /// Get the current element
    #[must_use]
    pub fn element(&self) -> &'a Element {
        self.element
    }

    /// Get the current path segments
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Current path joined with `/`
    #[must_use]
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }

    fn descend(&self, child: &'a Element) -> Cursor<'a> {
        let mut path = self.path.clone();
        path.push(segment_for(child));
        Cursor {
            element: child,
            path,
        }
    }

    /// Get all children matching a tag, in document order
    #[must_use]
    pub fn children(&self, tag: &str) -> Vec<Cursor<'a>> {
        self.element
            .find_children(tag)
            .map(|child| self.descend(child))
            .collect()
    }
}

/// Walk the tree depth-first using a visitor
pub fn walk<T: Traversal>(element: &Element, visitor: &mut T) {
    walk_recursive(element, visitor, &mut vec![]);
}

fn walk_recursive<T: Traversal>(element: &Element, visitor: &mut T, path: &mut Vec<String>) {
    if !visitor.should_continue() {
        return;
    }

    visitor.visit(element, path);

    if !element.children.is_empty() {
        visitor.enter(element, path);
        path.push(segment_for(element));

        for child in &element.children {
            walk_recursive(child, visitor, path);
        }

        path.pop();
        visitor.leave(element, path);
    }
}
