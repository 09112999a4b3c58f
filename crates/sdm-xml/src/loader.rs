//! XML loader
//!
//! Parses raw bytes into an [`Element`] tree, records source positions for every
//! start tag and performs a shallow structural check for the declared document kind.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sdm_ir::{
    Document, DocumentKind, DocumentMetadata, Element, Position, PositionTracker, SourceInfo,
};
use tracing::{debug, warn};

use crate::normalizer::local_name;
use crate::{BASE_ROOT, COUNTRY_TAG, Error, OVERLAY_ROOT, Result};

/// Loader for base and overlay documents
#[derive(Debug, Clone)]
pub struct XmlLoader {
    source_name: Option<String>,
    max_depth: usize,
}

struct Frame {
    element: Element,
    text: String,
}

impl XmlLoader {
    /// Create a loader with default limits
    #[must_use]
    pub fn new() -> Self {
        Self {
            source_name: None,
            max_depth: 256,
        }
    }

    /// Name the source for diagnostics (file name, upload id)
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Reject documents nested deeper than `depth`
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn document_name(&self, kind: DocumentKind) -> String {
        self.source_name
            .clone()
            .unwrap_or_else(|| kind.to_string())
    }

    /// Parse and structurally check a document of the expected kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDocument`] for unparsable markup and
    /// [`Error::UnexpectedDocumentKind`] when the structure does not match `expected`.
    pub fn load(&self, input: &[u8], expected: DocumentKind) -> Result<Document> {
        let document = self.parse(input, expected)?;
        check_kind(&document, expected)?;
        debug!(
            kind = %expected,
            document = %document.source_name(),
            elements = document.root.element_count(),
            "Loaded XML document"
        );
        Ok(document)
    }

    /// Parse for well-formedness only, tagging every element with `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDocument`] for unparsable markup.
    pub fn parse(&self, input: &[u8], kind: DocumentKind) -> Result<Document> {
        let name = self.document_name(kind);

        let text = std::str::from_utf8(input).map_err(|e| {
            let valid = &input[..e.valid_up_to()];
            let prefix = String::from_utf8_lossy(valid);
            Error::malformed(
                kind,
                &name,
                Position::from_offset(&prefix, prefix.len()),
                format!("invalid UTF-8: {e}"),
            )
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut metadata = DocumentMetadata::new(kind);
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<Element> = None;
        let mut positions = PositionTracker::new(text);

        loop {
            let offset = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
            let position = positions.advance_to(offset);

            let event = reader.read_event().map_err(|e| {
                let at = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
                Error::malformed(kind, &name, Position::from_offset(text, at), e.to_string())
            })?;

            match event {
                Event::Decl(decl) => {
                    metadata.xml_version = decl
                        .version()
                        .ok()
                        .map(|v| String::from_utf8_lossy(&v).into_owned());
                    metadata.encoding = decl
                        .encoding()
                        .and_then(std::result::Result::ok)
                        .map(|v| String::from_utf8_lossy(&v).into_owned());
                }
                Event::Start(start) => {
                    if stack.len() >= self.max_depth {
                        return Err(Error::malformed(
                            kind,
                            &name,
                            position,
                            format!("nesting deeper than {} levels", self.max_depth),
                        ));
                    }
                    let element = self.build_element(&start, kind, position, &name, &mut metadata)?;
                    stack.push(Frame {
                        element,
                        text: String::new(),
                    });
                }
                Event::Empty(start) => {
                    let element = self.build_element(&start, kind, position, &name, &mut metadata)?;
                    attach(element, &mut stack, &mut root, kind, &name, position)?;
                }
                Event::End(_) => {
                    let Some(frame) = stack.pop() else {
                        return Err(Error::malformed(kind, &name, position, "unbalanced end tag"));
                    };
                    let mut element = frame.element;
                    if !frame.text.trim().is_empty() {
                        element.text = Some(frame.text);
                    }
                    attach(element, &mut stack, &mut root, kind, &name, position)?;
                }
                Event::Text(content) => {
                    let raw = String::from_utf8_lossy(&content);
                    let content = quick_xml::escape::unescape(&raw)
                        .map_err(|e| Error::malformed(kind, &name, position, e.to_string()))?;
                    push_text(&mut stack, &content, kind, &name, position)?;
                }
                Event::CData(content) => {
                    let content = String::from_utf8_lossy(&content);
                    push_text(&mut stack, &content, kind, &name, position)?;
                }
                Event::GeneralRef(reference) => {
                    let resolved = match reference.resolve_char_ref() {
                        Ok(Some(ch)) => ch.to_string(),
                        _ => {
                            let entity = String::from_utf8_lossy(&reference).into_owned();
                            quick_xml::escape::resolve_predefined_entity(&entity)
                                .map(str::to_string)
                                .ok_or_else(|| {
                                    Error::malformed(
                                        kind,
                                        &name,
                                        position,
                                        format!("unknown entity '&{entity};'"),
                                    )
                                })?
                        }
                    };
                    push_text(&mut stack, &resolved, kind, &name, position)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            let position = positions.advance_to(text.len());
            return Err(Error::malformed(
                kind,
                &name,
                position,
                format!("unclosed element <{}>", open.element.tag),
            ));
        }

        let root = root.ok_or_else(|| {
            Error::malformed(kind, &name, Position::new(1, 1, 0), "document has no root element")
        })?;

        metadata.source = Some(
            SourceInfo::new(&name, root.position).with_context(root.tag.clone()),
        );
        metadata.loaded_at = Some(chrono::Utc::now());

        Ok(Document::with_metadata(root, metadata))
    }

    fn build_element(
        &self,
        start: &BytesStart<'_>,
        kind: DocumentKind,
        position: Position,
        name: &str,
        metadata: &mut DocumentMetadata,
    ) -> Result<Element> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut element = Element::new(tag, kind).with_position(position);

        for attribute in start.attributes() {
            let attribute = attribute
                .map_err(|e| Error::malformed(kind, name, position, e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attribute.value).into_owned();
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|e| {
                    Error::malformed(kind, name, position, format!("attribute '{key}': {e}"))
                })?
                .into_owned();

            if key == "xmlns" {
                metadata.namespaces.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                metadata.namespaces.push((prefix.to_string(), value));
            } else {
                element.attributes.push(sdm_ir::Attribute { name: key, value });
            }
        }

        Ok(element)
    }
}

impl Default for XmlLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn attach(
    element: Element,
    stack: &mut [Frame],
    root: &mut Option<Element>,
    kind: DocumentKind,
    name: &str,
    position: Position,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.element.children.push(element);
        Ok(())
    } else if root.is_some() {
        Err(Error::malformed(kind, name, position, "multiple root elements"))
    } else {
        *root = Some(element);
        Ok(())
    }
}

fn push_text(
    stack: &mut [Frame],
    content: &str,
    kind: DocumentKind,
    name: &str,
    position: Position,
) -> Result<()> {
    match stack.last_mut() {
        Some(frame) => {
            frame.text.push_str(content);
            Ok(())
        }
        None if content.trim().is_empty() => Ok(()),
        None => Err(Error::malformed(
            kind,
            name,
            position,
            "text outside of the root element",
        )),
    }
}

fn has_descendant(element: &Element, tag: &str) -> bool {
    element
        .children
        .iter()
        .any(|child| local_name(&child.tag) == tag || has_descendant(child, tag))
}

fn kind_of(root: &Element) -> Option<DocumentKind> {
    match local_name(&root.tag) {
        BASE_ROOT => Some(DocumentKind::Base),
        OVERLAY_ROOT => Some(DocumentKind::Overlay),
        _ => None,
    }
}

/// Structural sanity check for a parsed document.
///
/// Base documents need the `succession-data-model` root. Overlays need the
/// `country-specific-fields` root and at least one `country` grouping.
///
/// # Errors
///
/// Returns [`Error::UnexpectedDocumentKind`] when the check fails.
pub fn check_kind(document: &Document, expected: DocumentKind) -> Result<()> {
    let detected = kind_of(&document.root);
    let name = document.source_name();
    let root_tag = local_name(&document.root.tag);

    match expected {
        DocumentKind::Base if detected != Some(DocumentKind::Base) => Err(Error::unexpected_kind(
            expected,
            detected,
            name,
            format!("root element is <{root_tag}>, not <{BASE_ROOT}>"),
        )),
        DocumentKind::Overlay if detected != Some(DocumentKind::Overlay) => {
            Err(Error::unexpected_kind(
                expected,
                detected,
                name,
                format!("root element is <{root_tag}>, not <{OVERLAY_ROOT}>"),
            ))
        }
        DocumentKind::Overlay if !has_descendant(&document.root, COUNTRY_TAG) => {
            Err(Error::unexpected_kind(
                expected,
                detected,
                name,
                format!("overlay has no <{COUNTRY_TAG}> grouping"),
            ))
        }
        _ => Ok(()),
    }
}

/// Detect the document kind from content alone.
///
/// Returns `Ok(None)` for well-formed XML that is neither kind.
///
/// # Errors
///
/// Returns [`Error::MalformedDocument`] for unparsable markup.
pub fn detect_kind(input: &[u8]) -> Result<Option<DocumentKind>> {
    let document = XmlLoader::new().parse(input, DocumentKind::Base)?;
    let detected = kind_of(&document.root);
    Ok(detected.filter(|kind| check_kind(&document, *kind).is_ok()))
}

/// Upload intake: load bytes declared as `declared`, trusting only the structural check.
///
/// # Errors
///
/// Returns [`Error::MalformedDocument`] or [`Error::UnexpectedDocumentKind`];
/// the latter names the kind the content actually looks like, if any.
pub fn accept_upload(
    input: &[u8],
    declared: DocumentKind,
    source_name: impl Into<String>,
) -> Result<Document> {
    XmlLoader::new()
        .with_source(source_name)
        .load(input, declared)
        .inspect_err(|e| {
            if let Error::UnexpectedDocumentKind {
                detected, document, ..
            } = e
            {
                warn!(
                    declared = %declared,
                    detected = ?detected,
                    document = %document,
                    "Upload does not match its declared kind"
                );
            }
        })
}
