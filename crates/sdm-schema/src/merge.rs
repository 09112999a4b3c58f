//! Base/overlay merge
//!
//! The merge is a pure function of two normalized trees and a country selection.
//! Overlay definitions never remove base fields: a field already present in the
//! base gains a [`CountryVariant`], anything else is appended after the base
//! fields, scoped to its country.

use std::collections::HashSet;

use sdm_ir::{Document, DocumentKind, Element};
use sdm_xml::{COUNTRY_TAG, normalize_language};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extract::{self, FieldExtractor, declared_languages};
use crate::model::{ALL_COUNTRIES, CountryVariant, DataType, Field, FieldSet, Label, MergeMode};
use crate::{Error, Result};

/// Suffix some overlays put on element ids (`jobInfo_csf`)
const OVERLAY_ELEMENT_SUFFIX: &str = "_csf";

/// Options for a merge run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Target language for the resulting field sets
    pub language: String,
    /// Fallback language for label resolution
    pub default_language: String,
    pub mode: MergeMode,
    /// Field names or `{element}_{field}` ids to leave out
    #[serde(default)]
    pub excluded_fields: Vec<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            language: "en-us".to_string(),
            default_language: "en-us".to_string(),
            mode: MergeMode::Combined,
            excluded_fields: Vec::new(),
        }
    }
}

#[allow(clippy::return_self_not_must_use)]
impl MergeOptions {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_exclusions<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields
            .extend(excluded.into_iter().map(Into::into));
        self
    }
}

/// One country grouping found in an overlay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    pub code: String,
    pub field_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

/// A country grouping of the overlay with its resolved code
struct CountryNode<'a> {
    code: String,
    node: &'a Element,
}

/// Overlay contribution of one country, before it is applied to a field list
struct CountryContribution {
    country: String,
    variants: Vec<(String, CountryVariant)>,
    additions: Vec<Field>,
}

/// Merges a base model with an optional country overlay
#[derive(Debug, Clone, Default)]
pub struct Merger {
    options: MergeOptions,
}

impl Merger {
    #[must_use]
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge `base` with `overlay` for the requested countries
    ///
    /// Returns one field set per country in `per_country` mode, otherwise a single
    /// set covering every requested country.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyCountrySelection`] when `countries` is empty, with
    /// [`Error::UnknownCountry`] when a code is absent from the overlay, and with
    /// [`Error::WrongDocumentKind`] when the documents are swapped.
    pub fn merge(
        &self,
        base: &Document,
        overlay: Option<&Document>,
        countries: &[String],
    ) -> Result<Vec<FieldSet>> {
        expect_kind(base, DocumentKind::Base)?;
        if let Some(overlay) = overlay {
            expect_kind(overlay, DocumentKind::Overlay)?;
        }

        let country_nodes = overlay.map(|o| country_nodes(&o.root)).unwrap_or_default();
        let selected = select_countries(countries, &country_nodes)?;

        let extractor = FieldExtractor::new().with_exclusions(self.options.excluded_fields.clone());
        let base_fields = base_fields(&extractor, &base.root);

        let contributions: Vec<CountryContribution> = selected
            .iter()
            .filter_map(|code| country_nodes.iter().find(|c| &c.code == code))
            .map(|country| contribution(&extractor, country, &base_fields))
            .collect();

        let mut roots = vec![&base.root];
        roots.extend(overlay.map(|o| &o.root));
        let declared = declared_languages(roots);
        let language = normalize_language(&self.options.language);

        let sets: Vec<FieldSet> = match self.options.mode {
            MergeMode::PerCountry if !contributions.is_empty() => contributions
                .iter()
                .map(|c| FieldSet {
                    countries: vec![c.country.clone()],
                    language: language.clone(),
                    mode: MergeMode::PerCountry,
                    declared_languages: declared.clone(),
                    fields: apply(&base_fields, std::slice::from_ref(c), true),
                    business_keys: Vec::new(),
                    keyless: false,
                    warnings: Vec::new(),
                })
                .collect(),
            mode => vec![FieldSet {
                countries: selected.clone(),
                language: language.clone(),
                mode,
                declared_languages: declared.clone(),
                fields: apply(&base_fields, &contributions, mode == MergeMode::PerCountry),
                business_keys: Vec::new(),
                keyless: false,
                warnings: Vec::new(),
            }],
        };

        info!(
            base_fields = base_fields.len(),
            countries = ?selected,
            mode = ?self.options.mode,
            sets = sets.len(),
            language = %language,
            "Merged field sets"
        );
        Ok(sets)
    }
}

/// List the country groupings of an overlay, in document order
#[must_use]
pub fn extract_countries(overlay: &Document) -> Vec<CountryInfo> {
    let extractor = FieldExtractor::new();
    country_nodes(&overlay.root)
        .into_iter()
        .map(|country| {
            let field_count = extract::collect_elements(country.node, None)
                .into_iter()
                .map(|element| {
                    let id = element_id(element);
                    extractor.fields_of(&id, element, &id).len()
                })
                .sum();
            CountryInfo {
                code: country.code,
                field_count,
                labels: extract::labels_of(country.node),
            }
        })
        .collect()
}

fn expect_kind(document: &Document, expected: DocumentKind) -> Result<()> {
    if document.kind() == expected {
        Ok(())
    } else {
        Err(Error::WrongDocumentKind {
            expected,
            actual: document.kind(),
            document: document.source_name(),
        })
    }
}

fn element_id(element: &Element) -> String {
    let id = element.id().unwrap_or_default();
    id.strip_suffix(OVERLAY_ELEMENT_SUFFIX).unwrap_or(id).to_string()
}

fn country_code(node: &Element) -> Option<String> {
    ["id", "country-code", "code"]
        .iter()
        .find_map(|name| node.attribute(name))
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
}

fn country_nodes(root: &Element) -> Vec<CountryNode<'_>> {
    fn recurse<'a>(node: &'a Element, out: &mut Vec<CountryNode<'a>>) {
        for child in &node.children {
            if child.tag == COUNTRY_TAG {
                if let Some(code) = country_code(child) {
                    if !out.iter().any(|c| c.code == code) {
                        out.push(CountryNode { code, node: child });
                    }
                }
            } else {
                recurse(child, out);
            }
        }
    }

    let mut out = Vec::new();
    recurse(root, &mut out);
    out
}

/// Resolve the requested codes against the overlay, keeping request order
fn select_countries(requested: &[String], available: &[CountryNode<'_>]) -> Result<Vec<String>> {
    if requested.iter().all(|c| c.trim().is_empty()) {
        return Err(Error::EmptyCountrySelection);
    }

    let mut selected: Vec<String> = Vec::new();
    for code in requested {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            continue;
        }
        if code == ALL_COUNTRIES {
            for country in available {
                if !selected.contains(&country.code) {
                    selected.push(country.code.clone());
                }
            }
        } else if available.iter().any(|c| c.code == code) {
            if !selected.contains(&code) {
                selected.push(code);
            }
        } else {
            return Err(Error::unknown_country(
                code,
                available.iter().map(|c| c.code.clone()).collect(),
            ));
        }
    }
    Ok(selected)
}

fn base_fields(extractor: &FieldExtractor, root: &Element) -> Vec<Field> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut fields = Vec::new();

    for element in extract::collect_elements(root, Some(COUNTRY_TAG)) {
        let id = element_id(element);
        if id.is_empty() {
            continue;
        }
        let path = format!("{}/{}[{id}]", root.tag, extract::ELEMENT_TAG);
        for field in extractor.fields_of(&id, element, &path) {
            if seen.insert(field.id.clone()) {
                fields.push(field);
            }
        }
    }
    debug!(fields = fields.len(), "Extracted base fields");
    fields
}

fn contribution(
    extractor: &FieldExtractor,
    country: &CountryNode<'_>,
    base_fields: &[Field],
) -> CountryContribution {
    let code = &country.code;
    let mut variants = Vec::new();
    let mut additions: Vec<Field> = Vec::new();

    for element in extract::collect_elements(country.node, None) {
        let id = element_id(element);
        if id.is_empty() {
            continue;
        }
        let path = format!("{COUNTRY_TAG}[{code}]/{}[{id}]", extract::ELEMENT_TAG);

        for mut field in extractor.fields_of(&id, element, &path) {
            if base_fields.iter().any(|b| b.id == field.id) {
                let variant = CountryVariant {
                    country: code.clone(),
                    labels: std::mem::take(&mut field.labels),
                    data_type: declared_type(element, &field.name),
                    path: field.path,
                };
                variants.push((field.id, variant));
            } else {
                field.id = format!("{code}_{}", field.id);
                field.country.clone_from(code);
                if !additions.iter().any(|a| a.id == field.id) {
                    additions.push(field);
                }
            }
        }
    }

    debug!(
        country = %code,
        variants = variants.len(),
        additions = additions.len(),
        "Collected overlay contribution"
    );
    CountryContribution {
        country: code.clone(),
        variants,
        additions,
    }
}

/// The overlay's explicit type for a field, ignoring inferred types
fn declared_type(element: &Element, name: &str) -> Option<DataType> {
    fn find<'a>(node: &'a Element, name: &str) -> Option<&'a Element> {
        node.children.iter().find_map(|child| {
            if child.tag == extract::FIELD_TAG && child.id() == Some(name) {
                Some(child)
            } else if child.tag == extract::ELEMENT_TAG {
                None
            } else {
                find(child, name)
            }
        })
    }

    find(element, name)
        .and_then(|node| node.attribute("type"))
        .and_then(DataType::from_declared)
}

/// Build the ordered field list: base fields with variants, then additions
fn apply(base: &[Field], contributions: &[CountryContribution], override_types: bool) -> Vec<Field> {
    let mut fields: Vec<Field> = base.to_vec();

    for contribution in contributions {
        for (id, variant) in &contribution.variants {
            let Some(field) = fields.iter_mut().find(|f| &f.id == id) else {
                continue;
            };
            if override_types {
                if let Some(data_type) = variant.data_type {
                    field.data_type = data_type;
                }
                overlay_labels(&mut field.labels, &variant.labels);
            }
            field.variants.push(variant.clone());
        }
    }

    for contribution in contributions {
        fields.extend(contribution.additions.iter().cloned());
    }
    fields
}

/// Replace labels sharing a language, append the rest
fn overlay_labels(labels: &mut Vec<Label>, overrides: &[Label]) {
    for label in overrides {
        match labels.iter_mut().find(|l| l.lang == label.lang) {
            Some(existing) => existing.text.clone_from(&label.text),
            None => labels.push(label.clone()),
        }
    }
}
