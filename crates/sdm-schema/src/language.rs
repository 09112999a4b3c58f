//! Label resolution across languages and country variants
#![allow(clippy::must_use_candidate)]

use sdm_xml::normalize_language;

use crate::extract::DEFAULT_LABEL_LANGUAGE;
use crate::model::{Field, Label};

/// Which partition a header is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScope<'a> {
    /// Multi-country record: country-only columns carry a `{COUNTRY}: ` prefix
    Combined,
    /// Single-country layout: variant labels win over base labels
    Country(&'a str),
}

fn primary_subtag(code: &str) -> &str {
    code.split('-').next().unwrap_or(code)
}

/// Label in `lang` by exact code, then by primary subtag
fn matching_label<'a>(labels: &'a [Label], lang: &str) -> Option<&'a str> {
    let lang = normalize_language(lang);
    labels
        .iter()
        .find(|l| normalize_language(&l.lang) == lang)
        .or_else(|| {
            let primary = primary_subtag(&lang);
            labels
                .iter()
                .find(|l| primary_subtag(&normalize_language(&l.lang)) == primary)
        })
        .map(|l| l.text.as_str())
}

/// Pick the label for `lang`
///
/// Tries the exact language, the same primary subtag, the default language (or an
/// untagged label), then the first label.
pub fn resolve_label<'a>(labels: &'a [Label], lang: &str, default_lang: &str) -> Option<&'a str> {
    matching_label(labels, lang)
        .or_else(|| matching_label(labels, default_lang))
        .or_else(|| {
            labels
                .iter()
                .find(|l| l.lang == DEFAULT_LABEL_LANGUAGE)
                .map(|l| l.text.as_str())
        })
        .or_else(|| labels.first().map(|l| l.text.as_str()))
}

/// Header text for one column, falling back to the field id
pub fn header_label(field: &Field, lang: &str, default_lang: &str, scope: LabelScope<'_>) -> String {
    match scope {
        LabelScope::Combined => {
            let label = resolve_label(&field.labels, lang, default_lang).unwrap_or(field.id.as_str());
            if field.is_shared() {
                label.to_string()
            } else {
                format!("{}: {label}", field.country)
            }
        }
        LabelScope::Country(country) => field
            .variant(country)
            .and_then(|v| matching_label(&v.labels, lang))
            .or_else(|| resolve_label(&field.labels, lang, default_lang))
            .unwrap_or(field.id.as_str())
            .to_string(),
    }
}

/// Whether `lang` was declared by the sources, exactly or by primary subtag
///
/// A source that declares no language at all accepts any.
pub fn supports_language(declared: &[String], lang: &str) -> bool {
    if declared.is_empty() {
        return true;
    }
    let lang = normalize_language(lang);
    declared.iter().any(|d| {
        let d = normalize_language(d);
        d == lang || primary_subtag(&d) == primary_subtag(&lang)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CountryVariant;

    fn labels() -> Vec<Label> {
        vec![
            Label::new("en-us", "First Name"),
            Label::new("es-es", "Nombre"),
            Label::new("default", "first name"),
        ]
    }

    #[test]
    fn test_resolution_order() {
        let labels = labels();
        assert_eq!(resolve_label(&labels, "en-us", "en-us"), Some("First Name"));
        assert_eq!(resolve_label(&labels, "es-mx", "en-us"), Some("Nombre"));
        assert_eq!(resolve_label(&labels, "fr-fr", "en-us"), Some("First Name"));
        assert_eq!(resolve_label(&labels, "fr-fr", "de-de"), Some("first name"));
        assert_eq!(
            resolve_label(&[Label::new("pt-br", "Nome")], "fr-fr", "de-de"),
            Some("Nome")
        );
        assert_eq!(resolve_label(&[], "en-us", "en-us"), None);
    }

    #[test]
    fn test_resolution_ignores_code_casing() {
        let labels = vec![Label::new("en_US", "First Name")];
        assert_eq!(resolve_label(&labels, "EN-us", "de"), Some("First Name"));
    }

    #[test]
    fn test_combined_prefix() {
        let mut field = Field::new("personInfo", "curp");
        field.id = "MEX_personInfo_curp".to_string();
        field.country = "MEX".to_string();
        field.labels = vec![Label::new("en-us", "CURP")];

        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Combined),
            "MEX: CURP"
        );
        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Country("MEX")),
            "CURP"
        );
    }

    #[test]
    fn test_country_variant_labels() {
        let mut field = Field::new("personInfo", "A");
        field.labels = vec![Label::new("en-us", "Field A")];
        field.variants.push(CountryVariant {
            country: "MEX".to_string(),
            labels: vec![Label::new("en-us", "Field A (MEX)")],
            data_type: None,
            path: String::new(),
        });

        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Country("MEX")),
            "Field A (MEX)"
        );
        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Country("USA")),
            "Field A"
        );
        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Combined),
            "Field A"
        );
    }

    #[test]
    fn test_header_falls_back_to_id() {
        let field = Field::new("personInfo", "B");
        assert_eq!(
            header_label(&field, "en-us", "en-us", LabelScope::Combined),
            "personInfo_B"
        );
    }

    #[test]
    fn test_supports_language() {
        let declared = vec!["en-us".to_string(), "es-mx".to_string()];
        assert!(supports_language(&declared, "en_US"));
        assert!(supports_language(&declared, "es-es"));
        assert!(!supports_language(&declared, "fr-fr"));
        assert!(supports_language(&[], "fr-fr"));
    }
}
