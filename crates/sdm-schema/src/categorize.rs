//! Field categorization and business-key resolution

use tracing::{debug, warn};

use crate::catalog::KeyCatalog;
use crate::model::{Category, Field, FieldSet, Warning, WarningKind};

/// Resolves categories and the business key of a merged field set
///
/// Only structural markers make a field identifying: a key flag on the field, a
/// `key-fields` reference in its element, or an entry in the key catalog.
#[derive(Debug, Clone, Default)]
pub struct Categorizer {
    catalog: KeyCatalog,
}

impl Categorizer {
    #[must_use]
    pub fn new(catalog: KeyCatalog) -> Self {
        Self { catalog }
    }

    fn is_identifying(&self, field: &Field) -> bool {
        field.identifying || self.catalog.is_key(&field.element, &field.name)
    }

    fn category_of(&self, field: &Field) -> Category {
        if self.is_identifying(field) {
            Category::BusinessKey
        } else if field.is_shared() {
            Category::Standard
        } else {
            Category::CountrySpecific
        }
    }

    /// Assign categories and resolve the business key
    ///
    /// An empty key leaves the set keyless with a `NoBusinessKey` warning.
    #[must_use]
    pub fn categorize(&self, mut set: FieldSet) -> FieldSet {
        for field in &mut set.fields {
            field.identifying = self.is_identifying(field);
            field.category = self.category_of(field);
        }

        set.business_keys = set
            .fields
            .iter()
            .filter(|f| f.is_business_key())
            .map(|f| f.id.clone())
            .collect();
        set.warnings.retain(|w| w.kind != WarningKind::NoBusinessKey);
        set.keyless = set.business_keys.is_empty();

        if set.keyless {
            warn!(scope = %set.scope_name(), fields = set.len(), "No business key resolved");
            set.warnings.push(Warning::new(
                WarningKind::NoBusinessKey,
                format!(
                    "no identifying field found for {}; duplicate rows cannot be detected",
                    set.scope_name()
                ),
            ));
        } else {
            debug!(
                scope = %set.scope_name(),
                keys = ?set.business_keys,
                "Resolved business key"
            );
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MergeMode;

    fn set(fields: Vec<Field>) -> FieldSet {
        FieldSet {
            countries: vec!["MEX".to_string()],
            language: "en-us".to_string(),
            mode: MergeMode::Combined,
            declared_languages: vec!["en-us".to_string()],
            fields,
            business_keys: Vec::new(),
            keyless: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_categories() {
        let mut key = Field::new("personInfo", "person-id-external");
        key.identifying = true;
        let standard = Field::new("personInfo", "birth-date");
        let mut local = Field::new("personInfo", "curp");
        local.id = "MEX_personInfo_curp".to_string();
        local.country = "MEX".to_string();

        let out = Categorizer::default().categorize(set(vec![key, standard, local]));

        let categories: Vec<_> = out.fields.iter().map(|f| f.category).collect();
        assert_eq!(
            categories,
            vec![
                Category::BusinessKey,
                Category::Standard,
                Category::CountrySpecific
            ]
        );
        assert_eq!(out.business_keys, vec!["personInfo_person-id-external"]);
        assert!(!out.keyless);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_catalog_marks_keys() {
        let catalog = KeyCatalog::new().with_keys("jobInfo", ["start-date"]);
        let out = Categorizer::new(catalog).categorize(set(vec![
            Field::new("jobInfo", "start-date"),
            Field::new("personInfo", "start-date"),
        ]));
        assert_eq!(out.business_keys, vec!["jobInfo_start-date"]);
    }

    #[test]
    fn test_country_key_outranks_country_specific() {
        let mut field = Field::new("personInfo", "rfc");
        field.country = "MEX".to_string();
        field.identifying = true;
        let out = Categorizer::default().categorize(set(vec![field]));
        assert_eq!(out.fields[0].category, Category::BusinessKey);
    }

    #[test]
    fn test_names_alone_are_not_keys() {
        let out = Categorizer::default().categorize(set(vec![
            Field::new("personInfo", "person-id-external"),
            Field::new("personInfo", "user-id"),
        ]));
        assert!(out.keyless);
        assert!(out.business_keys.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, WarningKind::NoBusinessKey);
    }

    #[test]
    fn test_categorize_twice_keeps_one_warning() {
        let categorizer = Categorizer::default();
        let once = categorizer.categorize(set(vec![Field::new("a", "b")]));
        let twice = categorizer.categorize(once.clone());
        assert_eq!(once, twice);
    }
}
