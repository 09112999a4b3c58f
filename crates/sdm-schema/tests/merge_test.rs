//! Merge and categorization over loaded documents

use std::fs;
use std::path::PathBuf;

use sdm_ir::{Document, DocumentKind};
use sdm_schema::{
    Categorizer, Category, DataType, Error, KeyCatalog, Label, MergeMode, MergeOptions, Merger,
    extract_countries,
};
use sdm_xml::{Normalizer, XmlLoader};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn load(input: &[u8], kind: DocumentKind) -> Document {
    let document = XmlLoader::new().load(input, kind).expect("document should load");
    Normalizer::new().normalize(&document)
}

fn fixture(name: &str, kind: DocumentKind) -> Document {
    let data = fs::read(repo_root().join("testdata/sdm").join(name)).expect("fixture should exist");
    load(&data, kind)
}

fn codes(codes: &[&str]) -> Vec<String> {
    codes.iter().map(ToString::to_string).collect()
}

const SMALL_BASE: &str = r#"<succession-data-model>
  <hris-element id="employee">
    <hris-field id="A"><label xml:lang="en_US">A</label></hris-field>
    <hris-field id="B"><label xml:lang="en_US">B</label></hris-field>
  </hris-element>
</succession-data-model>"#;

const SMALL_OVERLAY: &str = r#"<country-specific-fields>
  <country id="MEX">
    <hris-element id="employee_csf">
      <hris-field id="A"><label xml:lang="en_US">A (MEX)</label></hris-field>
      <hris-field id="C"><label xml:lang="en_US">C</label></hris-field>
    </hris-element>
  </country>
</country-specific-fields>"#;

#[test]
fn test_mex_usa_example() {
    let base = load(SMALL_BASE.as_bytes(), DocumentKind::Base);
    let overlay = load(SMALL_OVERLAY.as_bytes(), DocumentKind::Overlay);
    let merger = Merger::new(MergeOptions::default().with_mode(MergeMode::PerCountry));

    let sets = merger.merge(&base, Some(&overlay), &codes(&["MEX"])).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(
        sets[0].field_ids(),
        vec!["employee_A", "employee_B", "MEX_employee_C"]
    );
    assert_eq!(sets[0].fields[0].labels, vec![Label::new("en-us", "A (MEX)")]);

    let err = merger
        .merge(&base, Some(&overlay), &codes(&["USA"]))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownCountry { ref code, .. } if code == "USA"));
}

#[test]
fn test_fixture_merge_all_countries() {
    let base = fixture("base.xml", DocumentKind::Base);
    let overlay = fixture("overlay.xml", DocumentKind::Overlay);

    let sets = Merger::default()
        .merge(&base, Some(&overlay), &codes(&["ALL"]))
        .unwrap();
    assert_eq!(sets.len(), 1);
    let set = &sets[0];

    assert_eq!(set.countries, vec!["MEX", "USA"]);
    assert_eq!(
        set.field_ids(),
        vec![
            "personInfo_person-id-external",
            "personInfo_date-of-birth",
            "personalInfo_first-name",
            "personalInfo_last-name",
            "personalInfo_gender",
            "emailInfo_email-address",
            "emailInfo_isPrimary",
            "MEX_personalInfo_curp",
            "USA_personalInfo_ethnic-group",
            "USA_personalInfo_veteran",
        ]
    );
    assert_eq!(set.declared_languages, vec!["en-us", "es-mx"]);

    let first_name = set.field("personalInfo_first-name").unwrap();
    assert_eq!(first_name.max_length, Some(128));
    assert!(first_name.required);
    assert!(first_name.variant("MEX").is_some());

    let last_name = set.field("personalInfo_last-name").unwrap();
    assert_eq!(last_name.max_length, Some(128));
    assert_eq!(last_name.labels[0].text, "Last Name");

    let gender = set.field("personalInfo_gender").unwrap();
    assert_eq!(gender.data_type, DataType::Enum);
    assert_eq!(gender.allowed_values, vec!["M", "F"]);

    assert!(set.field("personInfo_timeInCompany").is_none());
}

#[test]
fn test_fixture_categorization() {
    let base = fixture("base.xml", DocumentKind::Base);
    let overlay = fixture("overlay.xml", DocumentKind::Overlay);
    let sets = Merger::default()
        .merge(&base, Some(&overlay), &codes(&["MEX"]))
        .unwrap();

    let catalog = KeyCatalog::from_path(repo_root().join("config/business_keys.yaml")).unwrap();
    let set = Categorizer::new(catalog).categorize(sets[0].clone());

    assert_eq!(set.business_keys, vec!["personInfo_person-id-external"]);
    assert!(!set.keyless);
    assert_eq!(
        set.field("MEX_personalInfo_curp").unwrap().category,
        Category::CountrySpecific
    );
    assert_eq!(
        set.field("personalInfo_first-name").unwrap().category,
        Category::Standard
    );
}

#[test]
fn test_normalizing_twice_gives_same_field_set() {
    let raw_base = XmlLoader::new()
        .load(&fs::read(repo_root().join("testdata/sdm/base.xml")).unwrap(), DocumentKind::Base)
        .unwrap();
    let raw_overlay = XmlLoader::new()
        .load(
            &fs::read(repo_root().join("testdata/sdm/overlay.xml")).unwrap(),
            DocumentKind::Overlay,
        )
        .unwrap();

    let normalizer = Normalizer::new();
    let once = (normalizer.normalize(&raw_base), normalizer.normalize(&raw_overlay));
    let twice = (normalizer.normalize(&once.0), normalizer.normalize(&once.1));

    let merger = Merger::default();
    let categorizer = Categorizer::default();
    let from_once: Vec<_> = merger
        .merge(&once.0, Some(&once.1), &codes(&["ALL"]))
        .unwrap()
        .into_iter()
        .map(|s| categorizer.categorize(s))
        .collect();
    let from_twice: Vec<_> = merger
        .merge(&twice.0, Some(&twice.1), &codes(&["ALL"]))
        .unwrap()
        .into_iter()
        .map(|s| categorizer.categorize(s))
        .collect();

    assert_eq!(from_once, from_twice);
}

#[test]
fn test_per_country_sets() {
    let base = fixture("base.xml", DocumentKind::Base);
    let overlay = fixture("overlay.xml", DocumentKind::Overlay);

    let merger = Merger::new(
        MergeOptions::default()
            .with_mode(MergeMode::PerCountry)
            .with_language("es_MX"),
    );
    let sets = merger
        .merge(&base, Some(&overlay), &codes(&["usa", "MEX"]))
        .unwrap();

    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].countries, vec!["USA"]);
    assert_eq!(sets[1].countries, vec!["MEX"]);
    assert_eq!(sets[0].language, "es-mx");
    assert!(sets[0].field("MEX_personalInfo_curp").is_none());
    assert!(sets[1].field("USA_personalInfo_veteran").is_none());
    assert_eq!(sets[0].field("USA_personalInfo_veteran").unwrap().data_type, DataType::Boolean);
}

#[test]
fn test_configured_exclusions() {
    let base = fixture("base.xml", DocumentKind::Base);
    let merger = Merger::new(MergeOptions::default().with_exclusions(["emailInfo_isPrimary"]));
    let sets = merger.merge(&base, None, &codes(&["ALL"])).unwrap();
    assert_eq!(sets[0].len(), 6);
    assert!(sets[0].field("emailInfo_isPrimary").is_none());
}

#[test]
fn test_extract_fixture_countries() {
    let overlay = fixture("overlay.xml", DocumentKind::Overlay);
    let countries = extract_countries(&overlay);
    let summary: Vec<_> = countries
        .iter()
        .map(|c| (c.code.as_str(), c.field_count))
        .collect();
    assert_eq!(summary, vec![("MEX", 2), ("USA", 2)]);
}
