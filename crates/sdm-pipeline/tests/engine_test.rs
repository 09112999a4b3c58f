//! Engine operations over the fixture model

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use sdm_pipeline::{
    Engine, EngineConfig, ErrorKind, ProcessRequest, StoreConfig, VersionSelector,
};
use sdm_schema::MergeMode;
use sdm_store::{MemoryVersionStore, StoredVersion, VersionEntry, VersionStore};
use sdm_validation::ErrorType;
use uuid::Uuid;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture(name: &str) -> Vec<u8> {
    fs::read(repo_root().join("testdata/sdm").join(name)).expect("fixture should exist")
}

fn config() -> EngineConfig {
    EngineConfig {
        key_catalog: Some(repo_root().join("config/business_keys.yaml")),
        ..EngineConfig::default()
    }
}

fn engine() -> Engine<MemoryVersionStore> {
    Engine::new(config(), MemoryVersionStore::new()).expect("engine should build")
}

/// Memory store that fails every publish of one instance
#[derive(Debug, Clone)]
struct RefusingStore {
    inner: MemoryVersionStore,
    refused: &'static str,
}

impl VersionStore for RefusingStore {
    fn backend(&self) -> &'static str {
        "refusing"
    }

    async fn next_version(&self, instance_id: &str) -> sdm_store::Result<u32> {
        self.inner.next_version(instance_id).await
    }

    async fn put(&self, version: &StoredVersion) -> sdm_store::Result<()> {
        if version.instance_id == self.refused {
            return Err(sdm_store::Error::persistence(
                &version.instance_id,
                version.version,
                "disk full",
            ));
        }
        self.inner.put(version).await
    }

    async fn get(
        &self,
        instance_id: &str,
        selector: &VersionSelector,
    ) -> sdm_store::Result<StoredVersion> {
        self.inner.get(instance_id, selector).await
    }

    async fn list_versions(&self, instance_id: &str) -> sdm_store::Result<Vec<VersionEntry>> {
        self.inner.list_versions(instance_id).await
    }

    async fn delete(&self, instance_id: &str, version: u32) -> sdm_store::Result<()> {
        self.inner.delete(instance_id, version).await
    }
}

fn request(countries: &[&str]) -> ProcessRequest {
    ProcessRequest::new("acme-001", fixture("base.xml"))
        .with_overlay(fixture("overlay.xml"))
        .with_provenance("Acme", "jdoe")
        .with_countries(countries.iter().copied())
}

#[tokio::test]
async fn test_process_then_validate_clean() {
    let engine = engine();
    let outcome = engine.process(request(&["ALL"])).await.unwrap();

    assert_eq!(outcome.records.len(), 1);
    let record = &outcome.records[0];
    assert_eq!(record.metadata.version, 1);
    assert_eq!(record.field_count, record.metadata.fields.len());
    assert_eq!(
        record.output_document_ref,
        "golden_record_template_en-us_MEX_USA.csv"
    );
    assert_eq!(
        record.metadata_document_ref,
        format!("acme-001/{}", record.metadata.version_label)
    );
    assert!(!record.metadata.keyless);

    let report = engine
        .validate("acme-001", &VersionSelector::Latest, &record.csv)
        .await
        .unwrap();
    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.summary.rows, 3);

    let export = engine.export_report(&report.validation_id).unwrap();
    let export = String::from_utf8(export).unwrap();
    assert_eq!(export.trim_end(), "row,field,error_type,message");
}

#[tokio::test]
async fn test_versions_increase_per_process() {
    let engine = engine();
    engine.process(request(&["MEX"])).await.unwrap();
    engine.process(request(&["MEX"])).await.unwrap();
    engine.delete_version("acme-001", 2).await.unwrap();
    let third = engine.process(request(&["MEX"])).await.unwrap();

    assert_eq!(third.records[0].metadata.version, 3);
    let versions: Vec<u32> = engine
        .list_versions("acme-001")
        .await
        .unwrap()
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, vec![1, 3]);

    let loaded = engine
        .load_metadata("acme-001", &"v1".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn test_per_country_publishes_one_instance_per_country() {
    let engine = engine();
    let outcome = engine
        .process(request(&["MEX", "USA"]).with_mode(MergeMode::PerCountry))
        .await
        .unwrap();

    let instances: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.metadata.instance_id.as_str())
        .collect();
    assert_eq!(instances, vec!["acme-001_MEX", "acme-001_USA"]);
    assert!(outcome.records.iter().all(|r| r.metadata.version == 1));
    assert!(engine.list_versions("acme-001").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failures_publish_nothing() {
    let engine = engine();

    let err = engine.process(request(&["BRA"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCountry);

    let err = engine
        .process(request(&["MEX"]).with_language("de-DE"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);

    let err = engine.process(request(&[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyCountrySelection);

    let swapped = ProcessRequest::new("acme-001", fixture("overlay.xml")).with_countries(["ALL"]);
    let err = engine.process(swapped).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedDocumentKind);

    let broken = ProcessRequest::new("acme-001", b"<succession-data-model>".to_vec())
        .with_countries(["ALL"]);
    let err = engine.process(broken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);

    assert!(engine.list_versions("acme-001").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_country_publish_withdraws_earlier_sets() {
    let memory = MemoryVersionStore::new();
    let store = RefusingStore {
        inner: memory.clone(),
        refused: "acme-001_USA",
    };
    let engine = Engine::new(config(), store).unwrap();

    let err = engine
        .process(request(&["MEX", "USA"]).with_mode(MergeMode::PerCountry))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceError);
    assert!(!err.is_retryable());

    assert!(memory.list_versions("acme-001_MEX").await.unwrap().is_empty());
    assert!(memory.list_versions("acme-001_USA").await.unwrap().is_empty());
    // The withdrawn number stays claimed
    assert_eq!(memory.next_version("acme-001_MEX").await.unwrap(), 2);
}

#[tokio::test]
async fn test_validate_without_metadata() {
    let engine = engine();
    let err = engine
        .validate("nobody", &VersionSelector::Latest, b"a,b\r\n")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataNotFound);
}

#[tokio::test]
async fn test_duplicate_row_reported_and_exported() {
    let engine = engine();
    let outcome = engine.process(request(&["ALL"])).await.unwrap();
    let text = String::from_utf8(outcome.records[0].csv.clone()).unwrap();
    let last = text.trim_end().lines().last().unwrap().to_string();
    let submitted = format!("{}\r\n{last}\r\n", text.trim_end());

    let report = engine
        .validate("acme-001", &VersionSelector::Latest, submitted.as_bytes())
        .await
        .unwrap();
    assert_eq!(report.count_of(ErrorType::DuplicateKey), 1);
    assert_eq!(report.count_of(ErrorType::TypeMismatch), 0);

    let cached = engine.report(&report.validation_id).unwrap();
    assert!(Arc::ptr_eq(&cached, &report));
    let export = String::from_utf8(engine.export_report(&report.validation_id).unwrap()).unwrap();
    assert!(export.contains("DuplicateKey"));
}

#[tokio::test]
async fn test_reports_expire() {
    let engine = Engine::new(
        EngineConfig {
            report_ttl_secs: 0,
            ..config()
        },
        MemoryVersionStore::new(),
    )
    .unwrap();
    let outcome = engine.process(request(&["MEX"])).await.unwrap();
    let report = engine
        .validate("acme-001", &VersionSelector::Latest, &outcome.records[0].csv)
        .await
        .unwrap();

    let err = engine.export_report(&report.validation_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReportNotFound);
    assert_eq!(
        engine.report(&Uuid::new_v4()).unwrap_err().kind(),
        ErrorKind::ReportNotFound
    );
}

#[tokio::test]
async fn test_split_published_record() {
    let engine = engine();
    let outcome = engine.process(request(&["ALL"])).await.unwrap();

    let split = engine
        .split(&outcome.records[0].csv, "acme-001", &VersionSelector::Latest)
        .await
        .unwrap();
    let countries: Vec<&str> = split.files.iter().map(|f| f.country.as_str()).collect();
    assert_eq!(countries, vec!["MEX", "USA"]);
    assert!(!split.archive.is_empty());
}

#[tokio::test]
async fn test_extract_countries() {
    let engine = engine();
    let countries = engine.extract_countries(&fixture("overlay.xml")).unwrap();
    let codes: Vec<&str> = countries.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["MEX", "USA"]);
    assert!(countries.iter().all(|c| c.field_count > 0));

    let err = engine.extract_countries(&fixture("base.xml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedDocumentKind);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_get_distinct_versions() {
    let engine = Arc::new(
        Engine::new(
            EngineConfig {
                publish_attempts: 10,
                ..config()
            },
            MemoryVersionStore::new(),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.process(request(&["MEX"])).await.map(|o| o.records[0].metadata.version)
        }));
    }
    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_filesystem_store_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_store(StoreConfig::Filesystem {
        root: dir.path().to_path_buf(),
    });

    let engine = Engine::from_config(config.clone()).await.unwrap();
    engine.process(request(&["USA"])).await.unwrap();

    // A second engine over the same root continues the numbering
    let reopened = Engine::from_config(config).await.unwrap();
    let outcome = reopened.process(request(&["USA"])).await.unwrap();
    assert_eq!(outcome.records[0].metadata.version, 2);
    assert!(dir.path().join("acme-001").exists());
}
