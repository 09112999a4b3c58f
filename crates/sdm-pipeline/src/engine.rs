//! Request-level engine operations

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use sdm_csv::{GoldenMode, GoldenRecordGenerator, LayoutSplitter, SplitOutput};
use sdm_ir::{Document, DocumentKind};
use sdm_schema::{
    Categorizer, CountryInfo, FieldSet, KeyCatalog, MergeMode, MergeOptions, Merger,
    MetadataDocument, Provenance, Warning,
};
use sdm_store::{AnyStore, MetadataGenerator, VersionEntry, VersionSelector, VersionStore};
use sdm_validation::{
    ReportCache, StructuralValidator, ValidationConfig, ValidationReport, ValidationReporter,
};
use sdm_xml::{Normalizer, accept_upload};

use crate::config::EngineConfig;
use crate::policies::PublishPolicy;
use crate::{Error, Result};

/// Input of [`Engine::process`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub instance_id: String,
    pub client: String,
    pub consultant: String,
    /// Raw base document
    pub main_document: Vec<u8>,
    /// Raw country overlay
    pub overlay_document: Option<Vec<u8>>,
    /// Target language; the configured default when absent
    pub language: Option<String>,
    /// Country codes or `ALL`
    pub country_codes: Vec<String>,
    /// Overrides the configured merge mode
    pub mode: Option<MergeMode>,
    /// Overrides the configured golden mode
    pub golden_mode: Option<GoldenMode>,
}

#[allow(clippy::return_self_not_must_use)]
impl ProcessRequest {
    pub fn new(instance_id: impl Into<String>, main_document: impl Into<Vec<u8>>) -> Self {
        Self {
            instance_id: instance_id.into(),
            client: String::new(),
            consultant: String::new(),
            main_document: main_document.into(),
            overlay_document: None,
            language: None,
            country_codes: Vec::new(),
            mode: None,
            golden_mode: None,
        }
    }

    pub fn with_overlay(mut self, overlay: impl Into<Vec<u8>>) -> Self {
        self.overlay_document = Some(overlay.into());
        self
    }

    pub fn with_provenance(mut self, client: impl Into<String>, consultant: impl Into<String>) -> Self {
        self.client = client.into();
        self.consultant = consultant.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_countries<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.country_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_golden_mode(mut self, mode: GoldenMode) -> Self {
        self.golden_mode = Some(mode);
        self
    }
}

/// One published metadata version and its rendered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    pub metadata: MetadataDocument,
    /// Golden Record CSV bytes
    pub csv: Vec<u8>,
    pub field_count: usize,
    /// Suggested file name of the rendered record
    pub output_document_ref: String,
    /// `{instance_id}/{version_label}`
    pub metadata_document_ref: String,
}

/// Result of [`Engine::process`]
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// One entry per field set, in merge order
    pub records: Vec<ProcessedRecord>,
    pub processing_time: Duration,
    pub warnings: Vec<Warning>,
}

impl ProcessOutcome {
    pub fn field_count(&self) -> usize {
        self.records.iter().map(|r| r.field_count).sum()
    }
}

/// Rendered but not yet published
struct PendingRecord {
    document: MetadataDocument,
    csv: Vec<u8>,
    output_document_ref: String,
}

/// Orchestrates processing, validation and splitting over one version store
///
/// Every operation takes `&self`; an engine can be shared across tasks.
#[derive(Debug, Clone)]
pub struct Engine<S> {
    config: EngineConfig,
    categorizer: Categorizer,
    generator: MetadataGenerator<S>,
    validator: StructuralValidator,
    reports: ReportCache,
    policy: PublishPolicy,
}

impl Engine<AnyStore> {
    /// Open the configured store and key catalog
    ///
    /// # Errors
    ///
    /// Fails when the configuration is out of range, the catalog cannot be
    /// loaded or the store cannot be opened.
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = config.store.open().await?;
        let catalog = config.load_catalog()?;
        Self::with_catalog(config, store, catalog)
    }
}

impl<S: VersionStore> Engine<S> {
    /// Engine over `store`, with the catalog named in `config`
    ///
    /// # Errors
    ///
    /// Fails when the configuration is out of range or the catalog cannot be
    /// loaded.
    pub fn new(config: EngineConfig, store: S) -> Result<Self> {
        let catalog = config.load_catalog()?;
        Self::with_catalog(config, store, catalog)
    }

    /// Engine over `store` with an explicit key catalog
    ///
    /// # Errors
    ///
    /// Fails when the configuration is out of range.
    pub fn with_catalog(config: EngineConfig, store: S, catalog: KeyCatalog) -> Result<Self> {
        config.validate()?;
        let validator = StructuralValidator::with_config(ValidationConfig {
            chunk_size: config.chunk_size,
            ..ValidationConfig::default()
        })?;
        debug!(
            backend = store.backend(),
            catalog_elements = catalog.len(),
            publish_attempts = config.publish_attempts,
            "Engine ready"
        );
        Ok(Self {
            categorizer: Categorizer::new(catalog),
            generator: MetadataGenerator::new(store),
            validator,
            reports: ReportCache::new(Duration::from_secs(config.report_ttl_secs)),
            policy: PublishPolicy::new(config.publish_attempts),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.generator.store()
    }

    pub fn reports(&self) -> &ReportCache {
        &self.reports
    }

    /// Load, merge, categorize, render and publish
    ///
    /// Everything up to publishing is checked first, so a parse, merge or
    /// language failure publishes nothing. In per-country mode with several
    /// countries each set is published under `{instance_id}_{COUNTRY}`; when
    /// one of those publishes fails, the versions already published by this
    /// request are deleted again before the error is returned. Their numbers
    /// stay claimed.
    ///
    /// # Errors
    ///
    /// Fails with the loader, merge or render error that stopped processing, or
    /// with the store error of a publish that ran out of attempts.
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let normalizer = Normalizer::new();

        let base = normalizer.normalize(&accept_upload(
            &request.main_document,
            DocumentKind::Base,
            "main_document",
        )?);
        let overlay: Option<Document> = request
            .overlay_document
            .as_deref()
            .map(|bytes| accept_upload(bytes, DocumentKind::Overlay, "overlay_document"))
            .transpose()?
            .map(|doc| normalizer.normalize(&doc));

        let language = request
            .language
            .unwrap_or_else(|| self.config.default_language.clone());
        let options = MergeOptions::default()
            .with_language(language)
            .with_default_language(self.config.default_language.clone())
            .with_mode(request.mode.unwrap_or(self.config.merge_mode))
            .with_exclusions(self.config.excluded_fields.iter().cloned());
        let sets = Merger::new(options).merge(&base, overlay.as_ref(), &request.country_codes)?;

        let golden = GoldenRecordGenerator::new()
            .mode(request.golden_mode.unwrap_or(self.config.golden_mode))
            .sample_rows(self.config.sample_rows);
        let provenance = Provenance::new(request.client, request.consultant);
        let split_instances = sets.len() > 1;

        let mut warnings = Vec::new();
        let mut pending = Vec::with_capacity(sets.len());
        for set in sets {
            let set = self.categorizer.categorize(set);
            warnings.extend(set.warnings.iter().cloned());
            let instance_id = if split_instances {
                format!("{}_{}", request.instance_id, set.countries.join("_"))
            } else {
                request.instance_id.clone()
            };
            let output_document_ref = template_name(&set);
            let document = MetadataDocument::new(
                set,
                instance_id,
                provenance.clone(),
                self.config.header_style,
                self.config.default_language.clone(),
            )?;
            let csv = golden.render_csv(&document)?;
            pending.push(PendingRecord {
                document,
                csv,
                output_document_ref,
            });
        }

        let mut records: Vec<ProcessedRecord> = Vec::with_capacity(pending.len());
        for record in pending {
            let document = record.document;
            let published = self
                .policy
                .run(|_| self.generator.publish(document.clone()))
                .await;
            let metadata = match published {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(
                        instance_id = %document.instance_id,
                        published = records.len(),
                        error = %err,
                        "Publish failed; withdrawing versions published by this request"
                    );
                    self.withdraw(&records).await;
                    return Err(err.into());
                }
            };
            records.push(ProcessedRecord {
                field_count: metadata.fields.len(),
                metadata_document_ref: format!("{}/{}", metadata.instance_id, metadata.version_label),
                metadata,
                csv: record.csv,
                output_document_ref: record.output_document_ref,
            });
        }

        let outcome = ProcessOutcome {
            records,
            processing_time: started.elapsed(),
            warnings,
        };
        info!(
            instance_id = %request.instance_id,
            records = outcome.records.len(),
            fields = outcome.field_count(),
            warnings = outcome.warnings.len(),
            elapsed_ms = u64::try_from(outcome.processing_time.as_millis()).unwrap_or(u64::MAX),
            "Processed documents"
        );
        Ok(outcome)
    }

    /// Delete versions published earlier in a failed request
    async fn withdraw(&self, records: &[ProcessedRecord]) {
        for record in records {
            let metadata = &record.metadata;
            match self
                .generator
                .delete(&metadata.instance_id, metadata.version)
                .await
            {
                Ok(()) => debug!(
                    instance_id = %metadata.instance_id,
                    version = metadata.version,
                    "Withdrew published version"
                ),
                Err(err) => warn!(
                    instance_id = %metadata.instance_id,
                    version = metadata.version,
                    error = %err,
                    "Could not withdraw published version"
                ),
            }
        }
    }

    /// Load a published metadata document
    ///
    /// # Errors
    ///
    /// Returns a `MetadataNotFound` store error when nothing matches.
    pub async fn load_metadata(
        &self,
        instance_id: &str,
        selector: &VersionSelector,
    ) -> Result<MetadataDocument> {
        Ok(self.generator.load(instance_id, selector).await?)
    }

    /// Validate a submitted record against a published version and cache the
    /// report for export
    ///
    /// # Errors
    ///
    /// Aborts only when the metadata is missing, the store fails or the input
    /// is not readable CSV; every other finding is collected in the report.
    pub async fn validate(
        &self,
        instance_id: &str,
        selector: &VersionSelector,
        csv: &[u8],
    ) -> Result<Arc<ValidationReport>> {
        let document = self.load_metadata(instance_id, selector).await?;
        let report = self.validator.validate(&document, csv)?;
        if !report.is_valid() {
            warn!(
                instance_id,
                version = report.version,
                errors = report.summary.error_count,
                "Submitted record has validation errors"
            );
        }
        Ok(self.reports.insert(report))
    }

    /// Cached report by validation id
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReportNotFound`] when the report was never cached or has
    /// expired.
    pub fn report(&self, validation_id: &Uuid) -> Result<Arc<ValidationReport>> {
        self.reports
            .get(validation_id)
            .ok_or(Error::ReportNotFound {
                validation_id: *validation_id,
            })
    }

    /// Cached report as `row,field,error_type,message` CSV
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReportNotFound`] for unknown or expired ids.
    pub fn export_report(&self, validation_id: &Uuid) -> Result<Vec<u8>> {
        let report = self.report(validation_id)?;
        Ok(ValidationReporter::new().to_csv(&report)?)
    }

    /// Split a combined record into per-country layouts of a published version
    ///
    /// # Errors
    ///
    /// Fails when the metadata is missing or the record header disagrees with it.
    pub async fn split(
        &self,
        csv: &[u8],
        instance_id: &str,
        selector: &VersionSelector,
    ) -> Result<SplitOutput> {
        let document = self.load_metadata(instance_id, selector).await?;
        Ok(LayoutSplitter::new().split(csv, &document)?)
    }

    /// Country groupings of an overlay document
    ///
    /// # Errors
    ///
    /// Fails when the bytes are not a well-formed overlay.
    pub fn extract_countries(&self, overlay: &[u8]) -> Result<Vec<CountryInfo>> {
        let document = Normalizer::new().normalize(&accept_upload(
            overlay,
            DocumentKind::Overlay,
            "overlay_document",
        )?);
        let countries = sdm_schema::extract_countries(&document);
        debug!(countries = countries.len(), "Extracted overlay countries");
        Ok(countries)
    }

    /// Published versions of an instance, oldest first
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_versions(&self, instance_id: &str) -> Result<Vec<VersionEntry>> {
        Ok(self.generator.versions(instance_id).await?)
    }

    /// Remove a published version; its number is never handed out again
    ///
    /// # Errors
    ///
    /// Returns a `MetadataNotFound` store error when the version is not published.
    pub async fn delete_version(&self, instance_id: &str, version: u32) -> Result<()> {
        Ok(self.generator.delete(instance_id, version).await?)
    }
}

/// `golden_record_template_{lang}[_{COUNTRIES}].csv`, countries sorted
fn template_name(set: &FieldSet) -> String {
    let mut countries = set.countries.clone();
    countries.sort();
    if countries.is_empty() {
        format!("golden_record_template_{}.csv", set.language)
    } else {
        format!("golden_record_template_{}_{}.csv", set.language, countries.join("_"))
    }
}
