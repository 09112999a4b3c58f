//! # sdm
//!
//! Command-line interface for the Succession Data Model engine.
//!
//! Results are printed to stdout as JSON; logs go to stderr and follow
//! `RUST_LOG` (default `info`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdm_csv::GoldenMode;
use sdm_pipeline::{Engine, EngineConfig, ProcessRequest, StoreConfig, VersionSelector};
use sdm_schema::MergeMode;
use sdm_store::AnyStore;
use sdm_validation::{ValidationReport, ValidationReporter};

/// Store used when neither `--store` nor a config file names one
const DEFAULT_STORE_DIR: &str = ".sdm-store";

#[derive(Parser)]
#[command(name = "sdm")]
#[command(about = "Succession Data Model engine CLI")]
#[command(version)]
struct Cli {
    /// Path to an engine configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Version store: `memory`, `fs:<dir>`, `sql:<path>` or a libsql URL
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Combined,
    PerCountry,
}

impl From<ModeArg> for MergeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Combined => MergeMode::Combined,
            ModeArg::PerCountry => MergeMode::PerCountry,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge documents, publish metadata and render Golden Records
    Process {
        /// Instance identifier
        #[arg(short, long)]
        instance: String,

        /// Base Succession Data Model document
        #[arg(short, long)]
        base: PathBuf,

        /// Country-specific fields overlay
        #[arg(short, long)]
        overlay: Option<PathBuf>,

        /// Country codes, comma separated, or ALL
        #[arg(long, value_delimiter = ',', default_value = "ALL")]
        countries: Vec<String>,

        /// Target language (e.g. en-US, es_MX)
        #[arg(short, long)]
        language: Option<String>,

        /// Merge mode
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Render headers without sample rows
        #[arg(long)]
        header_only: bool,

        #[arg(long, default_value = "")]
        client: String,

        #[arg(long, default_value = "")]
        consultant: String,

        /// Directory for rendered records and metadata
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Validate a filled-in record against published metadata
    Validate {
        #[arg(short, long)]
        instance: String,

        /// Version selector: latest, 3, v3 or YYYYMMDD_v3
        #[arg(short, long, default_value = "latest")]
        version: String,

        /// Submitted CSV file
        input: PathBuf,

        /// Write the row,field,error_type,message export here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the full report as JSON here
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Export a saved JSON report as CSV
    ExportReport {
        /// Report written by `validate --json`
        input: PathBuf,

        /// Output CSV path
        output: PathBuf,
    },

    /// Split a combined record into per-country layout files
    Split {
        #[arg(short, long)]
        instance: String,

        #[arg(short, long, default_value = "latest")]
        version: String,

        /// Combined Golden Record CSV
        input: PathBuf,

        /// Output zip archive
        output: PathBuf,
    },

    /// List published metadata versions
    Versions {
        #[arg(short, long)]
        instance: String,

        /// Delete this version number instead of listing
        #[arg(long)]
        delete: Option<u32>,
    },

    /// List the countries of an overlay document
    Countries {
        /// Country-specific fields overlay
        overlay: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> anyhow::Result<()> {
    fs::write(path, contents).with_context(|| format!("cannot write {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default().with_store(StoreConfig::Filesystem {
            root: DEFAULT_STORE_DIR.into(),
        }),
    };
    if let Some(store) = &cli.store {
        config = config.with_store(store.parse()?);
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = engine_config(&cli)?;
    let engine: Engine<AnyStore> = Engine::from_config(config).await?;

    match cli.command {
        Commands::Process {
            instance,
            base,
            overlay,
            countries,
            language,
            mode,
            header_only,
            client,
            consultant,
            output_dir,
        } => {
            let mut request = ProcessRequest::new(instance, read(&base)?)
                .with_provenance(client, consultant)
                .with_countries(countries);
            if let Some(overlay) = overlay {
                request = request.with_overlay(read(&overlay)?);
            }
            if let Some(language) = language {
                request = request.with_language(language);
            }
            if let Some(mode) = mode {
                request = request.with_mode(mode.into());
            }
            if header_only {
                request = request.with_golden_mode(GoldenMode::HeaderOnly);
            }

            let outcome = engine.process(request).await?;
            fs::create_dir_all(&output_dir)
                .with_context(|| format!("cannot create {}", output_dir.display()))?;

            let mut records = Vec::with_capacity(outcome.records.len());
            for record in &outcome.records {
                let metadata = &record.metadata;
                let csv_path = output_dir.join(&record.output_document_ref);
                let metadata_path = output_dir.join(format!(
                    "{}_{}_metadata.json",
                    metadata.instance_id, metadata.version_label
                ));
                write(&csv_path, &record.csv)?;
                write(&metadata_path, metadata.to_json()?)?;
                info!(csv = %csv_path.display(), metadata = %metadata_path.display(), "Wrote outputs");
                records.push(json!({
                    "instance_id": metadata.instance_id,
                    "version": metadata.version,
                    "version_label": metadata.version_label,
                    "field_count": record.field_count,
                    "business_keys": metadata.business_keys,
                    "output_document_ref": csv_path,
                    "metadata_document_ref": record.metadata_document_ref,
                }));
            }
            print_json(&json!({
                "records": records,
                "field_count": outcome.field_count(),
                "processing_time_ms": u64::try_from(outcome.processing_time.as_millis()).unwrap_or(u64::MAX),
                "warnings": outcome.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }))
        }

        Commands::Validate {
            instance,
            version,
            input,
            report,
            json,
        } => {
            let selector: VersionSelector = version.parse()?;
            let result = engine.validate(&instance, &selector, &read(&input)?).await?;
            if let Some(path) = report {
                write(&path, engine.export_report(&result.validation_id)?)?;
            }
            if let Some(path) = json {
                write(&path, ValidationReporter::new().to_json(&result)?)?;
            }
            print_json(&json!({
                "validation_id": result.validation_id,
                "instance_id": result.instance_id,
                "version_label": result.version_label,
                "summary": result.summary,
            }))
        }

        Commands::ExportReport { input, output } => {
            let report: ValidationReport = serde_json::from_slice(&read(&input)?)
                .with_context(|| format!("{} is not a validation report", input.display()))?;
            write(&output, ValidationReporter::new().to_csv(&report)?)?;
            print_json(&json!({
                "validation_id": report.validation_id,
                "errors": report.errors.len(),
                "output": output,
            }))
        }

        Commands::Split {
            instance,
            version,
            input,
            output,
        } => {
            let selector: VersionSelector = version.parse()?;
            let split = engine.split(&read(&input)?, &instance, &selector).await?;
            write(&output, &split.archive)?;
            print_json(&json!({
                "archive": output,
                "files": split.files,
            }))
        }

        Commands::Versions { instance, delete } => {
            if let Some(version) = delete {
                engine.delete_version(&instance, version).await?;
            }
            let versions = engine.list_versions(&instance).await?;
            print_json(&serde_json::to_value(versions)?)
        }

        Commands::Countries { overlay } => {
            let countries = engine.extract_countries(&read(&overlay)?)?;
            print_json(&serde_json::to_value(countries)?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    run(Cli::parse()).await
}
