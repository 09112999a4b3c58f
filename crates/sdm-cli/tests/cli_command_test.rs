use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cargo_bin() -> PathBuf {
    if let Ok(path) = env::var("CARGO_BIN_EXE_sdm") {
        return PathBuf::from(path);
    }

    let target_dir = env::var("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| repo_root().join("target"));
    let executable_name = format!("sdm{}", std::env::consts::EXE_SUFFIX);
    let fallback = target_dir.join("debug").join(executable_name);

    if fallback.exists() {
        return fallback;
    }

    panic!(
        "CARGO_BIN_EXE_sdm is not set and fallback binary was not found at {}",
        fallback.display()
    );
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn fixture(name: &str) -> String {
    repo_root()
        .join("testdata/sdm")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

/// Run against the repository config with a private store
fn run_sdm(store: &Path, args: &[&str]) -> Output {
    let store = format!("fs:{}", store.display());
    Command::new(cargo_bin())
        .current_dir(repo_root())
        .args(["--config", "config/engine.yaml", "--store", &store])
        .args(args)
        .output()
        .expect("run sdm")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "expected {what} to succeed; stdout: {}; stderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn process(store: &Path, out_dir: &Path) -> serde_json::Value {
    let output = run_sdm(
        store,
        &[
            "process",
            "--instance",
            "acme-001",
            "--base",
            &fixture("base.xml"),
            "--overlay",
            &fixture("overlay.xml"),
            "--countries",
            "MEX,USA",
            "--output-dir",
            &out_dir.to_string_lossy(),
        ],
    );
    assert_success(&output, "process");
    stdout_json(&output)
}

#[test]
fn process_writes_record_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let out = dir.path().join("out");

    let summary = process(&store, &out);
    let record = &summary["records"][0];
    assert_eq!(record["instance_id"], "acme-001");
    assert_eq!(record["version"], 1);
    assert!(record["field_count"].as_u64().unwrap() > 0);

    let csv = out.join("golden_record_template_en-us_MEX_USA.csv");
    assert!(csv.exists(), "record should be written to {}", csv.display());
    let label = record["version_label"].as_str().unwrap();
    assert!(out.join(format!("acme-001_{label}_metadata.json")).exists());

    let second = process(&store, &out);
    assert_eq!(second["records"][0]["version"], 2);

    let output = run_sdm(&store, &["versions", "--instance", "acme-001"]);
    assert_success(&output, "versions");
    let versions = stdout_json(&output);
    assert_eq!(versions.as_array().unwrap().len(), 2);
}

#[test]
fn validate_rendered_record_and_export_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let out = dir.path().join("out");
    process(&store, &out);

    let csv = out.join("golden_record_template_en-us_MEX_USA.csv");
    let report_csv = dir.path().join("report.csv");
    let report_json = dir.path().join("report.json");
    let output = run_sdm(
        &store,
        &[
            "validate",
            "--instance",
            "acme-001",
            "--version",
            "v1",
            &csv.to_string_lossy(),
            "--report",
            &report_csv.to_string_lossy(),
            "--json",
            &report_json.to_string_lossy(),
        ],
    );
    assert_success(&output, "validate");
    let summary = stdout_json(&output);
    assert_eq!(summary["summary"]["is_valid"], true);

    let exported = fs::read_to_string(&report_csv).unwrap();
    assert_eq!(exported.trim_end(), "row,field,error_type,message");

    let converted = dir.path().join("converted.csv");
    let output = run_sdm(
        &store,
        &[
            "export-report",
            &report_json.to_string_lossy(),
            &converted.to_string_lossy(),
        ],
    );
    assert_success(&output, "export-report");
    assert_eq!(fs::read_to_string(&converted).unwrap(), exported);
}

#[test]
fn validate_unknown_instance_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    fs::write(&input, "a,b\r\n1,2\r\n").unwrap();

    let output = run_sdm(
        &dir.path().join("store"),
        &["validate", "--instance", "nobody", &input.to_string_lossy()],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No metadata for 'nobody'"), "stderr: {stderr}");
}

#[test]
fn split_writes_archive() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let out = dir.path().join("out");
    process(&store, &out);

    let archive = dir.path().join("layouts.zip");
    let output = run_sdm(
        &store,
        &[
            "split",
            "--instance",
            "acme-001",
            &out.join("golden_record_template_en-us_MEX_USA.csv").to_string_lossy(),
            &archive.to_string_lossy(),
        ],
    );
    assert_success(&output, "split");
    let listing = stdout_json(&output);
    let files = listing["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["name"], "acme-001_MEX_en-us.csv");
    assert!(fs::metadata(&archive).unwrap().len() > 0);
}

#[test]
fn countries_lists_overlay_codes() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_sdm(&dir.path().join("store"), &["countries", &fixture("overlay.xml")]);
    assert_success(&output, "countries");

    let countries = stdout_json(&output);
    let codes: Vec<&str> = countries
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["MEX", "USA"]);
}

#[test]
fn unknown_country_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_sdm(
        &dir.path().join("store"),
        &[
            "process",
            "--instance",
            "acme-001",
            "--base",
            &fixture("base.xml"),
            "--overlay",
            &fixture("overlay.xml"),
            "--countries",
            "BRA",
            "--output-dir",
            &dir.path().join("out").to_string_lossy(),
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown country 'BRA'"));
}
