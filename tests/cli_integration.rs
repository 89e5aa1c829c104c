//! CLI integration tests
//!
//! These run the built binary against the JSON review fixtures in
//! `tests/fixtures`, with AI analysis switched off so no network is touched.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn fitsense() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fitsense"));
    cmd.env_remove("RUST_LOG")
        .env_remove("FITSENSE_ADAPTER_TIMEOUT")
        .env_remove("FITSENSE_PIPELINE_TIMEOUT");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("Failed to execute fitsense")
}

#[test]
fn test_cli_help() {
    let output = run(fitsense().arg("--help"));

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("summarize"));
    assert!(stdout.contains("sources"));
}

#[test]
fn test_cli_version() {
    let output = run(fitsense().arg("--version"));

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_summarize_fixtures_as_json() {
    let output = run(fitsense().args([
        "-q",
        "summarize",
        "black satin slip skirt",
        "--no-ai",
        "--format",
        "json",
        "--fixture",
    ])
    .arg(fixture("boutique.json"))
    .arg("--fixture")
    .arg(fixture("marketplace.json")));

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["query"], "black satin slip skirt");
    assert_eq!(summary["total_reviews_considered"], 5);
    assert_eq!(summary["degraded"], true);
    assert_eq!(summary["style_advice"], "");
    assert_eq!(
        summary["sources_succeeded"],
        serde_json::json!(["boutique", "marketplace"])
    );
    assert_eq!(
        summary["sample_image_url"],
        "https://img.example.com/slip-skirt-black.jpg"
    );

    let aspects = summary["aspect_summaries"].as_array().unwrap();
    let fit = aspects
        .iter()
        .find(|a| a["tag"] == "fit")
        .expect("fit aspect");
    assert!(fit["representative_quotes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|q| q["text"].as_str().unwrap_or("").contains("Runs small")));
}

#[test]
fn test_summarize_human_output_to_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("summary.txt");

    let output = run(fitsense()
        .args(["-q", "summarize", "slip skirt", "--no-ai", "--fixture"])
        .arg(fixture("boutique.json"))
        .arg("-o")
        .arg(&out));

    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("Review Summary: slip skirt (degraded)"));
    assert!(text.contains("Aspects:"));
    assert!(text.contains("boutique (fixture)"));
}

#[test]
fn test_missing_fixture_is_a_usage_error() {
    let output = run(fitsense().args([
        "-q",
        "summarize",
        "slip skirt",
        "--no-ai",
        "--fixture",
        "/nonexistent/reviews.json",
    ]));

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read review fixture"));
}

#[test]
fn test_no_usable_reviews_exits_one() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiny.json");
    std::fs::write(&path, r#"[{"text": "ok"}, {"text": "nice"}]"#).unwrap();

    let output = run(fitsense()
        .args(["-q", "summarize", "slip skirt", "--no-ai", "--fixture"])
        .arg(&path));

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No usable reviews found for 'slip skirt'"));
}

#[test]
fn test_inverted_timeouts_rejected() {
    let output = run(fitsense()
        .args([
            "-q",
            "summarize",
            "slip skirt",
            "--no-ai",
            "--adapter-timeout",
            "60",
            "--pipeline-timeout",
            "10",
            "--fixture",
        ])
        .arg(fixture("boutique.json")));

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_sources_report_as_json() {
    let output = run(fitsense().args(["sources", "--format", "json"]));

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let kinds: Vec<&str> = report
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["shopping-search", "site-scrape", "answer-engine", "analysis"]
    );
}
