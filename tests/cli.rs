//! CLI round trip against a SQLite index in a temp directory.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn lexrag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lexrag"))
}

fn setup_env(tmp: &TempDir) -> PathBuf {
    let config_path = tmp.path().join("lexrag.toml");
    let db_path = tmp.path().join("index.sqlite");
    fs::write(
        &config_path,
        format!(
            r#"[chunking]
chunk_size = 50
overlap_fraction = 0.2

[index]
backend = "sqlite"
path = "{}"

[pipeline]
retry_count = 1
retry_backoff_ms = 1
"#,
            db_path.display()
        ),
    )
    .unwrap();
    config_path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(lexrag_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_ingest_ask_delete() {
    let tmp = TempDir::new().unwrap();
    let config = setup_env(&tmp);
    let pdf = tmp.path().join("agreement.pdf");
    fs::write(&pdf, common::notice_agreement()).unwrap();

    let out = run(&config, &["init"]);
    assert!(out.status.success(), "init failed: {:?}", out);
    assert!(stdout(&out).contains("backend: sqlite"));

    let out = run(&config, &["ingest", pdf.to_str().unwrap(), "--json"]);
    assert!(out.status.success(), "ingest failed: {:?}", out);
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["documents_processed"], 1);
    assert!(report["chunks_indexed"].as_u64().unwrap() >= 2);

    let out = run(&config, &["ask", "What is the notice period?", "--json"]);
    assert!(out.status.success(), "ask failed: {:?}", out);
    let answer: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(answer["status"], "grounded");
    assert!(answer["answer_text"].as_str().unwrap().contains("30 days"));
    assert!(!answer["cited_chunk_ids"].as_array().unwrap().is_empty());

    let out = run(&config, &["documents"]);
    assert!(stdout(&out).contains("agreement.pdf"));

    let out = run(&config, &["delete", "agreement.pdf"]);
    assert!(out.status.success(), "delete failed: {:?}", out);
    assert!(!stdout(&out).contains("entries removed: 0"));

    let out = run(&config, &["documents"]);
    assert!(stdout(&out).contains("No documents indexed."));
}

#[test]
fn corrupted_file_is_reported_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = setup_env(&tmp);
    let bad = tmp.path().join("scan.pdf");
    fs::write(&bad, b"%PDF-1.4\ngarbage").unwrap();

    let out = run(&config, &["ingest", bad.to_str().unwrap()]);
    assert!(out.status.success(), "ingest failed: {:?}", out);
    let text = stdout(&out);
    assert!(text.contains("processed: 0"));
    assert!(text.contains("FAILED scan.pdf"));
}

#[test]
fn ask_on_empty_index_is_insufficient() {
    let tmp = TempDir::new().unwrap();
    let config = setup_env(&tmp);

    let out = run(&config, &["ask", "anything"]);
    assert!(out.status.success(), "ask failed: {:?}", out);
    assert!(stdout(&out).starts_with("Insufficient information"));
}

#[test]
fn missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let out = run(&tmp.path().join("nope.toml"), &["documents"]);
    assert!(!out.status.success());
}
