use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/rag.sqlite"

[server]
bind = "127.0.0.1:7332"
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_rag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run rag binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env("");

    let (stdout, stderr, ok) = run_rag(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/rag.sqlite").exists());

    // Idempotent
    let (_, stderr, ok) = run_rag(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_info_on_empty_index() {
    let (_tmp, config) = setup_test_env("");

    let (stdout, stderr, ok) = run_rag(&config, &["info"]);
    assert!(ok, "info failed: {}", stderr);
    assert!(stdout.contains("Chunks:     0"));
    assert!(stdout.contains("Embedding:  disabled"));
    assert!(stdout.contains("Reranker:   disabled"));
}

#[test]
fn test_query_on_empty_index() {
    let (_tmp, config) = setup_test_env("");

    let (stdout, stderr, ok) = run_rag(&config, &["query", "anything"]);
    assert!(ok, "query failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_query_rejects_unknown_search_type() {
    let (_tmp, config) = setup_test_env("");

    let (_, stderr, ok) = run_rag(&config, &["query", "anything", "--search-type", "hamming"]);
    assert!(!ok);
    assert!(stderr.contains("unknown search_type"));
}

#[test]
fn test_add_without_embedding_provider_fails() {
    let (_tmp, config) = setup_test_env("");

    let (_, stderr, ok) = run_rag(&config, &["add", "Rust has a borrow checker"]);
    assert!(!ok);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);

    let (stdout, _, ok) = run_rag(&config, &["info"]);
    assert!(ok);
    assert!(stdout.contains("Chunks:     0"));
}

#[test]
fn test_invalid_config_is_reported() {
    let (_tmp, config) = setup_test_env("[embedding]\nprovider = \"faiss\"\n");

    let (_, stderr, ok) = run_rag(&config, &["info"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_missing_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_rag(&tmp.path().join("nope.toml"), &["info"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
