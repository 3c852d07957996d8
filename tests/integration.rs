use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn finrag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_finrag"))
}

/// A config with both providers disabled so no command needs the network.
fn setup_test_env(with_corpus: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    if with_corpus {
        fs::create_dir_all(root.join("data")).unwrap();
    }

    let config_content = format!(
        r#"[corpus]
dir = "{root}/data"

[index]
dir = "{root}/rag_index"

[embedding]
provider = "disabled"

[model]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("finrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_finrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = finrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run finrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_status_without_index() {
    let (_tmp, config_path) = setup_test_env(true);

    let (stdout, stderr, success) = run_finrag(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No index"));
}

#[test]
fn test_init_builds_then_reuses() {
    let (_tmp, config_path) = setup_test_env(true);

    let (stdout, stderr, success) = run_finrag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Index built"));

    let (stdout, _, success) = run_finrag(&config_path, &["init"]);
    assert!(success, "second init failed");
    assert!(stdout.contains("Using existing index"));

    let (stdout, _, success) = run_finrag(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("complete"));
    assert!(stdout.contains("entries:         0"));
}

#[test]
fn test_init_missing_corpus_fails() {
    let (_tmp, config_path) = setup_test_env(false);

    let (_, stderr, success) = run_finrag(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("corpus directory does not exist"), "{}", stderr);
}

#[test]
fn test_ask_empty_question() {
    let (_tmp, config_path) = setup_test_env(true);

    let (stdout, _, success) = run_finrag(&config_path, &["ask", ""]);
    assert!(success);
    assert_eq!(stdout.trim(), "query is required");
}

#[test]
fn test_ask_reports_query_errors_as_text() {
    let (_tmp, config_path) = setup_test_env(true);
    run_finrag(&config_path, &["init"]);

    // The disabled embedder cannot embed the query.
    let (stdout, _, success) = run_finrag(&config_path, &["ask", "Is the dividend safe?"]);
    assert!(success);
    assert!(stdout.starts_with("Error during query processing:"), "{}", stdout);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env(true);
    fs::write(
        &config_path,
        "[chunking]\nchunk_size = 10\nchunk_overlap = 10\n",
    )
    .unwrap();

    let (_, stderr, success) = run_finrag(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "{}", stderr);
}
