//! Integration tests for the kms-stream binary.
//! Runs the binary with assert_cmd against a real temp config and an
//! in-process HTTP server. No mocks.

mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use common::{spawn_server_thread, Script};
use predicates::prelude::*;
use std::io::Write as _;
use std::net::TcpListener as StdTcpListener;

/// Pick a free port by binding to :0 and extracting the assigned port.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a minimal YAML config pointing at `url` with no prompt suffix.
fn write_config(dir: &tempfile::TempDir, url: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "api:\n  url: {}\n  username: tester\nstream:\n  prompt_suffix: \"\"",
        url
    )
    .unwrap();
    path
}

fn answer_script() -> Script {
    Script::sse(&[
        "data: {\"type\":\"chat\",\"content\":\"Test \"}\n",
        "data: {'type': 'chat', 'content': 'answer.'}\n",
        "data: {\"type\":\"info\",\"evidence\":\"/docs/a.md\"}\n",
        "data: [DONE]\n",
    ])
}

#[test]
fn prints_streamed_answer_and_evidence() {
    let (url, server) = spawn_server_thread(answer_script());
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &url);

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."))
        .stdout(predicate::str::contains("Evidence (1):"))
        .stdout(predicate::str::contains("/docs/a.md"));

    let body = server.join().unwrap();
    assert!(body.contains("\"message\":\"What is the answer?\""), "{}", body);
    assert!(body.contains("\"username\":\"tester\""), "{}", body);
}

#[test]
fn config_from_env_var() {
    let (url, _server) = spawn_server_thread(answer_script());
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &url);

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.env("KMS_STREAM_CONFIG", &config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn positional_question_and_url_override() {
    let (url, _server) = spawn_server_thread(answer_script());
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, "http://127.0.0.1:1/unused");

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--url")
        .arg(&url)
        .arg("What is the answer?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn single_shot_mode() {
    let (url, server) = spawn_server_thread(Script::json(
        r#"{"response":"Whole answer.","evidence":["/docs/b.md"]}"#,
    ));
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &url);

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--no-stream")
        .arg("question");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Whole answer."))
        .stdout(predicate::str::contains("/docs/b.md"));

    let body = server.join().unwrap();
    assert!(body.contains("\"stream\":false"), "{}", body);
}

#[test]
fn server_down_shows_error() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, &format!("http://127.0.0.1:{}/chat/query", port));

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config").arg(&config_path).write_stdin("hello\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(connect|error|refused)").unwrap());
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg("hello");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn empty_question_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, "http://127.0.0.1:1/chat/query");

    let mut cmd = Command::from(cargo_bin_cmd!("kms-stream"));
    cmd.arg("--config").arg(&config_path).write_stdin("\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no question provided"));
}
