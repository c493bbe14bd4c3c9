#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const CONFIG: &str = r#"
[backend]
uri = "bolt://graph.internal:7687"
user = "reader"
password = "hunter2"
statement_timeout_ms = 2500

[server]
port = 8081
allow_origins = ["https://ops.example.com"]
"#;

fn write_config(dir: &TempDir) -> String {
    let path = dir.path().join("graphgate.toml");
    fs::write(&path, CONFIG).expect("write config");
    path.display().to_string()
}

#[test]
fn config_json_is_resolved_and_redacted() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir);

    let output = cargo_bin_cmd!("graphgate")
        .env_remove("NEO4J_URI")
        .env_remove("NEO4J_USER")
        .env_remove("NEO4J_PASSWORD")
        .args(["--config", config.as_str(), "--user", "writer", "--format", "json", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(value["backend"]["uri"], "bolt://graph.internal:7687");
    assert_eq!(value["backend"]["user"], "writer");
    assert_eq!(value["backend"]["password"], "********");
    assert_eq!(value["backend"]["statement_timeout_ms"], 2500);
    assert_eq!(value["server"]["port"], 8081);
    assert!(!String::from_utf8_lossy(&output).contains("hunter2"));
}

#[test]
fn config_text_masks_password_from_environment() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir);

    let output = cargo_bin_cmd!("graphgate")
        .env("NEO4J_PASSWORD", "from-env-secret")
        .env("NEO4J_URI", "bolt://env-host:7687")
        .args(["--config", config.as_str(), "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("uri = bolt://env-host:7687"));
    assert!(text.contains("password = ********"));
    assert!(!text.contains("from-env-secret"));
    assert!(!text.contains("hunter2"));
}

#[test]
fn missing_config_file_fails() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("absent.toml").display().to_string();

    let output = cargo_bin_cmd!("graphgate")
        .args(["--config", missing.as_str(), "config"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("does not exist"));
}

#[test]
fn invalid_config_values_fail() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[backend]\nmax_connections = 0\n").expect("write config");
    let path = path.display().to_string();

    cargo_bin_cmd!("graphgate")
        .args(["--config", path.as_str(), "config"])
        .assert()
        .failure();
}

#[test]
fn query_rejects_non_object_params_before_connecting() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir);

    let output = cargo_bin_cmd!("graphgate")
        .args([
            "--config",
            config.as_str(),
            "query",
            "RETURN $x AS x",
            "--params",
            "[1, 2]",
        ])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("--params must be a JSON object"));
}

#[test]
fn empty_query_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir);

    let output = cargo_bin_cmd!("graphgate")
        .args(["--config", config.as_str(), "query", "  "])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("No query provided"));
}

#[test]
fn serve_failure_is_reported_once() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(&dir);
    let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = taken.local_addr().expect("addr").port().to_string();

    let output = cargo_bin_cmd!("graphgate")
        .args([
            "--config",
            config.as_str(),
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            port.as_str(),
        ])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert_eq!(stderr.matches("failed to serve HTTP").count(), 1, "{stderr}");
}
