//! Integration tests for the `buildmart` CLI binary.
//!
//! Argument parsing, completions, config handling and error reporting run
//! without a backend; the `products` tests talk to a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `buildmart` binary with env isolation.
///
/// Clears all `BUILDMART_*` variables and points the config file at
/// `config` so tests never touch the user's real configuration.
fn buildmart_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("buildmart");
    cmd.env("BUILDMART_CONFIG", config)
        .env("HOME", "/tmp/buildmart-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/buildmart-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("BUILDMART_PROFILE")
        .env_remove("BUILDMART_API_URL")
        .env_remove("BUILDMART_TOKEN")
        .env_remove("BUILDMART_OUTPUT")
        .env_remove("BUILDMART_INSECURE")
        .env_remove("BUILDMART_TIMEOUT");
    cmd
}

fn missing_config() -> std::path::PathBuf {
    Path::new("/tmp/buildmart-cli-test-nonexistent/config.toml").to_path_buf()
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = buildmart_cmd(&missing_config()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    buildmart_cmd(&missing_config())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Buildmart")
                .and(predicate::str::contains("products"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_version_flag() {
    buildmart_cmd(&missing_config())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("buildmart"));
}

#[test]
fn test_products_help_lists_actions() {
    buildmart_cmd(&missing_config())
        .args(["products", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("upload")
                .and(predicate::str::contains("delete-media"))
                .and(predicate::str::contains("update")),
        );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    buildmart_cmd(&missing_config())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("buildmart"));
}

#[test]
fn test_completions_zsh() {
    buildmart_cmd(&missing_config())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    buildmart_cmd(&missing_config())
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = buildmart_cmd(&missing_config()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let output = buildmart_cmd(&missing_config())
        .args(["-o", "xml", "products", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("xml"));
}

#[test]
fn test_products_list_without_config() {
    let output = buildmart_cmd(&missing_config())
        .args(["products", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("config init"));
}

#[test]
fn test_unknown_profile_is_reported() {
    let output = buildmart_cmd(&missing_config())
        .args(["--profile", "prod", "products", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("prod"));
}

#[test]
fn test_non_numeric_id_is_rejected() {
    let output = buildmart_cmd(&missing_config())
        .args(["--api-url", "http://127.0.0.1:9/api/", "products", "get", "tmp-1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("numeric id"));
}

#[test]
fn test_unreachable_api_fails() {
    let output = buildmart_cmd(&missing_config())
        .args([
            "--api-url",
            "http://127.0.0.1:9/api/",
            "--timeout",
            "2",
            "products",
            "list",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honours_override() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    buildmart_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_masks_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
default_profile = "staging"

[profiles.staging]
api_url = "https://staging.buildmart.test/api"
token = "super-secret-token"
"#,
    )
    .unwrap();

    buildmart_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("****")
                .and(predicate::str::contains("staging.buildmart.test"))
                .and(predicate::str::contains("super-secret-token").not()),
        );
}

#[test]
fn test_config_use_switches_default_profile() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
default_profile = "a"

[profiles.a]
api_url = "http://a.test/api"

[profiles.b]
api_url = "http://b.test/api"
"#,
    )
    .unwrap();

    buildmart_cmd(&config).args(["config", "use", "b"]).assert().success();
    buildmart_cmd(&config)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("b *"));

    let output = buildmart_cmd(&config)
        .args(["config", "use", "missing"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
}

// ── Against a mock backend ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_products_list_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/my-products"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{ "id": 1, "name": "Cement", "price": 7 }],
            "meta": { "current_page": 2, "last_page": 2, "per_page": 10, "total": 11 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = buildmart_cmd(&missing_config())
        .args([
            "--api-url",
            &format!("{}/api/", server.uri()),
            "--token",
            "test-token",
            "-o",
            "json",
            "products",
            "list",
            "--page",
            "2",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let items: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(items, json!([{ "id": 1, "name": "Cement", "price": 7 }]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_products_create_sends_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/products"))
        .and(body_string_contains("Red brick"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": { "id": 42, "name": "Red brick", "price": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    buildmart_cmd(&missing_config())
        .args([
            "--api-url",
            &format!("{}/api/", server.uri()),
            "-o",
            "plain",
            "products",
            "create",
            "-F",
            "name=Red brick",
            "-F",
            "price=3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_products_delete_reports_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/products/5"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "message": "You do not own this product"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = buildmart_cmd(&missing_config())
        .args([
            "--api-url",
            &format!("{}/api/", server.uri()),
            "--yes",
            "products",
            "delete",
            "5",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("You do not own this product"));
}
