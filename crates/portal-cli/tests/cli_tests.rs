//! Integration tests for the `portal` CLI binary.
//!
//! These tests run the CLI as a subprocess against a temporary state
//! directory. None of them need a dashboard server: the API URL points at a
//! port nothing listens on.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

/// Helper: locate the `portal` binary built by `cargo test`.
fn portal_bin() -> String {
    let path = env!("CARGO_BIN_EXE_portal");
    assert!(Path::new(path).exists(), "portal binary not found at {path}");
    path.to_owned()
}

/// Helper: run portal with args and return (`exit_code`, stdout, stderr).
fn run(state_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(portal_bin())
        .args(args)
        .env("PORTAL_API_URL", "http://127.0.0.1:19999") // Non-existent server
        .env("PORTAL_STATE_DIR", state_dir)
        .env_remove("PORTAL_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute portal");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn run_json(state_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run(state_dir, args);
    assert_eq!(code, 0, "portal {args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout should be a JSON document")
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["--version"]);
    assert_eq!(code, 0, "portal --version should exit 0");
    assert!(stdout.contains("portal"), "version output should contain 'portal': {stdout}");
}

#[test]
fn test_help_flag() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["--help"]);
    assert_eq!(code, 0, "portal --help should exit 0");
    assert!(stdout.contains("Portal CLI"), "help should mention Portal CLI");
    for command in ["login", "register", "logout", "whoami", "open", "range", "keys", "activity"] {
        assert!(stdout.contains(command), "help should list '{command}'");
    }
}

#[test]
fn test_subcommand_help() {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["keys", "activity", "login", "open"] {
        let (code, stdout, _) = run(dir.path(), &[sub, "--help"]);
        assert_eq!(code, 0, "portal {sub} --help should exit 0");
        assert!(stdout.contains("Usage"), "portal {sub} --help should print usage");
    }
}

// ── Argument validation ──────────────────────────────────────────────

#[test]
fn test_invalid_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["range", "90d"]);
    assert_eq!(code, 2, "clap usage errors exit 2");
    assert!(stderr.contains("invalid range '90d'"), "stderr: {stderr}");
}

#[test]
fn test_activity_reset_conflicts_with_filters() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run(dir.path(), &["activity", "--reset", "--status", "error"]);
    assert_eq!(code, 2);
}

#[test]
fn test_short_password_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["login", "--email", "owner@example.com", "--password", "short"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Password must be at least 8 characters."), "stderr: {stderr}");
    assert!(!dir.path().join("portal.session").exists());
}

// ── Signed-out behavior ──────────────────────────────────────────────

#[test]
fn test_whoami_when_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["whoami"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Signed out"), "stdout: {stdout}");
    assert!(stdout.contains("portal login"), "should hint at login: {stdout}");
}

#[test]
fn test_whoami_json_when_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let value = run_json(dir.path(), &["--json", "whoami"]);
    assert_eq!(value["auth"]["status"], "signed_out");
    assert_eq!(value["apiUrl"], "http://127.0.0.1:19999");
}

#[test]
fn test_key_mutation_requires_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["keys", "create", "CI deploys"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Sign in to manage keys."), "stderr: {stderr}");
}

#[test]
fn test_location_is_remembered_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["open", "#/keys?status=revoked"]);
    assert_eq!(code, 0, "stderr: {stderr}");

    let stored = fs::read_to_string(dir.path().join("portal.location")).unwrap();
    assert_eq!(stored, "#/keys?status=revoked");

    let value = run_json(dir.path(), &["--json", "whoami"]);
    assert_eq!(value["location"], "#/keys?status=revoked");
}

#[test]
fn test_unverifiable_session_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("portal.session"),
        r#"{"token":"tok_stale","email":"owner@example.com","tenantId":"tenant_demo"}"#,
    )
    .unwrap();

    let value = run_json(dir.path(), &["--json", "whoami"]);
    assert_eq!(value["auth"]["status"], "signed_out");
    assert!(
        !dir.path().join("portal.session").exists(),
        "a session that cannot be revalidated must be removed"
    );
}
