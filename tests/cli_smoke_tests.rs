//! CLI smoke tests - verify basic command-line interface functionality
//!
//! These tests run the actual compiled binary against a throwaway config file:
//! - Help and version flags work
//! - Config commands edit the file they are pointed at
//! - Error messages are helpful

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to get the path to the compiled masw binary
fn masw_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_masw"))
}

fn temp_config() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    (dir, path)
}

fn run_with_config(path: &Path, args: &[&str]) -> Output {
    masw_bin()
        .args(args)
        .arg("--config")
        .arg(path)
        .output()
        .expect("Failed to run masw")
}

#[test]
fn cli_help_works() {
    let output = masw_bin()
        .arg("--help")
        .output()
        .expect("Failed to run masw --help");

    assert!(output.status.success(), "masw --help should exit successfully");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Help should show usage");
    assert!(stdout.contains("run"), "Help should list run command");
    assert!(stdout.contains("status"), "Help should list status command");
    assert!(stdout.contains("set"), "Help should list set command");
}

#[test]
fn cli_version_works() {
    let output = masw_bin()
        .arg("--version")
        .output()
        .expect("Failed to run masw --version");

    assert!(output.status.success(), "masw --version should exit successfully");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("masw"), "Version should mention masw");
    assert!(
        stdout.split_whitespace().count() >= 2,
        "Version should show name and version number"
    );
}

#[test]
fn cli_validate_creates_default_config() {
    let (_dir, path) = temp_config();

    let output = run_with_config(&path, &["validate"]);

    assert!(output.status.success(), "validate should accept the default config");
    assert!(path.exists(), "validate should create the default config");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration valid"));
}

#[test]
fn cli_validate_reports_invalid_config() {
    let (_dir, path) = temp_config();
    fs::write(&path, "[settings]\nlog_level = \"chatty\"\n").unwrap();

    let output = run_with_config(&path, &["validate"]);

    assert!(!output.status.success(), "validate should fail on a bad log level");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("log_level"), "Error should name the bad field");
}

#[test]
fn cli_set_and_toggle_edit_the_config() {
    let (_dir, path) = temp_config();

    let output = run_with_config(&path, &["set", "LG TV", "TV"]);
    assert!(output.status.success(), "set should succeed");
    let output = run_with_config(&path, &["set", "Projector"]);
    assert!(output.status.success(), "set without device should succeed");
    let output = run_with_config(&path, &["disable"]);
    assert!(output.status.success(), "disable should succeed");

    let config = masw::Config::load_from_path(&path).unwrap();
    assert_eq!(config.device_for("LG TV"), Some("TV"));
    assert_eq!(config.device_for("Projector"), Some(""));
    assert!(!config.settings.enabled);

    let output = run_with_config(&path, &["toggle"]);
    assert!(output.status.success(), "toggle should succeed");
    assert!(masw::Config::load_from_path(&path).unwrap().settings.enabled);
}

#[test]
fn cli_status_json_lists_mapping() {
    let (_dir, path) = temp_config();
    fs::write(&path, "[monitors]\n\"LG TV\" = \"TV\"\n").unwrap();

    let output = run_with_config(&path, &["status", "--json"]);

    assert!(output.status.success(), "status should work without OS backends");
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status --json should print JSON");
    assert_eq!(json["enabled"], true);
    assert!(json["daemon_running"].is_boolean());
    assert_eq!(json["mapping"][0]["monitor"], "LG TV");
    assert_eq!(json["mapping"][0]["device"], "TV");
}

#[cfg(not(windows))]
#[test]
fn cli_list_devices_reports_unsupported_platform() {
    let (_dir, path) = temp_config();

    let output = run_with_config(&path, &["list-devices"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported platform"));
}

#[cfg(not(windows))]
#[test]
fn cli_stop_reports_unsupported_platform() {
    let (_dir, path) = temp_config();

    let output = run_with_config(&path, &["stop"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported platform"));
}

#[test]
fn cli_invalid_command_shows_error() {
    let output = masw_bin()
        .arg("invalid-command-xyz")
        .output()
        .expect("Failed to run masw with invalid command");

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("unrecognized"),
        "Should show error for invalid command"
    );
}
