use assert_cmd::Command;
use predicates::str;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn setup_test_config() -> (Command, PathBuf) {
    let temp_dir = env::temp_dir();
    let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let test_config_path = temp_dir.join(format!(
        "memreplay_test_config_{}_{}.toml",
        std::process::id(),
        counter
    ));

    if test_config_path.exists() {
        fs::remove_file(&test_config_path).ok();
    }

    let mut cmd = Command::cargo_bin("memreplay").unwrap();
    cmd.env("MEMREPLAY_CONFIG_PATH", &test_config_path);

    (cmd, test_config_path)
}

fn command_for(config_path: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("memreplay").unwrap();
    cmd.env("MEMREPLAY_CONFIG_PATH", config_path);
    cmd
}

fn cleanup_test_config(config_path: &PathBuf) {
    if config_path.exists() {
        fs::remove_file(config_path).ok();
    }
}

fn show_config(config_path: &PathBuf) -> Value {
    let output = command_for(config_path)
        .args(["config", "show"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&output.get_output().stdout).unwrap();
    serde_json::from_str(stdout).expect("Should be valid JSON")
}

#[test]
fn test_config_show_command() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "show"]);

    let output = cmd.assert().success();
    let stdout = std::str::from_utf8(&output.get_output().stdout).unwrap();

    let json: Value = serde_json::from_str(stdout).expect("Should be valid JSON");
    assert!(json.get("watch_directories").is_some());
    assert!(json.get("archive_root").is_some());
    assert!(json.get("database_path").is_some());
    assert_eq!(json["batch_size"], 500);

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_default_subcommand_is_show() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.arg("config");

    cmd.assert()
        .success()
        .stdout(str::contains("\"batch_size\""));

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_path_command() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "path"]);

    cmd.assert()
        .success()
        .stdout(str::contains("memreplay_test_config_"));

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_archive_root() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "archive_root", "/srv/archive"]);

    cmd.assert()
        .success()
        .stdout("Set archive_root = /srv/archive\n");

    let json = show_config(&config_path);
    assert_eq!(json["archive_root"], "/srv/archive");

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_watch_directories_appends() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "watch_directories", "/videos/a"]);
    cmd.assert().success();

    command_for(&config_path)
        .args(["config", "set", "watch_directories", "/videos/b"])
        .assert()
        .success();
    command_for(&config_path)
        .args(["config", "set", "watch_directories", "/videos/a"])
        .assert()
        .success();

    let json = show_config(&config_path);
    let dirs = json["watch_directories"].as_array().unwrap();
    assert_eq!(dirs.len(), 2);
    assert_eq!(dirs[0], "/videos/a");
    assert_eq!(dirs[1], "/videos/b");

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_batch_size() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "batch_size", "25"]);
    cmd.assert().success().stdout("Set batch_size = 25\n");

    let json = show_config(&config_path);
    assert_eq!(json["batch_size"], 25);

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_invalid_batch_size() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "batch_size", "lots"]);

    cmd.assert()
        .failure()
        .stderr(str::contains("Invalid number for batch_size: lots"));

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_invalid_field() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "invalid_field", "value"]);

    cmd.assert()
        .failure()
        .stderr(str::contains("Error: Unknown field 'invalid_field'"))
        .stderr(str::contains("Valid fields are:"));

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_unset_field() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "archive_root", "/srv/archive"]);
    cmd.assert().success();

    command_for(&config_path)
        .args(["config", "unset", "archive_root"])
        .assert()
        .success()
        .stdout("Unset archive_root\n");

    let json = show_config(&config_path);
    assert_eq!(json["archive_root"], "");

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_unset_invalid_field() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "unset", "invalid_field"]);

    cmd.assert()
        .failure()
        .stderr(str::contains("Error: Unknown field 'invalid_field'"));

    cleanup_test_config(&config_path);
}

#[test]
fn test_config_set_missing_arguments() {
    let (mut cmd, config_path) = setup_test_config();
    cmd.args(["config", "set", "archive_root"]);

    cmd.assert().failure().stderr(str::contains("required"));

    cleanup_test_config(&config_path);
}
