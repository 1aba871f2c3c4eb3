use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs with a private data dir and an empty home
fn statewipe(data: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("statewipe").unwrap();
    let home = data.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    cmd.env("STATEWIPE_HOME", data.path().join("data"))
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("APPDATA", home.join("AppData/Roaming"))
        .env("LOCALAPPDATA", home.join("AppData/Local"))
        .env_remove("RUST_LOG");
    cmd
}

// ─── Help & version ──────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cursor and Windsurf"))
        .stdout(predicate::str::contains("discover"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("backups"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn test_version_flag() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("statewipe"));
}

// ─── Discover ────────────────────────────────────────────────────────────────

#[test]
fn test_discover_empty_home() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["discover", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not installed"));
}

#[test]
fn test_discover_json() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["discover", "cursor", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"application\": \"cursor\""))
        .stdout(predicate::str::contains("\"stores\": []"));
}

#[test]
fn test_discover_unknown_app_fails() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["discover", "notepad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ─── Clean ───────────────────────────────────────────────────────────────────

#[test]
fn test_clean_requires_target() {
    let data = TempDir::new().unwrap();
    statewipe(&data).arg("clean").assert().failure();
}

#[test]
fn test_clean_not_installed_succeeds() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["clean", "--all", "--yes", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not installed"));
}

#[test]
fn test_clean_dry_run_lists_stores() {
    let data = TempDir::new().unwrap();
    let cursor = data.path().join("home/.config/Cursor/User");
    std::fs::create_dir_all(&cursor).unwrap();
    std::fs::write(cursor.join("storage.json"), r#"{"telemetry.machineId": "abc"}"#).unwrap();

    statewipe(&data)
        .args(["clean", "cursor", "--dry-run", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"dry_run\""))
        .stdout(predicate::str::contains("storage.json"));

    assert_eq!(
        std::fs::read_to_string(cursor.join("storage.json")).unwrap(),
        r#"{"telemetry.machineId": "abc"}"#
    );
}

// ─── Backups, restore & purge ────────────────────────────────────────────────

#[test]
fn test_backups_list_empty() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["backups", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshots found"));
}

#[test]
fn test_backups_show_missing() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["backups", "show", "cursor_clean_20240101_000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_restore_without_snapshots_fails() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["restore", "--last", "cursor", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No complete snapshot"));
}

#[test]
fn test_restore_requires_source() {
    let data = TempDir::new().unwrap();
    statewipe(&data).arg("restore").assert().failure();
}

#[test]
fn test_purge_expired_empty() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["purge", "--expired"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshots to purge"));
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_data_dir() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(data.path().join("data").to_string_lossy().to_string()));
}

#[test]
fn test_config_init_and_show() {
    let data = TempDir::new().unwrap();
    statewipe(&data).args(["config", "init"]).assert().success();
    assert!(data.path().join("data/config.toml").exists());
    assert!(data.path().join("data/backups").is_dir());

    statewipe(&data)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[cleaning]"))
        .stdout(predicate::str::contains("retention_days = 30"));
}

// ─── Completions ─────────────────────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let data = TempDir::new().unwrap();
    statewipe(&data)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("statewipe"));
}
