use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `docex` command isolated from the user's config and data directories.
fn docex(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docex").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("GEMINI_API_KEY")
        .env_remove("GOOGLE_CLOUD_VISION_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Config with every provider switched off and the cache inside `home`.
fn offline_config(home: &Path) -> String {
    let path = home.join("offline.json");
    let config = serde_json::json!({
        "providers": {
            "primary": { "api_key_env": "" },
            "secondary": { "api_key_env": "" },
            "offline": { "enabled": false }
        },
        "cache": { "dir": home.join("cache") },
        "face": { "enabled": false }
    });
    fs::write(&path, config.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("docex"));
}

#[test]
fn test_config_init_get_set() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("cfg.json");
    let path = path.to_str().unwrap();

    docex(home.path())
        .args(["--config", path, "config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    docex(home.path())
        .args(["--config", path, "config", "get", "orchestration.strategy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sequential\""));

    docex(home.path())
        .args(["--config", path, "config", "set", "orchestration.strategy", "parallel"])
        .assert()
        .success();

    docex(home.path())
        .args(["--config", path, "config", "get", "orchestration.strategy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"parallel\""));

    docex(home.path())
        .args(["--config", path, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_set_rejects_bad_value() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("cfg.json");
    let path = path.to_str().unwrap();

    docex(home.path())
        .args(["--config", path, "config", "set", "orchestration.strategy", "sideways"])
        .assert()
        .failure();
    docex(home.path())
        .args(["--config", path, "config", "set", "orchestration.nope", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    docex(home.path())
        .args(["--config", path, "config", "set", "orchestration.request_timeout_secs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("missing.json");

    docex(home.path())
        .args(["--config", missing.to_str().unwrap(), "cache", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_cache_stats_and_clear() {
    let home = TempDir::new().unwrap();
    let config = offline_config(home.path());

    docex(home.path())
        .args(["--config", &config, "cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries: 0"));

    docex(home.path())
        .args(["--config", &config, "cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 cached results"));
}

#[test]
fn test_process_missing_file_fails() {
    let home = TempDir::new().unwrap();
    let config = offline_config(home.path());

    docex(home.path())
        .args(["--config", &config, "process", "nope.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_process_without_providers_is_degraded() {
    let home = TempDir::new().unwrap();
    let config = offline_config(home.path());
    let image = home.path().join("card.png");
    fs::write(&image, b"not really an image").unwrap();

    docex(home.path())
        .args(["--config", &config, "process", "-t", "zairyu_card"])
        .arg(&image)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"method\": \"fallback\""))
        .stderr(predicate::str::contains("all providers exhausted"));

    // Degraded results are never cached.
    let cached = fs::read_dir(home.path().join("cache")).unwrap().count();
    assert_eq!(cached, 0);
}

#[test]
fn test_batch_without_matches_fails() {
    let home = TempDir::new().unwrap();
    let config = offline_config(home.path());
    let pattern = home.path().join("*.png");

    docex(home.path())
        .args(["--config", &config, "batch"])
        .arg(pattern.to_str().unwrap())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn test_batch_continue_on_error_writes_summary() {
    let home = TempDir::new().unwrap();
    let config = offline_config(home.path());
    let input = home.path().join("in");
    let output = home.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.png"), b"one").unwrap();
    fs::write(input.join("b.jpg"), b"two").unwrap();

    docex(home.path())
        .args(["--config", &config, "batch", "--continue-on-error", "--summary", "-o"])
        .arg(&output)
        .arg(input.join("*").to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 successful"));

    let summary = fs::read_to_string(output.join("summary.csv")).unwrap();
    assert!(summary.starts_with("filename,status,method,confidence"));
    assert!(summary.contains("a.png,error,fallback"));
    assert!(output.join("b.json").exists());
}

#[test]
fn test_models_list() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version-RFB-320.onnx"));
}
