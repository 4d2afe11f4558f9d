use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn pstream(data_dir: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("pstream"));
    cmd.arg("--data-dir")
        .arg(data_dir)
        .env("TMPDIR", data_dir)
        .env_remove("GITHUB_TOKEN")
        .env_remove("PSTREAM_DATA_DIR");
    cmd
}

#[test]
fn test_settings_get_defaults() {
    let dir = tempdir().unwrap();

    pstream(dir.path())
        .args(["settings", "get", "streamUrl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pstream.mov\""));

    pstream(dir.path())
        .args(["settings", "get", "discordRPCEnabled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn test_settings_set_persists() {
    let dir = tempdir().unwrap();

    pstream(dir.path())
        .args(["settings", "set", "warpLaunchEnabled", "true"])
        .assert()
        .success();

    pstream(dir.path())
        .args(["settings", "set", "streamUrl", "mirror.example"])
        .assert()
        .success();

    let saved = std::fs::read_to_string(dir.path().join("settings.json")).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["warpLaunchEnabled"], true);
    assert_eq!(saved["streamUrl"], "mirror.example");

    pstream(dir.path())
        .args(["settings", "get", "warpLaunchEnabled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn test_settings_get_unknown_key_fails() {
    let dir = tempdir().unwrap();

    pstream(dir.path())
        .args(["settings", "get", "noSuchSetting"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting"));
}

#[test]
fn test_downloads_list_empty() {
    let dir = tempdir().unwrap();

    pstream(dir.path())
        .args(["downloads", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));

    assert!(dir.path().join("downloads").is_dir());
}

#[test]
fn test_downloads_list_and_delete() {
    let dir = tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    std::fs::create_dir_all(&downloads).unwrap();
    std::fs::write(downloads.join("Movie_abc.mp4"), b"video").unwrap();
    let manifest = serde_json::json!([{
        "id": "abc",
        "title": "Movie",
        "poster": null,
        "filePath": downloads.join("Movie_abc.mp4"),
        "url": "https://cdn.example.com/movie.m3u8",
        "status": "completed",
        "progress": 100.0,
        "error": null,
        "createdAt": 1700000000000u64
    }]);
    std::fs::write(downloads.join("manifest.json"), manifest.to_string()).unwrap();

    pstream(dir.path())
        .args(["downloads", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"abc\""))
        .stdout(predicate::str::contains("completed"));

    pstream(dir.path())
        .args(["downloads", "delete", "abc"])
        .assert()
        .success();

    assert!(!downloads.join("Movie_abc.mp4").exists());

    pstream(dir.path())
        .args(["downloads", "delete", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No download with id"));
}

#[test]
fn test_corrupt_manifest_is_backed_up() {
    let dir = tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    std::fs::create_dir_all(&downloads).unwrap();
    std::fs::write(downloads.join("manifest.json"), "{not json").unwrap();

    pstream(dir.path())
        .args(["downloads", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));

    let backups = std::fs::read_dir(&downloads)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert_eq!(backups, 1);
}

#[test]
fn test_relay_request() {
    let mut server = Server::new();
    let url = server.url();

    let _mock = server
        .mock("GET", "/api/search?q=dune")
        .match_header("x-custom", "1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": [1, 2]}"#)
        .create();

    let dir = tempdir().unwrap();
    let request = format!(
        r#"{{"url": "/api/search", "baseUrl": "{}", "query": {{"q": "dune"}}, "headers": {{"X-Custom": "1"}}}}"#,
        url
    );

    pstream(dir.path())
        .arg("relay")
        .arg(request)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"statusCode\": 200"))
        .stdout(predicate::str::contains("\"results\""));
}

#[test]
fn test_relay_invalid_json_fails() {
    let dir = tempdir().unwrap();

    pstream(dir.path())
        .args(["relay", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_check_prints_report() {
    let mut server = Server::new();
    let url = server.url();

    let _mock = server
        .mock("GET", "/repos/p-stream/p-stream-desktop/releases/latest")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "tag_name": "v999.0.0",
                "html_url": "https://github.com/p-stream/p-stream-desktop/releases/tag/v999.0.0",
                "name": "P-Stream 999",
                "body": "notes",
                "assets": []
            }"#,
        )
        .create();

    let dir = tempdir().unwrap();
    let assert = pstream(dir.path())
        .arg("check")
        .arg("--api-url")
        .arg(&url)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"currentVersion\""));

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    if report["isDevelopment"] == true {
        assert_eq!(report["updateAvailable"], false);
    } else {
        assert_eq!(report["updateAvailable"], true);
        assert_eq!(report["latestVersion"], "999.0.0");
    }
}

#[test]
fn test_no_subcommand_fails() {
    Command::new(cargo::cargo_bin!("pstream"))
        .assert()
        .failure();
}
