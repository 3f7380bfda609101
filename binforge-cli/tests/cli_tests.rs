use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

fn binforge(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("binforge"));
    cmd.current_dir(dir)
        .env_remove("GITHUB_OUTPUT")
        .env_remove("BINFORGE_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

fn php_watch_item(name: &str, date: &str, eol: bool) -> Value {
    json!({
        "name": name,
        "versionId": 1,
        "releaseDate": date,
        "activeSupportEndDate": "2026-12-31",
        "eolDate": "2027-12-31",
        "isEOLVersion": eol,
        "isSecureVersion": !eol,
        "isLatestVersion": false,
        "isFutureVersion": false,
        "isNextVersion": false
    })
}

fn write_php_watch(dir: &Path) {
    let doc = json!({
        "data": {
            "81": php_watch_item("8.1", "2021-11-25", true),
            "84": php_watch_item("8.4", "2024-11-21", false)
        }
    });
    fs::write(dir.join("api_response.json"), doc.to_string()).expect("write feed");
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json")
}

// ---------------------------------------------------------------------------
// check-versions
// ---------------------------------------------------------------------------

#[test]
fn check_versions_writes_github_output_and_plan() {
    let tmp = TempDir::new().expect("tempdir");
    write_php_watch(tmp.path());

    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "check-versions",
            "--feed",
            "api_response.json",
            "--github-output",
            "out.txt",
            "--plan-out",
            "plan.json",
        ])
        .assert()
        .success()
        .stdout(contains("should-build=true"))
        .stdout(contains("8.4"));

    let output = fs::read_to_string(tmp.path().join("out.txt")).expect("output");
    assert!(output.contains("matrix={\"include\":["));
    assert!(output.contains("eol=[]"));
    assert!(output.contains("should-build=true"));

    let plan = read_json(&tmp.path().join("plan.json"));
    assert_eq!(plan["include"].as_array().map(Vec::len), Some(1));
    assert_eq!(plan["include"][0]["runs-on"], "macos-latest");
    assert_eq!(plan["include"][0]["release"]["eolDate"], "2027-12-31");
    assert!(!tmp.path().join("metadata.json").exists(), "diff stage never writes metadata");
}

#[test]
fn local_github_output_is_rewritten_each_run() {
    let tmp = TempDir::new().expect("tempdir");
    write_php_watch(tmp.path());

    for _ in 0..2 {
        binforge(tmp.path())
            .args(["--family", "runtime", "check-versions", "--feed", "api_response.json"])
            .assert()
            .success();
    }

    let output = fs::read_to_string(tmp.path().join("github_output.txt")).expect("output");
    assert_eq!(output.matches("matrix=").count(), 1, "{output}");
    assert!(output.ends_with("should-build=true\n"));
}

#[test]
fn github_output_env_is_appended_to() {
    let tmp = TempDir::new().expect("tempdir");
    write_php_watch(tmp.path());
    fs::write(tmp.path().join("step_output"), "earlier=1\n").expect("seed");

    binforge(tmp.path())
        .env("GITHUB_OUTPUT", "step_output")
        .args(["--family", "runtime", "check-versions", "--feed", "api_response.json"])
        .assert()
        .success();

    let output = fs::read_to_string(tmp.path().join("step_output")).expect("output");
    assert!(output.starts_with("earlier=1\nmatrix="), "{output}");
    assert!(!tmp.path().join("github_output.txt").exists());
}

#[test]
fn config_adds_platforms_to_the_matrix() {
    let tmp = TempDir::new().expect("tempdir");
    write_php_watch(tmp.path());
    fs::write(
        tmp.path().join("binforge.yaml"),
        "runtime:\n  platforms:\n    - name: macos-aarch64\n      runner: macos-latest\n    - name: linux-x86_64\n      runner: ubuntu-latest\n",
    )
    .expect("config");

    binforge(tmp.path())
        .env("BINFORGE_CONFIG", "binforge.yaml")
        .args([
            "--family",
            "runtime",
            "check-versions",
            "--feed",
            "api_response.json",
            "--github-output",
            "out.txt",
            "--plan-out",
            "plan.json",
        ])
        .assert()
        .success();

    let plan = read_json(&tmp.path().join("plan.json"));
    assert_eq!(plan["include"].as_array().map(Vec::len), Some(2));
    assert_eq!(plan["include"][1]["os"], "linux-x86_64");
}

#[test]
fn unknown_family_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    binforge(tmp.path())
        .args(["--family", "perl", "status"])
        .assert()
        .code(1)
        .stderr(contains("unknown family"));
}

// ---------------------------------------------------------------------------
// update-metadata
// ---------------------------------------------------------------------------

#[test]
fn full_runtime_cycle() {
    let tmp = TempDir::new().expect("tempdir");
    write_php_watch(tmp.path());

    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "check-versions",
            "--feed",
            "api_response.json",
            "--github-output",
            "out.txt",
            "--plan-out",
            "plan.json",
        ])
        .assert()
        .success();

    let sha = "c".repeat(128);
    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "update-metadata",
            "--build-matrix-file",
            "plan.json",
            "--archive-checksums",
            &format!("8.4,macos-aarch64,{sha},php-8.4-20250301120000-macos-aarch64.tar.gz"),
        ])
        .assert()
        .success()
        .stdout(contains("1 builds recorded"));

    let doc = read_json(&tmp.path().join("metadata.json"));
    assert_eq!(doc["versions"]["8.4"]["releaseDate"], "2024-11-21");
    assert_eq!(doc["versions"]["8.4"]["builds"]["macos-aarch64"]["sha512"], sha);
    assert!(doc["last_sync"].as_str().is_some_and(|s| s.ends_with('Z')));

    // Same feed again: nothing to build.
    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "check-versions",
            "--feed",
            "api_response.json",
            "--github-output",
            "out2.txt",
        ])
        .assert()
        .success()
        .stdout(contains("should-build=false"));
}

#[test]
fn missing_checksum_fails_without_touching_metadata() {
    let tmp = TempDir::new().expect("tempdir");
    let original = "{\n  \"last_sync\": \"\",\n  \"versions\": {}\n}\n";
    fs::write(tmp.path().join("metadata.json"), original).expect("seed");
    let matrix = json!({
        "include": [{
            "key": "8.4",
            "version": "8.4",
            "os": "macos-aarch64",
            "runs-on": "macos-latest",
            "release": { "releaseDate": "2024-11-21" }
        }]
    });

    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "update-metadata",
            "--build-matrix",
            &matrix.to_string(),
            "--archive-checksums",
            "8.3,macos-aarch64,abc,php-8.3.tar.gz",
        ])
        .assert()
        .code(1)
        .stderr(contains("no checksum found for 8.4 on macos-aarch64"));

    let after = fs::read_to_string(tmp.path().join("metadata.json")).expect("read");
    assert_eq!(after, original);
}

#[test]
fn malformed_checksum_line_is_fatal() {
    let tmp = TempDir::new().expect("tempdir");
    binforge(tmp.path())
        .args([
            "--family",
            "installer",
            "update-metadata",
            "--build-matrix",
            "{\"include\": []}",
            "--archive-checksums",
            "8.4.13,macos-aarch64,ff,php.tar.gz",
        ])
        .assert()
        .code(1)
        .stderr(contains("expected 3 fields (version,sha256,filename), got 4"));
    assert!(!tmp.path().join("metadata-installer.json").exists());
}

#[test]
fn update_metadata_requires_checksums() {
    let tmp = TempDir::new().expect("tempdir");
    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "update-metadata",
            "--build-matrix",
            "{\"include\": []}",
        ])
        .assert()
        .code(1)
        .stderr(contains("--archive-checksums"));
}

// ---------------------------------------------------------------------------
// cleanup-eol
// ---------------------------------------------------------------------------

#[test]
fn cleanup_eol_is_idempotent() {
    let tmp = TempDir::new().expect("tempdir");
    fs::write(
        tmp.path().join("metadata.json"),
        r#"{"last_sync": "", "versions": {"8.0": {"releaseDate": "2020-11-26"}, "8.4": {"releaseDate": "2024-11-21"}}}"#,
    )
    .expect("seed");

    for expected in ["Removed 1 EOL versions", "Removed 0 EOL versions"] {
        binforge(tmp.path())
            .args(["--family", "runtime", "cleanup-eol", "--eol-versions", "[\"8.0\"]"])
            .assert()
            .success()
            .stdout(contains(expected));
    }

    let doc = read_json(&tmp.path().join("metadata.json"));
    assert!(doc["versions"].get("8.0").is_none());
    assert!(doc["versions"].get("8.4").is_some());
}

// ---------------------------------------------------------------------------
// create-archive + status
// ---------------------------------------------------------------------------

#[test]
fn create_archive_for_service() {
    let tmp = TempDir::new().expect("tempdir");
    let pkg = tmp.path().join("mariadb-package").join("bin");
    fs::create_dir_all(&pkg).expect("mkdir");
    fs::write(pkg.join("mariadbd"), b"server").expect("write");

    binforge(tmp.path())
        .args([
            "--family",
            "services",
            "create-archive",
            "--service",
            "mariadb",
            "--version",
            "11.8.3",
            "--os",
            "macos-aarch64",
            "--timestamp",
            "20250301120000",
        ])
        .assert()
        .success()
        .stdout(contains("Created mariadb-11.8.3-20250301120000-macos-aarch64.tar.gz"));

    let info = fs::read_to_string(tmp.path().join("archive_info.txt")).expect("info");
    assert!(info.starts_with("ARCHIVE_NAME=mariadb-11.8.3-20250301120000-macos-aarch64.tar.gz\n"));
    assert!(tmp
        .path()
        .join("mariadb-11.8.3-20250301120000-macos-aarch64.tar.gz")
        .exists());
}

#[test]
fn create_archive_rejects_bad_timestamp() {
    let tmp = TempDir::new().expect("tempdir");
    binforge(tmp.path())
        .args([
            "--family",
            "runtime",
            "create-archive",
            "--version",
            "8.4",
            "--os",
            "macos-aarch64",
            "--timestamp",
            "2025-03-01",
        ])
        .assert()
        .code(1)
        .stderr(contains("invalid build timestamp"));
}

#[test]
fn status_json_reports_records() {
    let tmp = TempDir::new().expect("tempdir");
    fs::write(
        tmp.path().join("metadata-services.json"),
        r#"{"last_sync": "2025-03-01T12:00:00.000000Z", "redis": {"8": {"version": "8.2.1", "sha512": "aa", "filename": "redis.tar.gz", "last_build": "2025-03-01T12:00:00Z"}}}"#,
    )
    .expect("seed");

    let assert = binforge(tmp.path())
        .args(["--family", "services", "status", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let report: Value = serde_json::from_str(&stdout).expect("status json");
    assert_eq!(report["family"], "services");
    assert_eq!(report["records"][0]["key"], "redis/8");
    assert_eq!(report["records"][0]["current"], "8.2.1");
    assert_eq!(report["records"][0]["builds"][0]["filename"], "redis.tar.gz");
}

#[test]
fn status_table_on_empty_store() {
    let tmp = TempDir::new().expect("tempdir");
    binforge(tmp.path())
        .args(["--family", "installer", "status"])
        .assert()
        .success()
        .stdout(contains("No versions recorded.").and(contains("installer")));
}
