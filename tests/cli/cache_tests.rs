//! Tests for the on-disk cache and `clear-cache`

use std::fs;

use crate::common::{assert_contains, assert_valid_json, record_names, records, TestRepo};

fn cache_file(repo: &TestRepo) -> String {
    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");
    json["cache_file"]
        .as_str()
        .expect("cache_file should be set")
        .to_string()
}

#[test]
fn test_clear_cache_removes_file() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    let path = cache_file(&repo);
    assert!(fs::metadata(&path).is_ok());

    let output = repo.run_cli_success(&["clear-cache"]);
    assert_contains(&output, "Removed cache", true, "clear-cache");
    assert!(fs::metadata(&path).is_err());
}

#[test]
fn test_clear_cache_when_absent() {
    let repo = TestRepo::new();

    let output = repo.run_cli_success(&["clear-cache"]);
    assert_contains(&output, "No cache", true, "nothing to clear");
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    let path = cache_file(&repo);

    fs::write(&path, b"definitely not an index").unwrap();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(record_names(&records(&output, "after corruption")), vec!["a_valid_async"]);

    let output = repo.run_cli_success(&["stats", "-f", "json"]);
    assert_eq!(assert_valid_json(&output, "stats")["source"], "cache");
}

#[test]
fn test_truncated_cache_is_rebuilt() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    let path = cache_file(&repo);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(record_names(&records(&output, "after truncation")), vec!["a_valid_async"]);
}

#[test]
fn test_cache_keyed_by_marker_settings() {
    let repo = TestRepo::new();
    repo.add_file(
        "svc.py",
        "@provider\ndef a(config: Config): ...\n\n@injected\ndef b(config: Config): ...\n",
    );
    repo.build();

    let output = repo.run_cli_success(&["query-iproxy-functions", "Config", "--marker", "provider"]);
    assert_eq!(record_names(&records(&output, "other marker")), vec!["a"]);
}
