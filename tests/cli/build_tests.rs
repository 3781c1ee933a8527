//! Tests for the `build` command

use crate::common::{assert_contains, assert_valid_json, TestRepo};

// ============================================================================
// SUMMARY OUTPUT
// ============================================================================

#[test]
fn test_build_text_summary() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();

    let output = repo.build();

    assert_contains(
        &output,
        "Indexed 1 functions under 1 type keys from 2 files",
        true,
        "build summary",
    );
    assert_contains(&output, "multiple_subjects: 1", true, "rejection counts");
    assert_contains(&output, "files_failed: 0", true, "failure count");
}

#[test]
fn test_build_json_summary() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    // process_user, load_users, process_user_list, maybe_user, UserService.by_id, ship
    assert_eq!(json["records"], 6);
    assert_eq!(json["report"]["files_scanned"], 2);
    assert_eq!(json["report"]["files_parsed"], 2);
    assert_eq!(json["report"]["rejections"]["missing_annotation"], 1);
    assert!(json["fingerprint"].as_str().is_some_and(|f| !f.is_empty()));
}

#[test]
fn test_build_writes_cache() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    let cache_file = json["cache_file"].as_str().expect("cache_file should be set");
    assert!(std::path::Path::new(cache_file).exists());
    assert!(cache_file.starts_with(&*repo.cache_dir().to_string_lossy()));
}

#[test]
fn test_build_no_cache_skips_write() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();

    let output = repo.run_cli_success(&["build", "--no-cache", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    assert!(json["cache_file"].is_null());
    assert!(!repo.cache_dir().exists());
}

#[test]
fn test_build_with_explicit_root() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    let other = TestRepo::new();

    // Run from an unrelated directory
    let output = other.run_cli_success(&["build", "--root", &repo.path_str()]);
    assert_contains(&output, "Indexed 1 functions", true, "explicit root");
}

// ============================================================================
// SCANNING AND CONFIGURATION
// ============================================================================

#[test]
fn test_build_skips_default_excluded_dirs() {
    let repo = TestRepo::new();
    repo.add_injected("src/app.py", "handle", "Request");
    repo.add_injected(".venv/lib/site.py", "vendored", "Request");
    repo.add_injected("node_modules/pkg/x.py", "bundled", "Request");
    repo.add_injected("src/__pycache__/cached.py", "stale", "Request");

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    assert_eq!(json["report"]["files_scanned"], 1);
    assert_eq!(json["records"], 1);
}

#[test]
fn test_build_exclude_flag() {
    let repo = TestRepo::new();
    repo.add_injected("src/app.py", "handle", "Request");
    repo.add_injected("legacy/old.py", "old_handle", "Request");

    let output = repo.run_cli_success(&["build", "--exclude", "legacy", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    assert_eq!(json["report"]["files_scanned"], 1);
}

#[test]
fn test_build_config_file_markers_and_excludes() {
    let repo = TestRepo::new();
    repo.with_config("markers = [\"provider\"]\nexclude = [\"generated\"]\n");
    repo.add_file(
        "svc.py",
        "@provider\ndef make_session(config: Config):\n    return config\n\n@injected\ndef ignored(config: Config):\n    return config\n",
    );
    repo.add_file(
        "generated/api.py",
        "@provider\ndef gen(config: Config):\n    return config\n",
    );

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    assert_eq!(json["records"], 1);
    assert_eq!(json["report"]["files_scanned"], 1);
}

#[test]
fn test_build_marker_flag_overrides_config() {
    let repo = TestRepo::new();
    repo.with_config("markers = [\"provider\"]\n");
    repo.add_file(
        "svc.py",
        "@provider\ndef a(config: Config): ...\n\n@injected\ndef b(config: Config): ...\n",
    );

    let output = repo.run_cli_success(&["build", "--marker", "injected", "-f", "json"]);
    let json = assert_valid_json(&output, "build json");

    assert_eq!(json["records"], 1);
}

#[test]
fn test_build_invalid_config_is_general_error() {
    let repo = TestRepo::new();
    repo.with_config("unknown_key = 1\n");
    repo.add_injected("a.py", "f", "User");

    let (code, _, stderr) = repo.run_cli_with_code(&["build"]);
    assert_eq!(code, 1);
    assert_contains(&stderr, "Configuration error", true, "config error");
}

#[test]
fn test_build_invalid_exclude_glob() {
    let repo = TestRepo::new();
    repo.add_injected("a.py", "f", "User");

    let (code, _, stderr) = repo.run_cli_with_code(&["build", "--exclude", "a["]);
    assert_eq!(code, 1);
    assert_contains(&stderr, "exclude", false, "glob error");
}

// ============================================================================
// FAILURES AND STRICT MODE
// ============================================================================

#[test]
fn test_build_best_effort_on_parse_failure() {
    let repo = TestRepo::new();
    repo.add_injected("good.py", "ok", "User");
    repo.add_file("broken.py", "@injected\ndef broken(:\n    pass\n");

    let output = repo.build();
    assert_contains(&output, "files_failed: 1", true, "failure count");
    assert_contains(&output, "broken.py", true, "failure listed");
}

#[test]
fn test_build_strict_fails_on_parse_failure() {
    let repo = TestRepo::new();
    repo.add_injected("good.py", "ok", "User");
    repo.add_file("broken.py", "@injected\ndef broken(:\n    pass\n");

    let (code, _, stderr) = repo.run_cli_with_code(&["build", "--strict"]);
    assert_eq!(code, 4);
    assert_contains(&stderr, "broken.py", true, "failing file reported");
    assert_contains(&stderr, "1 of 2 files failed to parse", true, "summary");
}

#[test]
fn test_build_strict_from_config() {
    let repo = TestRepo::new();
    repo.with_config("strict = true\n");
    repo.add_injected("good.py", "ok", "User");
    repo.add_file("broken.py", "@injected\ndef broken(:\n");

    let (code, _, _) = repo.run_cli_with_code(&["build"]);
    assert_eq!(code, 4);
}

#[test]
fn test_build_all_files_failing_is_fatal() {
    let repo = TestRepo::new();
    repo.add_file("one.py", "@injected\ndef one(:\n");
    repo.add_file("two.py", "@injected\nclass (\n");

    let (code, _, stderr) = repo.run_cli_with_code(&["build"]);
    assert_eq!(code, 4);
    assert_contains(&stderr, "2 of 2 files failed to parse", true, "all failed");
}

#[test]
fn test_build_missing_root() {
    let repo = TestRepo::new();
    let missing = repo.path().join("does-not-exist");

    let (code, _, stderr) =
        repo.run_cli_with_code(&["build", "--root", &missing.to_string_lossy()]);
    assert_eq!(code, 3);
    assert_contains(&stderr, "Cannot read project root", true, "root error");
}

#[test]
fn test_build_empty_project() {
    let repo = TestRepo::new();

    let output = repo.build();
    assert_contains(
        &output,
        "Indexed 0 functions under 0 type keys from 0 files",
        true,
        "empty project",
    );
}
