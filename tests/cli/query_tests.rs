//! Tests for the `query-iproxy-functions` command

use crate::common::{
    assert_record_exists, assert_record_not_exists, record_names, records, TestRepo,
};

// ============================================================================
// EXACT LOOKUP
// ============================================================================

#[test]
fn test_query_two_required_params_rejected() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    repo.build();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "query User");

    assert_eq!(record_names(&found), vec!["a_valid_async"]);
    let record = &found[0];
    assert_eq!(record["file_path"], "a.py");
    assert_eq!(record["line_number"], 5);
    assert_eq!(record["is_async"], true);
    assert_eq!(record["subject_param"], "x");
    assert_eq!(record["subject_type_raw"], "User");
    assert_eq!(record["subject_type_key"], "User");
}

#[test]
fn test_query_without_prior_build() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(record_names(&records(&output, "cold query")), vec!["a_valid_async"]);
    // The cold query populated the cache
    assert!(repo.cache_dir().exists());
}

#[test]
fn test_query_positional_only_and_methods() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "query User");

    assert_record_exists(&found, "process_user");
    let method = assert_record_exists(&found, "UserService.by_id");
    assert_eq!(method["subject_param"], "user");
    assert_record_not_exists(&found, "process_user_list");
    assert_record_not_exists(&found, "maybe_user");
    assert_eq!(found.len(), 2);
}

#[test]
fn test_query_generic_key_normalized() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    for spelling in ["List[User]", "List[ User ]", "List[User ]"] {
        let output = repo.run_cli_success(&["query-iproxy-functions", spelling]);
        let found = records(&output, spelling);
        assert_eq!(record_names(&found), vec!["process_user_list"], "{}", spelling);
    }
}

#[test]
fn test_query_keyword_only_default_ignored() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "Order"]);
    let found = records(&output, "query Order");

    assert_eq!(record_names(&found), vec!["ship"]);
    assert_record_not_exists(&found, "no_annotation");
    assert_record_not_exists(&found, "not_injected");
}

#[test]
fn test_query_no_matches_prints_empty_array() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "Invoice"]);
    assert_eq!(output.trim(), "[]");
}

#[test]
fn test_query_is_case_sensitive() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "user"]);
    assert!(records(&output, "lowercase").is_empty());
}

// ============================================================================
// NESTED LOOKUP
// ============================================================================

#[test]
fn test_query_nested_includes_generic_arguments() {
    let repo = TestRepo::new();
    repo.with_service_layout();

    let output = repo.run_cli_success(&["query-iproxy-functions", "User", "--nested"]);
    let found = records(&output, "nested User");
    let names = record_names(&found);

    // Exact matches come first
    assert_eq!(&names[..2], &["process_user", "UserService.by_id"]);
    assert!(names.contains(&"process_user_list".to_string()));
    assert!(names.contains(&"maybe_user".to_string()));
    // Return annotations never count
    assert!(!names.contains(&"load_users".to_string()));
}

// ============================================================================
// CACHE INTERACTION
// ============================================================================

#[test]
fn test_query_sees_new_file_after_build() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    repo.build();

    repo.add_injected("c.py", "another", "User");

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "after edit");
    assert_eq!(found.len(), 2);
    assert_record_exists(&found, "another");
}

#[test]
fn test_query_forgets_removed_file() {
    let repo = TestRepo::new();
    repo.with_user_product_layout();
    repo.build();

    repo.remove_file("a.py");

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert!(records(&output, "after removal").is_empty());
}

#[test]
fn test_query_same_name_in_two_files() {
    let repo = TestRepo::new();
    repo.add_injected("pkg/a.py", "handle", "Event");
    repo.add_injected("pkg/b.py", "handle", "Event");

    let output = repo.run_cli_success(&["query-iproxy-functions", "Event"]);
    let found = records(&output, "duplicates");

    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["file_path"], "pkg/a.py");
    assert_eq!(found[1]["file_path"], "pkg/b.py");
}

#[test]
fn test_query_strict_with_cached_failures() {
    let repo = TestRepo::new();
    repo.add_injected("good.py", "ok", "User");
    repo.add_file("broken.py", "@injected\ndef broken(:\n");
    repo.build();

    // Best-effort query still answers
    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(record_names(&records(&output, "best effort")), vec!["ok"]);

    // Strict query fails even when served from the cache
    let (code, _, _) = repo.run_cli_with_code(&["query-iproxy-functions", "User", "--strict"]);
    assert_eq!(code, 4);
}

#[test]
fn test_query_missing_root() {
    let repo = TestRepo::new();
    let missing = repo.path().join("nope");

    let (code, _, _) = repo.run_cli_with_code(&[
        "query-iproxy-functions",
        "User",
        "--root",
        &missing.to_string_lossy(),
    ]);
    assert_eq!(code, 3);
}
