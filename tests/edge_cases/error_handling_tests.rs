//! Error Handling and Edge Case Tests
//!
//! Odd inputs the indexer must survive: empty and undecodable files,
//! unusual decorator and signature forms, and bad command lines.

use crate::common::{
    assert_contains, assert_record_exists, assert_valid_json, record_names, records, TestRepo,
};

// ============================================================================
// UNUSUAL FILES
// ============================================================================

#[test]
fn test_empty_python_file() {
    let repo = TestRepo::new();
    repo.add_empty_file("pkg/__init__.py");

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "empty file");
    assert_eq!(json["records"], 0);
    assert_eq!(json["report"]["files_skipped"], 1);
}

#[test]
fn test_non_utf8_file_is_reported_not_fatal() {
    let repo = TestRepo::new();
    repo.add_injected("good.py", "ok", "User");
    std::fs::write(repo.path().join("latin1.py"), b"# caf\xe9\n@injected\n").unwrap();

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let json = assert_valid_json(&output, "non-utf8");
    assert_eq!(json["records"], 1);
    assert_eq!(json["report"]["failures"][0]["path"], "latin1.py");
}

#[test]
fn test_non_python_files_ignored() {
    let repo = TestRepo::new();
    repo.add_file("README.md", "@injected\ndef f(x: User): ...\n");
    repo.add_file("script.pyi", "@injected\ndef f(x: User): ...\n");
    repo.add_injected("real.py", "f", "User");

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    assert_eq!(assert_valid_json(&output, "extensions")["report"]["files_scanned"], 1);
}

#[test]
fn test_deeply_nested_project() {
    let repo = TestRepo::new();
    repo.add_injected("a/b/c/d/e/f/g/deep.py", "deep", "Token");

    let output = repo.run_cli_success(&["query-iproxy-functions", "Token"]);
    let found = records(&output, "deep");
    assert_eq!(found[0]["file_path"], "a/b/c/d/e/f/g/deep.py");
}

// ============================================================================
// DECORATOR AND SIGNATURE FORMS
// ============================================================================

#[test]
fn test_marker_forms() {
    let repo = TestRepo::new();
    repo.add_file(
        "forms.py",
        r#"import pinjected


@injected(protocol=UserProto)
def called(user: User):
    pass


@pinjected.injected
def dotted(user: User):
    pass


@cache
@injected
def stacked(user: User):
    pass


@instance
def other_marker(user: User):
    pass
"#,
    );

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(
        record_names(&records(&output, "marker forms")),
        vec!["called", "dotted", "stacked"]
    );
}

#[test]
fn test_signature_edge_cases() {
    let repo = TestRepo::new();
    repo.add_file(
        "sigs.py",
        r#"@injected
def with_defaults(user: User, retries: int = 3, *args, **kwargs):
    pass


@injected
def keyword_only_subject(logger, /, *, user: User):
    pass


@injected
def all_defaults(user: User = None):
    pass


@injected
def only_variadics(*args: User, **kwargs):
    pass


@injected
def no_params():
    pass


@injected
def two_keyword_only(*, a: User, b: User):
    pass
"#,
    );

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(
        record_names(&records(&output, "signatures")),
        vec!["with_defaults", "keyword_only_subject"]
    );

    let output = repo.run_cli_success(&["build", "-f", "json"]);
    let rejections = &assert_valid_json(&output, "build")["report"]["rejections"];
    assert_eq!(rejections["all_defaults"], 1);
    assert_eq!(rejections["no_parameters"], 1);
    assert_eq!(rejections["multiple_subjects"], 1);
}

#[test]
fn test_nested_function_and_class_scopes() {
    let repo = TestRepo::new();
    repo.add_file(
        "scopes.py",
        r#"class Outer:
    class Inner:
        @injected
        def method(self, /, user: User):
            pass


def factory():
    @injected
    def built(user: User):
        pass
    return built
"#,
    );

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "scopes");
    assert_record_exists(&found, "Outer.Inner.method");
    assert_record_exists(&found, "factory.built");
}

#[test]
fn test_redefinition_in_same_file_last_wins() {
    let repo = TestRepo::new();
    repo.add_file(
        "redef.py",
        "@injected\ndef handle(x: User): ...\n\n\n@injected\ndef handle(y: User): ...\n",
    );

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "redefinition");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["subject_param"], "y");
    assert_eq!(found[0]["line_number"], 6);
}

#[test]
fn test_rejected_redefinition_hides_earlier_one() {
    let repo = TestRepo::new();
    repo.add_file(
        "redef.py",
        "@injected\ndef handle(x: User): ...\n\n\n@injected\ndef handle(x: User, y: Product): ...\n",
    );
    repo.add_injected("other.py", "kept", "User");

    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    assert_eq!(record_names(&records(&output, "shadowed")), vec!["kept"]);
}

#[test]
fn test_annotated_spacing_variants_match() {
    let repo = TestRepo::new();
    repo.add_file(
        "deps.py",
        "@injected\ndef current(user: Annotated[User,Depends( get_user )]): ...\n",
    );

    let output = repo.run_cli_success(&[
        "query-iproxy-functions",
        "Annotated[User, Depends(get_user)]",
    ]);
    let found = records(&output, "annotated");
    assert_eq!(record_names(&found), vec!["current"]);
    assert_eq!(found[0]["subject_type_key"], "Annotated[User, Depends(get_user)]");
}

#[test]
fn test_string_and_union_annotations() {
    let repo = TestRepo::new();
    repo.add_file(
        "ann.py",
        "@injected\ndef forward(x: \"User\"): ...\n\n@injected\ndef either(x: User | None): ...\n",
    );

    let output = repo.run_cli_success(&["query-iproxy-functions", "User | None"]);
    assert_eq!(record_names(&records(&output, "union")), vec!["either"]);

    // Forward references are keyed without their quotes
    let output = repo.run_cli_success(&["query-iproxy-functions", "User"]);
    let found = records(&output, "string");
    assert_eq!(record_names(&found), vec!["forward"]);
    assert_eq!(found[0]["subject_type_raw"], "\"User\"");
}

// ============================================================================
// COMMAND LINE ERRORS
// ============================================================================

#[test]
fn test_query_requires_type_key() {
    let repo = TestRepo::new();

    let (code, _, stderr) = repo.run_cli_with_code(&["query-iproxy-functions"]);
    assert_eq!(code, 2);
    assert_contains(&stderr, "TYPE_KEY", true, "usage error");
}

#[test]
fn test_unknown_command() {
    let repo = TestRepo::new();

    let (code, _, _) = repo.run_cli_with_code(&["explode"]);
    assert_eq!(code, 2);
}

#[test]
fn test_root_is_a_file() {
    let repo = TestRepo::new();
    repo.add_file("not_a_dir.py", "x = 1\n");
    let file = repo.path().join("not_a_dir.py");

    let (code, _, stderr) = repo.run_cli_with_code(&["build", "--root", &file.to_string_lossy()]);
    assert_eq!(code, 3);
    assert_contains(&stderr, "not a directory", true, "root is a file");
}
