//! TestRepo builder for CLI integration tests
//!
//! Each repo gets its own temporary project root plus a separate state
//! directory holding the cache and daemon runtime files, so tests never
//! touch the user's real cache or sockets and can run in parallel.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Builder for creating Python test projects
pub struct TestRepo {
    dir: TempDir,
    state: TempDir,
}

impl TestRepo {
    /// Create a new empty test project
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            state: TempDir::new().expect("Failed to create state dir"),
        }
    }

    /// Get the path to the project root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get path as string
    pub fn path_str(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    /// Cache directory handed to the CLI
    pub fn cache_dir(&self) -> PathBuf {
        self.state.path().join("cache")
    }

    /// Runtime directory (sockets, daemon logs) handed to the CLI
    pub fn runtime_dir(&self) -> PathBuf {
        self.state.path().join("run")
    }

    /// Add a source file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add an empty file
    pub fn add_empty_file(&self, relative_path: &str) -> &Self {
        self.add_file(relative_path, "")
    }

    /// Remove a file from the project
    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.dir.path().join(relative_path)).expect("Failed to remove file");
        self
    }

    /// Add an `@injected` function whose only parameter has the given annotation
    pub fn add_injected(&self, relative_path: &str, fn_name: &str, annotation: &str) -> &Self {
        self.add_file(
            relative_path,
            &format!(
                "from pinjected import injected\n\n\n@injected\ndef {fn_name}(subject: {annotation}):\n    return subject\n"
            ),
        )
    }

    /// The two-file project: one valid async function, one with two required params
    pub fn with_user_product_layout(&self) -> &Self {
        self.add_file(
            "a.py",
            r#"from pinjected import injected


@injected
async def a_valid_async(x: User):
    return x
"#,
        );
        self.add_file(
            "b.py",
            r#"from pinjected import injected


@injected
def invalid_two_params(x: User, y: Product):
    return x, y
"#,
        );
        self
    }

    /// A small project exercising generics, classes and positional-only params
    pub fn with_service_layout(&self) -> &Self {
        self.add_file(
            "app/users.py",
            r#"from typing import List, Optional

from pinjected import injected


@injected
def process_user(logger, /, user: User):
    logger.info(user)


@injected
async def load_users(db, /, ids: List[int]) -> List[User]:
    return await db.fetch(ids)


@injected
def process_user_list(logger, /, users: List[User]):
    for user in users:
        logger.info(user)


@injected
def maybe_user(user: Optional[User]):
    return user


class UserService:
    @injected
    def by_id(self, /, user: User):
        return user.id
"#,
        );
        self.add_file(
            "app/orders.py",
            r#"from pinjected import injected


@injected
def ship(order: Order, *, express=False):
    return order


@injected
def no_annotation(order):
    return order


def not_injected(order: Order):
    return order
"#,
        );
        self
    }

    /// Write a `.iproxy-indexer.toml` at the project root
    pub fn with_config(&self, toml: &str) -> &Self {
        self.add_file(".iproxy-indexer.toml", toml)
    }

    /// Run the iproxy-indexer CLI inside the project and return output
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(env!("CARGO_BIN_EXE_iproxy-indexer"))
            .current_dir(self.path())
            .env("IPROXY_INDEXER_CACHE_DIR", self.cache_dir())
            .env("IPROXY_INDEXER_RUNTIME_DIR", self.runtime_dir())
            .env_remove("IPROXY_INDEXER_LOG")
            .env_remove("RUST_LOG")
            .args(args)
            .output()
    }

    /// Run CLI and expect success, return stdout
    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command failed: {:?}\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Run CLI and expect failure, return (stdout, stderr)
    pub fn run_cli_failure(&self, args: &[&str]) -> (String, String) {
        let (_, stdout, stderr) = self.run_cli_with_code(args);
        (stdout, stderr)
    }

    /// Run CLI expecting a non-zero exit, return (exit code, stdout, stderr)
    pub fn run_cli_with_code(&self, args: &[&str]) -> (i32, String, String) {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            !output.status.success(),
            "CLI command should have failed: {:?}\nstdout: {}",
            args,
            String::from_utf8_lossy(&output.stdout)
        );
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        )
    }

    /// Run `build` and expect success
    pub fn build(&self) -> String {
        self.run_cli_success(&["build"])
    }

    /// Whether a daemon socket exists for this project
    pub fn socket_exists(&self) -> bool {
        fs::read_dir(self.runtime_dir())
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.path().extension().is_some_and(|ext| ext == "sock"))
            })
            .unwrap_or(false)
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRepo {
    fn drop(&mut self) {
        // Reap any daemon a test left behind
        if self.socket_exists() {
            let _ = self.run_cli(&["stop"]);
        }
    }
}
