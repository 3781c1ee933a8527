//! Source file discovery for a project root
//!
//! Walks the root with `ignore::WalkBuilder`, skipping a built-in set of
//! tooling directories plus any user-supplied exclude globs, and yields
//! every file with a recognized extension in sorted order.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;

use crate::config::IndexSettings;
use crate::error::{IndexerError, Result};

/// Directory names that are never scanned.
///
/// User excludes are appended to this set, never replace it.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    ".tox",
    ".nox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "__pycache__",
    "node_modules",
    "site-packages",
    "build",
    "dist",
];

/// Files found under a root
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Candidate source files, sorted by path
    pub files: Vec<PathBuf>,
    /// Entries that could not be read and were skipped
    pub unreadable: usize,
}

/// Walks a project root for candidate source files
#[derive(Debug, Clone)]
pub struct SourceScanner {
    root: PathBuf,
    excludes: Vec<String>,
    extensions: Vec<String>,
}

impl SourceScanner {
    pub fn new(root: &Path, settings: &IndexSettings) -> Self {
        Self {
            root: root.to_path_buf(),
            excludes: settings.excludes.clone(),
            extensions: settings.extensions.clone(),
        }
    }

    /// Produce the candidate file list.
    ///
    /// Calling this again re-walks the tree, so the sequence is restartable.
    ///
    /// # Errors
    ///
    /// `RootUnreadable` when the root itself cannot be listed, and
    /// `ConfigError` for an invalid exclude glob. Unreadable entries below
    /// the root are skipped with a warning.
    pub fn scan(&self) -> Result<ScanResult> {
        if let Err(e) = fs::read_dir(&self.root) {
            return Err(IndexerError::RootUnreadable {
                path: self.root.clone(),
                message: e.to_string(),
            });
        }

        let overrides = self.build_overrides()?;

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .overrides(overrides)
            .filter_entry(|entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                !(is_dir && entry.depth() > 0 && is_default_excluded(entry.file_name()))
            });

        let mut result = ScanResult::default();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    result.unreadable += 1;
                    continue;
                }
            };

            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.has_source_extension(entry.path()) {
                result.files.push(entry.into_path());
            }
        }

        result.files.sort();
        tracing::debug!(
            "Scanned {}: {} candidate files, {} unreadable entries",
            self.root.display(),
            result.files.len(),
            result.unreadable
        );
        Ok(result)
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|known| known == ext))
            .unwrap_or(false)
    }

    fn build_overrides(&self) -> Result<Override> {
        let mut builder = OverrideBuilder::new(&self.root);
        for pattern in &self.excludes {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            // A leading '!' in an override means "ignore"
            builder
                .add(&format!("!{}", pattern))
                .map_err(|e| IndexerError::ConfigError {
                    message: format!("Invalid exclude pattern '{}': {}", pattern, e),
                })?;
        }
        builder.build().map_err(|e| IndexerError::ConfigError {
            message: format!("Invalid exclude patterns: {}", e),
        })
    }
}

fn is_default_excluded(name: &std::ffi::OsStr) -> bool {
    let Some(name) = name.to_str() else {
        return false;
    };
    DEFAULT_EXCLUDED_DIRS.contains(&name) || name.ends_with(".egg-info")
}
