//! Command modules for the iproxy-indexer CLI
//!
//! Each module implements one group of subcommands:
//! - `build` - Scan, index and persist the cache
//! - `stats` - Index statistics
//! - `query` - One-shot query against a cached or fresh index
//! - `cache` - Remove a cached index
//! - `daemon` - `start`, `status`, `stop` and `test-iproxy-query`
//! - `serve` - Foreground daemon
//!
//! All handlers take their `Args` struct from `cli.rs` plus the shared
//! `CommandContext`, and return the text to print on stdout.

pub mod build;
pub mod cache;
pub mod query;
pub mod stats;

#[cfg(unix)]
pub mod daemon;
#[cfg(unix)]
pub mod serve;

pub use build::run_build;
pub use cache::run_clear_cache;
pub use query::run_query;
pub use stats::run_stats;

#[cfg(unix)]
pub use daemon::{run_start, run_status, run_stop, run_test_query};
#[cfg(unix)]
pub use serve::run_serve;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cli::{IndexOptions, LogLevel, OutputFormat, RootArgs};
use crate::config::{IndexSettings, ProjectConfig, StatePaths};
use crate::error::{IndexerError, Result};
use crate::fs_utils;
use crate::index::FunctionRecord;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Output format for summaries
    pub format: OutputFormat,
    /// Log level explicitly requested on the command line
    pub log_level: Option<LogLevel>,
    /// Cache and runtime directories
    pub paths: StatePaths,
}

impl CommandContext {
    pub fn new(format: OutputFormat, log_level: Option<LogLevel>, paths: StatePaths) -> Self {
        Self {
            format,
            log_level,
            paths,
        }
    }
}

/// Resolve `--root` (or the current directory) to a canonical directory.
pub fn resolve_root(args: &RootArgs) -> Result<PathBuf> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let meta = std::fs::metadata(&root).map_err(|e| IndexerError::RootUnreadable {
        path: root.clone(),
        message: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(IndexerError::RootUnreadable {
            path: root,
            message: "not a directory".to_string(),
        });
    }

    Ok(fs_utils::canonical_root(&root))
}

/// Project config plus the index settings after command-line overrides
pub fn resolve_settings(root: &Path, options: &IndexOptions) -> Result<(ProjectConfig, IndexSettings)> {
    let config = ProjectConfig::load(root)?;
    let settings = IndexSettings::resolve(
        &config,
        &options.markers,
        &options.excludes,
        options.workers,
    )?;
    Ok((config, settings))
}

/// Render records as a pretty JSON array
pub fn records_json<'a>(records: impl IntoIterator<Item = &'a FunctionRecord>) -> Result<String> {
    let records: Vec<&FunctionRecord> = records.into_iter().collect();
    to_json(&records)
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| IndexerError::ConfigError {
        message: format!("JSON serialization failed: {}", e),
    })
}

/// Render `key: value` lines
pub(crate) fn key_values(pairs: &[(&str, String)]) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(&format!("{}: {}\n", key, value));
    }
    out
}
