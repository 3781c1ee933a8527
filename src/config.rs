//! Configuration for indexing and the daemon.
//!
//! Settings come from three places, later ones winning:
//! 1. Built-in defaults
//! 2. `<root>/.iproxy-indexer.toml` (optional)
//! 3. Command-line flags (excludes are appended, never replacing)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::fs_utils::{self, Fnv1a};

/// Name of the per-project config file
pub const PROJECT_CONFIG_FILE: &str = ".iproxy-indexer.toml";

/// Decorator name that marks an injectable function
pub const DEFAULT_MARKER: &str = "injected";

/// Default daemon idle timeout
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Source file extensions recognized by the scanner
pub const DEFAULT_EXTENSIONS: &[&str] = &["py"];

/// Per-project configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Decorator names treated as the injectable marker
    #[serde(default)]
    pub markers: Option<Vec<String>>,

    /// Extra exclude globs (appended to the built-in set)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Worker threads for the build
    #[serde(default)]
    pub workers: Option<usize>,

    /// Daemon idle timeout in seconds
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Fail one-shot commands when any file fails to parse
    #[serde(default)]
    pub strict: Option<bool>,
}

impl ProjectConfig {
    /// Load `<root>/.iproxy-indexer.toml`, or defaults if absent
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&root.join(PROJECT_CONFIG_FILE))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| IndexerError::file(path, e))?;

        toml::from_str(&content).map_err(|e| IndexerError::ConfigError {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }
}

/// Everything that influences what an index build produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub markers: Vec<String>,
    pub excludes: Vec<String>,
    pub extensions: Vec<String>,
    pub workers: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            markers: vec![DEFAULT_MARKER.to_string()],
            excludes: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            workers: default_workers(),
        }
    }
}

impl IndexSettings {
    /// Merge file config with command-line overrides
    pub fn resolve(
        file: &ProjectConfig,
        cli_markers: &[String],
        cli_excludes: &[String],
        cli_workers: Option<usize>,
    ) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(markers) = &file.markers {
            settings.markers = markers.clone();
        }
        if !cli_markers.is_empty() {
            settings.markers = cli_markers.to_vec();
        }
        settings.markers.retain(|m| !m.trim().is_empty());
        if settings.markers.is_empty() {
            return Err(IndexerError::ConfigError {
                message: "at least one marker name is required".to_string(),
            });
        }

        settings.excludes.extend(file.exclude.iter().cloned());
        settings.excludes.extend(cli_excludes.iter().cloned());

        if let Some(workers) = cli_workers.or(file.workers) {
            if workers == 0 {
                return Err(IndexerError::ConfigError {
                    message: "workers must be at least 1".to_string(),
                });
            }
            settings.workers = workers;
        }

        Ok(settings)
    }

    /// Digest of the settings that change index content.
    ///
    /// Worker count is excluded: parallelism never changes the result.
    pub fn digest(&self) -> u64 {
        let mut hasher = Fnv1a::default();
        for marker in &self.markers {
            hasher.write_str(marker);
        }
        hasher.write_str("--");
        for exclude in &self.excludes {
            hasher.write_str(exclude);
        }
        hasher.write_str("--");
        for ext in &self.extensions {
            hasher.write_str(ext);
        }
        hasher.finish()
    }
}

/// Daemon settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonSettings {
    pub idle_timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl DaemonSettings {
    pub fn resolve(file: &ProjectConfig, cli_idle_timeout_secs: Option<u64>) -> Self {
        let secs = cli_idle_timeout_secs
            .or(file.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        Self {
            idle_timeout: Duration::from_secs(secs),
        }
    }

    /// How often the idle watchdog looks at the clock
    pub fn check_interval(&self) -> Duration {
        (self.idle_timeout / 10)
            .min(Duration::from_secs(1))
            .max(Duration::from_millis(10))
    }
}

/// Default worker count: available hardware parallelism
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Where per-user state lives
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub cache_dir: PathBuf,
    pub runtime_dir: PathBuf,
}

impl StatePaths {
    pub fn resolve(cache_dir: Option<PathBuf>, runtime_dir: Option<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.unwrap_or_else(fs_utils::get_cache_base_dir),
            runtime_dir: runtime_dir.unwrap_or_else(fs_utils::get_runtime_base_dir),
        }
    }

    /// Cache file for a root: `<cache_dir>/<root_hash>/index.bin`
    pub fn cache_file(&self, root: &Path) -> PathBuf {
        self.cache_dir
            .join(fs_utils::root_hash(root))
            .join("index.bin")
    }

    /// Daemon socket for a root: `<runtime_dir>/<root_hash>.sock`
    pub fn socket_path(&self, root: &Path) -> PathBuf {
        self.runtime_dir
            .join(format!("{}.sock", fs_utils::root_hash(root)))
    }

    /// Daemon log file for a root: `<runtime_dir>/<root_hash>.log`
    pub fn log_path(&self, root: &Path) -> PathBuf {
        self.runtime_dir
            .join(format!("{}.log", fs_utils::root_hash(root)))
    }
}
