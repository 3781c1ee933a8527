//! Error types and exit codes for iproxy-indexer

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Exit code: general failure (bad config, RPC failure, bad input)
pub const EXIT_GENERAL: u8 = 1;
/// Exit code: file or I/O failure
pub const EXIT_FILE_ERROR: u8 = 3;
/// Exit code: parse failures severe enough to fail the run
pub const EXIT_PARSE_ERROR: u8 = 4;
/// Exit code: `start` found a live daemon for the root
pub const EXIT_ALREADY_RUNNING: u8 = 5;
/// Exit code: daemon control command found no daemon for the root
pub const EXIT_NOT_RUNNING: u8 = 6;

/// Main error type for iproxy-indexer operations
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Cannot read project root {path}: {message}")]
    RootUnreadable { path: PathBuf, message: String },

    #[error("IO error at {path}: {message}")]
    FileError { path: PathBuf, message: String },

    #[error("Failed to parse {path}: {message}")]
    ParseFailure { path: PathBuf, message: String },

    #[error("{failed} of {total} files failed to parse")]
    ParseFailures { failed: usize, total: usize },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Daemon request failed: {message}")]
    RpcError { message: String },

    #[error("Daemon already running for {root} (socket {socket})")]
    AlreadyRunning { root: PathBuf, socket: PathBuf },

    #[error("No daemon running for {root}")]
    NotRunning { root: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    /// Numeric exit code for this error:
    /// - 1: Config / RPC / general
    /// - 3: File and I/O errors
    /// - 4: Parse errors
    /// - 5: Daemon already running
    /// - 6: Daemon not running
    pub fn code(&self) -> u8 {
        match self {
            Self::RootUnreadable { .. } => EXIT_FILE_ERROR,
            Self::FileError { .. } => EXIT_FILE_ERROR,
            Self::Io(_) => EXIT_FILE_ERROR,
            Self::ParseFailure { .. } => EXIT_PARSE_ERROR,
            Self::ParseFailures { .. } => EXIT_PARSE_ERROR,
            Self::ConfigError { .. } => EXIT_GENERAL,
            Self::RpcError { .. } => EXIT_GENERAL,
            Self::AlreadyRunning { .. } => EXIT_ALREADY_RUNNING,
            Self::NotRunning { .. } => EXIT_NOT_RUNNING,
        }
    }

    /// Convert error to a process exit code
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Daemon lifecycle outcomes that are reported to the user, not failures
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. } | Self::NotRunning { .. })
    }

    pub(crate) fn file(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::FileError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for iproxy-indexer operations
pub type Result<T> = std::result::Result<T, IndexerError>;
