//! Daemon protocol message types
//!
//! One JSON object per line in each direction:
//!
//! ```json
//! // Client -> Daemon
//! {"type": "query", "type_key": "List[User]", "nested": false}
//! {"type": "status"}
//! {"type": "rebuild"}
//! {"type": "stop"}
//! {"type": "ping"}
//!
//! // Daemon -> Client
//! {"type": "records", "records": [...]}
//! {"type": "status", "state": "ready", "index_keys": 12, ...}
//! {"type": "rebuilt", "records": 40, "keys": 12, ...}
//! {"type": "stopping"}
//! {"type": "pong", "pid": 4242}
//! {"type": "error", "code": "bad_request", "message": "..."}
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::index::FunctionRecord;
use crate::query::TypeQuery;

/// Client-to-daemon message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Look up functions by subject type
    Query(TypeQuery),
    /// Report daemon state and index size
    Status,
    /// Rebuild the index from scratch and publish it
    Rebuild,
    /// Shut down gracefully
    Stop,
    /// Liveness probe
    Ping,
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Status => "status",
            Self::Rebuild => "rebuild",
            Self::Stop => "stop",
            Self::Ping => "ping",
        }
    }
}

/// Daemon-to-client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Records { records: Vec<FunctionRecord> },
    Status(DaemonStatus),
    Rebuilt(RebuildSummary),
    Stopping,
    Pong { pid: u32 },
    Error { code: ErrorCode, message: String },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Machine-readable error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request line was not a valid request
    BadRequest,
    /// A rebuild failed; the previous index is still served
    BuildFailed,
    /// The index is still loading; only `ping`, `status` and `stop` are served
    Starting,
    /// The daemon is shutting down and refuses new work
    ShuttingDown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadRequest => "bad_request",
            Self::BuildFailed => "build_failed",
            Self::Starting => "starting",
            Self::ShuttingDown => "shutting_down",
        })
    }
}

/// Lifecycle state of a daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Stopped,
    Starting,
    Ready,
    Serving,
    Idle,
    ShuttingDown,
}

impl DaemonState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Ready => 2,
            Self::Serving => 3,
            Self::Idle => 4,
            Self::ShuttingDown => 5,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Ready,
            3 => Self::Serving,
            4 => Self::Idle,
            5 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Ready => "Ready",
            Self::Serving => "Serving",
            Self::Idle => "Idle",
            Self::ShuttingDown => "ShuttingDown",
        })
    }
}

/// Payload of a `status` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub root: PathBuf,
    pub pid: u32,
    /// Distinct type keys in the served index
    pub index_keys: usize,
    pub records: usize,
    pub files_indexed: usize,
    pub fingerprint: String,
    pub built_at: String,
    /// Whether the served index was loaded from the on-disk cache
    pub from_cache: bool,
    pub uptime_secs: u64,
    /// Time since the previous request was serviced
    pub last_activity_ms: u64,
    /// Zero when idle shutdown is disabled
    pub idle_timeout_secs: u64,
    pub requests_served: u64,
}

/// Payload of a `rebuilt` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub records: usize,
    pub keys: usize,
    pub files_scanned: usize,
    pub files_failed: usize,
    pub elapsed_ms: u64,
}
