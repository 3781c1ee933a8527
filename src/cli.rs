//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Index dependency-injected Python functions by subject type
#[derive(Parser, Debug)]
#[command(name = "iproxy-indexer")]
#[command(about = "Index @injected Python functions by the type of their single subject parameter")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for summaries (query results are always JSON)
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,

    /// Diagnostic log level; RUST_LOG takes precedence when set
    #[arg(long, value_enum, global = true, env = "IPROXY_INDEXER_LOG")]
    pub log_level: Option<LogLevel>,

    /// Directory for persisted index caches
    #[arg(long, value_name = "DIR", global = true, env = "IPROXY_INDEXER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for daemon sockets and logs
    #[arg(long, value_name = "DIR", global = true, env = "IPROXY_INDEXER_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,
}

/// Output format for command summaries
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable key: value lines
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Diagnostic verbosity
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// ============================================
// Main Commands Enum
// ============================================

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan and index a project, then persist the index cache
    Build(BuildArgs),

    /// Show index size, file count and fingerprint
    Stats(StatsArgs),

    /// Print a JSON array of functions whose subject has the given type
    #[command(name = "query-iproxy-functions")]
    QueryIproxyFunctions(QueryArgs),

    /// Start a background daemon for a project
    Start(StartArgs),

    /// Show the daemon's state
    Status(DaemonArgs),

    /// Stop the daemon gracefully
    Stop(DaemonArgs),

    /// Send a query to the running daemon
    #[command(name = "test-iproxy-query")]
    TestIproxyQuery(DaemonQueryArgs),

    /// Remove the cached index for a project
    ClearCache(RootArgs),

    /// Run the daemon in the foreground (used by `start`)
    #[command(hide = true)]
    Serve(ServeArgs),
}

// ============================================
// Shared argument groups
// ============================================

#[derive(Args, Debug, Clone, Default)]
pub struct RootArgs {
    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IndexOptions {
    /// Decorator name marking injectable functions (repeatable)
    #[arg(long = "marker", value_name = "NAME")]
    pub markers: Vec<String>,

    /// Glob of paths to exclude, relative to the root (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub excludes: Vec<String>,

    /// Worker threads for parsing (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

// ============================================
// Subcommand arguments
// ============================================

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub root: RootArgs,

    #[command(flatten)]
    pub index: IndexOptions,

    /// Fail when any file cannot be parsed
    #[arg(long)]
    pub strict: bool,

    /// Do not write the index cache
    #[arg(long)]
    pub no_cache: bool,

    /// Show a progress bar while indexing
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub root: RootArgs,

    #[command(flatten)]
    pub index: IndexOptions,

    /// Ignore the cache and build fresh
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Type annotation to look up, e.g. `User` or `List[User]`
    #[arg(value_name = "TYPE_KEY")]
    pub type_key: String,

    #[command(flatten)]
    pub root: RootArgs,

    #[command(flatten)]
    pub index: IndexOptions,

    /// Also return functions whose subject type contains TYPE_KEY as an argument
    #[arg(long)]
    pub nested: bool,

    /// Fail when any file cannot be parsed
    #[arg(long)]
    pub strict: bool,

    /// Ignore the cache and build fresh
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub root: RootArgs,

    #[command(flatten)]
    pub index: IndexOptions,

    /// Shut down after this many seconds without requests (0 disables)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Ignore the cache when loading the index
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub root: RootArgs,

    #[command(flatten)]
    pub index: IndexOptions,

    /// Shut down after this many seconds without requests (0 disables)
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Ignore the cache when loading the index
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub root: RootArgs,
}

#[derive(Args, Debug)]
pub struct DaemonQueryArgs {
    /// Type annotation to look up
    #[arg(value_name = "TYPE_KEY")]
    pub type_key: String,

    #[command(flatten)]
    pub root: RootArgs,

    /// Also return functions whose subject type contains TYPE_KEY as an argument
    #[arg(long)]
    pub nested: bool,
}
