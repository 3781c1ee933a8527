//! iproxy-indexer: find dependency-injected Python functions by type
//!
//! Scans a Python project with tree-sitter, picks out functions carrying an
//! `@injected` style marker whose signature has exactly one required
//! parameter after any positional-only prefix, and indexes them by that
//! parameter's type annotation. Indexes are cached on disk and can be kept
//! warm in a per-project daemon that answers queries over a Unix socket.
//!
//! # Example
//!
//! ```no_run
//! use iproxy_indexer::{build_index, query, IndexSettings};
//! use std::path::Path;
//!
//! let outcome = build_index(Path::new("."), &IndexSettings::default(), None)?;
//! for record in query(&outcome.index, "List[User]") {
//!     println!("{} {}:{}", record.qualified_name, record.file_path, record.line_number);
//! }
//! # Ok::<(), iproxy_indexer::IndexerError>(())
//! ```

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fingerprint;
pub mod fs_utils;
pub mod index;
pub mod indexing;
pub mod logging;
pub mod parsing;
pub mod query;
pub mod scanner;
pub mod signature;
pub mod type_key;

// Re-export commonly used types
pub use cache::{CacheLookup, IndexCache, MissReason};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{DaemonSettings, IndexSettings, ProjectConfig, StatePaths};
pub use error::{IndexerError, Result};
pub use fingerprint::Fingerprint;
pub use index::{FunctionRecord, Index};
pub use indexing::{build_index, load_or_build, BuildOutcome, BuildReport};
pub use query::{query, query_nested, TypeQuery};
pub use scanner::SourceScanner;
pub use signature::{validate, Rejection};
pub use type_key::{TypeExpr, TypeKey};
