//! Per-root query daemon
//!
//! Keeps one project's index warm in memory and answers requests over a
//! Unix domain socket.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                  iproxy-indexer serve --root <root>                │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  <runtime_dir>/<root_hash>.sock ──► accept loop ──► connection     │
//! │                                                     tasks (NDJSON) │
//! │                                          │                         │
//! │                                          ▼                         │
//! │  DaemonSession                                                     │
//! │    index: RwLock<Arc<Index>>   ◄── rebuild (blocking pool) swaps   │
//! │    last_activity / state       ◄── idle watchdog ticks             │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Starting → Ready → (Serving ⇄ Idle) → ShuttingDown → Stopped`
//!
//! - `Starting`: the socket is claimed and the accept loop runs while the
//!   index is loaded from the cache or built. `ping`, `status` and `stop`
//!   are answered; `query` and `rebuild` are refused with `starting`. A
//!   failed build exits with an error.
//! - `Serving` while any request is in flight; `Idle` after one watchdog
//!   interval without requests. Any request returns the daemon to `Ready`.
//! - The watchdog moves to `ShuttingDown` once no request has been seen for
//!   the idle timeout. `stop`, SIGINT and SIGTERM do the same.

pub mod protocol;
pub mod session;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

pub use protocol::{DaemonState, DaemonStatus, ErrorCode, RebuildSummary, Request, Response};
pub use session::{DaemonSession, WatchdogAction};

#[cfg(unix)]
pub use client::DaemonClient;
#[cfg(unix)]
pub use server::{serve, ServeOptions, ServeOutcome, StopReason};
