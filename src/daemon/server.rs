//! Daemon server: socket claim, accept loop, request dispatch, idle
//! watchdog and shutdown.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, Mutex};
use tokio::time::{self, MissedTickBehavior};

use crate::cache::IndexCache;
use crate::config::{DaemonSettings, IndexSettings, StatePaths};
use crate::error::{IndexerError, Result};
use crate::fingerprint::Fingerprint;
use crate::fs_utils;
use crate::index::Index;
use crate::indexing::{build_index, load_or_build, BuildOutcome};

use super::client::{self, PROBE_TIMEOUT};
use super::protocol::{DaemonState, ErrorCode, RebuildSummary, Request, Response};
use super::session::{DaemonSession, WatchdogAction};

/// Everything `serve` needs to run a daemon for one root
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub root: PathBuf,
    pub settings: IndexSettings,
    pub daemon: DaemonSettings,
    pub paths: StatePaths,
    /// Warm-start from (and write back to) the on-disk cache
    pub use_cache: bool,
}

/// Why a daemon stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A client sent `stop`
    Requested,
    IdleTimeout,
    /// SIGINT or SIGTERM
    Signal,
}

/// How `serve` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// A healthy daemon already owns the socket
    AlreadyRunning { socket: PathBuf },
    Stopped(StopReason),
}

/// Removes the socket file on every exit path that unwinds through `serve`.
///
/// Only the file this daemon bound is removed: if the path now names a
/// different inode, another daemon owns it.
struct SocketGuard {
    path: PathBuf,
    identity: Option<(u64, u64)>,
}

impl SocketGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            identity: socket_identity(path),
        }
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if socket_identity(&self.path) != self.identity {
            tracing::debug!("Socket {} was replaced, leaving it", self.path.display());
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed socket {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove socket {}: {}", self.path.display(), e),
        }
    }
}

fn socket_identity(path: &Path) -> Option<(u64, u64)> {
    fs::symlink_metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

enum Claim {
    Bound(UnixListener),
    AlreadyRunning,
}

struct Server {
    session: Arc<DaemonSession>,
    cache: Option<IndexCache>,
    shutdown: watch::Sender<Option<StopReason>>,
    rebuild_lock: Mutex<()>,
}

/// Run a daemon for `options.root` until it is stopped.
///
/// The socket is claimed and answering before the index is loaded, so a
/// second daemon for the same root sees a live `Starting` daemon and backs
/// off instead of treating the socket as stale.
pub async fn serve(options: ServeOptions) -> Result<ServeOutcome> {
    let root = fs_utils::canonical_root(&options.root);
    let socket = options.paths.socket_path(&root);

    let listener = match claim_socket(&socket).await? {
        Claim::Bound(listener) => listener,
        Claim::AlreadyRunning => {
            tracing::info!("Daemon already running for {}", root.display());
            return Ok(ServeOutcome::AlreadyRunning { socket });
        }
    };
    let _socket_guard = SocketGuard::new(&socket);

    tracing::info!("Daemon starting for {} on {}", root.display(), socket.display());

    let cache = options
        .use_cache
        .then(|| IndexCache::for_root(&options.paths, &root));

    let session = Arc::new(DaemonSession::new(
        &root,
        options.settings,
        options.daemon,
        Index::new(&root, Fingerprint::from_hex(""), 0),
        false,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(None);
    let server = Arc::new(Server {
        session: Arc::clone(&session),
        cache,
        shutdown: shutdown_tx,
        rebuild_lock: Mutex::new(()),
    });

    let watchdog = tokio::spawn(Arc::clone(&server).watchdog());
    let accept_handle =
        tokio::spawn(Arc::clone(&server).accept_loop(listener, shutdown_rx.clone()));

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let startup = {
        let root = root.clone();
        let settings = session.settings().clone();
        let cache = server.cache.clone();
        tokio::task::spawn_blocking(move || load_or_build(&root, &settings, cache.as_ref(), None))
    };

    let early_stop = tokio::select! {
        joined = startup => {
            let loaded = joined
                .map_err(|e| IndexerError::RpcError {
                    message: format!("startup index task failed: {}", e),
                })
                .and_then(|result| result);
            match loaded {
                Ok(warm) => {
                    match warm.report() {
                        Some(report) => tracing::info!(
                            "Built index: {} records from {} files ({} failed)",
                            report.records_indexed,
                            report.files_scanned,
                            report.failures.len()
                        ),
                        None => tracing::info!(
                            "Loaded index from cache: {} records",
                            warm.index.record_count()
                        ),
                    }
                    let from_cache = warm.from_cache();
                    session.publish(warm.index, from_cache);
                    session.mark_ready();
                    None
                }
                Err(e) => {
                    accept_handle.abort();
                    watchdog.abort();
                    session.mark_stopped();
                    return Err(e);
                }
            }
        }
        reason = &mut signal => {
            tracing::info!("Shutdown signal received during startup");
            session.request_shutdown();
            server.stop(reason);
            Some(reason)
        }
        reason = wait_for_stop(shutdown_rx.clone()) => Some(reason),
    };

    let reason = match early_stop {
        Some(reason) => reason,
        None => {
            tracing::info!(
                "Daemon ready (idle timeout {:?})",
                session.daemon_settings().idle_timeout
            );
            tokio::select! {
                reason = &mut signal => {
                    tracing::info!("Shutdown signal received");
                    session.request_shutdown();
                    server.stop(reason);
                    reason
                }
                reason = wait_for_stop(shutdown_rx) => reason,
            }
        }
    };

    let _ = accept_handle.await;
    watchdog.abort();
    session.mark_stopped();

    tracing::info!("Daemon stopped ({:?})", reason);
    Ok(ServeOutcome::Stopped(reason))
}

/// Bind `socket`, or detect a live daemon already holding it.
///
/// An existing socket file is probed with `ping`: a reply means another
/// daemon is healthy; no reply means the file was left by a dead process
/// and is removed before binding.
async fn claim_socket(socket: &Path) -> Result<Claim> {
    if let Some(dir) = socket.parent() {
        ensure_runtime_dir(dir)?;
    }

    if fs::symlink_metadata(socket).is_ok() {
        if probe(socket).await {
            return Ok(Claim::AlreadyRunning);
        }
        tracing::info!("Removing stale socket {}", socket.display());
        match fs::remove_file(socket) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(IndexerError::file(socket, e)),
        }
    }

    match UnixListener::bind(socket) {
        Ok(listener) => Ok(Claim::Bound(listener)),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse && probe(socket).await => {
            Ok(Claim::AlreadyRunning)
        }
        Err(e) => Err(IndexerError::file(socket, e)),
    }
}

fn ensure_runtime_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| IndexerError::file(dir, e))
}

async fn probe(socket: &Path) -> bool {
    let socket = socket.to_path_buf();
    tokio::task::spawn_blocking(move || client::probe(&socket, PROBE_TIMEOUT))
        .await
        .unwrap_or(false)
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> anyhow::Result<()> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn wait_for_stop(mut rx: watch::Receiver<Option<StopReason>>) -> StopReason {
    loop {
        if let Some(reason) = *rx.borrow_and_update() {
            return reason;
        }
        if rx.changed().await.is_err() {
            return StopReason::Requested;
        }
    }
}

async fn shutdown_signal() -> StopReason {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return StopReason::Signal;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    StopReason::Signal
}

impl Server {
    async fn accept_loop(
        self: Arc<Self>,
        listener: UnixListener,
        mut shutdown: watch::Receiver<Option<StopReason>>,
    ) {
        loop {
            if shutdown.borrow().is_some() {
                break;
            }
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_client(stream).await {
                                    tracing::debug!("Connection ended with error: {:#}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Record the first stop reason; later ones are ignored
    fn stop(&self, reason: StopReason) {
        self.shutdown.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    async fn watchdog(self: Arc<Self>) {
        let mut ticker = time::interval(self.session.daemon_settings().check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.session.watchdog_tick() {
                WatchdogAction::Continue => {}
                WatchdogAction::Shutdown => {
                    tracing::info!(
                        "Idle for {:?}, shutting down",
                        self.session.idle_duration()
                    );
                    self.stop(StopReason::IdleTimeout);
                    break;
                }
                WatchdogAction::Stopping => break,
            }
        }
    }

    async fn handle_client(self: &Arc<Self>, stream: UnixStream) -> anyhow::Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (response, stopping) = self.dispatch(line).await;
            let written = write_response(&mut write_half, &response).await;

            // Record the stop even if the reply could not be written
            if stopping {
                self.stop(StopReason::Requested);
            }
            written?;
            if stopping {
                break;
            }
        }

        Ok(())
    }

    /// Handle one request line. The flag is set when the daemon should stop
    /// after the response is written.
    async fn dispatch(&self, line: &str) -> (Response, bool) {
        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Bad request: {}", e);
                return (
                    Response::error(ErrorCode::BadRequest, format!("invalid request: {}", e)),
                    false,
                );
            }
        };

        let Some(guard) = self.session.begin_request() else {
            return (
                Response::error(ErrorCode::ShuttingDown, "daemon is shutting down"),
                false,
            );
        };

        tracing::debug!("Request: {}", request.name());

        if guard.admission.state == DaemonState::Starting
            && matches!(request, Request::Query(_) | Request::Rebuild)
        {
            return (
                Response::error(ErrorCode::Starting, "index is still loading"),
                false,
            );
        }

        let response = match request {
            Request::Query(query) => {
                let index = self.session.index();
                let records = query.run(&index).into_iter().cloned().collect();
                Response::Records { records }
            }
            Request::Status => Response::Status(self.session.status(Some(guard.admission))),
            Request::Ping => Response::Pong {
                pid: std::process::id(),
            },
            Request::Rebuild => self.rebuild().await,
            Request::Stop => {
                tracing::info!("Stop requested by client");
                drop(guard);
                self.session.request_shutdown();
                return (Response::Stopping, true);
            }
        };

        drop(guard);
        (response, false)
    }

    async fn rebuild(&self) -> Response {
        let _lock = self.rebuild_lock.lock().await;

        let root = self.session.root().to_path_buf();
        let settings = self.session.settings().clone();
        let cache = self.cache.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<BuildOutcome> {
            let outcome = build_index(&root, &settings, None)?;
            if let Some(cache) = cache {
                if let Err(e) = cache.save(&outcome.index) {
                    tracing::warn!("Could not write index cache: {}", e);
                }
            }
            Ok(outcome)
        })
        .await;

        match result {
            Ok(Ok(outcome)) => {
                let summary = RebuildSummary {
                    records: outcome.index.record_count(),
                    keys: outcome.index.len(),
                    files_scanned: outcome.report.files_scanned,
                    files_failed: outcome.report.failures.len(),
                    elapsed_ms: outcome.report.elapsed.as_millis() as u64,
                };
                self.session.publish(outcome.index, false);
                tracing::info!(
                    "Rebuilt index: {} records under {} keys",
                    summary.records,
                    summary.keys
                );
                Response::Rebuilt(summary)
            }
            Ok(Err(e)) => {
                tracing::warn!("Rebuild failed, keeping previous index: {}", e);
                Response::error(ErrorCode::BuildFailed, e.to_string())
            }
            Err(e) => Response::error(ErrorCode::BuildFailed, format!("build task failed: {}", e)),
        }
    }
}
