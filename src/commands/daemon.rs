//! Daemon control command handlers: start, status, stop, test-iproxy-query

use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::cli::{DaemonArgs, DaemonQueryArgs, OutputFormat, StartArgs};
use crate::commands::{key_values, records_json, resolve_root, resolve_settings, to_json, CommandContext};
use crate::config::DaemonSettings;
use crate::daemon::client::{self, DaemonClient, PROBE_TIMEOUT};
use crate::daemon::{DaemonState, DaemonStatus, Request, Response};
use crate::error::{IndexerError, Result};
use crate::query::TypeQuery;

/// How long `start` waits for the new daemon to answer
const START_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `stop` waits for the socket to disappear
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `start`: spawn `serve` in the background and wait until its index
/// is loaded.
pub fn run_start(args: &StartArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let socket = ctx.paths.socket_path(&root);

    if client::probe(&socket, PROBE_TIMEOUT) {
        return Err(IndexerError::AlreadyRunning { root, socket });
    }

    // Surface config errors here rather than in the daemon log
    let (config, _) = resolve_settings(&root, &args.index)?;
    let daemon = DaemonSettings::resolve(&config, args.idle_timeout);

    fs::create_dir_all(&ctx.paths.runtime_dir)
        .map_err(|e| IndexerError::file(&ctx.paths.runtime_dir, e))?;
    let log_path = ctx.paths.log_path(&root);
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| IndexerError::file(&log_path, e))?;
    let log_err = log.try_clone().map_err(|e| IndexerError::file(&log_path, e))?;

    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command
        .arg("--cache-dir")
        .arg(&ctx.paths.cache_dir)
        .arg("--runtime-dir")
        .arg(&ctx.paths.runtime_dir);
    if let Some(level) = ctx.log_level {
        command.arg("--log-level").arg(level.as_str());
    }
    command.arg("serve").arg("--root").arg(&root);
    for marker in &args.index.markers {
        command.arg("--marker").arg(marker);
    }
    for exclude in &args.index.excludes {
        command.arg("--exclude").arg(exclude);
    }
    if let Some(workers) = args.index.workers {
        command.arg("--workers").arg(workers.to_string());
    }
    command
        .arg("--idle-timeout")
        .arg(daemon.idle_timeout.as_secs().to_string());
    if args.no_cache {
        command.arg("--no-cache");
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .process_group(0);

    let mut child = command
        .spawn()
        .map_err(|e| IndexerError::RpcError {
            message: format!("failed to spawn daemon: {}", e),
        })?;
    tracing::debug!("Spawned daemon pid {} for {}", child.id(), root.display());

    let deadline = Instant::now() + START_TIMEOUT;
    loop {
        match client::probe_state(&socket, PROBE_TIMEOUT) {
            Some(DaemonState::Starting) | None => {}
            Some(_) => break,
        }
        if let Some(status) = child.try_wait()? {
            // A clean exit means another daemon won the race for the socket
            if status.success() && client::probe(&socket, PROBE_TIMEOUT) {
                return Err(IndexerError::AlreadyRunning { root, socket });
            }
            return Err(IndexerError::RpcError {
                message: format!(
                    "daemon exited during startup ({}); see {}",
                    status,
                    log_path.display()
                ),
            });
        }
        if Instant::now() >= deadline {
            return Err(IndexerError::RpcError {
                message: format!(
                    "daemon did not respond within {:?}; see {}",
                    START_TIMEOUT,
                    log_path.display()
                ),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }

    Ok(format!(
        "Daemon started for {} (pid {}, socket {})\n",
        root.display(),
        child.id(),
        socket.display()
    ))
}

/// Run `status`
pub fn run_status(args: &DaemonArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let mut client = connect(&ctx.paths.socket_path(&root), &root)?;

    let status = match expect_ok(client.request(&Request::Status)?)? {
        Response::Status(status) => status,
        other => return Err(unexpected(&other)),
    };

    match ctx.format {
        OutputFormat::Json => Ok(format!("{}\n", to_json(&status)?)),
        OutputFormat::Text => Ok(format_status(&status)),
    }
}

/// Run `stop`: ask the daemon to exit and wait for its socket to go away.
pub fn run_stop(args: &DaemonArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let socket = ctx.paths.socket_path(&root);
    let mut client = connect(&socket, &root)?;

    match expect_ok(client.request(&Request::Stop)?)? {
        Response::Stopping => {}
        other => return Err(unexpected(&other)),
    }
    drop(client);

    let deadline = Instant::now() + STOP_TIMEOUT;
    while socket.exists() && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
    }
    if socket.exists() {
        tracing::warn!("Daemon socket {} still present after stop", socket.display());
    }

    Ok(format!("Daemon stopped for {}\n", root.display()))
}

/// Run `test-iproxy-query` against the running daemon
pub fn run_test_query(args: &DaemonQueryArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let mut client = connect(&ctx.paths.socket_path(&root), &root)?;

    let request = Request::Query(TypeQuery {
        type_key: args.type_key.clone(),
        nested: args.nested,
    });
    match expect_ok(client.request(&request)?)? {
        Response::Records { records } => Ok(format!("{}\n", records_json(&records)?)),
        other => Err(unexpected(&other)),
    }
}

fn connect(socket: &Path, root: &Path) -> Result<DaemonClient> {
    DaemonClient::connect(socket).map_err(|e| {
        if client::is_not_running(&e) {
            IndexerError::NotRunning {
                root: root.to_path_buf(),
            }
        } else {
            IndexerError::RpcError {
                message: format!("cannot connect to {}: {}", socket.display(), e),
            }
        }
    })
}

fn expect_ok(response: Response) -> Result<Response> {
    match response {
        Response::Error { code, message } => Err(IndexerError::RpcError {
            message: format!("{}: {}", code, message),
        }),
        other => Ok(other),
    }
}

fn unexpected(response: &Response) -> IndexerError {
    IndexerError::RpcError {
        message: format!("unexpected response: {:?}", response),
    }
}

fn format_status(status: &DaemonStatus) -> String {
    key_values(&[
        ("state", status.state.to_string()),
        ("root", status.root.display().to_string()),
        ("pid", status.pid.to_string()),
        ("index_keys", status.index_keys.to_string()),
        ("records", status.records.to_string()),
        ("files_indexed", status.files_indexed.to_string()),
        ("fingerprint", status.fingerprint.clone()),
        ("from_cache", status.from_cache.to_string()),
        ("uptime_secs", status.uptime_secs.to_string()),
        ("last_activity_ms", status.last_activity_ms.to_string()),
        ("idle_timeout_secs", status.idle_timeout_secs.to_string()),
        ("requests_served", status.requests_served.to_string()),
    ])
}
