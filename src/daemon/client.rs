//! Blocking client for the daemon socket.
//!
//! The CLI is synchronous, so the client uses a plain `UnixStream` with
//! read/write timeouts rather than a runtime.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndexerError, Result};

use super::protocol::{DaemonState, Request, Response};

/// Default time to wait for a response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for liveness probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// A connection to one daemon. Requests are sent one at a time.
pub struct DaemonClient {
    socket: PathBuf,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    /// Connect to the daemon listening on `socket`.
    ///
    /// `NotFound` and `ConnectionRefused` mean no daemon is running; see
    /// [`is_not_running`].
    pub fn connect(socket: &Path) -> io::Result<Self> {
        let stream = UnixStream::connect(socket)?;
        let reader = BufReader::new(stream.try_clone()?);
        let client = Self {
            socket: socket.to_path_buf(),
            writer: stream,
            reader,
        };
        client.set_timeout(DEFAULT_REQUEST_TIMEOUT)?;
        Ok(client)
    }

    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.writer.set_read_timeout(Some(timeout))?;
        self.writer.set_write_timeout(Some(timeout))
    }

    /// Send one request and wait for its response
    pub fn request(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request).map_err(|e| IndexerError::RpcError {
            message: format!("failed to encode request: {}", e),
        })?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| self.io_error("send", e))?;

        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .map_err(|e| self.io_error("receive", e))?;
        if read == 0 {
            return Err(IndexerError::RpcError {
                message: format!("daemon at {} closed the connection", self.socket.display()),
            });
        }

        serde_json::from_str(reply.trim_end()).map_err(|e| IndexerError::RpcError {
            message: format!("malformed response: {}", e),
        })
    }

    fn io_error(&self, action: &str, err: io::Error) -> IndexerError {
        IndexerError::RpcError {
            message: format!("failed to {} via {}: {}", action, self.socket.display(), err),
        }
    }
}

/// Whether a connect error means there is no daemon behind the socket
pub fn is_not_running(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// True if a live daemon answers `ping` on `socket` within `timeout`.
pub fn probe(socket: &Path, timeout: Duration) -> bool {
    let Ok(mut client) = DaemonClient::connect(socket) else {
        return false;
    };
    if client.set_timeout(timeout).is_err() {
        return false;
    }
    matches!(client.request(&Request::Ping), Ok(Response::Pong { .. }))
}

/// Lifecycle state of the daemon on `socket`, or `None` if nothing answers
/// `status` within `timeout`.
pub fn probe_state(socket: &Path, timeout: Duration) -> Option<DaemonState> {
    let mut client = DaemonClient::connect(socket).ok()?;
    client.set_timeout(timeout).ok()?;
    match client.request(&Request::Status) {
        Ok(Response::Status(status)) => Some(status.state),
        _ => None,
    }
}
