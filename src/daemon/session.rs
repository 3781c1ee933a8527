//! Daemon session state.
//!
//! The session owns everything the connection handlers share: the published
//! index, the activity clock and the lifecycle state. The index is an
//! immutable snapshot behind `RwLock<Arc<Index>>`; readers clone the `Arc`
//! under a momentary read lock and a rebuild publishes a new snapshot by
//! swapping it. Lifecycle transitions that race with incoming requests
//! (idle shutdown against a request arriving) are serialized by one small
//! mutex, so a request either lands before the shutdown fires and cancels
//! it, or lands after and is refused.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::{DaemonSettings, IndexSettings};
use crate::index::Index;

use super::protocol::{DaemonState, DaemonStatus};

/// What the idle watchdog should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Continue,
    /// The idle timeout fired on this tick
    Shutdown,
    /// Shutdown was already started by something else
    Stopping,
}

/// State observed just before a request was admitted
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub state: DaemonState,
    pub idle: Duration,
}

/// Shared state of one running daemon
pub struct DaemonSession {
    root: PathBuf,
    settings: IndexSettings,
    daemon: DaemonSettings,
    index: RwLock<Arc<Index>>,
    from_cache: AtomicBool,
    launch_time: Instant,
    /// Milliseconds since launch of the latest activity
    last_activity: AtomicU64,
    state: AtomicU8,
    in_flight: AtomicUsize,
    requests: AtomicU64,
    transition: Mutex<()>,
}

/// Marks a request as in flight until dropped
pub struct RequestGuard<'a> {
    session: &'a DaemonSession,
    pub admission: Admission,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.session.touch();
        self.session.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DaemonSession {
    pub fn new(
        root: &Path,
        settings: IndexSettings,
        daemon: DaemonSettings,
        index: Index,
        from_cache: bool,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            daemon,
            index: RwLock::new(Arc::new(index)),
            from_cache: AtomicBool::new(from_cache),
            launch_time: Instant::now(),
            last_activity: AtomicU64::new(0),
            state: AtomicU8::new(DaemonState::Starting.as_u8()),
            in_flight: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            transition: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn daemon_settings(&self) -> &DaemonSettings {
        &self.daemon
    }

    /// Current index snapshot
    pub fn index(&self) -> Arc<Index> {
        self.index.read().clone()
    }

    /// Publish a new index, returning the one it replaced
    pub fn publish(&self, index: Index, from_cache: bool) -> Arc<Index> {
        let next = Arc::new(index);
        let previous = std::mem::replace(&mut *self.index.write(), next);
        self.from_cache.store(from_cache, Ordering::Relaxed);
        previous
    }

    fn clock(&self) -> u64 {
        self.launch_time.elapsed().as_millis() as u64
    }

    pub fn touch(&self) {
        self.touch_at(self.clock());
    }

    fn touch_at(&self, now_ms: u64) {
        self.last_activity.fetch_max(now_ms, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            DaemonState::Idle.as_u8(),
            DaemonState::Ready.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn idle_duration(&self) -> Duration {
        self.idle_at(self.clock())
    }

    fn idle_at(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.last_activity.load(Ordering::SeqCst)))
    }

    pub fn uptime(&self) -> Duration {
        self.launch_time.elapsed()
    }

    /// Lifecycle state. `Serving` while any request is in flight.
    pub fn state(&self) -> DaemonState {
        let stored = DaemonState::from_u8(self.state.load(Ordering::SeqCst));
        match stored {
            DaemonState::Ready | DaemonState::Idle if self.in_flight.load(Ordering::SeqCst) > 0 => {
                DaemonState::Serving
            }
            other => other,
        }
    }

    /// Starting -> Ready, once the listener is accepting
    pub fn mark_ready(&self) {
        let _guard = self.transition.lock();
        let _ = self.state.compare_exchange(
            DaemonState::Starting.as_u8(),
            DaemonState::Ready.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.touch();
    }

    pub fn mark_stopped(&self) {
        self.state.store(DaemonState::Stopped.as_u8(), Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(
            DaemonState::from_u8(self.state.load(Ordering::SeqCst)),
            DaemonState::ShuttingDown | DaemonState::Stopped
        )
    }

    /// Enter ShuttingDown. Returns false if already shutting down.
    pub fn request_shutdown(&self) -> bool {
        let _guard = self.transition.lock();
        let previous = self
            .state
            .swap(DaemonState::ShuttingDown.as_u8(), Ordering::SeqCst);
        !matches!(
            DaemonState::from_u8(previous),
            DaemonState::ShuttingDown | DaemonState::Stopped
        )
    }

    /// Admit a request, resetting the idle clock.
    ///
    /// Returns `None` once shutdown has begun.
    pub fn begin_request(&self) -> Option<RequestGuard<'_>> {
        self.begin_request_at(self.clock())
    }

    fn begin_request_at(&self, now_ms: u64) -> Option<RequestGuard<'_>> {
        let _guard = self.transition.lock();
        if self.is_shutting_down() {
            return None;
        }
        let admission = Admission {
            state: self.state(),
            idle: self.idle_at(now_ms),
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.touch_at(now_ms);
        Some(RequestGuard {
            session: self,
            admission,
        })
    }

    /// One idle watchdog check
    pub fn watchdog_tick(&self) -> WatchdogAction {
        self.watchdog_tick_at(self.clock())
    }

    fn watchdog_tick_at(&self, now_ms: u64) -> WatchdogAction {
        let _guard = self.transition.lock();
        match DaemonState::from_u8(self.state.load(Ordering::SeqCst)) {
            DaemonState::ShuttingDown | DaemonState::Stopped => return WatchdogAction::Stopping,
            DaemonState::Starting => return WatchdogAction::Continue,
            _ => {}
        }

        let timeout = self.daemon.idle_timeout;
        if timeout.is_zero() || self.in_flight.load(Ordering::SeqCst) > 0 {
            return WatchdogAction::Continue;
        }

        let idle = self.idle_at(now_ms);
        if idle >= timeout {
            self.state
                .store(DaemonState::ShuttingDown.as_u8(), Ordering::SeqCst);
            return WatchdogAction::Shutdown;
        }
        if idle >= self.daemon.check_interval() {
            let _ = self.state.compare_exchange(
                DaemonState::Ready.as_u8(),
                DaemonState::Idle.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        WatchdogAction::Continue
    }

    /// Status snapshot. `admission` carries the state observed before the
    /// status request itself was admitted.
    pub fn status(&self, admission: Option<Admission>) -> DaemonStatus {
        let index = self.index();
        let (state, idle) = match admission {
            Some(a) => (a.state, a.idle),
            None => (self.state(), self.idle_duration()),
        };
        DaemonStatus {
            state,
            root: self.root.clone(),
            pid: std::process::id(),
            index_keys: index.len(),
            records: index.record_count(),
            files_indexed: index.files_indexed,
            fingerprint: index.fingerprint.to_string(),
            built_at: index.built_at.clone(),
            from_cache: self.from_cache.load(Ordering::Relaxed),
            uptime_secs: self.uptime().as_secs(),
            last_activity_ms: idle.as_millis() as u64,
            idle_timeout_secs: self.daemon.idle_timeout.as_secs(),
            requests_served: self.requests.load(Ordering::Relaxed),
        }
    }
}
