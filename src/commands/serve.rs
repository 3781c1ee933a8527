//! Serve command handler
//!
//! Runs the daemon in the foreground until it is stopped, idles out, or
//! receives SIGINT/SIGTERM. `start` launches this command in the
//! background with its output appended to the daemon log.

use std::time::Duration;

use crate::cli::ServeArgs;
use crate::commands::{resolve_root, resolve_settings, CommandContext};
use crate::config::DaemonSettings;
use crate::daemon::{serve, ServeOptions, ServeOutcome};
use crate::error::{IndexerError, Result};

/// Run the daemon
///
/// This creates a tokio runtime and blocks on the async server.
pub fn run_serve(args: &ServeArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let (config, settings) = resolve_settings(&root, &args.index)?;

    let options = ServeOptions {
        root: root.clone(),
        settings,
        daemon: DaemonSettings::resolve(&config, args.idle_timeout),
        paths: ctx.paths.clone(),
        use_cache: !args.no_cache,
    };

    tracing::info!(
        "Starting iproxy-indexer daemon v{} (pid {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    let runtime = tokio::runtime::Runtime::new().map_err(|e| IndexerError::ConfigError {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;
    let outcome = runtime.block_on(serve(options));
    runtime.shutdown_timeout(Duration::from_secs(1));

    match outcome? {
        ServeOutcome::AlreadyRunning { socket } => Ok(format!(
            "Daemon already running for {} (socket {})\n",
            root.display(),
            socket.display()
        )),
        ServeOutcome::Stopped(reason) => {
            tracing::info!("Daemon exited: {:?}", reason);
            Ok(String::new())
        }
    }
}
