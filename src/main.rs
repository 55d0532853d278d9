//! hotkey-daemon: run shell commands on systemwide hotkeys
//!
//! Reads `{"bindings": [{"combo": "Ctrl+Alt+T", "command": "xterm"}]}` from
//! the bindings file, binds every combo on the selected backend and runs
//! the dispatch loop until SIGTERM/SIGINT.

mod lifecycle;

use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hotkey_daemon::config::{load_bindings, Binding};
use hotkey_daemon::{Config, HotKey, HotKeyEvent, HotKeys};

use crate::lifecycle::ShutdownSignal;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotkey-daemon starting");

    let config = Config::load()?;
    info!(bindings = ?config.bindings_path, backend = ?config.backend, "configuration loaded");
    let bindings = load_bindings(&config.bindings_path)?;

    let keys = HotKeys::new(config).context("failed to set up hotkey backend")?;
    info!(backend = %keys.backend_kind(), "hotkey backend selected");

    let hotkeys = bind_all(&keys, &bindings);
    let mut events = keys.subscribe();
    let dispatch = keys
        .start()
        .context("failed to start hotkey dispatch loop")?;
    let dispatch_exit = tokio::task::spawn_blocking(move || dispatch.join());

    let shutdown = ShutdownSignal::new();

    info!(hotkeys = hotkeys.len(), "daemon initialized, entering main loop");

    tokio::select! {
        result = dispatch_exit => {
            match result {
                Ok(Ok(Ok(()))) => warn!("dispatch loop exited on its own"),
                Ok(Ok(Err(e))) => error!(error = %e, "dispatch loop failed"),
                Ok(Err(_)) => error!("dispatch thread panicked"),
                Err(e) => error!(error = %e, "failed to join dispatch thread"),
            }
        }

        _ = log_events(&mut events) => {
            info!("hotkey event stream closed");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(error = %e, "failed to install signal handlers"),
            }
        }
    }

    info!("shutting down...");

    if let Err(e) = keys.stop_and_wait(STOP_TIMEOUT) {
        warn!(error = %e, "dispatch loop did not stop in time");
    }
    for hotkey in hotkeys {
        if let Err(e) = hotkey.free() {
            warn!(combo = %hotkey.combo(), error = %e, "failed to free hotkey");
        }
    }

    info!("hotkey-daemon stopped");

    Ok(())
}

/// Create one hotkey per binding; bad bindings are logged and skipped
fn bind_all(keys: &HotKeys, bindings: &[Binding]) -> Vec<HotKey> {
    bindings
        .iter()
        .filter_map(|binding| {
            let command = binding.command.clone();
            match keys.hotkey(&binding.combo, move || spawn_command(&command)) {
                Ok(hotkey) => {
                    info!(combo = %binding.combo, command = %binding.command, "binding loaded");
                    Some(hotkey)
                }
                Err(e) => {
                    error!(combo = %binding.combo, error = %e, "skipping binding");
                    None
                }
            }
        })
        .collect()
}

/// Start `command` through the shell without waiting for it
fn spawn_command(command: &str) -> std::io::Result<()> {
    let mut child = shell(command).stdin(Stdio::null()).spawn()?;
    debug!(%command, pid = child.id(), "command started");

    let command = command.to_string();
    thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => warn!(%command, %status, "command failed"),
        Ok(_) => {}
        Err(e) => warn!(%command, error = %e, "failed to wait for command"),
    });
    Ok(())
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

async fn log_events(events: &mut broadcast::Receiver<HotKeyEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(%event, "hotkey event"),
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "hotkey event receiver lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
