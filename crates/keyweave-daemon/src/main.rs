//! keyweaved: the keyweave remapping daemon.
//!
//! # Startup sequence
//!
//! ```text
//! main()
//!  └─ load config            -- exit 2 when unreadable or invalid
//!  └─ create uinput keyboard -- exit 3 when /dev/uinput is unusable
//!       (declares every configured output key and every key a present,
//!        matching device reports)
//!  └─ DaemonController::start()
//!       ├─ register profiles, write keybind fragment
//!       └─ grab matching devices  -- exit 3 when every match fails
//!  └─ spawn signal handlers, control socket, hot-plug watcher
//!  └─ DaemonController::run()     -- until SIGTERM / SIGINT
//!       └─ shutdown(): release every device, no key left down
//! ```
//!
//! Exit codes: `0` clean shutdown, `1` other error, `2` configuration
//! invalid, `3` fatal device acquisition.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keyweave_core::config::{Config, LogLevel};
use keyweave_core::compile;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keyweave_daemon::application::controller::{ControlMessage, DaemonController};
use keyweave_daemon::application::device_manager::{output_capabilities, DeviceBackend};
use keyweave_daemon::application::device_worker::{OutputSink, SharedSink};
use keyweave_daemon::infrastructure::control_socket::{self, ControlServer};
use keyweave_daemon::infrastructure::evdev_input::EvdevBackend;
use keyweave_daemon::infrastructure::hotplug::{spawn_hotplug_watcher, RESCAN_INTERVAL};
use keyweave_daemon::infrastructure::storage::config::{default_config_path, load_config};
use keyweave_daemon::infrastructure::storage::TomlConfigStore;
use keyweave_daemon::infrastructure::virtual_output::UinputSink;

/// Pending control messages before senders wait.
const CONTROL_QUEUE: usize = 32;

// ── CLI arguments ─────────────────────────────────────────────────────────────

/// keyweave remapping daemon.
///
/// Grabs the configured keyboards and re-emits their remapped events through
/// a virtual uinput keyboard.
#[derive(Debug, Parser)]
#[command(name = "keyweaved", about = "keyweave input remapping daemon", version)]
struct Cli {
    /// Configuration file.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/keyweave/config.toml`.
    #[arg(long, short, env = "KEYWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Control socket path.
    ///
    /// Defaults to `$XDG_RUNTIME_DIR/keyweave.sock`.
    #[arg(long, env = "KEYWEAVE_SOCKET")]
    socket: Option<PathBuf>,
}

// ── Exit codes ────────────────────────────────────────────────────────────────

/// A fatal error and the exit code it maps to.
struct Fatal {
    code: u8,
    error: anyhow::Error,
}

impl Fatal {
    fn other(error: impl Into<anyhow::Error>) -> Self {
        Self { code: 1, error: error.into() }
    }

    fn config(error: impl Into<anyhow::Error>) -> Self {
        Self { code: 2, error: error.into() }
    }

    fn device(error: impl Into<anyhow::Error>) -> Self {
        Self { code: 3, error: error.into() }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The config names the log level, so it is read before logging starts.
    let loaded = match cli.config.clone() {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
    .and_then(|path| load_config(&path).map(|config| (path, config)));

    let level = loaded
        .as_ref()
        .map(|(_, config)| config.global.log_level)
        .unwrap_or_default();
    init_logging(level);

    let result = match loaded {
        Ok((path, config)) => run(&cli, path, config).await,
        Err(e) => Err(Fatal::config(e)),
    };

    match result {
        Ok(()) => {
            info!("keyweaved stopped");
            ExitCode::SUCCESS
        }
        Err(fatal) => {
            error!("{:#}", fatal.error);
            ExitCode::from(fatal.code)
        }
    }
}

/// Logging level: `RUST_LOG` when set, otherwise the config's `log_level`.
fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .init();
}

async fn run(cli: &Cli, path: PathBuf, config: Config) -> Result<(), Fatal> {
    let compiled = compile(&config)
        .with_context(|| format!("invalid configuration in {}", path.display()))
        .map_err(Fatal::config)?;
    info!(
        config = %path.display(),
        devices = compiled.devices.len(),
        "configuration loaded"
    );

    let backend: Arc<dyn DeviceBackend> = Arc::new(EvdevBackend::new());
    let matchers: Vec<_> = compiled.devices.iter().map(|d| d.matcher().clone()).collect();
    let capabilities = output_capabilities(&compiled.capabilities, &backend.enumerate(), &matchers);
    let sink = UinputSink::create(capabilities)
        .context("cannot create the virtual keyboard (is /dev/uinput writable?)")
        .map_err(Fatal::device)?;
    let sink: Box<dyn OutputSink> = Box::new(sink);
    let sink: SharedSink = Arc::new(Mutex::new(sink));
    let store = Arc::new(TomlConfigStore::new(path));

    let mut controller = DaemonController::new(compiled, store, Arc::clone(&backend), sink);
    let (control, mut requests) = mpsc::channel(CONTROL_QUEUE);

    spawn_signal_handlers(control.clone())
        .context("cannot install signal handlers")
        .map_err(Fatal::other)?;

    match controller.start().await {
        Ok(acquired) => info!(devices = acquired, "keyweaved running"),
        Err(e) => {
            controller.shutdown().await;
            return Err(Fatal::device(e));
        }
    }

    // ── Control socket ────────────────────────────────────────────────────────
    let socket_path = cli.socket.clone().unwrap_or_else(control_socket::socket_path);
    let server = match ControlServer::bind(&socket_path) {
        Ok(server) => Some(server.spawn(control.clone())),
        Err(e) => {
            warn!("{e}; continuing without the control socket");
            None
        }
    };

    // ── Hot-plug ──────────────────────────────────────────────────────────────
    let watcher = spawn_hotplug_watcher(backend, control, RESCAN_INTERVAL);

    controller.run(&mut requests).await;

    watcher.abort();
    if let Some(server) = server {
        server.abort();
        // Dropping the server task removes the socket file.
        let _ = server.await;
    }
    Ok(())
}

/// SIGTERM and SIGINT request shutdown; SIGHUP requests a reload.
fn spawn_signal_handlers(control: mpsc::Sender<ControlMessage>) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = terminate.recv() => {
                    info!("SIGTERM received, shutting down");
                    ControlMessage::Shutdown
                }
                _ = interrupt.recv() => {
                    info!("SIGINT received, shutting down");
                    ControlMessage::Shutdown
                }
                _ = hangup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    ControlMessage::Reload { reply: None }
                }
            };
            if control.send(message).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_accepts_config_and_socket() {
        let cli = Cli::parse_from(["keyweaved", "-c", "/etc/kw.toml", "--socket", "/run/kw.sock"]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/kw.toml")));
        assert_eq!(cli.socket, Some(PathBuf::from("/run/kw.sock")));
    }

    #[test]
    fn test_fatal_exit_codes_are_distinct() {
        assert_eq!(Fatal::other(anyhow::anyhow!("x")).code, 1);
        assert_eq!(Fatal::config(anyhow::anyhow!("x")).code, 2);
        assert_eq!(Fatal::device(anyhow::anyhow!("x")).code, 3);
    }
}
