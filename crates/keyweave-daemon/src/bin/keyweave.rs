//! keyweave: command-line companion of the keyweave daemon.
//!
//! Offline commands (`devices`, `validate`, `generate`) work without a
//! running daemon.  The others talk to `keyweaved` over its control socket.
//!
//! Exit codes follow the daemon: `0` success, `1` other error, `2`
//! configuration invalid, `3` device access failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use keyweave_core::compile;
use keyweave_core::config::{CompiledConfig, DeviceMatcher};
use keyweave_core::keybinds::render_keybinds;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use keyweave_daemon::application::device_manager::{match_devices, DeviceBackend, PhysicalDevice};
use keyweave_daemon::infrastructure::control_socket::messages::{
    ControlRequest, ControlResponse, DeviceInfo, ProfileInfo,
};
use keyweave_daemon::infrastructure::control_socket::{self, request};
use keyweave_daemon::infrastructure::evdev_input::EvdevBackend;
use keyweave_daemon::infrastructure::storage::config::{default_config_path, load_config};
use keyweave_daemon::infrastructure::storage::keybinds::write_atomically;

// ── CLI arguments ─────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "keyweave", about = "Inspect and control the keyweave daemon", version)]
struct Cli {
    /// Configuration file.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/keyweave/config.toml`.
    #[arg(long, short, global = true, env = "KEYWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Control socket of the running daemon.
    #[arg(long, global = true, env = "KEYWEAVE_SOCKET")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List input devices with their name, vendor:product and path.
    Devices {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Check the configuration and report the first problem found.
    Validate {
        /// Also show which present devices each spec would grab.
        #[arg(long)]
        dry_run: bool,
    },
    /// Write the compositor keybind fragment.
    Generate {
        /// Output file.  Defaults to `keybinds_path`, else stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show grabbed devices and active profiles.
    Status,
    /// List a device's profiles.
    Profiles {
        /// Device name, `vendor:product`, or event node path.
        device: String,
    },
    /// Switch a device to another profile.
    Switch { device: String, profile: String },
    /// Reload the configuration from disk.
    Reload,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A failed command and its exit code.
struct Failure {
    code: u8,
    error: anyhow::Error,
}

impl Failure {
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
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("keyweave: {:#}", failure.error);
            ExitCode::from(failure.code)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let socket = cli.socket.clone().unwrap_or_else(control_socket::socket_path);
    match cli.command {
        Command::Devices { json } => list_devices(json),
        Command::Validate { dry_run } => {
            let (path, compiled) = load_compiled(cli.config)?;
            println!(
                "{}: ok ({} device spec(s), {} keybind(s))",
                path.display(),
                compiled.devices.len(),
                compiled.keybinds.len()
            );
            if dry_run {
                print_dry_run(&compiled, &EvdevBackend::new().enumerate());
            }
            Ok(())
        }
        Command::Generate { output } => {
            let (path, compiled) = load_compiled(cli.config)?;
            let text = render_keybinds(&compiled.keybinds, &path);
            match output.or_else(|| compiled.global.keybinds_path.clone()) {
                Some(target) => {
                    write_atomically(&target, &text).map_err(Failure::other)?;
                    println!("wrote {} keybind(s) to {}", compiled.keybinds.len(), target.display());
                }
                None => print!("{text}"),
            }
            Ok(())
        }
        Command::Status => ask(&socket, ControlRequest::Status).await,
        Command::Profiles { device } => ask(&socket, ControlRequest::ListProfiles { device }).await,
        Command::Switch { device, profile } => {
            ask(&socket, ControlRequest::SwitchProfile { device, profile }).await
        }
        Command::Reload => ask(&socket, ControlRequest::Reload).await,
    }
}

fn load_compiled(config: Option<PathBuf>) -> Result<(PathBuf, CompiledConfig), Failure> {
    let path = match config {
        Some(path) => path,
        None => default_config_path().map_err(Failure::config)?,
    };
    let config = load_config(&path).map_err(Failure::config)?;
    let compiled = compile(&config)
        .with_context(|| format!("{} is invalid", path.display()))
        .map_err(Failure::config)?;
    Ok((path, compiled))
}

// ── Offline commands ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DeviceRow<'a> {
    path: &'a Path,
    name: &'a str,
    vendor_product: String,
}

fn list_devices(json: bool) -> Result<(), Failure> {
    let devices = EvdevBackend::new().enumerate();
    if devices.is_empty() && !json {
        return Err(Failure::device(anyhow::anyhow!(
            "no readable input devices (are you in the `input` group?)"
        )));
    }
    let rows: Vec<DeviceRow<'_>> = devices
        .iter()
        .map(|d| DeviceRow {
            path: &d.path,
            name: &d.name,
            vendor_product: d.vendor_product(),
        })
        .collect();

    if json {
        let text = serde_json::to_string_pretty(&rows).map_err(Failure::other)?;
        println!("{text}");
    } else {
        for row in rows {
            println!("{:<24} {}  {}", row.path.display(), row.vendor_product, row.name);
        }
    }
    Ok(())
}

fn print_dry_run(compiled: &CompiledConfig, present: &[PhysicalDevice]) {
    let matchers: Vec<DeviceMatcher> = compiled.devices.iter().map(|d| d.matcher().clone()).collect();
    let matched = match_devices(present, &matchers);
    for matcher in &matchers {
        let hits: Vec<&PhysicalDevice> = matched
            .iter()
            .filter(|(_, m)| m == matcher)
            .map(|(device, _)| *device)
            .collect();
        if hits.is_empty() {
            println!("  {matcher}: not present");
        }
        for device in hits {
            println!("  {matcher}: would grab {} ({})", device.path.display(), device.name);
        }
    }
}

// ── Daemon commands ───────────────────────────────────────────────────────────

async fn ask(socket: &Path, req: ControlRequest) -> Result<(), Failure> {
    let response = request(socket, &req).await.map_err(Failure::other)?;
    match response {
        ControlResponse::Profiles(info) => print_profiles(&info),
        ControlResponse::Status { devices, profiles } => {
            print_devices(&devices);
            for info in &profiles {
                print_profiles(info);
            }
        }
        ControlResponse::Reloaded {
            added,
            removed,
            kept,
            incompatible,
            acquired,
        } => {
            println!(
                "reloaded: {} kept, {} added, {} removed, {acquired} device(s) grabbed",
                kept.len(),
                added.len(),
                removed.len()
            );
            for device in incompatible {
                println!("  {device}: kept previous profiles (active profile no longer exists)");
            }
        }
        ControlResponse::Error { message } => return Err(Failure::other(anyhow::anyhow!(message))),
    }
    Ok(())
}

fn print_devices(devices: &[DeviceInfo]) {
    if devices.is_empty() {
        println!("no devices tracked");
    }
    for device in devices {
        println!(
            "{:<24} {:<10} {} [{}]",
            device.path.display(),
            device.status,
            device.name,
            device.device
        );
    }
}

fn print_profiles(info: &ProfileInfo) {
    println!("{}:", info.device);
    for profile in &info.profiles {
        let marker = if *profile == info.active { '*' } else { ' ' };
        println!("  {marker} {profile}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_parses_device_and_profile() {
        let cli = Cli::parse_from(["keyweave", "switch", "Keychron K3 Pro", "gaming"]);

        match cli.command {
            Command::Switch { device, profile } => {
                assert_eq!(device, "Keychron K3 Pro");
                assert_eq!(profile, "gaming");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::parse_from(["keyweave", "validate", "--dry-run", "--config", "/tmp/k.toml"]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/k.toml")));
        assert!(matches!(cli.command, Command::Validate { dry_run: true }));
    }

    #[test]
    fn test_invalid_config_maps_to_exit_code_two() {
        let path = std::env::temp_dir().join(format!("keyweave-cli-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[[device]]\nname = \"kbd\"\n[[device.profile]]\nname = \"a\"\nremap = { NotAKey = \"A\" }\n",
        )
        .unwrap();

        let failure = load_compiled(Some(path.clone())).err().unwrap();

        assert_eq!(failure.code, 2);
        let _ = std::fs::remove_file(path);
    }
}
