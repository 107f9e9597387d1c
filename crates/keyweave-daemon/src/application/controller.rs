//! DaemonController: owns the running state and applies every change to it.
//!
//! All state transitions go through one task.  Signals, the control socket,
//! the hot-plug watcher and the device workers only send messages; the
//! controller handles them one at a time, so a reload never races a
//! hot-plug rescan and a shutdown never races a reload.
//!
//! ```text
//!  SIGHUP / SIGTERM ─┐
//!  control socket ───┼──► ControlMessage ──► DaemonController ──► DeviceManager
//!  hot-plug watcher ─┘                            │                ProfileManager
//!  device workers ───────► WorkerReport ──────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use keyweave_core::config::{compile, CompiledConfig, Config, ConfigError, DeviceMatcher};
use keyweave_core::keybinds::collect_keybinds;
use keyweave_core::KeySet;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::device_manager::{DeviceBackend, DeviceManager, DeviceStatus};
use super::device_worker::{SharedSink, WorkerEnv, WorkerReport};
use super::profile_manager::{ProfileListing, ProfileManager, Replaced, SwitchError};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Where configuration comes from and where the keybind fragment goes.
pub trait ConfigStore: Send + Sync {
    /// Reads and parses the current on-disk configuration.
    fn load(&self) -> Result<Config, String>;

    /// Regenerates the compositor keybind fragment.
    ///
    /// Returns the written path, or `None` when no path is configured.
    fn publish_keybinds(&self, config: &CompiledConfig) -> Result<Option<PathBuf>, String>;
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Requests delivered to the controller.
#[derive(Debug)]
pub enum ControlMessage {
    DeviceAdded(PathBuf),
    DeviceRemoved(PathBuf),
    SwitchProfile {
        device: String,
        profile: String,
        reply: oneshot::Sender<Result<ProfileListing, SwitchError>>,
    },
    ListProfiles {
        device: String,
        reply: oneshot::Sender<Result<ProfileListing, SwitchError>>,
    },
    Status {
        reply: oneshot::Sender<DaemonStatus>,
    },
    /// Reload from disk.  Signals send no reply channel.
    Reload {
        reply: Option<oneshot::Sender<Result<ReloadSummary, ReloadError>>>,
    },
    Shutdown,
}

/// Snapshot answered to status requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub devices: Vec<DeviceStatus>,
    pub profiles: Vec<ProfileListing>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for a rejected reload.  The running state is unchanged.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("cannot read configuration: {0}")]
    Load(String),
    #[error(transparent)]
    ConfigInvalid(#[from] ConfigError),
    #[error("reload incompatible: {0}")]
    ReloadIncompatible(String),
}

/// Error type for startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("none of the {attempted} matching device(s) could be acquired")]
    NoDeviceAcquired { attempted: usize },
}

/// What a reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    /// Kept specs whose active profile vanished without a default; they keep
    /// their previous profile set.
    pub incompatible: Vec<String>,
    pub acquired: usize,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct DaemonController {
    store: Arc<dyn ConfigStore>,
    profiles: Arc<ProfileManager>,
    sink: SharedSink,
    devices: DeviceManager,
    config: CompiledConfig,
    reports: mpsc::UnboundedReceiver<WorkerReport>,
}

impl DaemonController {
    /// Builds the controller around an already-created virtual device.
    pub fn new(
        config: CompiledConfig,
        store: Arc<dyn ConfigStore>,
        backend: Arc<dyn DeviceBackend>,
        sink: SharedSink,
    ) -> Self {
        let profiles = Arc::new(ProfileManager::new());
        let (exits, reports) = mpsc::unbounded_channel();
        let env = WorkerEnv {
            sink: Arc::clone(&sink),
            profiles: Arc::clone(&profiles),
            exits,
        };
        Self {
            store,
            profiles,
            sink,
            devices: DeviceManager::new(backend, env),
            config,
            reports,
        }
    }

    pub fn profiles(&self) -> &Arc<ProfileManager> {
        &self.profiles
    }

    /// Registers every spec's profiles, writes the keybind fragment, and
    /// grabs the matching devices that are present.
    ///
    /// # Errors
    ///
    /// [`StartupError::NoDeviceAcquired`] when devices matched but none of
    /// them could be grabbed.  With no matching device present the daemon
    /// simply waits for hot-plug.
    pub async fn start(&mut self) -> Result<usize, StartupError> {
        for device in &self.config.devices {
            self.profiles.register(Arc::clone(device));
        }
        self.publish_keybinds();

        let report = self.devices.scan(&self.matchers()).await;
        if report.attempted > 0 && report.acquired == 0 {
            return Err(StartupError::NoDeviceAcquired {
                attempted: report.attempted,
            });
        }
        if report.attempted == 0 {
            info!("no configured device present yet; waiting for hot-plug");
        }
        Ok(report.acquired)
    }

    /// Handles messages until a shutdown request, then shuts down.
    pub async fn run(&mut self, control: &mut mpsc::Receiver<ControlMessage>) {
        loop {
            tokio::select! {
                Some(report) = self.reports.recv() => self.devices.on_worker_exit(report).await,
                message = control.recv() => match message {
                    Some(ControlMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message).await,
                },
            }
        }
        self.shutdown().await;
    }

    /// Applies one control message.
    pub async fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::DeviceAdded(path) => {
                debug!(path = %path.display(), "device node added");
                self.devices.scan(&self.matchers()).await;
            }
            ControlMessage::DeviceRemoved(path) => {
                debug!(path = %path.display(), "device node removed");
                self.devices.device_removed(&path).await;
            }
            ControlMessage::SwitchProfile {
                device,
                profile,
                reply,
            } => {
                let _ = reply.send(self.switch_profile(&device, &profile));
            }
            ControlMessage::ListProfiles { device, reply } => {
                let _ = reply.send(self.profiles.listing(&device));
            }
            ControlMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ControlMessage::Reload { reply } => {
                let result = self.reload().await;
                match &result {
                    Ok(summary) => info!(
                        added = summary.added.len(),
                        removed = summary.removed.len(),
                        kept = summary.kept.len(),
                        "configuration reloaded"
                    ),
                    Err(e) => error!("reload rejected, keeping running configuration: {e}"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            ControlMessage::Shutdown => self.shutdown().await,
        }
    }

    fn switch_profile(&self, device: &str, profile: &str) -> Result<ProfileListing, SwitchError> {
        let matcher = self
            .profiles
            .find(device)
            .ok_or_else(|| SwitchError::UnknownDevice(device.to_string()))?;
        self.profiles.request_switch(&matcher, profile)?;
        self.profiles
            .listing_for(&matcher)
            .ok_or_else(|| SwitchError::UnknownDevice(device.to_string()))
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            devices: self.devices.status(),
            profiles: self.profiles.listings(),
        }
    }

    /// Re-reads the configuration and applies it to the running state.
    ///
    /// Specs are diffed by matcher: removed specs are released, kept specs
    /// keep their grab and get the new profile set, added specs are
    /// acquired.  On error nothing changes.
    pub async fn reload(&mut self) -> Result<ReloadSummary, ReloadError> {
        let config = self.store.load().map_err(ReloadError::Load)?;
        let mut next = compile(&config)?;

        let live = self.sink.lock().await.capabilities().clone();
        if !next.capabilities.is_subset(&live) {
            return Err(ReloadError::ReloadIncompatible(format!(
                "the virtual device lacks {}; restart the daemon to apply",
                describe(&next.capabilities.difference(&live))
            )));
        }

        let mut summary = ReloadSummary::default();

        for old in &self.config.devices {
            let matcher = old.matcher();
            if next.device(matcher).is_none() {
                self.devices.release_spec(matcher).await;
                self.profiles.remove(matcher);
                info!(device = %matcher, "device spec removed");
                summary.removed.push(matcher.to_string());
            }
        }

        for slot in &mut next.devices {
            let matcher = slot.matcher().clone();
            let Some(old) = self.config.device(&matcher) else {
                self.profiles.register(Arc::clone(slot));
                info!(device = %matcher, "device spec added");
                summary.added.push(matcher.to_string());
                continue;
            };
            match self.profiles.replace(Arc::clone(slot)) {
                Ok(Replaced::Preserved(active)) => {
                    debug!(device = %matcher, profile = %active, "profiles replaced");
                    summary.kept.push(matcher.to_string());
                }
                Ok(Replaced::FellBack { from, to }) => {
                    warn!(device = %matcher, "profile {from:?} is gone; switched to default {to:?}");
                    summary.kept.push(matcher.to_string());
                }
                Err(active) => {
                    warn!(
                        device = %matcher,
                        "reload incompatible: active profile {active:?} is gone and no \
                         default_profile is set; keeping the previous profiles"
                    );
                    *slot = Arc::clone(old);
                    summary.incompatible.push(matcher.to_string());
                }
            }
        }

        // The fragment must describe the profile sets in use, including the
        // previous ones a kept spec fell back to.
        let mut publish = true;
        if !summary.incompatible.is_empty() {
            match collect_keybinds(&next.devices) {
                Ok(keybinds) => next.keybinds = keybinds,
                Err(e) => {
                    warn!("keybind fragment left unchanged: {e}");
                    publish = false;
                }
            }
        }

        self.config = next;
        if publish {
            self.publish_keybinds();
        }
        summary.acquired = self.devices.scan(&self.matchers()).await.acquired;
        Ok(summary)
    }

    /// Releases every device, emitting the outstanding key releases first.
    pub async fn shutdown(&mut self) {
        info!(devices = self.devices.grabbed(), "shutting down");
        self.devices.release_all().await;
    }

    fn matchers(&self) -> Vec<DeviceMatcher> {
        self.config
            .devices
            .iter()
            .map(|d| d.matcher().clone())
            .collect()
    }

    fn publish_keybinds(&self) {
        match self.store.publish_keybinds(&self.config) {
            Ok(Some(path)) => info!(
                path = %path.display(),
                bindings = self.config.keybinds.len(),
                "keybind fragment written"
            ),
            Ok(None) => debug!("no keybinds_path configured"),
            Err(e) => warn!("could not write keybind fragment: {e}"),
        }
    }
}

fn describe(keys: &KeySet) -> String {
    keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
