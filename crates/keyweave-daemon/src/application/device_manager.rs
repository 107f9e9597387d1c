//! DeviceManager: keeps every present, matching physical device grabbed.
//!
//! The manager keeps one record per device node it has seen match a
//! configured spec.  A record is `Grabbed` while a [`DeviceWorker`] runs for
//! it, `Lost` after the device disappeared, and `Ungrabbed` when acquisition
//! failed (busy, no permission).
//!
//! # Matching (for beginners)
//!
//! A device spec identifies a keyboard by exact name, by `vendor:product`, or
//! by device node path.  Matching runs in three passes over the specs, one per
//! identity kind and in that order; within a pass specs are tried in
//! declaration order and the first hit wins.  So a name match always beats a
//! `vendor:product` match, which beats a path match, and a physical device is
//! only ever bound to one spec.
//!
//! # Blocking
//!
//! Opening and grabbing a device node are blocking syscalls, so acquisition
//! runs on Tokio's blocking pool.  Running workers are unaffected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyweave_core::config::DeviceMatcher;
use keyweave_core::KeySet;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::device_worker::{DeviceWorker, EventSource, ExitReason, WorkerEnv, WorkerReport};

// ── Physical devices ──────────────────────────────────────────────────────────

/// An input device node as enumerated, before any grab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalDevice {
    pub path: PathBuf,
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    /// Key codes the device can report.
    pub keys: KeySet,
}

impl PhysicalDevice {
    /// The `vvvv:pppp` identity string, as accepted by `vendor_product`.
    pub fn vendor_product(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor, self.product)
    }

    fn matches(&self, matcher: &DeviceMatcher) -> bool {
        match matcher {
            DeviceMatcher::Name(name) => self.name == *name,
            DeviceMatcher::VendorProduct { vendor, product } => {
                self.vendor == *vendor && self.product == *product
            }
            DeviceMatcher::Path(path) => same_node(&self.path, path),
        }
    }
}

fn same_node(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Error type for acquiring a physical device.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("{path}: device is grabbed by another process")]
    DeviceBusy { path: PathBuf },
    #[error("{path}: permission denied (is the user in the `input` group?)")]
    PermissionDenied { path: PathBuf },
    #[error("{path}: device disappeared before it could be opened")]
    DeviceGone { path: PathBuf },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Access to the platform's input devices.
///
/// The evdev implementation lives in `infrastructure::evdev_input`; tests use
/// `infrastructure::evdev_input::mock`.
pub trait DeviceBackend: Send + Sync {
    /// Lists the input devices present right now.
    fn enumerate(&self) -> Vec<PhysicalDevice>;

    /// Opens and exclusively grabs a device.  May block.
    fn acquire(&self, device: &PhysicalDevice) -> Result<Box<dyn EventSource>, AcquireError>;

    /// Lists the present device node paths, cheaply, for hot-plug polling.
    fn device_nodes(&self) -> Vec<PathBuf>;
}

/// Pairs each present device with the spec that claims it.
///
/// Unmatched devices are left out.
/// Keys the virtual device declares: `configured` plus every key a present,
/// matching device can report.
///
/// Declared this way, unbound keys of those devices forward unchanged.  Keys
/// only a later hot-plugged device reports are dropped by its engine.
pub fn output_capabilities(
    configured: &KeySet,
    present: &[PhysicalDevice],
    specs: &[DeviceMatcher],
) -> KeySet {
    let mut keys = configured.clone();
    for (device, _) in match_devices(present, specs) {
        keys.union_with(&device.keys);
    }
    keys
}

pub fn match_devices<'a>(
    present: &'a [PhysicalDevice],
    specs: &[DeviceMatcher],
) -> Vec<(&'a PhysicalDevice, DeviceMatcher)> {
    let name_specs = specs.iter().filter(|m| matches!(m, DeviceMatcher::Name(_)));
    let id_specs = specs
        .iter()
        .filter(|m| matches!(m, DeviceMatcher::VendorProduct { .. }));
    let path_specs = specs.iter().filter(|m| matches!(m, DeviceMatcher::Path(_)));
    let ordered: Vec<&DeviceMatcher> = name_specs.chain(id_specs).chain(path_specs).collect();

    present
        .iter()
        .filter_map(|device| {
            ordered
                .iter()
                .find(|matcher| device.matches(matcher))
                .map(|matcher| (device, (*matcher).clone()))
        })
        .collect()
}

// ── Runtime state ─────────────────────────────────────────────────────────────

/// Grab state of a tracked device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabStatus {
    Ungrabbed,
    Grabbed,
    Lost,
}

impl GrabStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GrabStatus::Ungrabbed => "ungrabbed",
            GrabStatus::Grabbed => "grabbed",
            GrabStatus::Lost => "lost",
        }
    }
}

/// Status snapshot of one tracked device, for `keyweave status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub path: PathBuf,
    pub name: String,
    pub device: String,
    pub status: GrabStatus,
}

/// Result of one match-and-acquire pass.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Matching devices an acquisition was attempted for.
    pub attempted: usize,
    pub acquired: usize,
    pub failed: Vec<AcquireError>,
}

struct Worker {
    id: u64,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Tracked {
    name: String,
    matcher: DeviceMatcher,
    status: GrabStatus,
    worker: Option<Worker>,
}

/// Owns every grabbed device's worker.
pub struct DeviceManager {
    backend: Arc<dyn DeviceBackend>,
    env: WorkerEnv,
    tracked: BTreeMap<PathBuf, Tracked>,
    next_id: u64,
}

impl DeviceManager {
    pub fn new(backend: Arc<dyn DeviceBackend>, env: WorkerEnv) -> Self {
        Self {
            backend,
            env,
            tracked: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Matches present devices against `specs` and grabs every matched device
    /// that is not grabbed yet.
    ///
    /// Failures are logged and collected; the remaining devices still get
    /// acquired.
    pub async fn scan(&mut self, specs: &[DeviceMatcher]) -> ScanReport {
        let backend = Arc::clone(&self.backend);
        let present = tokio::task::spawn_blocking(move || backend.enumerate())
            .await
            .unwrap_or_default();
        let mut report = ScanReport::default();

        for (device, matcher) in match_devices(&present, specs) {
            if self.is_running(&device.path) {
                continue;
            }
            // A finished worker still holds its record; retire it first.
            self.release(&device.path).await;

            report.attempted += 1;
            match self.acquire(device).await {
                Ok(source) => {
                    if self.start_worker(device, matcher, source) {
                        report.acquired += 1;
                    }
                }
                Err(e) => {
                    warn!("skipping device: {e}");
                    self.tracked.insert(
                        device.path.clone(),
                        Tracked {
                            name: device.name.clone(),
                            matcher,
                            status: GrabStatus::Ungrabbed,
                            worker: None,
                        },
                    );
                    report.failed.push(e);
                }
            }
        }

        // A lost record is stale once its spec is grabbed under another node.
        let grabbed: Vec<DeviceMatcher> = self
            .tracked
            .values()
            .filter(|t| t.status == GrabStatus::Grabbed)
            .map(|t| t.matcher.clone())
            .collect();
        self.tracked
            .retain(|_, t| t.status != GrabStatus::Lost || !grabbed.contains(&t.matcher));

        report
    }

    async fn acquire(&self, device: &PhysicalDevice) -> Result<Box<dyn EventSource>, AcquireError> {
        let backend = Arc::clone(&self.backend);
        let target = device.clone();
        match tokio::task::spawn_blocking(move || backend.acquire(&target)).await {
            Ok(result) => result,
            Err(e) => Err(AcquireError::Io {
                path: device.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            }),
        }
    }

    fn start_worker(
        &mut self,
        device: &PhysicalDevice,
        matcher: DeviceMatcher,
        mut source: Box<dyn EventSource>,
    ) -> bool {
        let Some(selection) = self.env.profiles.subscribe(&matcher) else {
            error!(path = %device.path.display(), device = %matcher, "no profiles registered");
            source.release();
            return false;
        };
        let id = self.next_id;
        self.next_id += 1;
        let (cancel, cancel_rx) = watch::channel(false);
        let worker = DeviceWorker::new(
            &self.env,
            id,
            device.path.clone(),
            matcher.clone(),
            source,
            selection,
            cancel_rx,
        );
        let task = tokio::spawn(worker.run());

        info!(
            path = %device.path.display(),
            name = %device.name,
            device = %matcher,
            "device grabbed"
        );
        self.tracked.insert(
            device.path.clone(),
            Tracked {
                name: device.name.clone(),
                matcher,
                status: GrabStatus::Grabbed,
                worker: Some(Worker { id, cancel, task }),
            },
        );
        true
    }

    fn is_running(&self, path: &Path) -> bool {
        self.tracked
            .get(path)
            .and_then(|t| t.worker.as_ref())
            .is_some_and(|w| !w.task.is_finished())
    }

    /// Stops the worker of `path`, waiting until its outstanding keys are
    /// released and the device is ungrabbed.
    ///
    /// The record stays (as `Ungrabbed`).  Returns `false` if no worker was
    /// running.  Calling it twice is harmless.
    pub async fn release(&mut self, path: &Path) -> bool {
        let Some(worker) = self.tracked.get_mut(path).and_then(|t| t.worker.take()) else {
            return false;
        };
        if let Some(tracked) = self.tracked.get_mut(path) {
            tracked.status = GrabStatus::Ungrabbed;
        }
        stop(path, worker).await;
        true
    }

    /// Releases and forgets every device bound to `matcher`.
    pub async fn release_spec(&mut self, matcher: &DeviceMatcher) {
        let paths: Vec<PathBuf> = self
            .tracked
            .iter()
            .filter(|(_, t)| t.matcher == *matcher)
            .map(|(path, _)| path.clone())
            .collect();
        for path in paths {
            self.release(&path).await;
            self.tracked.remove(&path);
        }
    }

    /// Releases every device.  After this no worker runs.
    pub async fn release_all(&mut self) {
        let paths: Vec<PathBuf> = self.tracked.keys().cloned().collect();
        for path in paths {
            self.release(&path).await;
        }
        self.tracked.clear();
    }

    /// Handles a device node that disappeared.
    pub async fn device_removed(&mut self, path: &Path) {
        let Some(tracked) = self.tracked.get(path) else {
            return;
        };
        if tracked.status == GrabStatus::Ungrabbed {
            self.tracked.remove(path);
            return;
        }
        if self.release(path).await {
            warn!(path = %path.display(), "grabbed device removed");
        }
        if let Some(tracked) = self.tracked.get_mut(path) {
            tracked.status = GrabStatus::Lost;
        }
    }

    /// Handles a worker that stopped on its own (loss or fault).
    ///
    /// Reports from an older generation of the same node are ignored.
    pub async fn on_worker_exit(&mut self, report: WorkerReport) {
        if report.reason == ExitReason::Released {
            return;
        }
        let current = self
            .tracked
            .get(&report.path)
            .and_then(|t| t.worker.as_ref())
            .is_some_and(|w| w.id == report.id);
        if !current {
            return;
        }
        self.release(&report.path).await;
        if let Some(tracked) = self.tracked.get_mut(&report.path) {
            tracked.status = GrabStatus::Lost;
        }
        match report.reason {
            ExitReason::Fault(reason) => {
                error!(path = %report.path.display(), device = %report.matcher, "device faulted: {reason}");
            }
            _ => info!(path = %report.path.display(), device = %report.matcher, "device lost"),
        }
    }

    /// Number of devices with a running worker.
    pub fn grabbed(&self) -> usize {
        self.tracked
            .values()
            .filter(|t| t.status == GrabStatus::Grabbed)
            .count()
    }

    pub fn status(&self) -> Vec<DeviceStatus> {
        self.tracked
            .iter()
            .map(|(path, t)| DeviceStatus {
                path: path.clone(),
                name: t.name.clone(),
                device: t.matcher.to_string(),
                status: t.status,
            })
            .collect()
    }
}

async fn stop(path: &Path, worker: Worker) {
    worker.cancel.send_replace(true);
    if let Err(e) = worker.task.await {
        error!(path = %path.display(), "device worker panicked: {e}");
    }
}
