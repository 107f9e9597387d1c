//! Hot-plug detection by polling the device node directory.
//!
//! # How it works (for beginners)
//!
//! Every [`RESCAN_INTERVAL`] the watcher lists the event device nodes and
//! compares the list with the previous one.  New nodes become
//! [`ControlMessage::DeviceAdded`], vanished nodes
//! [`ControlMessage::DeviceRemoved`].  The controller decides what to do
//! with them; the watcher never touches a device itself.
//!
//! Removal is also noticed, usually sooner, by the device worker itself when
//! a read fails with `ENODEV`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::application::controller::ControlMessage;
use crate::application::device_manager::DeviceBackend;

/// Polling period of the watcher.
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns the watcher.  It stops once the control channel closes.
pub fn spawn_hotplug_watcher(
    backend: Arc<dyn DeviceBackend>,
    control: mpsc::Sender<ControlMessage>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut known: BTreeSet<PathBuf> = backend.device_nodes().into_iter().collect();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let current: BTreeSet<PathBuf> = backend.device_nodes().into_iter().collect();

            for path in known.difference(&current) {
                debug!(path = %path.display(), "device node vanished");
                if control.send(ControlMessage::DeviceRemoved(path.clone())).await.is_err() {
                    return;
                }
            }
            for path in current.difference(&known) {
                debug!(path = %path.display(), "device node appeared");
                if control.send(ControlMessage::DeviceAdded(path.clone())).await.is_err() {
                    return;
                }
            }
            known = current;
        }
    })
}
