//! Physical keyboards through the Linux evdev interface.
//!
//! [`EvdevBackend`] enumerates `/dev/input/event*`, and acquires a device by
//! opening it and taking an exclusive grab (`EVIOCGRAB`).  The grabbed
//! device is read asynchronously through evdev's Tokio event stream.
//!
//! # Releasing
//!
//! The kernel drops the grab when the last file descriptor closes, so
//! [`EvdevSource::release`] simply drops the stream.  Dropping the source
//! without calling it has the same effect.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evdev::{Device, EventStream, InputEventKind};
use keyweave_core::engine::{KeyAction, KeyEvent};
use keyweave_core::{KeyCode, KeySet};
use tracing::{debug, trace};

use crate::application::device_manager::{AcquireError, DeviceBackend, PhysicalDevice};
use crate::application::device_worker::{EventSource, SourceError};
use crate::infrastructure::virtual_output::VIRTUAL_DEVICE_NAME;

pub mod mock;

/// Directory holding the event device nodes.
pub const INPUT_DIR: &str = "/dev/input";

/// The evdev implementation of [`DeviceBackend`].
#[derive(Debug, Default)]
pub struct EvdevBackend;

impl EvdevBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for EvdevBackend {
    fn enumerate(&self) -> Vec<PhysicalDevice> {
        let mut devices: Vec<PhysicalDevice> = evdev::enumerate()
            .filter_map(|(path, device)| {
                let name = device.name().unwrap_or_default().to_string();
                // Never grab our own output.
                if name == VIRTUAL_DEVICE_NAME {
                    return None;
                }
                let id = device.input_id();
                let keys: KeySet = device
                    .supported_keys()
                    .map(|keys| keys.iter().map(|key| KeyCode(key.code())).collect())
                    .unwrap_or_default();
                Some(PhysicalDevice {
                    path,
                    name,
                    vendor: id.vendor(),
                    product: id.product(),
                    keys,
                })
            })
            .collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    fn acquire(&self, device: &PhysicalDevice) -> Result<Box<dyn EventSource>, AcquireError> {
        let path = &device.path;
        let mut handle = Device::open(path).map_err(|e| classify(path, e))?;
        handle.grab().map_err(|e| classify(path, e))?;
        let stream = handle.into_event_stream().map_err(|e| classify(path, e))?;
        debug!(path = %path.display(), "device opened and grabbed");
        Ok(Box::new(EvdevSource {
            path: path.clone(),
            stream: Some(stream),
        }))
    }

    fn device_nodes(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(INPUT_DIR) else {
            return Vec::new();
        };
        let mut nodes: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
            .map(|entry| entry.path())
            .collect();
        nodes.sort();
        nodes
    }
}

/// Maps an open/grab failure to the acquisition error taxonomy.
fn classify(path: &Path, error: io::Error) -> AcquireError {
    let path = path.to_path_buf();
    match error.raw_os_error() {
        Some(libc::EBUSY) => AcquireError::DeviceBusy { path },
        Some(libc::EACCES) | Some(libc::EPERM) => AcquireError::PermissionDenied { path },
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
            AcquireError::DeviceGone { path }
        }
        _ => AcquireError::Io {
            path,
            source: error,
        },
    }
}

/// A grabbed evdev device.
pub struct EvdevSource {
    path: PathBuf,
    stream: Option<EventStream>,
}

#[async_trait]
impl EventSource for EvdevSource {
    async fn next_event(&mut self) -> Result<KeyEvent, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SourceError::Gone);
        };
        loop {
            let event = match stream.next_event().await {
                Ok(event) => event,
                Err(e) if e.raw_os_error() == Some(libc::ENODEV) => return Err(SourceError::Gone),
                Err(e) => return Err(SourceError::Io(e)),
            };
            // Only key events are remapped; SYN reports are regenerated by
            // the sink, and MSC_SCAN / LED noise is dropped.
            if let InputEventKind::Key(key) = event.kind() {
                if let Some(action) = KeyAction::from_value(event.value()) {
                    trace!(path = %self.path.display(), code = key.code(), "key event");
                    return Ok(KeyEvent {
                        key: KeyCode(key.code()),
                        action,
                    });
                }
            }
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            debug!(path = %self.path.display(), "device released");
        }
    }
}
