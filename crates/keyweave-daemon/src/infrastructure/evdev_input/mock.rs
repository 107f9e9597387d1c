//! Mock physical devices for unit and integration testing.
//!
//! [`MockBackend`] stands in for `/dev/input`: tests plug and unplug
//! [`PhysicalDevice`]s, make acquisition fail on purpose, and feed key events
//! into whichever [`MockSource`] currently holds a device.  Counters record
//! how often each node was acquired and released, so a test can tell a kept
//! grab from a close/reopen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use keyweave_core::engine::KeyEvent;
use keyweave_core::KeyCode;
use tokio::sync::mpsc;

use crate::application::device_manager::{AcquireError, DeviceBackend, PhysicalDevice};
use crate::application::device_worker::{EventSource, SourceError};

/// Builds a [`PhysicalDevice`] reporting the standard keyboard keys.
pub fn keyboard(path: &str, name: &str, vendor: u16, product: u16) -> PhysicalDevice {
    PhysicalDevice {
        path: PathBuf::from(path),
        name: name.to_string(),
        vendor,
        product,
        keys: (1..=keyweave_core::keymap::STANDARD_KEYBOARD_MAX).map(KeyCode).collect(),
    }
}

/// Acquisition failure to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Busy,
    Denied,
    Gone,
}

/// A grabbed mock device, fed through a channel.
///
/// Closing the channel (dropping every sender) reads as the device going
/// away.
pub struct MockSource {
    events: mpsc::UnboundedReceiver<KeyEvent>,
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl MockSource {
    /// A standalone source and the sender feeding it.
    pub fn channel() -> (Self, mpsc::UnboundedSender<KeyEvent>) {
        let (tx, events) = mpsc::unbounded_channel();
        let source = Self {
            events,
            releases: Arc::new(AtomicUsize::new(0)),
            released: false,
        };
        (source, tx)
    }
}

#[async_trait]
impl EventSource for MockSource {
    async fn next_event(&mut self) -> Result<KeyEvent, SourceError> {
        if self.released {
            return Err(SourceError::Gone);
        }
        self.events.recv().await.ok_or(SourceError::Gone)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct Node {
    acquired: usize,
    releases: Arc<AtomicUsize>,
    feed: Option<mpsc::UnboundedSender<KeyEvent>>,
    refusal: Option<Refusal>,
}

#[derive(Default)]
struct Inner {
    present: Vec<PhysicalDevice>,
    nodes: HashMap<PathBuf, Node>,
}

/// An in-memory [`DeviceBackend`].
#[derive(Default)]
pub struct MockBackend {
    inner: Mutex<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes a device present.  Replaces a present device with the same path.
    pub fn plug(&self, device: PhysicalDevice) {
        let mut inner = self.lock();
        inner.present.retain(|d| d.path != device.path);
        inner.present.push(device);
    }

    /// Removes a device; its current source reads as gone.
    pub fn unplug(&self, path: &Path) {
        let mut inner = self.lock();
        inner.present.retain(|d| d.path != path);
        if let Some(node) = inner.nodes.get_mut(path) {
            node.feed = None;
        }
    }

    /// Makes acquisitions of `path` fail until [`allow`](Self::allow).
    pub fn refuse(&self, path: &Path, refusal: Refusal) {
        self.lock().nodes.entry(path.to_path_buf()).or_default().refusal = Some(refusal);
    }

    pub fn allow(&self, path: &Path) {
        if let Some(node) = self.lock().nodes.get_mut(path) {
            node.refusal = None;
        }
    }

    /// Feeds an event to the source holding `path`.  Returns `false` if the
    /// device is not grabbed.
    pub fn send(&self, path: &Path, event: KeyEvent) -> bool {
        self.lock()
            .nodes
            .get(path)
            .and_then(|node| node.feed.as_ref())
            .is_some_and(|feed| feed.send(event).is_ok())
    }

    /// How many times `path` was successfully acquired.
    pub fn acquire_count(&self, path: &Path) -> usize {
        self.lock().nodes.get(path).map_or(0, |node| node.acquired)
    }

    /// How many sources of `path` were released.
    pub fn release_count(&self, path: &Path) -> usize {
        self.lock()
            .nodes
            .get(path)
            .map_or(0, |node| node.releases.load(Ordering::SeqCst))
    }
}

impl DeviceBackend for MockBackend {
    fn enumerate(&self) -> Vec<PhysicalDevice> {
        self.lock().present.clone()
    }

    fn acquire(&self, device: &PhysicalDevice) -> Result<Box<dyn EventSource>, AcquireError> {
        let mut inner = self.lock();
        let path = device.path.clone();
        if !inner.present.iter().any(|d| d.path == path) {
            return Err(AcquireError::DeviceGone { path });
        }
        let node = inner.nodes.entry(path.clone()).or_default();
        match node.refusal {
            Some(Refusal::Busy) => return Err(AcquireError::DeviceBusy { path }),
            Some(Refusal::Denied) => return Err(AcquireError::PermissionDenied { path }),
            Some(Refusal::Gone) => return Err(AcquireError::DeviceGone { path }),
            None => {}
        }

        let (tx, events) = mpsc::unbounded_channel();
        node.feed = Some(tx);
        node.acquired += 1;
        Ok(Box::new(MockSource {
            events,
            releases: Arc::clone(&node.releases),
            released: false,
        }))
    }

    fn device_nodes(&self) -> Vec<PathBuf> {
        self.lock().present.iter().map(|d| d.path.clone()).collect()
    }
}
