//! Recording virtual device for tests.
//!
//! # Why a recording sink?
//!
//! The real [`UinputSink`](super::UinputSink) needs `/dev/uinput` and would
//! type into the test machine's session.  [`RecordingSink`] keeps every
//! written event in memory together with the (Tokio) time it was written, so
//! tests can assert order, timing, and "nothing left down".
//!
//! The sink is moved into the shared [`SharedSink`], so tests keep an
//! [`OutputLog`] handle to inspect it afterwards.
//!
//! # Failure injection
//!
//! [`OutputLog::fail_writes`] makes every following write fail, to exercise
//! the per-device fault path.

use std::sync::{Arc, Mutex, MutexGuard};

use keyweave_core::engine::{KeyAction, KeyEvent};
use keyweave_core::KeySet;
use tokio::time::Instant;

use crate::application::device_worker::{OutputSink, SharedSink, SinkError};

#[derive(Default)]
struct Recorded {
    events: Vec<(Instant, KeyEvent)>,
    should_fail: bool,
}

/// Shared view of everything a [`RecordingSink`] has written.
#[derive(Clone, Default)]
pub struct OutputLog {
    inner: Arc<Mutex<Recorded>>,
}

impl OutputLog {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Written events, in write order.
    pub fn events(&self) -> Vec<KeyEvent> {
        self.lock().events.iter().map(|(_, e)| *e).collect()
    }

    /// Written events with their write time.
    pub fn timed(&self) -> Vec<(Instant, KeyEvent)> {
        self.lock().events.clone()
    }

    /// Keys the virtual device currently holds down, replaying the log.
    pub fn currently_down(&self) -> KeySet {
        let mut down = KeySet::new();
        for (_, event) in &self.lock().events {
            match event.action {
                KeyAction::Down => {
                    down.insert(event.key);
                }
                KeyAction::Up => {
                    down.remove(event.key);
                }
                KeyAction::Repeat => {}
            }
        }
        down
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    /// Makes every following write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.lock().should_fail = fail;
    }
}

/// An [`OutputSink`] that records instead of writing to uinput.
pub struct RecordingSink {
    log: OutputLog,
    capabilities: KeySet,
}

impl RecordingSink {
    /// Creates a sink declaring `capabilities`, like
    /// [`UinputSink::create`](super::UinputSink::create).
    pub fn new(capabilities: KeySet) -> Self {
        Self {
            log: OutputLog::default(),
            capabilities,
        }
    }

    pub fn log(&self) -> OutputLog {
        self.log.clone()
    }

    /// Boxes the sink into the shared handle the workers use.
    pub fn shared(self) -> SharedSink {
        Arc::new(tokio::sync::Mutex::new(Box::new(self)))
    }
}

impl OutputSink for RecordingSink {
    fn emit(&mut self, events: &[KeyEvent]) -> Result<(), SinkError> {
        let mut recorded = self.log.lock();
        if recorded.should_fail {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock write failure",
            )));
        }
        if let Some(missing) = events.iter().find(|e| !self.capabilities.contains(e.key)) {
            return Err(SinkError::CapabilityMissing(missing.key));
        }
        let now = Instant::now();
        recorded.events.extend(events.iter().map(|e| (now, *e)));
        Ok(())
    }

    fn capabilities(&self) -> &KeySet {
        &self.capabilities
    }
}
