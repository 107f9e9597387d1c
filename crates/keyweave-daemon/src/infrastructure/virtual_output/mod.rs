//! The virtual output keyboard, created through `/dev/uinput`.
//!
//! One [`UinputSink`] exists per daemon.  Its key capabilities are fixed when
//! it is created (uinput cannot add keys to a live device), so the sink
//! checks every batch against them and refuses undeclared keys with
//! [`SinkError::CapabilityMissing`] instead of letting the kernel drop them.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use keyweave_core::engine::KeyEvent;
use keyweave_core::KeySet;
use tracing::info;

use crate::application::device_worker::{OutputSink, SinkError};

pub mod mock;

/// Name the virtual keyboard shows up under in `keyweave devices`.
pub const VIRTUAL_DEVICE_NAME: &str = "keyweave virtual keyboard";

/// Writes key events to a uinput virtual keyboard.
pub struct UinputSink {
    device: VirtualDevice,
    capabilities: KeySet,
    batch: Vec<InputEvent>,
}

impl UinputSink {
    /// Creates the virtual keyboard declaring exactly `capabilities`.
    ///
    /// # Errors
    ///
    /// [`SinkError::Create`] when `/dev/uinput` cannot be opened or the
    /// device cannot be built.
    pub fn create(capabilities: KeySet) -> Result<Self, SinkError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in capabilities.iter() {
            keys.insert(Key::new(code.0));
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(SinkError::Create)?
            .name(VIRTUAL_DEVICE_NAME)
            .with_keys(&keys)
            .map_err(SinkError::Create)?
            .build()
            .map_err(SinkError::Create)?;

        info!(keys = capabilities.len(), "virtual keyboard created");
        Ok(Self {
            device,
            capabilities,
            batch: Vec::with_capacity(16),
        })
    }
}

impl OutputSink for UinputSink {
    fn emit(&mut self, events: &[KeyEvent]) -> Result<(), SinkError> {
        if let Some(missing) = events.iter().find(|e| !self.capabilities.contains(e.key)) {
            return Err(SinkError::CapabilityMissing(missing.key));
        }
        self.batch.clear();
        self.batch.extend(
            events
                .iter()
                .map(|e| InputEvent::new(EventType::KEY, e.key.0, e.action.value())),
        );
        // `emit` terminates the batch with SYN_REPORT.
        self.device.emit(&self.batch)?;
        Ok(())
    }

    fn capabilities(&self) -> &KeySet {
        &self.capabilities
    }
}
