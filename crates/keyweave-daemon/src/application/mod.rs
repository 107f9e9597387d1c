//! Application layer of the daemon.
//!
//! # What lives here (for beginners)
//!
//! The use cases that keep keyboards remapped while devices come and go.
//! They depend only on traits (`EventSource`, `OutputSink`, `DeviceBackend`,
//! `ConfigStore`), never on evdev, uinput, or the file system, so every
//! piece runs in tests against the mocks in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`device_worker`**   – One task per grabbed keyboard: reads events,
//!   runs them through the remap engine, writes the result, plays macros,
//!   and releases every held key when it stops.
//!
//! - **`profile_manager`** – The active profile of each device spec, shared
//!   by all workers through `watch` channels.
//!
//! - **`device_manager`**  – Matches present devices to specs, acquires
//!   them, and tracks their grab state across hot-plug.
//!
//! - **`controller`**      – Startup, reload, and shutdown.  Every state
//!   change goes through its message loop.

pub mod controller;
pub mod device_manager;
pub mod device_worker;
pub mod profile_manager;
