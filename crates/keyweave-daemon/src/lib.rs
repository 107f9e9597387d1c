//! keyweave daemon library.
//!
//! Shared by the `keyweaved` daemon, the `keyweave` CLI, and the integration
//! tests in `tests/`, so all three see the same module tree.
//!
//! ```text
//! /dev/input/eventN ──► DeviceWorker ──► RemapEngine ──► uinput keyboard
//!        ▲                  │ switch
//!  DeviceManager ◄── DaemonController ◄── signals, control socket, hot-plug
//! ```

pub mod application;
pub mod infrastructure;
