//! Infrastructure layer of the daemon.
//!
//! Contains the OS-facing adapters: evdev input devices, the uinput virtual
//! keyboard, hot-plug polling, the control socket, and file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keyweave_core`, but MUST NOT be imported by the `application` layer.

pub mod control_socket;
pub mod evdev_input;
pub mod hotplug;
pub mod storage;
pub mod virtual_output;
