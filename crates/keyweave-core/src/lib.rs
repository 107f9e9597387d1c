//! # keyweave-core
//!
//! OS-independent heart of the keyweave input remapper: key tables, the
//! configuration model and its validation, the per-device remap engine, and
//! the compositor keybind generator.
//!
//! This crate never touches a device node.  The daemon crate feeds it raw key
//! events read from evdev and writes whatever it returns to a uinput device.
//!
//! # Architecture overview (for beginners)
//!
//! keyweave grabs selected keyboards exclusively, so the desktop no longer
//! sees their raw events, and re-emits a transformed stream through a virtual
//! keyboard.  Each grabbed keyboard has a set of named *profiles*; each
//! profile says which keys are remapped, which chords become other chords
//! (combos), which chords play a macro, and which chords must reach the
//! compositor untouched (passthrough).
//!
//! - **`keymap`**: key codes, key names, modifier chords, and [`KeySet`], a
//!   fixed-size bitset used for "currently down" bookkeeping.
//!
//! - **`config`**: the structured configuration, and [`compile`], which
//!   validates it and turns each profile into a flat per-key table so the
//!   engine never looks up strings while handling events.
//!
//! - **`engine`**: [`RemapEngine`], the state machine that turns one device's
//!   `(key, action)` events into output events, macro requests, and profile
//!   switch requests, without ever leaving an output key stuck down.
//!
//! - **`keybinds`**: renders passthrough chords as a compositor keybind file.

pub mod config;
pub mod engine;
pub mod keybinds;
pub mod keymap;

pub use config::{compile, CompiledConfig, CompiledDevice, CompiledProfile, Config, ConfigError};
pub use engine::{Effect, KeyAction, KeyEvent, RemapEngine};
pub use keymap::{Chord, KeyCode, KeySet};
