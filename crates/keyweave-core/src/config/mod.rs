//! Configuration model, validation, and compilation.
//!
//! - [`model`]: the structured configuration a parser produces.
//! - [`compile()`]: checks every invariant and resolves names into the
//!   per-key tables consumed by [`crate::engine::RemapEngine`].

mod tables;
mod error;
pub mod model;

pub use tables::{
    compile, ChordAction, ChordEntry, CompiledConfig, CompiledDevice, CompiledProfile,
    CompiledStep, KeyBinding, MacroId, ProfileId,
};
pub use error::ConfigError;
pub use model::{
    Config, DeviceMatcher, DeviceSpec, GlobalSettings, LogLevel, MacroStep, PassthroughBinding,
    Profile,
};
