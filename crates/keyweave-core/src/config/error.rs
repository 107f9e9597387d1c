use thiserror::Error;

use crate::keymap::ChordError;

/// A configuration invariant that does not hold.
///
/// Every variant names the device (by its matcher) and, where relevant, the
/// profile, so the first failing invariant can be reported with context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("device {device}: no profiles declared")]
    NoProfiles { device: String },

    #[error("device {device}: profile {profile:?} declared more than once")]
    DuplicateProfile { device: String, profile: String },

    #[error("device {device}: declared more than once")]
    DuplicateDevice { device: String },

    #[error("device {device}: default profile {profile:?} does not exist")]
    UnknownDefaultProfile { device: String, profile: String },

    #[error("device {device}: profile_switch {chord:?} targets unknown profile {profile:?}")]
    UnknownSwitchTarget {
        device: String,
        chord: String,
        profile: String,
    },

    #[error("device {device}, profile {profile:?}: invalid {table} entry {entry:?}: {source}")]
    InvalidKey {
        device: String,
        profile: String,
        table: &'static str,
        entry: String,
        #[source]
        source: ChordError,
    },

    #[error("device {device}, profile {profile:?}: macro {trigger:?} has no steps")]
    EmptyMacro {
        device: String,
        profile: String,
        trigger: String,
    },

    #[error(
        "device {device}, profile {profile:?}: key {key} is bound in both {first} and {second}"
    )]
    ConflictingBinding {
        device: String,
        profile: String,
        key: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("passthrough chord {chord} is bound to different actions in {first} and {second}")]
    DuplicateKeybind {
        chord: String,
        first: String,
        second: String,
    },
}
