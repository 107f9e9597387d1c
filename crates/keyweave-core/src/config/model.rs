//! Structured configuration as produced by a config-file parser.
//!
//! Everything here is still textual (key names, profile names).  Call
//! [`crate::config::compile`] to validate it and resolve names into the
//! index-based tables the remap engine consumes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub global: GlobalSettings,
    /// Devices in declaration order; matching honours this order.
    pub devices: Vec<DeviceSpec>,
}

/// Daemon-wide settings.  Only `keybinds_path` affects behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSettings {
    pub log_level: LogLevel,
    /// Where the compositor keybind fragment is written.  `None` disables it.
    pub keybinds_path: Option<PathBuf>,
}

/// Log verbosity understood by `tracing`'s env filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// How a [`DeviceSpec`] recognizes its physical device.
///
/// The matcher is also the spec's identity across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeviceMatcher {
    /// Exact device name as reported by the kernel.
    Name(String),
    /// USB vendor/product pair, written `"3434:0361"` (hex).
    VendorProduct { vendor: u16, product: u16 },
    /// Event node path such as `/dev/input/event5` or a `/dev/input/by-id` link.
    Path(PathBuf),
}

impl DeviceMatcher {
    /// Parses a `"vvvv:pppp"` hex pair.
    pub fn vendor_product(text: &str) -> Option<DeviceMatcher> {
        let (vendor, product) = text.trim().split_once(':')?;
        Some(DeviceMatcher::VendorProduct {
            vendor: u16::from_str_radix(vendor.trim(), 16).ok()?,
            product: u16::from_str_radix(product.trim(), 16).ok()?,
        })
    }
}

impl fmt::Display for DeviceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMatcher::Name(name) => write!(f, "{name:?}"),
            DeviceMatcher::VendorProduct { vendor, product } => {
                write!(f, "{vendor:04x}:{product:04x}")
            }
            DeviceMatcher::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One physical device to grab, with its profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub matcher: DeviceMatcher,
    /// Profiles in declaration order.  Must be non-empty with unique names.
    pub profiles: Vec<Profile>,
    /// `(chord, profile name)` pairs that switch the active profile.
    pub profile_switch: Vec<(String, String)>,
    /// Profile active at startup and the fallback on reload.  `None` means the
    /// first declared profile.
    pub default_profile: Option<String>,
}

/// A named bundle of transformation tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: String,
    /// `(source key, destination key)`; later duplicates win.
    pub remap: Vec<(String, String)>,
    /// `(trigger chord, destination chord)`.
    pub combo: Vec<(String, String)>,
    /// `(trigger chord, steps)`.
    pub macros: Vec<(String, Vec<MacroStep>)>,
    pub passthrough: Vec<PassthroughBinding>,
}

impl Profile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A step of a macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroStep {
    /// Tap a key or chord (`"Ctrl+C"`).
    Emit(String),
    /// Pause before the next step.
    Wait(Duration),
}

impl FromStr for MacroStep {
    type Err = String;

    /// Parses `"wait(50)"` / `"delay(50)"` (milliseconds) or a chord.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let lower = trimmed.to_ascii_lowercase();
        for prefix in ["wait(", "delay("] {
            if let Some(rest) = lower.strip_prefix(prefix) {
                let millis = rest
                    .strip_suffix(')')
                    .and_then(|ms| ms.trim().parse::<u64>().ok())
                    .ok_or_else(|| format!("invalid wait step {trimmed:?}, expected wait(<ms>)"))?;
                return Ok(MacroStep::Wait(Duration::from_millis(millis)));
            }
        }
        Ok(MacroStep::Emit(trimmed.to_string()))
    }
}

/// A chord forwarded to the compositor together with the action it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughBinding {
    pub key: String,
    /// Opaque compositor action, copied verbatim into the keybind fragment.
    pub action: String,
}
