//! TOML configuration file: on-disk schema and conversion to the core model.
//!
//! Default location: `$XDG_CONFIG_HOME/keyweave/config.toml`, falling back to
//! `~/.config/keyweave/config.toml`.
//!
//! # Example
//!
//! ```toml
//! [global]
//! log_level = "info"
//! keybinds_path = "~/.config/niri/keyweave-binds.kdl"
//!
//! [[device]]
//! name = "Keychron K3 Pro"        # or vendor_product = "3434:0361", or path = "/dev/input/event5"
//! default_profile = "default"
//!
//! [device.profile_switch]
//! "Ctrl+Alt+1" = "default"
//! "Ctrl+Alt+2" = "gaming"
//!
//! [[device.profile]]
//! name = "default"
//! remap = { CapsLock = "Escape" }
//! combo = { "Ctrl+Shift+Q" = "Alt+F4" }
//! macro = { "Ctrl+Shift+D" = ["Ctrl+C", "wait(50)", "Ctrl+V"] }
//! passthrough = [{ key = "Super+Return", action = 'spawn "alacritty";' }]
//! ```
//!
//! # Serde default values
//!
//! Every table except `name` is optional.  Missing tables deserialize as
//! empty, and `[global]` falls back to [`GlobalSection::default`].
//!
//! Binding tables are read as [`toml::Table`] (insertion ordered), so the
//! model keeps declaration order, which later validation reports rely on.

use std::path::{Path, PathBuf};

use keyweave_core::config::{
    Config, DeviceMatcher, DeviceSpec, GlobalSettings, LogLevel, MacroStep, PassthroughBinding,
    Profile,
};
use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine config directory (set XDG_CONFIG_HOME or HOME)")]
    NoConfigDir,

    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Well-formed TOML that does not describe a valid config shape.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceSection>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    /// `"error"`, `"warn"`, `"info"`, `"debug"` or `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Output path of the compositor keybind fragment; `~/` is expanded.
    #[serde(default)]
    pub keybinds_path: Option<String>,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            keybinds_path: None,
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// One `[[device]]` entry.  Exactly one of `name`, `vendor_product`, `path`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub name: Option<String>,
    pub vendor_product: Option<String>,
    pub path: Option<String>,
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profile_switch: toml::Table,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<ProfileSection>,
}

/// One `[[device.profile]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileSection {
    pub name: String,
    #[serde(default)]
    pub remap: toml::Table,
    #[serde(default)]
    pub combo: toml::Table,
    #[serde(default, rename = "macro")]
    pub macros: toml::Table,
    #[serde(default)]
    pub passthrough: Vec<PassthroughSection>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PassthroughSection {
    pub key: String,
    pub action: String,
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl ConfigFile {
    /// Converts the file into the core model.
    ///
    /// Only the shape is checked here; [`keyweave_core::compile`] validates
    /// keys, conflicts, and profile references.
    ///
    /// # Errors
    ///
    /// [`StorageError::Invalid`] naming the offending device or profile.
    pub fn into_model(self) -> Result<Config, StorageError> {
        let global = GlobalSettings {
            log_level: self.global.log_level,
            keybinds_path: self.global.keybinds_path.as_deref().map(expand_home),
        };
        let devices = self
            .devices
            .into_iter()
            .enumerate()
            .map(|(index, device)| device.into_model(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Config { global, devices })
    }
}

impl DeviceSection {
    fn into_model(self, index: usize) -> Result<DeviceSpec, StorageError> {
        let matcher = match (self.name, self.vendor_product, self.path) {
            (Some(name), None, None) => DeviceMatcher::Name(name),
            (None, Some(id), None) => DeviceMatcher::vendor_product(&id).ok_or_else(|| {
                StorageError::Invalid(format!(
                    "device #{}: vendor_product {id:?} is not a hex \"vvvv:pppp\" pair",
                    index + 1
                ))
            })?,
            (None, None, Some(path)) => DeviceMatcher::Path(expand_home(&path)),
            _ => {
                return Err(StorageError::Invalid(format!(
                    "device #{}: exactly one of name, vendor_product, path is required",
                    index + 1
                )))
            }
        };
        let context = format!("device {matcher}");

        let profile_switch = string_pairs(self.profile_switch, &format!("{context}, profile_switch"))?;
        let profiles = self
            .profiles
            .into_iter()
            .map(|profile| profile.into_model(&context))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeviceSpec {
            matcher,
            profiles,
            profile_switch,
            default_profile: self.default_profile,
        })
    }
}

impl ProfileSection {
    fn into_model(self, device: &str) -> Result<Profile, StorageError> {
        let context = format!("{device}, profile {:?}", self.name);

        let mut macros = Vec::with_capacity(self.macros.len());
        for (trigger, value) in self.macros {
            let toml::Value::Array(items) = value else {
                return Err(StorageError::Invalid(format!(
                    "{context}, macro {trigger:?}: expected an array of steps"
                )));
            };
            let steps = items
                .into_iter()
                .map(|item| match item {
                    toml::Value::String(text) => text.parse::<MacroStep>().map_err(|e| {
                        StorageError::Invalid(format!("{context}, macro {trigger:?}: {e}"))
                    }),
                    other => Err(StorageError::Invalid(format!(
                        "{context}, macro {trigger:?}: step {other} is not a string"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            macros.push((trigger, steps));
        }

        Ok(Profile {
            remap: string_pairs(self.remap, &format!("{context}, remap"))?,
            combo: string_pairs(self.combo, &format!("{context}, combo"))?,
            macros,
            passthrough: self
                .passthrough
                .into_iter()
                .map(|p| PassthroughBinding {
                    key: p.key,
                    action: p.action,
                })
                .collect(),
            name: self.name,
        })
    }
}

fn string_pairs(table: toml::Table, context: &str) -> Result<Vec<(String, String)>, StorageError> {
    table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(text) => Ok((key, text)),
            other => Err(StorageError::Invalid(format!(
                "{context}: value {other} for {key:?} must be a string"
            ))),
        })
        .collect()
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Expands a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Resolves the default config file path.
///
/// # Errors
///
/// [`StorageError::NoConfigDir`] if neither `XDG_CONFIG_HOME` nor `HOME` is
/// set.
pub fn default_config_path() -> Result<PathBuf, StorageError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok_or(StorageError::NoConfigDir)?;
    Ok(base.join("keyweave").join("config.toml"))
}

/// Parses configuration text.
///
/// # Errors
///
/// [`StorageError::Parse`] for malformed TOML or unknown fields,
/// [`StorageError::Invalid`] for a wrong shape.
pub fn parse_config(text: &str) -> Result<Config, StorageError> {
    let file: ConfigFile = toml::from_str(text)?;
    file.into_model()
}

/// Reads and parses the config file at `path`.
///
/// Unlike the keybind fragment, the config file is required: a missing file
/// is an error.
pub fn load_config(path: &Path) -> Result<Config, StorageError> {
    let text = std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
