//! Control socket message types.
//!
//! One JSON object per line in each direction, discriminated by `type`:
//!
//! ```text
//! → {"type":"switch_profile","device":"Keychron K3 Pro","profile":"gaming"}
//! ← {"type":"profiles","device":"\"Keychron K3 Pro\"","active":"gaming","profiles":["default","gaming"]}
//! → {"type":"status"}
//! → {"type":"reload"}
//! ← {"type":"error","message":"device \"kbd\" has no profile \"nope\""}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::application::controller::{DaemonStatus, ReloadSummary};
use crate::application::device_manager::DeviceStatus;
use crate::application::profile_manager::ProfileListing;

/// Requests accepted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    SwitchProfile { device: String, profile: String },
    ListProfiles { device: String },
    Status,
    Reload,
}

/// Responses sent back, one per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlResponse {
    Profiles(ProfileInfo),
    Status {
        devices: Vec<DeviceInfo>,
        profiles: Vec<ProfileInfo>,
    },
    Reloaded {
        added: Vec<String>,
        removed: Vec<String>,
        kept: Vec<String>,
        incompatible: Vec<String>,
        acquired: usize,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    pub fn error(message: impl ToString) -> Self {
        ControlResponse::Error {
            message: message.to_string(),
        }
    }
}

/// A device spec's profiles and the active one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileInfo {
    pub device: String,
    pub active: String,
    pub profiles: Vec<String>,
}

/// A tracked device node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    /// The spec the node matched, in matcher display form.
    pub device: String,
    /// `grabbed`, `ungrabbed` or `lost`.
    pub status: String,
}

impl From<ProfileListing> for ProfileInfo {
    fn from(listing: ProfileListing) -> Self {
        Self {
            device: listing.device,
            active: listing.active,
            profiles: listing.profiles,
        }
    }
}

impl From<DeviceStatus> for DeviceInfo {
    fn from(status: DeviceStatus) -> Self {
        Self {
            path: status.path,
            name: status.name,
            device: status.device,
            status: status.status.as_str().to_string(),
        }
    }
}

impl From<DaemonStatus> for ControlResponse {
    fn from(status: DaemonStatus) -> Self {
        ControlResponse::Status {
            devices: status.devices.into_iter().map(DeviceInfo::from).collect(),
            profiles: status.profiles.into_iter().map(ProfileInfo::from).collect(),
        }
    }
}

impl From<ReloadSummary> for ControlResponse {
    fn from(summary: ReloadSummary) -> Self {
        ControlResponse::Reloaded {
            added: summary.added,
            removed: summary.removed,
            kept: summary.kept,
            incompatible: summary.incompatible,
            acquired: summary.acquired,
        }
    }
}
