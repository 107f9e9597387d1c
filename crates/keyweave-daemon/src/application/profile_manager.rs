//! ProfileManager: the authoritative "active profile" of every device spec.
//!
//! Each device spec owns one slot holding a [`ProfileSelection`] (the
//! compiled profile set plus the active index).  The slot is a
//! `tokio::sync::watch` channel: the manager is the only writer, and every
//! device worker holds a receiver.  Workers adopt a new selection only
//! between two processed events, so a swap is atomic from the engine's point
//! of view and never lands in the middle of a combo or a macro.
//!
//! Slots outlive device workers.  When a device is unplugged and comes back,
//! its new worker subscribes to the same slot and resumes the profile that
//! was active before the loss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use keyweave_core::config::{CompiledDevice, CompiledProfile, DeviceMatcher, ProfileId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Error type for profile switch requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("no configured device matches {0:?}")]
    UnknownDevice(String),
    #[error("device {device} has no profile {profile:?}")]
    UnknownProfile { device: String, profile: String },
    /// A reload replaced the profile set the request was resolved against.
    #[error("profiles of {0} were reloaded; switch dropped")]
    Stale(String),
}

/// A device's compiled profiles and which one is active.
#[derive(Debug, Clone)]
pub struct ProfileSelection {
    pub device: Arc<CompiledDevice>,
    pub active: ProfileId,
}

impl ProfileSelection {
    /// The active profile's tables.
    pub fn profile(&self) -> Option<&CompiledProfile> {
        self.device.profile(self.active)
    }

    pub fn active_name(&self) -> &str {
        self.profile().map(CompiledProfile::name).unwrap_or_default()
    }
}

/// Outcome of replacing a device's profile set on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replaced {
    /// The previously active profile exists in the new set and stays active.
    Preserved(String),
    /// The active profile disappeared; the configured default took over.
    FellBack { from: String, to: String },
}

/// Snapshot of one device spec's profile state, for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileListing {
    pub device: String,
    pub active: String,
    pub profiles: Vec<String>,
}

/// Holds one selection slot per device spec.
#[derive(Default)]
pub struct ProfileManager {
    slots: Mutex<HashMap<DeviceMatcher, watch::Sender<ProfileSelection>>>,
}

impl ProfileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the slot for a spec, activating its initial profile.
    ///
    /// An existing slot for the same matcher is replaced.
    pub fn register(&self, device: Arc<CompiledDevice>) {
        let active = device.initial_profile();
        let matcher = device.matcher().clone();
        let (tx, _rx) = watch::channel(ProfileSelection { device, active });
        self.lock().insert(matcher, tx);
    }

    /// Drops the slot of a spec that is no longer configured.
    pub fn remove(&self, matcher: &DeviceMatcher) {
        self.lock().remove(matcher);
    }

    /// Subscribes a device worker to a spec's selection.
    pub fn subscribe(&self, matcher: &DeviceMatcher) -> Option<watch::Receiver<ProfileSelection>> {
        self.lock().get(matcher).map(watch::Sender::subscribe)
    }

    /// Switches by profile name (external requests).
    ///
    /// # Errors
    ///
    /// [`SwitchError::UnknownDevice`] or [`SwitchError::UnknownProfile`].
    pub fn request_switch(&self, matcher: &DeviceMatcher, profile: &str) -> Result<(), SwitchError> {
        let slots = self.lock();
        let slot = slots
            .get(matcher)
            .ok_or_else(|| SwitchError::UnknownDevice(matcher.to_string()))?;
        let id = slot
            .borrow()
            .device
            .profile_id(profile)
            .ok_or_else(|| SwitchError::UnknownProfile {
                device: matcher.to_string(),
                profile: profile.to_string(),
            })?;
        apply(slot, id);
        Ok(())
    }

    /// Switches by index (requests from a profile-switch chord, already
    /// resolved at compile time against `device`).
    ///
    /// # Errors
    ///
    /// [`SwitchError::UnknownDevice`] if the spec was removed by a reload,
    /// [`SwitchError::Stale`] if the slot now holds a different profile set,
    /// or [`SwitchError::UnknownProfile`] if the index does not exist.
    pub fn request_switch_id(&self, device: &Arc<CompiledDevice>, id: ProfileId) -> Result<(), SwitchError> {
        let matcher = device.matcher();
        let slots = self.lock();
        let slot = slots
            .get(matcher)
            .ok_or_else(|| SwitchError::UnknownDevice(matcher.to_string()))?;
        if !Arc::ptr_eq(&slot.borrow().device, device) {
            return Err(SwitchError::Stale(matcher.to_string()));
        }
        if device.profile(id).is_none() {
            return Err(SwitchError::UnknownProfile {
                device: matcher.to_string(),
                profile: format!("#{}", id.0),
            });
        }
        apply(slot, id);
        Ok(())
    }

    /// Replaces a spec's profile set, keeping the active profile by name.
    ///
    /// Falls back to the spec's configured default profile when the active
    /// one is gone.  Without a configured default the old set stays in
    /// place and `Err(active name)` is returned.
    pub fn replace(&self, device: Arc<CompiledDevice>) -> Result<Replaced, String> {
        let mut slots = self.lock();
        let slot = match slots.get(device.matcher()) {
            Some(slot) => slot,
            None => {
                let active = device.initial_profile();
                let selection = ProfileSelection { device, active };
                let name = selection.active_name().to_string();
                let matcher = selection.device.matcher().clone();
                slots.insert(matcher, watch::channel(selection).0);
                return Ok(Replaced::Preserved(name));
            }
        };

        let current = slot.borrow().active_name().to_string();
        let (active, outcome) = match device.profile_id(&current) {
            Some(id) => (id, Replaced::Preserved(current)),
            None => {
                let fallback = device.fallback_profile().ok_or_else(|| current.clone())?;
                let to = device
                    .profile(fallback)
                    .map(|p| p.name().to_string())
                    .unwrap_or_default();
                (fallback, Replaced::FellBack { from: current, to })
            }
        };
        slot.send_replace(ProfileSelection { device, active });
        Ok(outcome)
    }

    /// Lists a spec's profiles, looked up by matcher display text or by
    /// name matcher value.
    pub fn listing(&self, device: &str) -> Result<ProfileListing, SwitchError> {
        let matcher = self
            .find(device)
            .ok_or_else(|| SwitchError::UnknownDevice(device.to_string()))?;
        self.listing_for(&matcher)
            .ok_or_else(|| SwitchError::UnknownDevice(device.to_string()))
    }

    pub fn listing_for(&self, matcher: &DeviceMatcher) -> Option<ProfileListing> {
        let slots = self.lock();
        let selection = slots.get(matcher)?.borrow().clone();
        Some(ProfileListing {
            device: matcher.to_string(),
            active: selection.active_name().to_string(),
            profiles: selection.device.profile_names().map(str::to_string).collect(),
        })
    }

    /// Every spec's listing, ordered by device.
    pub fn listings(&self) -> Vec<ProfileListing> {
        let matchers: Vec<DeviceMatcher> = self.lock().keys().cloned().collect();
        let mut listings: Vec<ProfileListing> =
            matchers.iter().filter_map(|m| self.listing_for(m)).collect();
        listings.sort_by(|a, b| a.device.cmp(&b.device));
        listings
    }

    /// Resolves user-supplied device text to a registered matcher.
    ///
    /// Accepts the bare device name, `vvvv:pppp`, a path, or the matcher's
    /// display form.
    pub fn find(&self, text: &str) -> Option<DeviceMatcher> {
        let slots = self.lock();
        slots
            .keys()
            .find(|m| {
                m.to_string() == text
                    || match m {
                        DeviceMatcher::Name(name) => name == text,
                        DeviceMatcher::Path(path) => path.as_os_str() == text,
                        DeviceMatcher::VendorProduct { .. } => false,
                    }
            })
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceMatcher, watch::Sender<ProfileSelection>>> {
        // Poisoning only follows a panic while holding the lock; the map is
        // still structurally valid, so keep serving it.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply(slot: &watch::Sender<ProfileSelection>, id: ProfileId) {
    let previous = slot.borrow().active;
    if previous == id {
        return;
    }
    slot.send_modify(|selection| selection.active = id);
    let selection = slot.borrow();
    info!(
        device = %selection.device.matcher(),
        profile = selection.active_name(),
        "active profile switched"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_core::config::{compile, Config, DeviceSpec, Profile};

    fn device(profiles: &[&str], default: Option<&str>) -> Arc<CompiledDevice> {
        let config = Config {
            devices: vec![DeviceSpec {
                matcher: DeviceMatcher::Name("kbd".into()),
                profiles: profiles.iter().map(|p| Profile::named(*p)).collect(),
                profile_switch: Vec::new(),
                default_profile: default.map(str::to_string),
            }],
            ..Config::default()
        };
        Arc::clone(&compile(&config).unwrap().devices[0])
    }

    fn kbd() -> DeviceMatcher {
        DeviceMatcher::Name("kbd".into())
    }

    #[test]
    fn test_register_activates_initial_profile() {
        let manager = ProfileManager::new();
        manager.register(device(&["work", "play"], None));

        let rx = manager.subscribe(&kbd()).unwrap();
        assert_eq!(rx.borrow().active_name(), "work");
    }

    #[test]
    fn test_request_switch_updates_subscribers() {
        // Arrange
        let manager = ProfileManager::new();
        manager.register(device(&["work", "play"], None));
        let mut rx = manager.subscribe(&kbd()).unwrap();

        // Act
        manager.request_switch(&kbd(), "play").unwrap();

        // Assert
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().active_name(), "play");
    }

    #[test]
    fn test_request_switch_rejects_unknown_profile_and_device() {
        let manager = ProfileManager::new();
        manager.register(device(&["work"], None));

        assert_eq!(
            manager.request_switch(&kbd(), "nope"),
            Err(SwitchError::UnknownProfile {
                device: "\"kbd\"".into(),
                profile: "nope".into()
            })
        );
        assert!(matches!(
            manager.request_switch(&DeviceMatcher::Name("other".into()), "work"),
            Err(SwitchError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_switch_to_active_profile_does_not_notify() {
        let manager = ProfileManager::new();
        let work_play = device(&["work", "play"], None);
        manager.register(Arc::clone(&work_play));
        let rx = manager.subscribe(&kbd()).unwrap();

        manager.request_switch_id(&work_play, ProfileId(0)).unwrap();

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_switch_by_index_after_reload_is_dropped() {
        // Arrange: a chord resolved "play" to index 1 of the old set.
        let manager = ProfileManager::new();
        let old = device(&["work", "play"], None);
        manager.register(Arc::clone(&old));
        manager.replace(device(&["play", "work"], None)).unwrap();

        // Act
        let result = manager.request_switch_id(&old, ProfileId(1));

        // Assert: index 1 is "work" in the new set, so nothing switches.
        assert_eq!(result, Err(SwitchError::Stale("\"kbd\"".into())));
        assert_eq!(manager.listing_for(&kbd()).unwrap().active, "work");
    }

    #[test]
    fn test_replace_preserves_active_profile_by_name() {
        // Arrange
        let manager = ProfileManager::new();
        manager.register(device(&["work", "play"], None));
        manager.request_switch(&kbd(), "play").unwrap();

        // Act: "play" moves to a different index in the new set.
        let outcome = manager.replace(device(&["play", "work", "extra"], None));

        // Assert
        assert_eq!(outcome, Ok(Replaced::Preserved("play".into())));
        let rx = manager.subscribe(&kbd()).unwrap();
        assert_eq!(rx.borrow().active, ProfileId(0));
    }

    #[test]
    fn test_replace_falls_back_to_configured_default() {
        let manager = ProfileManager::new();
        manager.register(device(&["work", "play"], None));
        manager.request_switch(&kbd(), "play").unwrap();

        let outcome = manager.replace(device(&["work", "base"], Some("base")));

        assert_eq!(
            outcome,
            Ok(Replaced::FellBack {
                from: "play".into(),
                to: "base".into()
            })
        );
    }

    #[test]
    fn test_replace_without_default_is_incompatible_and_keeps_old_set() {
        // Arrange
        let manager = ProfileManager::new();
        manager.register(device(&["work", "play"], None));
        manager.request_switch(&kbd(), "play").unwrap();

        // Act
        let outcome = manager.replace(device(&["work"], None));

        // Assert
        assert_eq!(outcome, Err("play".to_string()));
        let listing = manager.listing_for(&kbd()).unwrap();
        assert_eq!(listing.active, "play");
        assert_eq!(listing.profiles, vec!["work", "play"]);
    }

    #[test]
    fn test_find_accepts_bare_name_and_display_form() {
        let manager = ProfileManager::new();
        manager.register(device(&["work"], None));

        assert_eq!(manager.find("kbd"), Some(kbd()));
        assert_eq!(manager.find("\"kbd\""), Some(kbd()));
        assert_eq!(manager.find("missing"), None);
    }
}
