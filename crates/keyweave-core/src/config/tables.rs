//! Validation and compilation of a [`Config`] into engine tables.
//!
//! Compilation resolves every key name, profile name and macro once, so the
//! remap engine never looks up strings on the event path.  Each profile
//! becomes a table with one [`KeyBinding`] slot per key code.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::keybinds::{collect_keybinds, KeybindEntry};
use crate::keymap::chord::parse_single_key;
use crate::keymap::{Chord, KeyCode, KeySet, ModifierSet, KEY_CAPACITY, STANDARD_KEYBOARD_MAX};

use super::error::ConfigError;
use super::model::{
    Config, DeviceMatcher, DeviceSpec, GlobalSettings, MacroStep, PassthroughBinding, Profile,
};

/// Index of a profile within its [`CompiledDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileId(pub usize);

/// Index of a macro within its [`CompiledProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroId(pub usize);

/// What a key does in a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyBinding {
    /// Not bound: forwarded unchanged.
    Identity,
    /// Forwarded unchanged; no other table is consulted.
    Passthrough,
    /// Translated 1:1 to another key.
    Remap(KeyCode),
    /// Trigger key of one or more combos, macros or profile switches, each
    /// selected by the exact set of held modifiers.
    Chorded(Vec<ChordEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordEntry {
    pub modifiers: ModifierSet,
    pub action: ChordAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChordAction {
    Combo(Chord),
    Macro(MacroId),
    SwitchProfile(ProfileId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompiledStep {
    Tap(Chord),
    Wait(Duration),
}

static IDENTITY: KeyBinding = KeyBinding::Identity;

#[derive(Debug, Clone)]
pub struct CompiledProfile {
    name: String,
    bindings: Vec<KeyBinding>,
    macros: Vec<Vec<CompiledStep>>,
    passthrough: Vec<(Chord, PassthroughBinding)>,
}

impl CompiledProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn binding(&self, key: KeyCode) -> &KeyBinding {
        self.bindings.get(key.index()).unwrap_or(&IDENTITY)
    }

    pub fn macro_steps(&self, id: MacroId) -> &[CompiledStep] {
        self.macros.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Passthrough bindings in declaration order, with their parsed chords.
    pub fn passthrough(&self) -> &[(Chord, PassthroughBinding)] {
        &self.passthrough
    }
}

/// A device spec with all profiles compiled.
#[derive(Debug, Clone)]
pub struct CompiledDevice {
    matcher: DeviceMatcher,
    profiles: Vec<CompiledProfile>,
    initial_profile: ProfileId,
    fallback_profile: Option<ProfileId>,
}

impl CompiledDevice {
    pub fn matcher(&self) -> &DeviceMatcher {
        &self.matcher
    }

    pub fn profile(&self, id: ProfileId) -> Option<&CompiledProfile> {
        self.profiles.get(id.0)
    }

    pub fn profile_id(&self, name: &str) -> Option<ProfileId> {
        self.profiles.iter().position(|p| p.name == name).map(ProfileId)
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn profiles(&self) -> &[CompiledProfile] {
        &self.profiles
    }

    /// Profile activated when the daemon starts.
    pub fn initial_profile(&self) -> ProfileId {
        self.initial_profile
    }

    /// The explicitly configured default profile, used when a reload removes
    /// the active one.
    pub fn fallback_profile(&self) -> Option<ProfileId> {
        self.fallback_profile
    }
}

/// The validated, compiled configuration.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub global: GlobalSettings,
    pub devices: Vec<Arc<CompiledDevice>>,
    /// Keys the virtual output device must advertise.
    pub capabilities: KeySet,
    /// Passthrough bindings for the compositor keybind fragment, deduplicated.
    pub keybinds: Vec<KeybindEntry>,
}

impl CompiledConfig {
    pub fn device(&self, matcher: &DeviceMatcher) -> Option<&Arc<CompiledDevice>> {
        self.devices.iter().find(|d| d.matcher() == matcher)
    }
}

/// Validates `config` and compiles it.
///
/// # Errors
///
/// Returns the first failing invariant as a [`ConfigError`].
pub fn compile(config: &Config) -> Result<CompiledConfig, ConfigError> {
    let mut seen = HashSet::new();
    let mut capabilities: KeySet = (1..=STANDARD_KEYBOARD_MAX).map(KeyCode).collect();
    let mut devices = Vec::with_capacity(config.devices.len());

    for spec in &config.devices {
        if !seen.insert(&spec.matcher) {
            return Err(ConfigError::DuplicateDevice {
                device: spec.matcher.to_string(),
            });
        }
        devices.push(Arc::new(compile_device(spec, &mut capabilities)?));
    }

    let keybinds = collect_keybinds(&devices)?;

    Ok(CompiledConfig {
        global: config.global.clone(),
        devices,
        capabilities,
        keybinds,
    })
}

fn compile_device(spec: &DeviceSpec, caps: &mut KeySet) -> Result<CompiledDevice, ConfigError> {
    let device = spec.matcher.to_string();
    if spec.profiles.is_empty() {
        return Err(ConfigError::NoProfiles { device });
    }

    let mut names = HashSet::new();
    for profile in &spec.profiles {
        if !names.insert(profile.name.as_str()) {
            return Err(ConfigError::DuplicateProfile {
                device,
                profile: profile.name.clone(),
            });
        }
    }
    let find = |name: &str| spec.profiles.iter().position(|p| p.name == name).map(ProfileId);

    let fallback_profile = match &spec.default_profile {
        Some(name) => Some(find(name).ok_or_else(|| ConfigError::UnknownDefaultProfile {
            device: device.clone(),
            profile: name.clone(),
        })?),
        None => None,
    };

    let mut switches = Vec::with_capacity(spec.profile_switch.len());
    for (chord_text, target) in &spec.profile_switch {
        let id = find(target).ok_or_else(|| ConfigError::UnknownSwitchTarget {
            device: device.clone(),
            chord: chord_text.clone(),
            profile: target.clone(),
        })?;
        switches.push((chord_text.as_str(), id));
    }

    let profiles = spec
        .profiles
        .iter()
        .map(|profile| {
            let mut builder = ProfileBuilder::new(&device, profile);
            builder.compile(&switches, caps)?;
            Ok(builder.finish())
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(CompiledDevice {
        matcher: spec.matcher.clone(),
        profiles,
        initial_profile: fallback_profile.unwrap_or(ProfileId(0)),
        fallback_profile,
    })
}

// ── Per-profile compilation ──────────────────────────────────────────────────

const REMAP: &str = "remap";
const COMBO: &str = "combo";
const MACRO: &str = "macro";
const PASSTHROUGH: &str = "passthrough";
const SWITCH: &str = "profile_switch";

struct ProfileBuilder<'a> {
    device: &'a str,
    profile: &'a Profile,
    bindings: Vec<KeyBinding>,
    owners: Vec<Option<&'static str>>,
    macros: Vec<Vec<CompiledStep>>,
    passthrough: Vec<(Chord, PassthroughBinding)>,
}

impl<'a> ProfileBuilder<'a> {
    fn new(device: &'a str, profile: &'a Profile) -> Self {
        Self {
            device,
            profile,
            bindings: vec![KeyBinding::Identity; KEY_CAPACITY],
            owners: vec![None; KEY_CAPACITY],
            macros: Vec::new(),
            passthrough: Vec::new(),
        }
    }

    fn compile(
        &mut self,
        switches: &[(&str, ProfileId)],
        caps: &mut KeySet,
    ) -> Result<(), ConfigError> {
        let profile = self.profile;

        for binding in &profile.passthrough {
            let chord = self.chord(PASSTHROUGH, &binding.key)?;
            self.claim(chord.key, PASSTHROUGH)?;
            self.bindings[chord.key.index()] = KeyBinding::Passthrough;
            caps.insert(chord.key);
            self.passthrough.push((chord, binding.clone()));
        }

        for (source, target) in &profile.remap {
            let from = self.single_key(source)?;
            let to = self.single_key(target)?;
            self.claim(from, REMAP)?;
            self.bindings[from.index()] = KeyBinding::Remap(to);
            caps.insert(to);
        }

        for (trigger, target) in &profile.combo {
            let trigger_chord = self.chord(COMBO, trigger)?;
            let output = self.chord(COMBO, target)?;
            add_chord_keys(caps, &output);
            self.add_chorded(trigger_chord, ChordAction::Combo(output), COMBO, trigger)?;
        }

        for (trigger, steps) in &profile.macros {
            if steps.is_empty() {
                return Err(ConfigError::EmptyMacro {
                    device: self.device.to_string(),
                    profile: profile.name.clone(),
                    trigger: trigger.clone(),
                });
            }
            let trigger_chord = self.chord(MACRO, trigger)?;
            let compiled = steps
                .iter()
                .map(|step| match step {
                    MacroStep::Emit(text) => self.chord(MACRO, text).map(CompiledStep::Tap),
                    MacroStep::Wait(duration) => Ok(CompiledStep::Wait(*duration)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            for step in &compiled {
                if let CompiledStep::Tap(chord) = step {
                    add_chord_keys(caps, chord);
                }
            }
            let id = MacroId(self.macros.len());
            self.macros.push(compiled);
            self.add_chorded(trigger_chord, ChordAction::Macro(id), MACRO, trigger)?;
        }

        for &(text, target) in switches {
            let chord = self.chord(SWITCH, text)?;
            self.add_chorded(chord, ChordAction::SwitchProfile(target), SWITCH, text)?;
        }

        Ok(())
    }

    fn finish(self) -> CompiledProfile {
        CompiledProfile {
            name: self.profile.name.clone(),
            bindings: self.bindings,
            macros: self.macros,
            passthrough: self.passthrough,
        }
    }

    fn add_chorded(
        &mut self,
        trigger: Chord,
        action: ChordAction,
        table: &'static str,
        text: &str,
    ) -> Result<(), ConfigError> {
        self.claim(trigger.key, table)?;
        let slot = &mut self.bindings[trigger.key.index()];
        if !matches!(slot, KeyBinding::Chorded(_)) {
            *slot = KeyBinding::Chorded(Vec::new());
        }
        if let KeyBinding::Chorded(entries) = slot {
            if let Some(existing) = entries.iter().find(|e| e.modifiers == trigger.modifiers) {
                return Err(ConfigError::ConflictingBinding {
                    device: self.device.to_string(),
                    profile: self.profile.name.clone(),
                    key: text.to_string(),
                    first: action_table(&existing.action),
                    second: table,
                });
            }
            entries.push(ChordEntry {
                modifiers: trigger.modifiers,
                action,
            });
        }
        Ok(())
    }

    /// Records that `table` binds `key`, rejecting cross-table overlap.
    ///
    /// Entries of one chord table may share a trigger key under different
    /// modifier sets.  A profile switch never shares its key with another
    /// table.
    fn claim(&mut self, key: KeyCode, table: &'static str) -> Result<(), ConfigError> {
        let owner = &mut self.owners[key.index()];
        match *owner {
            None => {
                *owner = Some(table);
                Ok(())
            }
            Some(existing) if existing == table => Ok(()),
            Some(existing) => Err(ConfigError::ConflictingBinding {
                device: self.device.to_string(),
                profile: self.profile.name.clone(),
                key: key.to_string(),
                first: existing,
                second: table,
            }),
        }
    }

    fn chord(&self, table: &'static str, text: &str) -> Result<Chord, ConfigError> {
        text.parse::<Chord>().map_err(|source| self.invalid(table, text, source))
    }

    fn single_key(&self, text: &str) -> Result<KeyCode, ConfigError> {
        parse_single_key(text).map_err(|source| self.invalid(REMAP, text, source))
    }

    fn invalid(
        &self,
        table: &'static str,
        text: &str,
        source: crate::keymap::ChordError,
    ) -> ConfigError {
        ConfigError::InvalidKey {
            device: self.device.to_string(),
            profile: self.profile.name.clone(),
            table,
            entry: text.to_string(),
            source,
        }
    }
}

fn action_table(action: &ChordAction) -> &'static str {
    match action {
        ChordAction::Combo(_) => COMBO,
        ChordAction::Macro(_) => MACRO,
        ChordAction::SwitchProfile(_) => SWITCH,
    }
}

fn add_chord_keys(caps: &mut KeySet, chord: &Chord) {
    caps.insert(chord.key);
    caps.extend(chord.modifiers.iter().map(|m| m.left_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::PassthroughBinding;
    use crate::keymap::Modifier;

    fn device(profiles: Vec<Profile>) -> DeviceSpec {
        DeviceSpec {
            matcher: DeviceMatcher::Name("Test Keyboard".into()),
            profiles,
            profile_switch: Vec::new(),
            default_profile: None,
        }
    }

    fn config(devices: Vec<DeviceSpec>) -> Config {
        Config {
            global: GlobalSettings::default(),
            devices,
        }
    }

    fn key(name: &str) -> KeyCode {
        KeyCode::from_name(name).unwrap()
    }

    #[test]
    fn test_compile_resolves_remap_and_combo_tables() {
        // Arrange
        let mut profile = Profile::named("default");
        profile.remap.push(("CapsLock".into(), "Escape".into()));
        profile.combo.push(("Ctrl+Shift+Q".into(), "Alt+F4".into()));
        let cfg = config(vec![device(vec![profile])]);

        // Act
        let compiled = compile(&cfg).unwrap();

        // Assert
        let profile = compiled.devices[0].profile(ProfileId(0)).unwrap();
        assert_eq!(profile.binding(KeyCode::CAPS_LOCK), &KeyBinding::Remap(KeyCode::ESC));
        let KeyBinding::Chorded(entries) = profile.binding(key("Q")) else {
            panic!("Q should be a combo trigger");
        };
        assert_eq!(entries.len(), 1);
        assert!(entries[0].modifiers.contains(Modifier::Ctrl));
        assert!(matches!(entries[0].action, ChordAction::Combo(c) if c.key == key("F4")));
        assert_eq!(profile.binding(key("W")), &KeyBinding::Identity);
    }

    #[test]
    fn test_remap_duplicate_source_last_write_wins() {
        let mut profile = Profile::named("default");
        profile.remap.push(("CapsLock".into(), "Escape".into()));
        profile.remap.push(("Caps".into(), "LeftCtrl".into()));

        let compiled = compile(&config(vec![device(vec![profile])])).unwrap();

        let profile = compiled.devices[0].profile(ProfileId(0)).unwrap();
        assert_eq!(profile.binding(KeyCode::CAPS_LOCK), &KeyBinding::Remap(KeyCode::LEFT_CTRL));
    }

    #[test]
    fn test_device_without_profiles_is_rejected() {
        let err = compile(&config(vec![device(vec![])])).unwrap_err();
        assert!(matches!(err, ConfigError::NoProfiles { .. }));
        assert!(err.to_string().contains("Test Keyboard"));
    }

    #[test]
    fn test_duplicate_profile_names_are_rejected() {
        let err = compile(&config(vec![device(vec![
            Profile::named("default"),
            Profile::named("default"),
        ])]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProfile { .. }));
    }

    #[test]
    fn test_duplicate_device_matchers_are_rejected() {
        let err = compile(&config(vec![
            device(vec![Profile::named("a")]),
            device(vec![Profile::named("b")]),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDevice { .. }));
    }

    #[test]
    fn test_unknown_switch_target_is_rejected() {
        let mut spec = device(vec![Profile::named("default")]);
        spec.profile_switch.push(("Ctrl+Alt+2".into(), "gaming".into()));

        let err = compile(&config(vec![spec])).unwrap_err();

        assert_eq!(
            err,
            ConfigError::UnknownSwitchTarget {
                device: "\"Test Keyboard\"".into(),
                chord: "Ctrl+Alt+2".into(),
                profile: "gaming".into(),
            }
        );
    }

    #[test]
    fn test_explicit_default_profile_is_initial_and_fallback() {
        let mut spec = device(vec![Profile::named("work"), Profile::named("play")]);
        spec.default_profile = Some("play".into());
        let compiled = compile(&config(vec![spec])).unwrap();
        assert_eq!(compiled.devices[0].initial_profile(), ProfileId(1));
        assert_eq!(compiled.devices[0].fallback_profile(), Some(ProfileId(1)));
    }

    #[test]
    fn test_unknown_default_profile_is_rejected() {
        let mut spec = device(vec![Profile::named("default")]);
        spec.default_profile = Some("missing".into());
        let err = compile(&config(vec![spec])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDefaultProfile { .. }));
    }

    #[test]
    fn test_key_in_remap_and_macro_is_a_conflict() {
        // Arrange
        let mut profile = Profile::named("default");
        profile.remap.push(("D".into(), "F".into()));
        profile
            .macros
            .push(("Ctrl+D".into(), vec![MacroStep::Emit("X".into())]));

        // Act
        let err = compile(&config(vec![device(vec![profile])])).unwrap_err();

        // Assert
        assert_eq!(
            err,
            ConfigError::ConflictingBinding {
                device: "\"Test Keyboard\"".into(),
                profile: "default".into(),
                key: "D".into(),
                first: "remap",
                second: "macro",
            }
        );
    }

    #[test]
    fn test_passthrough_key_cannot_also_be_remapped() {
        let mut profile = Profile::named("default");
        profile.passthrough.push(PassthroughBinding {
            key: "Super+Return".into(),
            action: "spawn \"alacritty\";".into(),
        });
        profile.remap.push(("Enter".into(), "Space".into()));

        let err = compile(&config(vec![device(vec![profile])])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ConflictingBinding { first: "passthrough", second: "remap", .. }
        ));
    }

    #[test]
    fn test_combos_may_share_trigger_with_different_modifiers() {
        let mut profile = Profile::named("default");
        profile.combo.push(("Ctrl+Q".into(), "Alt+F4".into()));
        profile.combo.push(("Ctrl+Shift+Q".into(), "Escape".into()));

        let compiled = compile(&config(vec![device(vec![profile])])).unwrap();

        let profile = compiled.devices[0].profile(ProfileId(0)).unwrap();
        let KeyBinding::Chorded(entries) = profile.binding(key("Q")) else {
            panic!("Q should be chorded");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_identical_combo_chords_are_a_conflict() {
        let mut profile = Profile::named("default");
        profile.combo.push(("Ctrl+Q".into(), "Alt+F4".into()));
        profile.combo.push(("Control+Q".into(), "Escape".into()));

        let err = compile(&config(vec![device(vec![profile])])).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingBinding { .. }));
    }

    #[test]
    fn test_switch_chord_on_combo_trigger_is_a_conflict() {
        // Arrange
        let mut profile = Profile::named("default");
        profile.combo.push(("Ctrl+2".into(), "Escape".into()));
        let mut spec = device(vec![profile, Profile::named("gaming")]);
        spec.profile_switch.push(("Ctrl+Alt+2".into(), "gaming".into()));

        // Act
        let err = compile(&config(vec![spec])).unwrap_err();

        // Assert
        assert_eq!(
            err,
            ConfigError::ConflictingBinding {
                device: "\"Test Keyboard\"".into(),
                profile: "default".into(),
                key: "2".into(),
                first: "combo",
                second: "profile_switch",
            }
        );
    }

    #[test]
    fn test_switch_table_is_compiled_into_every_profile() {
        // Arrange
        let mut spec = device(vec![Profile::named("default"), Profile::named("gaming")]);
        spec.profile_switch.push(("Ctrl+Alt+1".into(), "default".into()));
        spec.profile_switch.push(("Ctrl+Alt+2".into(), "gaming".into()));

        // Act
        let compiled = compile(&config(vec![spec])).unwrap();

        // Assert
        let device = &compiled.devices[0];
        for id in [ProfileId(0), ProfileId(1)] {
            let KeyBinding::Chorded(entries) = device.profile(id).unwrap().binding(key("2")) else {
                panic!("2 should be chorded in every profile");
            };
            assert_eq!(entries[0].action, ChordAction::SwitchProfile(ProfileId(1)));
        }
    }

    #[test]
    fn test_invalid_key_reports_table_and_profile() {
        let mut profile = Profile::named("work");
        profile.combo.push(("Ctrl+Bogus".into(), "Escape".into()));

        let err = compile(&config(vec![device(vec![profile])])).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("\"work\""), "{message}");
        assert!(message.contains("combo"), "{message}");
        assert!(message.contains("Bogus"), "{message}");
    }

    #[test]
    fn test_empty_macro_is_rejected() {
        let mut profile = Profile::named("default");
        profile.macros.push(("F13".into(), Vec::new()));
        let err = compile(&config(vec![device(vec![profile])])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyMacro { .. }));
    }

    #[test]
    fn test_capabilities_cover_destinations_and_standard_keys() {
        // Arrange
        let mut profile = Profile::named("default");
        profile.remap.push(("F1".into(), "BtnSide".into()));
        profile.macros.push((
            "F2".into(),
            vec![MacroStep::Emit("Super+F24".into()), MacroStep::Wait(Duration::from_millis(5))],
        ));

        // Act
        let compiled = compile(&config(vec![device(vec![profile])])).unwrap();

        // Assert
        let caps = &compiled.capabilities;
        assert!(caps.contains(key("BtnSide")));
        assert!(caps.contains(key("F24")));
        assert!(caps.contains(KeyCode::LEFT_META));
        assert!(caps.contains(KeyCode::ESC));
        assert!(caps.contains(KeyCode(STANDARD_KEYBOARD_MAX)));
    }

    #[test]
    fn test_default_profile_defaults_to_first_declared() {
        let compiled = compile(&config(vec![device(vec![
            Profile::named("work"),
            Profile::named("play"),
        ])]))
        .unwrap();
        let device = &compiled.devices[0];
        assert_eq!(device.initial_profile(), ProfileId(0));
        assert_eq!(device.fallback_profile(), None);
        assert_eq!(device.profile_id("play"), Some(ProfileId(1)));
        assert_eq!(device.profile_names().collect::<Vec<_>>(), vec!["work", "play"]);
    }
}
