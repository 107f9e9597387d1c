//! Compositor keybind fragment generation.
//!
//! Every passthrough binding of every profile becomes one line in a KDL
//! `binds { }` block that the compositor includes from its own config:
//!
//! ```text
//! // Auto-generated by keyweave
//! // Source: /home/me/.config/keyweave/config.toml
//! // DO NOT EDIT - changes will be overwritten
//!
//! binds {
//!     Mod+Return { spawn "alacritty"; }
//! }
//! ```
//!
//! The fragment is always regenerated in full.  Writing it to disk is left to
//! the caller so this module stays free of I/O.

use std::path::Path;
use std::sync::Arc;

use crate::config::{CompiledDevice, ConfigError};
use crate::keymap::Chord;

/// One line of the generated fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeybindEntry {
    /// Chord in compositor syntax (`Mod+Shift+Q`).
    pub chord: String,
    pub action: String,
}

/// Rewrites the platform modifier aliases to the compositor's `Mod` token.
///
/// Only modifier positions are rewritten; the final key is kept as written.
pub fn compositor_chord(text: &str) -> String {
    let parts: Vec<&str> = text.split('+').map(str::trim).collect();
    let last = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let is_super = matches!(
                part.to_ascii_lowercase().as_str(),
                "super" | "meta" | "win" | "mod"
            );
            if i < last && is_super {
                "Mod"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Collects passthrough bindings across the given devices and profiles.
///
/// [`crate::config::compile`] runs this over every configured device; a
/// reload that keeps a device's previous profiles runs it again over the
/// sets actually in use.  The same chord bound to the same action in several
/// places is emitted once.
///
/// # Errors
///
/// [`ConfigError::DuplicateKeybind`] if one chord is bound to different
/// actions, naming both locations.
pub fn collect_keybinds(devices: &[Arc<CompiledDevice>]) -> Result<Vec<KeybindEntry>, ConfigError> {
    let mut seen: Vec<(Chord, String, String)> = Vec::new();
    let mut entries = Vec::new();

    for device in devices {
        for profile in device.profiles() {
            for (chord, binding) in profile.passthrough() {
                let chord = *chord;
                let location = format!("device {}, profile {:?}", device.matcher(), profile.name());
                let action = binding.action.trim().to_string();

                match seen.iter().find(|(c, _, _)| *c == chord) {
                    Some((_, existing, _)) if *existing == action => continue,
                    Some((_, _, first)) => {
                        return Err(ConfigError::DuplicateKeybind {
                            chord: chord.to_string(),
                            first: first.clone(),
                            second: location,
                        });
                    }
                    None => {}
                }

                entries.push(KeybindEntry {
                    chord: compositor_chord(&binding.key),
                    action: action.clone(),
                });
                seen.push((chord, action, location));
            }
        }
    }

    Ok(entries)
}

/// Renders the complete fragment.
pub fn render_keybinds(entries: &[KeybindEntry], source: &Path) -> String {
    let mut out = String::new();
    out.push_str("// Auto-generated by keyweave\n");
    out.push_str(&format!("// Source: {}\n", source.display()));
    out.push_str("// DO NOT EDIT - changes will be overwritten\n\n");
    out.push_str("binds {\n");
    for entry in entries {
        out.push_str(&format!("    {} {{ {} }}\n", entry.chord, entry.action));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Config, DeviceMatcher, DeviceSpec, PassthroughBinding, Profile};
    use crate::config::compile;

    fn profile(name: &str, binds: &[(&str, &str)]) -> Profile {
        let mut profile = Profile::named(name);
        for (key, action) in binds {
            profile.passthrough.push(PassthroughBinding {
                key: key.to_string(),
                action: action.to_string(),
            });
        }
        profile
    }

    fn config(devices: Vec<(&str, Vec<Profile>)>) -> Config {
        Config {
            devices: devices
                .into_iter()
                .map(|(name, profiles)| DeviceSpec {
                    matcher: DeviceMatcher::Name(name.into()),
                    profiles,
                    profile_switch: Vec::new(),
                    default_profile: None,
                })
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_compositor_chord_rewrites_super_modifier_only() {
        assert_eq!(compositor_chord("Super+Return"), "Mod+Return");
        assert_eq!(compositor_chord("Ctrl+Shift+Super+T"), "Ctrl+Shift+Mod+T");
        assert_eq!(compositor_chord("Alt+Tab"), "Alt+Tab");
        assert_eq!(compositor_chord("Super"), "Super");
    }

    #[test]
    fn test_render_has_header_and_binds_block() {
        // Arrange
        let entries = vec![KeybindEntry {
            chord: "Mod+Return".into(),
            action: "spawn \"alacritty\";".into(),
        }];

        // Act
        let text = render_keybinds(&entries, Path::new("/etc/keyweave.toml"));

        // Assert
        assert!(text.starts_with("// Auto-generated by keyweave\n"));
        assert!(text.contains("// Source: /etc/keyweave.toml\n"));
        assert!(text.contains("// DO NOT EDIT"));
        assert!(text.contains("binds {\n    Mod+Return { spawn \"alacritty\"; }\n}\n"));
    }

    #[test]
    fn test_identical_bindings_across_profiles_are_emitted_once() {
        let cfg = config(vec![(
            "kbd",
            vec![
                profile("default", &[("Super+Return", "spawn \"foot\";")]),
                profile("gaming", &[("Mod+Enter", "spawn \"foot\";")]),
            ],
        )]);

        let entries = compile(&cfg).unwrap().keybinds;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chord, "Mod+Return");
    }

    #[test]
    fn test_conflicting_bindings_across_devices_name_both_locations() {
        // Arrange
        let cfg = config(vec![
            ("kbd-a", vec![profile("default", &[("Super+Q", "close-window;")])]),
            ("kbd-b", vec![profile("work", &[("Super+Q", "quit;")])]),
        ]);

        // Act
        let err = compile(&cfg).unwrap_err();

        // Assert
        let message = err.to_string();
        assert!(message.contains("kbd-a"), "{message}");
        assert!(message.contains("kbd-b"), "{message}");
        assert!(message.contains("\"work\""), "{message}");
    }

    #[test]
    fn test_collect_over_devices_from_separate_configs() {
        // Arrange: each config is valid alone.
        let a = config(vec![("kbd-a", vec![profile("default", &[("Super+Q", "close-window;")])])]);
        let b = config(vec![("kbd-b", vec![profile("default", &[("Super+T", "spawn \"foot\";")])])]);
        let (a, b) = (compile(&a).unwrap(), compile(&b).unwrap());
        let devices = vec![Arc::clone(&a.devices[0]), Arc::clone(&b.devices[0])];

        // Act
        let entries = collect_keybinds(&devices).unwrap();

        // Assert
        let chords: Vec<&str> = entries.iter().map(|e| e.chord.as_str()).collect();
        assert_eq!(chords, vec!["Mod+Q", "Mod+T"]);
    }

    #[test]
    fn test_empty_config_renders_empty_block() {
        let entries = collect_keybinds(&[]).unwrap();
        let text = render_keybinds(&entries, Path::new("config.toml"));
        assert!(text.ends_with("binds {\n}\n"));
    }
}
