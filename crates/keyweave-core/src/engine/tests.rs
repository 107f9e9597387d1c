use std::time::Duration;

use super::*;
use crate::config::{
    compile, CompiledConfig, Config, DeviceMatcher, DeviceSpec, MacroStep, PassthroughBinding,
    Profile,
};

fn key(name: &str) -> KeyCode {
    KeyCode::from_name(name).unwrap()
}

fn compiled(profiles: Vec<Profile>, switches: &[(&str, &str)]) -> CompiledConfig {
    let config = Config {
        devices: vec![DeviceSpec {
            matcher: DeviceMatcher::Name("kbd".into()),
            profiles,
            profile_switch: switches
                .iter()
                .map(|(c, p)| (c.to_string(), p.to_string()))
                .collect(),
            default_profile: None,
        }],
        ..Config::default()
    };
    compile(&config).unwrap()
}

fn single(profile: Profile) -> CompiledConfig {
    compiled(vec![profile], &[])
}

fn profile_of(config: &CompiledConfig, id: usize) -> &CompiledProfile {
    config.devices[0].profile(ProfileId(id)).unwrap()
}

/// Feeds `events` and returns only the emitted key events.
fn feed(engine: &mut RemapEngine, profile: &CompiledProfile, events: &[KeyEvent]) -> Vec<KeyEvent> {
    let mut effects = Vec::new();
    for event in events {
        engine.process(profile, *event, &mut effects);
    }
    effects
        .into_iter()
        .filter_map(|e| match e {
            Effect::Emit(ev) => Some(ev),
            _ => None,
        })
        .collect()
}

fn down(name: &str) -> KeyEvent {
    KeyEvent::down(key(name))
}
fn up(name: &str) -> KeyEvent {
    KeyEvent::up(key(name))
}
fn repeat(name: &str) -> KeyEvent {
    KeyEvent::repeat(key(name))
}

// ── Identity / passthrough / remap ───────────────────────────────────────────

#[test]
fn test_unbound_key_is_forwarded_unchanged() {
    let config = single(Profile::named("default"));
    let mut engine = RemapEngine::new();

    let out = feed(&mut engine, profile_of(&config, 0), &[down("A"), repeat("A"), up("A")]);

    assert_eq!(out, vec![down("A"), repeat("A"), up("A")]);
    assert!(engine.outstanding().is_empty());
}

#[test]
fn test_passthrough_key_preserves_every_action() {
    // Arrange
    let mut profile = Profile::named("default");
    profile.passthrough.push(PassthroughBinding {
        key: "Super+Return".into(),
        action: "spawn \"foot\";".into(),
    });
    let config = single(profile);
    let mut engine = RemapEngine::new();
    let input = [down("LeftMeta"), down("Enter"), repeat("Enter"), up("Enter"), up("LeftMeta")];

    // Act
    let out = feed(&mut engine, profile_of(&config, 0), &input);

    // Assert
    assert_eq!(out, input.to_vec());
}

#[test]
fn test_remap_translates_down_repeat_and_up() {
    // Arrange
    let mut profile = Profile::named("default");
    profile.remap.push(("CapsLock".into(), "Escape".into()));
    let config = single(profile);
    let mut engine = RemapEngine::new();

    // Act
    let out = feed(
        &mut engine,
        profile_of(&config, 0),
        &[down("CapsLock"), repeat("CapsLock"), up("CapsLock")],
    );

    // Assert
    assert_eq!(out, vec![down("Esc"), repeat("Esc"), up("Esc")]);
    assert!(engine.outstanding().is_empty());
}

#[test]
fn test_release_follows_route_after_profile_switch() {
    // Arrange: CapsLock is Escape in "default" and LeftCtrl in "alt".
    let mut first = Profile::named("default");
    first.remap.push(("CapsLock".into(), "Escape".into()));
    let mut second = Profile::named("alt");
    second.remap.push(("CapsLock".into(), "LeftCtrl".into()));
    let config = compiled(vec![first, second], &[]);
    let mut engine = RemapEngine::new();

    // Act: press under the first profile, release under the second.
    let mut out = feed(&mut engine, profile_of(&config, 0), &[down("CapsLock")]);
    out.extend(feed(&mut engine, profile_of(&config, 1), &[up("CapsLock")]));

    // Assert
    assert_eq!(out, vec![down("Esc"), up("Esc")]);
    assert!(engine.outstanding().is_empty());
}

#[test]
fn test_duplicate_down_is_treated_as_repeat() {
    let config = single(Profile::named("default"));
    let mut engine = RemapEngine::new();

    let out = feed(&mut engine, profile_of(&config, 0), &[down("B"), down("B"), up("B")]);

    assert_eq!(out, vec![down("B"), repeat("B"), up("B")]);
}

#[test]
fn test_up_without_down_is_dropped() {
    let config = single(Profile::named("default"));
    let mut engine = RemapEngine::new();

    let out = feed(&mut engine, profile_of(&config, 0), &[up("B"), repeat("C")]);

    assert!(out.is_empty());
}

#[test]
fn test_key_outside_output_set_is_never_pressed() {
    // Arrange
    let config = single(Profile::named("default"));
    let mut engine = RemapEngine::with_outputs(config.capabilities.clone());
    let profile = profile_of(&config, 0);
    let fn_key = KeyCode(464);

    // Act
    let pressed = feed(
        &mut engine,
        profile,
        &[down("A"), KeyEvent::down(fn_key), KeyEvent::repeat(fn_key)],
    );
    let mut released = Vec::new();
    engine.release_all(&mut released);

    // Assert
    assert_eq!(pressed, vec![down("A")]);
    assert_eq!(released, vec![up("A")]);
    assert!(feed(&mut engine, profile, &[KeyEvent::up(fn_key)]).is_empty());
}

// ── Combos ───────────────────────────────────────────────────────────────────

fn combo_config() -> CompiledConfig {
    let mut profile = Profile::named("default");
    profile.combo.push(("Ctrl+Shift+Q".into(), "Alt+F4".into()));
    single(profile)
}

#[test]
fn test_combo_fires_on_exact_modifier_match() {
    // Arrange
    let config = combo_config();
    let mut engine = RemapEngine::new();

    // Act
    let out = feed(
        &mut engine,
        profile_of(&config, 0),
        &[down("LeftCtrl"), down("LeftShift"), down("Q"), up("Q")],
    );

    // Assert: modifiers pass through, are lifted for Alt+F4, then restored.
    assert_eq!(
        out,
        vec![
            down("LeftCtrl"),
            down("LeftShift"),
            up("LeftCtrl"),
            up("LeftShift"),
            down("LeftAlt"),
            down("F4"),
            up("F4"),
            up("LeftAlt"),
            down("LeftCtrl"),
            down("LeftShift"),
        ]
    );
}

#[test]
fn test_combo_does_not_fire_without_modifiers() {
    let config = combo_config();
    let mut engine = RemapEngine::new();

    let out = feed(&mut engine, profile_of(&config, 0), &[down("Q"), up("Q")]);

    assert_eq!(out, vec![down("Q"), up("Q")]);
}

#[test]
fn test_combo_does_not_fire_on_modifier_superset() {
    let config = combo_config();
    let mut engine = RemapEngine::new();

    let out = feed(
        &mut engine,
        profile_of(&config, 0),
        &[down("LeftCtrl"), down("LeftShift"), down("LeftAlt"), down("Q")],
    );

    assert_eq!(out.last(), Some(&down("Q")));
    assert!(!engine.outstanding().contains(key("F4")));
}

#[test]
fn test_combo_matches_right_hand_modifiers() {
    let config = combo_config();
    let mut engine = RemapEngine::new();

    let out = feed(
        &mut engine,
        profile_of(&config, 0),
        &[down("RightCtrl"), down("RightShift"), down("Q")],
    );

    assert_eq!(out.last(), Some(&down("F4")));
}

#[test]
fn test_combo_repeat_repeats_destination_key() {
    let config = combo_config();
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    feed(&mut engine, profile, &[down("LeftCtrl"), down("LeftShift"), down("Q")]);

    let out = feed(&mut engine, profile, &[repeat("Q")]);

    assert_eq!(out, vec![repeat("F4")]);
}

#[test]
fn test_modifier_released_during_combo_is_not_restored() {
    // Arrange
    let config = combo_config();
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    feed(&mut engine, profile, &[down("LeftCtrl"), down("LeftShift"), down("Q")]);

    // Act: Ctrl is let go before Q.
    let out = feed(&mut engine, profile, &[up("LeftCtrl"), up("Q")]);

    // Assert: no stray Ctrl up (it was already lifted), only Shift comes back.
    assert_eq!(out, vec![up("F4"), up("LeftAlt"), down("LeftShift")]);
    assert!(engine.outstanding().contains(KeyCode::LEFT_SHIFT));
    assert!(!engine.outstanding().contains(KeyCode::LEFT_CTRL));
}

#[test]
fn test_remapped_modifier_counts_toward_combo() {
    // Arrange: CapsLock acts as Ctrl.
    let mut profile = Profile::named("default");
    profile.remap.push(("CapsLock".into(), "LeftCtrl".into()));
    profile.combo.push(("Ctrl+H".into(), "Backspace".into()));
    let config = single(profile);
    let mut engine = RemapEngine::new();

    // Act
    let out = feed(&mut engine, profile_of(&config, 0), &[down("CapsLock"), down("H"), up("H")]);

    // Assert
    assert_eq!(
        out,
        vec![
            down("LeftCtrl"),
            up("LeftCtrl"),
            down("Backspace"),
            up("Backspace"),
            down("LeftCtrl"),
        ]
    );
}

// ── Macros and switches ──────────────────────────────────────────────────────

fn macro_config() -> CompiledConfig {
    let mut profile = Profile::named("default");
    profile.macros.push((
        "Ctrl+Shift+D".into(),
        vec![
            MacroStep::Emit("Ctrl+C".into()),
            MacroStep::Wait(Duration::from_millis(50)),
            MacroStep::Emit("Ctrl+V".into()),
        ],
    ));
    single(profile)
}

#[test]
fn test_macro_trigger_requests_playback_and_swallows_key() {
    // Arrange
    let config = macro_config();
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    let mut effects = Vec::new();
    engine.process(profile, down("LeftCtrl"), &mut effects);
    engine.process(profile, down("LeftShift"), &mut effects);
    effects.clear();

    // Act
    engine.process(profile, down("D"), &mut effects);
    engine.process(profile, repeat("D"), &mut effects);
    engine.process(profile, down("D"), &mut effects);
    engine.process(profile, up("D"), &mut effects);

    // Assert: one playback request, nothing emitted for D itself.
    assert_eq!(effects, vec![Effect::RunMacro(MacroId(0))]);
    assert_eq!(
        profile.macro_steps(MacroId(0)).len(),
        3,
        "steps are resolved for playback"
    );
}

#[test]
fn test_macro_taps_are_exact_chords() {
    // Arrange: the user is holding Ctrl+Shift when the macro starts.
    let config = macro_config();
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    feed(&mut engine, profile, &[down("LeftCtrl"), down("LeftShift")]);
    let mut out = Vec::new();

    // Act
    engine.begin_macro(&mut out);
    engine.tap("Ctrl+C".parse().unwrap(), &mut out);
    engine.end_macro(&mut out);

    // Assert
    assert_eq!(
        out,
        vec![
            up("LeftCtrl"),
            up("LeftShift"),
            down("LeftCtrl"),
            down("C"),
            up("C"),
            up("LeftCtrl"),
            down("LeftCtrl"),
            down("LeftShift"),
        ]
    );
}

#[test]
fn test_switch_chord_requests_switch_without_output() {
    // Arrange
    let config = compiled(
        vec![Profile::named("default"), Profile::named("gaming")],
        &[("Ctrl+Alt+2", "gaming")],
    );
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    let mut effects = Vec::new();
    engine.process(profile, down("LeftCtrl"), &mut effects);
    engine.process(profile, down("LeftAlt"), &mut effects);
    effects.clear();

    // Act
    engine.process(profile, down("2"), &mut effects);
    engine.process(profile, up("2"), &mut effects);

    // Assert
    assert_eq!(effects, vec![Effect::SwitchProfile(ProfileId(1))]);
}

// ── Teardown ─────────────────────────────────────────────────────────────────

#[test]
fn test_release_all_lifts_every_outstanding_key() {
    // Arrange
    let config = combo_config();
    let mut engine = RemapEngine::new();
    let profile = profile_of(&config, 0);
    feed(
        &mut engine,
        profile,
        &[down("A"), down("LeftCtrl"), down("LeftShift"), down("Q")],
    );
    assert!(!engine.outstanding().is_empty());

    // Act
    let mut out = Vec::new();
    engine.release_all(&mut out);

    // Assert
    assert!(engine.outstanding().is_empty());
    assert!(engine.held().is_empty());
    assert!(out.iter().all(|e| e.action == KeyAction::Up));
    let released: KeySet = out.iter().map(|e| e.key).collect();
    assert!(released.contains(key("A")));
    assert!(released.contains(key("F4")));
    assert!(released.contains(KeyCode::LEFT_ALT));

    // Later ups from the physical device are dropped.
    assert!(feed(&mut engine, profile, &[up("A"), up("Q")]).is_empty());
}

#[test]
fn test_key_action_values_round_trip() {
    for action in [KeyAction::Up, KeyAction::Down, KeyAction::Repeat] {
        assert_eq!(KeyAction::from_value(action.value()), Some(action));
    }
    assert_eq!(KeyAction::from_value(7), None);
}
