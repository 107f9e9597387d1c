//! Criterion benchmarks for the remap engine hot path.
//!
//! Measures the per-event cost of each lookup path (identity, remap, combo)
//! and of compiling a realistic profile.
//!
//! Run with:
//! ```bash
//! cargo bench --package keyweave-core --bench engine_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyweave_core::config::{compile, Config, DeviceMatcher, DeviceSpec, ProfileId};
use keyweave_core::config::{MacroStep, Profile};
use keyweave_core::{KeyCode, KeyEvent, RemapEngine};

// ── Fixture ──────────────────────────────────────────────────────────────────

fn bench_config() -> Config {
    let mut profile = Profile::named("default");
    profile.remap.push(("CapsLock".into(), "Escape".into()));
    profile.remap.push(("RightAlt".into(), "RightCtrl".into()));
    profile.combo.push(("Ctrl+Shift+Q".into(), "Alt+F4".into()));
    profile.combo.push(("Ctrl+H".into(), "Backspace".into()));
    profile.macros.push((
        "Ctrl+Shift+D".into(),
        vec![MacroStep::Emit("Ctrl+C".into()), MacroStep::Emit("Ctrl+V".into())],
    ));
    Config {
        devices: vec![DeviceSpec {
            matcher: DeviceMatcher::Name("bench".into()),
            profiles: vec![profile, Profile::named("gaming")],
            profile_switch: vec![("Ctrl+Alt+2".into(), "gaming".into())],
            default_profile: None,
        }],
        ..Config::default()
    }
}

fn key(name: &str) -> KeyCode {
    KeyCode::from_name(name).unwrap_or(KeyCode(0))
}

// ── Benchmarks ───────────────────────────────────────────────────────────────

fn bench_process(c: &mut Criterion) {
    let compiled = compile(&bench_config()).expect("bench config is valid");
    let device = &compiled.devices[0];
    let profile = device.profile(ProfileId(0)).expect("profile 0 exists");
    let mut group = c.benchmark_group("engine_process");

    // Identity: the common case of an unbound letter key.
    group.bench_function("identity_down_up", |b| {
        let mut engine = RemapEngine::new();
        let mut out = Vec::with_capacity(8);
        let a = key("A");
        b.iter(|| {
            out.clear();
            engine.process(profile, black_box(KeyEvent::down(a)), &mut out);
            engine.process(profile, black_box(KeyEvent::up(a)), &mut out);
        })
    });

    group.bench_function("remap_down_up", |b| {
        let mut engine = RemapEngine::new();
        let mut out = Vec::with_capacity(8);
        let caps = KeyCode::CAPS_LOCK;
        b.iter(|| {
            out.clear();
            engine.process(profile, black_box(KeyEvent::down(caps)), &mut out);
            engine.process(profile, black_box(KeyEvent::up(caps)), &mut out);
        })
    });

    // Combo: modifiers held, trigger pressed and released.
    group.bench_function("combo_trigger", |b| {
        let mut engine = RemapEngine::new();
        let mut out = Vec::with_capacity(16);
        engine.process(profile, KeyEvent::down(KeyCode::LEFT_CTRL), &mut out);
        engine.process(profile, KeyEvent::down(KeyCode::LEFT_SHIFT), &mut out);
        let q = key("Q");
        b.iter(|| {
            out.clear();
            engine.process(profile, black_box(KeyEvent::down(q)), &mut out);
            engine.process(profile, black_box(KeyEvent::up(q)), &mut out);
        })
    });

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let config = bench_config();
    c.bench_function("config_compile", |b| b.iter(|| compile(black_box(&config))));
}

criterion_group!(benches, bench_process, bench_compile);
criterion_main!(benches);
