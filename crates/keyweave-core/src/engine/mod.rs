//! The remap engine: a per-device state machine from raw key events to output.
//!
//! One [`RemapEngine`] exists per grabbed physical device.  For every incoming
//! `(key, action)` it consults the active [`CompiledProfile`] in this order:
//!
//! 1. **passthrough**: forward unchanged
//! 2. **macro**: hand the macro to the caller for timed playback, swallow the key
//! 3. **combo** (and profile-switch chords): exact modifier-set match
//! 4. **remap**: translate the code 1:1
//! 5. **identity**: forward unchanged
//!
//! Macro and combo triggers share one chord table per key (they can never
//! bind the same key, see [`crate::config::compile`]), so steps 2 and 3 are a
//! single lookup here.
//!
//! # Routes
//!
//! When a key goes down the engine records its *route*: the output key it was
//! sent as, the combo it started, or "swallowed".  Repeats and the release
//! follow that route rather than re-reading the profile.  A profile switch or
//! reload while a key is held therefore can never strand a destination key in
//! the down state.
//!
//! # Stuck-key accounting
//!
//! `down` is the set of output keys the virtual device currently believes are
//! pressed.  Every emitted `Down` inserts, every emitted `Up` removes, and an
//! `Up` for a key not in the set is never emitted.  [`RemapEngine::release_all`]
//! drains it on teardown.
//!
//! An engine built with [`RemapEngine::with_outputs`] never presses a key
//! outside that set.  A physical key that would be forwarded as such a key is
//! swallowed until it is released.

use crate::config::{ChordAction, CompiledProfile, KeyBinding, MacroId, ProfileId};
use crate::keymap::{Chord, KeyCode, KeySet, Modifier, ModifierSet, KEY_CAPACITY};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Press state carried by a key event (`EV_KEY` value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Up,
    Down,
    Repeat,
}

impl KeyAction {
    /// Converts an `EV_KEY` value (0, 1, 2).
    pub fn from_value(value: i32) -> Option<KeyAction> {
        match value {
            0 => Some(KeyAction::Up),
            1 => Some(KeyAction::Down),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            KeyAction::Up => 0,
            KeyAction::Down => 1,
            KeyAction::Repeat => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn down(key: KeyCode) -> Self {
        Self {
            key,
            action: KeyAction::Down,
        }
    }

    pub fn up(key: KeyCode) -> Self {
        Self {
            key,
            action: KeyAction::Up,
        }
    }

    pub fn repeat(key: KeyCode) -> Self {
        Self {
            key,
            action: KeyAction::Repeat,
        }
    }
}

/// What the caller must do after an event was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Write this event to the virtual device.
    Emit(KeyEvent),
    /// Play this macro of the active profile, then call
    /// [`RemapEngine::end_macro`].
    RunMacro(MacroId),
    /// Ask the profile manager to activate this profile.
    SwitchProfile(ProfileId),
}

#[derive(Debug, Clone, Default)]
enum Route {
    #[default]
    Unrouted,
    Direct(KeyCode),
    Combo(Box<ActiveCombo>),
    Swallowed,
}

#[derive(Debug, Clone)]
struct ActiveCombo {
    output: KeyCode,
    /// Modifiers pressed on the output only for this combo.
    added: Vec<KeyCode>,
    /// Held output modifiers lifted because the destination chord lacks them.
    lifted: Vec<KeyCode>,
}

/// Remap working state for one physical device.
#[derive(Debug, Clone)]
pub struct RemapEngine {
    outputs: KeySet,
    held: KeySet,
    down: KeySet,
    routes: Vec<Route>,
    suspended: Vec<KeyCode>,
}

impl Default for RemapEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RemapEngine {
    /// An engine that may press any key code.
    pub fn new() -> Self {
        Self::with_outputs(KeySet::all())
    }

    /// An engine that only presses keys in `outputs`, normally the
    /// capabilities of the virtual device it writes to.
    pub fn with_outputs(outputs: KeySet) -> Self {
        Self {
            outputs,
            held: KeySet::new(),
            down: KeySet::new(),
            routes: vec![Route::Unrouted; KEY_CAPACITY],
            suspended: Vec::new(),
        }
    }

    /// Output keys currently held down on the virtual device.
    pub fn outstanding(&self) -> &KeySet {
        &self.down
    }

    /// Physical keys currently held on the source device.
    pub fn held(&self) -> &KeySet {
        &self.held
    }

    /// Processes one raw event against `profile`, appending effects to `out`.
    pub fn process(&mut self, profile: &CompiledProfile, event: KeyEvent, out: &mut Vec<Effect>) {
        let key = event.key;
        if !key.is_valid() {
            return;
        }

        match event.action {
            KeyAction::Down => {
                if !self.held.insert(key) {
                    // A second down without an up: keep the first route.
                    self.repeat(key, out);
                    return;
                }
                let route = self.route_down(profile, key, out);
                self.routes[key.index()] = route;
            }
            KeyAction::Repeat => self.repeat(key, out),
            KeyAction::Up => {
                self.held.remove(key);
                match std::mem::take(&mut self.routes[key.index()]) {
                    Route::Direct(output) => self.release(output, out),
                    Route::Combo(combo) => self.finish_combo(*combo, out),
                    Route::Swallowed | Route::Unrouted => {}
                }
            }
        }
    }

    fn route_down(&mut self, profile: &CompiledProfile, key: KeyCode, out: &mut Vec<Effect>) -> Route {
        match profile.binding(key) {
            KeyBinding::Passthrough | KeyBinding::Identity => self.press_direct(key, out),
            KeyBinding::Remap(target) => self.press_direct(*target, out),
            KeyBinding::Chorded(entries) => {
                let held = self.held_modifiers(key);
                match entries.iter().find(|e| e.modifiers == held).map(|e| &e.action) {
                    Some(ChordAction::Combo(chord)) => self.start_combo(*chord, out),
                    Some(ChordAction::Macro(id)) => {
                        out.push(Effect::RunMacro(*id));
                        Route::Swallowed
                    }
                    Some(ChordAction::SwitchProfile(id)) => {
                        out.push(Effect::SwitchProfile(*id));
                        Route::Swallowed
                    }
                    // No exact modifier match: the key behaves as unbound.
                    None => self.press_direct(key, out),
                }
            }
        }
    }

    fn repeat(&mut self, key: KeyCode, out: &mut Vec<Effect>) {
        let output = match &self.routes[key.index()] {
            Route::Direct(output) => *output,
            Route::Combo(combo) => combo.output,
            Route::Swallowed | Route::Unrouted => return,
        };
        if self.down.contains(output) {
            out.push(Effect::Emit(KeyEvent::repeat(output)));
        }
    }

    fn press_direct(&mut self, output: KeyCode, out: &mut Vec<Effect>) -> Route {
        if !self.outputs.contains(output) {
            debug!(key = output.0, "virtual device does not declare key; dropped");
            return Route::Swallowed;
        }
        self.down.insert(output);
        out.push(Effect::Emit(KeyEvent::down(output)));
        Route::Direct(output)
    }

    fn release(&mut self, output: KeyCode, out: &mut Vec<Effect>) {
        if self.down.remove(output) {
            out.push(Effect::Emit(KeyEvent::up(output)));
        }
    }

    /// Modifier classes held, as seen through each held key's route.
    ///
    /// A key remapped onto `LeftCtrl` counts as Ctrl; a swallowed key does not.
    fn held_modifiers(&self, except: KeyCode) -> ModifierSet {
        self.held
            .iter()
            .filter(|&key| key != except)
            .filter_map(|key| match &self.routes[key.index()] {
                Route::Direct(output) => output.modifier(),
                _ => None,
            })
            .collect()
    }

    /// Returns `true` if some held key is routed directly to `output`.
    fn held_as(&self, output: KeyCode) -> bool {
        self.held
            .iter()
            .any(|key| matches!(self.routes[key.index()], Route::Direct(o) if o == output))
    }

    fn modifier_down(&self, modifier: Modifier) -> bool {
        modifier.keys().into_iter().any(|k| self.down.contains(k))
    }

    fn start_combo(&mut self, chord: Chord, out: &mut Vec<Effect>) -> Route {
        let mut lifted = Vec::new();
        for modifier in Modifier::ALL {
            if chord.modifiers.contains(modifier) {
                continue;
            }
            for key in modifier.keys() {
                if self.down.remove(key) {
                    out.push(Effect::Emit(KeyEvent::up(key)));
                    lifted.push(key);
                }
            }
        }

        let mut added = Vec::new();
        for modifier in chord.modifiers.iter() {
            if !self.modifier_down(modifier) {
                let key = modifier.left_key();
                self.down.insert(key);
                out.push(Effect::Emit(KeyEvent::down(key)));
                added.push(key);
            }
        }

        self.down.insert(chord.key);
        out.push(Effect::Emit(KeyEvent::down(chord.key)));

        Route::Combo(Box::new(ActiveCombo {
            output: chord.key,
            added,
            lifted,
        }))
    }

    fn finish_combo(&mut self, combo: ActiveCombo, out: &mut Vec<Effect>) {
        self.release(combo.output, out);
        for &key in combo.added.iter().rev() {
            if !self.held_as(key) {
                self.release(key, out);
            }
        }
        for key in combo.lifted {
            if self.held_as(key) && self.down.insert(key) {
                out.push(Effect::Emit(KeyEvent::down(key)));
            }
        }
    }

    // ── Macro playback ───────────────────────────────────────────────────────
    //
    // The caller plays the steps of an `Effect::RunMacro` itself (waits are
    // real time) and feeds each tap through `tap`, bracketed by
    // `begin_macro` / `end_macro`.  Macro output is final: it is never looked
    // up in any table.

    /// Lifts every output modifier so macro chords are emitted exactly.
    pub fn begin_macro(&mut self, out: &mut Vec<KeyEvent>) {
        for modifier in Modifier::ALL {
            for key in modifier.keys() {
                if self.down.remove(key) {
                    out.push(KeyEvent::up(key));
                    self.suspended.push(key);
                }
            }
        }
    }

    /// Emits one macro step: modifiers down, key down/up, modifiers up.
    pub fn tap(&mut self, chord: Chord, out: &mut Vec<KeyEvent>) {
        let mut pressed = Vec::new();
        for modifier in chord.modifiers.iter() {
            if !self.modifier_down(modifier) {
                let key = modifier.left_key();
                self.down.insert(key);
                out.push(KeyEvent::down(key));
                pressed.push(key);
            }
        }
        out.push(KeyEvent::down(chord.key));
        out.push(KeyEvent::up(chord.key));
        self.down.remove(chord.key);
        for key in pressed.into_iter().rev() {
            self.down.remove(key);
            out.push(KeyEvent::up(key));
        }
    }

    /// Restores the modifiers lifted by [`begin_macro`](Self::begin_macro)
    /// that are still physically held.
    pub fn end_macro(&mut self, out: &mut Vec<KeyEvent>) {
        for key in std::mem::take(&mut self.suspended) {
            if self.held_as(key) && self.down.insert(key) {
                out.push(KeyEvent::down(key));
            }
        }
    }

    /// Releases every outstanding output key and forgets all held state.
    ///
    /// Afterwards [`outstanding`](Self::outstanding) is empty.
    pub fn release_all(&mut self, out: &mut Vec<KeyEvent>) {
        out.extend(self.down.iter().map(KeyEvent::up));
        self.down.clear();
        self.held.clear();
        self.suspended.clear();
        for route in &mut self.routes {
            *route = Route::Unrouted;
        }
    }
}
