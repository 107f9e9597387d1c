//! Key codes, key names, chords, and key bitsets.
//!
//! The canonical representation is the Linux input event code (`KEY_*` /
//! `BTN_*` from `linux/input-event-codes.h`).  Physical devices report these
//! codes directly and the virtual output device accepts them unchanged, so no
//! translation happens at either boundary.
//!
//! # Key names (for beginners)
//!
//! Configuration files refer to keys by name (`"CapsLock"`, `"Q"`, `"F13"`).
//! [`KeyCode::from_name`] resolves those names once, when the configuration is
//! compiled.  The remap engine itself only ever sees numeric codes.

pub mod chord;
pub mod keyset;
mod names;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use chord::{Chord, ChordError, Modifier, ModifierSet};
pub use keyset::KeySet;

/// Number of distinct key codes (`KEY_CNT` in the kernel headers).
pub const KEY_CAPACITY: usize = 0x300;

/// Highest code of the standard keyboard block that identity forwarding may
/// need to reproduce on the virtual device (`KEY_MICMUTE`).
pub const STANDARD_KEYBOARD_MAX: u16 = 248;

/// A Linux input key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const ESC: KeyCode = KeyCode(1);
    pub const LEFT_CTRL: KeyCode = KeyCode(29);
    pub const LEFT_SHIFT: KeyCode = KeyCode(42);
    pub const RIGHT_SHIFT: KeyCode = KeyCode(54);
    pub const LEFT_ALT: KeyCode = KeyCode(56);
    pub const CAPS_LOCK: KeyCode = KeyCode(58);
    pub const RIGHT_CTRL: KeyCode = KeyCode(97);
    pub const RIGHT_ALT: KeyCode = KeyCode(100);
    pub const LEFT_META: KeyCode = KeyCode(125);
    pub const RIGHT_META: KeyCode = KeyCode(126);

    /// Returns the code as an index into per-key tables.
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Returns `true` if the code fits in the per-key tables.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.index() < KEY_CAPACITY
    }

    /// Resolves a key name such as `"CapsLock"`, `"capslock"` or `"KEY_CAPSLOCK"`.
    ///
    /// Matching ignores case and underscores, and accepts an optional `KEY_`
    /// prefix so names copied from `evtest` output work as-is.
    pub fn from_name(name: &str) -> Option<KeyCode> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        names::KEY_NAMES
            .iter()
            .find(|(candidate, _)| normalize(candidate) == wanted)
            .map(|&(_, code)| KeyCode(code))
    }

    /// Returns the canonical name, if the code has one.
    pub fn name(self) -> Option<&'static str> {
        names::KEY_NAMES
            .iter()
            .find(|&&(_, code)| code == self.0)
            .map(|&(name, _)| name)
    }

    /// Returns the modifier class of this key, if it is one of the eight
    /// left/right modifier keys.
    #[inline]
    pub fn modifier(self) -> Option<Modifier> {
        Modifier::of(self)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "KEY_{}", self.0),
        }
    }
}

fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    let without_prefix = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("key_") => &trimmed[4..],
        _ => trimmed,
    };
    without_prefix
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
