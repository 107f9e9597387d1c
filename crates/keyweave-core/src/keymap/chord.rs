//! Modifier classes and `Mod+Mod+Key` chords.
//!
//! Left and right variants of a modifier are the same [`Modifier`] class:
//! holding either `LeftCtrl` or `RightCtrl` satisfies `Ctrl` in a chord.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::KeyCode;

/// Error type for chord parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChordError {
    /// The chord string was empty or had an empty component (`"Ctrl++Q"`).
    #[error("empty key chord component in {0:?}")]
    Empty(String),
    /// A component is not a known key name.
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    /// A component before the final key is not a modifier.
    #[error("{0:?} is not a modifier (expected Ctrl, Shift, Alt or Super)")]
    NotAModifier(String),
    /// A single key was expected but the text carried modifiers.
    #[error("expected a single key, found chord {0:?}")]
    UnexpectedModifiers(String),
}

/// A modifier class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Super,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [Modifier::Ctrl, Modifier::Shift, Modifier::Alt, Modifier::Super];

    /// Classifies a key code as a modifier.
    pub fn of(key: KeyCode) -> Option<Modifier> {
        match key {
            KeyCode::LEFT_CTRL | KeyCode::RIGHT_CTRL => Some(Modifier::Ctrl),
            KeyCode::LEFT_SHIFT | KeyCode::RIGHT_SHIFT => Some(Modifier::Shift),
            KeyCode::LEFT_ALT | KeyCode::RIGHT_ALT => Some(Modifier::Alt),
            KeyCode::LEFT_META | KeyCode::RIGHT_META => Some(Modifier::Super),
            _ => None,
        }
    }

    /// Left and right keys of this class.
    pub fn keys(self) -> [KeyCode; 2] {
        match self {
            Modifier::Ctrl => [KeyCode::LEFT_CTRL, KeyCode::RIGHT_CTRL],
            Modifier::Shift => [KeyCode::LEFT_SHIFT, KeyCode::RIGHT_SHIFT],
            Modifier::Alt => [KeyCode::LEFT_ALT, KeyCode::RIGHT_ALT],
            Modifier::Super => [KeyCode::LEFT_META, KeyCode::RIGHT_META],
        }
    }

    /// The key synthesized when a chord needs this modifier pressed.
    pub fn left_key(self) -> KeyCode {
        self.keys()[0]
    }

    /// Parses a modifier name used in chord strings.
    pub fn from_name(name: &str) -> Option<Modifier> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ctrl" | "control" | "leftctrl" | "rightctrl" => Some(Modifier::Ctrl),
            "shift" | "leftshift" | "rightshift" => Some(Modifier::Shift),
            "alt" | "leftalt" | "rightalt" | "altgr" => Some(Modifier::Alt),
            "super" | "meta" | "mod" | "win" | "leftmeta" | "rightmeta" => Some(Modifier::Super),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Modifier::Ctrl => 0b0001,
            Modifier::Shift => 0b0010,
            Modifier::Alt => 0b0100,
            Modifier::Super => 0b1000,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Shift => "Shift",
            Modifier::Alt => "Alt",
            Modifier::Super => "Super",
        }
    }
}

/// A set of modifier classes, compared exactly when matching combos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierSet(u8);

impl ModifierSet {
    pub const EMPTY: ModifierSet = ModifierSet(0);

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = ModifierSet::EMPTY;
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

/// A key pressed while a set of modifiers is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifiers: ModifierSet,
    pub key: KeyCode,
}

impl Chord {
    /// A chord with no modifiers.
    pub fn key(key: KeyCode) -> Self {
        Self {
            modifiers: ModifierSet::EMPTY,
            key,
        }
    }
}

impl FromStr for Chord {
    type Err = ChordError;

    /// Parses `"Ctrl+Shift+Q"`.  Every component except the last must be a
    /// modifier; the last is any key name, modifiers included (`"Ctrl+Shift"`
    /// is Shift pressed while Ctrl is held).
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = text.split('+').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ChordError::Empty(text.to_string()));
        }
        // split() always yields at least one element.
        let Some((last, mods)) = parts.split_last() else {
            return Err(ChordError::Empty(text.to_string()));
        };

        let mut modifiers = ModifierSet::EMPTY;
        for name in mods {
            let modifier =
                Modifier::from_name(name).ok_or_else(|| ChordError::NotAModifier(name.to_string()))?;
            modifiers.insert(modifier);
        }

        let key = KeyCode::from_name(last).ok_or_else(|| ChordError::UnknownKey(last.to_string()))?;
        Ok(Chord { modifiers, key })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in self.modifiers.iter() {
            write!(f, "{}+", modifier.label())?;
        }
        write!(f, "{}", self.key)
    }
}

/// Parses a single key name that must not carry modifiers (remap entries).
pub fn parse_single_key(text: &str) -> Result<KeyCode, ChordError> {
    let chord: Chord = text.parse()?;
    if !chord.modifiers.is_empty() {
        return Err(ChordError::UnexpectedModifiers(text.to_string()));
    }
    Ok(chord.key)
}
