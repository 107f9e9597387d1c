//! Fixed-capacity bitset over key codes.

use std::fmt;

use super::{KeyCode, KEY_CAPACITY};

const WORDS: usize = KEY_CAPACITY / 64;

/// A set of key codes stored as a 768-bit bitmap.
///
/// Used for the "currently down" and "physically held" sets in the remap
/// engine and for virtual-device capabilities.  Codes outside
/// [`KEY_CAPACITY`] are never stored.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    words: [u64; WORDS],
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every code below [`KEY_CAPACITY`].
    pub fn all() -> Self {
        Self {
            words: [u64::MAX; WORDS],
        }
    }

    /// Inserts `key`; returns `true` if it was not already present.
    pub fn insert(&mut self, key: KeyCode) -> bool {
        if !key.is_valid() {
            return false;
        }
        let (word, mask) = slot(key);
        let was_absent = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_absent
    }

    /// Removes `key`; returns `true` if it was present.
    pub fn remove(&mut self, key: KeyCode) -> bool {
        if !key.is_valid() {
            return false;
        }
        let (word, mask) = slot(key);
        let was_present = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_present
    }

    pub fn contains(&self, key: KeyCode) -> bool {
        if !key.is_valid() {
            return false;
        }
        let (word, mask) = slot(key);
        self.words[word] & mask != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }

    /// Adds every key of `other` to `self`.
    pub fn union_with(&mut self, other: &KeySet) {
        for (mine, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *mine |= *theirs;
        }
    }

    /// Returns `true` if every key in `self` is also in `other`.
    pub fn is_subset(&self, other: &KeySet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(mine, theirs)| mine & !theirs == 0)
    }

    /// Keys in `self` that are not in `other`.
    pub fn difference(&self, other: &KeySet) -> KeySet {
        let mut out = self.clone();
        for (mine, theirs) in out.words.iter_mut().zip(other.words.iter()) {
            *mine &= !theirs;
        }
        out
    }

    /// Iterates keys in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64u16).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    // index < WORDS, so the code is < KEY_CAPACITY and fits u16.
                    Some(KeyCode(index as u16 * 64 + bit))
                } else {
                    None
                }
            })
        })
    }
}

impl FromIterator<KeyCode> for KeySet {
    fn from_iter<I: IntoIterator<Item = KeyCode>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl Extend<KeyCode> for KeySet {
    fn extend<I: IntoIterator<Item = KeyCode>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[inline]
fn slot(key: KeyCode) -> (usize, u64) {
    let index = key.index();
    (index / 64, 1u64 << (index % 64))
}
