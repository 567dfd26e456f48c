//! The fixed two-octave key layout.
//!
//! Frequencies are computed once here, at layout time. The synthesis engine
//! only ever sees a `NoteId` and the frequency looked up for it.

use super::{
    has_sharp, natural_frequency, sharp_frequency, NoteId, FIRST_OCTAVE, NATURAL_NAMES, OCTAVES,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a key is a natural (white) or a sharp (black).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    White,
    Black,
}

/// A single playable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Identifier handed to the synthesis engine.
    pub id: NoteId,
    /// Display name such as "C4" or "F#5".
    pub name: String,
    /// White or black key.
    pub kind: KeyKind,
    /// Octave in scientific pitch notation.
    pub octave: u8,
    /// Tone frequency in Hz.
    pub frequency: f64,
}

/// Every key on the keyboard, indexed by `NoteId`.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    keys: BTreeMap<NoteId, Key>,
}

impl KeyLayout {
    /// Builds the standard two-octave layout.
    ///
    /// Keys are emitted left to right: each natural, followed by its sharp
    /// when it has one. IDs follow emission order, so C4 is 0 and C#4 is 1.
    pub fn standard() -> Self {
        let mut keys = BTreeMap::new();
        let mut next_id = 0u32;

        for i in 0..NATURAL_NAMES.len() * OCTAVES {
            let octave = i / NATURAL_NAMES.len();
            let note_index = i % NATURAL_NAMES.len();
            let octave_label = FIRST_OCTAVE + octave as u8;

            let id = NoteId::new(next_id);
            next_id += 1;
            keys.insert(
                id,
                Key {
                    id,
                    name: format!("{}{}", NATURAL_NAMES[note_index], octave_label),
                    kind: KeyKind::White,
                    octave: octave_label,
                    frequency: natural_frequency(note_index, octave),
                },
            );

            if has_sharp(note_index) {
                let id = NoteId::new(next_id);
                next_id += 1;
                keys.insert(
                    id,
                    Key {
                        id,
                        name: format!("{}#{}", NATURAL_NAMES[note_index], octave_label),
                        kind: KeyKind::Black,
                        octave: octave_label,
                        frequency: sharp_frequency(note_index, octave),
                    },
                );
            }
        }

        Self { keys }
    }

    /// Returns the key for an ID, if it exists.
    pub fn get(&self, id: NoteId) -> Option<&Key> {
        self.keys.get(&id)
    }

    /// Returns the frequency assigned to a key.
    pub fn frequency(&self, id: NoteId) -> Option<f64> {
        self.keys.get(&id).map(|k| k.frequency)
    }

    /// Looks a key up by its display name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        let name = name.trim();
        self.keys
            .values()
            .find(|k| k.name.eq_ignore_ascii_case(name))
    }

    /// Iterates over all keys in ID order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.values()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the layout has no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::standard()
    }
}
