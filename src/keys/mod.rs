//! Keyboard data: key identifiers and the fixed frequency layout.
//!
//! The virtual keyboard spans two octaves starting at middle C. Naturals use
//! a rounded base-frequency table scaled by octave; sharps are derived from
//! the natural below them with a single equal-tempered semitone step.

mod layout;
mod note;

pub use layout::{Key, KeyKind, KeyLayout};
pub use note::NoteId;

/// Base frequencies (Hz) for the naturals C4 through B4.
pub const BASE_FREQUENCIES: [u32; 7] = [262, 294, 330, 349, 392, 440, 494];

/// Names of the naturals, aligned with `BASE_FREQUENCIES`.
pub const NATURAL_NAMES: [&str; 7] = ["C", "D", "E", "F", "G", "A", "B"];

/// Equal-tempered semitone ratio, 2^(1/12).
pub const SEMITONE_RATIO: f64 = 1.059463094359;

/// Number of octaves on the keyboard.
pub const OCTAVES: usize = 2;

/// Octave number of the lowest keys (scientific pitch notation).
pub const FIRST_OCTAVE: u8 = 4;

/// Returns true if the natural at `note_index` has a sharp above it.
///
/// E and B are followed directly by F and C, so they carry no black key.
#[inline]
pub fn has_sharp(note_index: usize) -> bool {
    note_index != 2 && note_index != 6
}

/// Frequency of a natural key.
///
/// # Arguments
///
/// * `note_index` - Index into `BASE_FREQUENCIES` (0 = C)
/// * `octave` - Octave offset from the first octave (0-based)
///
/// # Returns
///
/// The frequency in Hz, octave-scaled by integer multiplication
pub fn natural_frequency(note_index: usize, octave: usize) -> f64 {
    (BASE_FREQUENCIES[note_index] as usize * (1 + octave)) as f64
}

/// Frequency of the sharp above a natural key, truncated to whole hertz.
pub fn sharp_frequency(note_index: usize, octave: usize) -> f64 {
    (BASE_FREQUENCIES[note_index] as f64 * SEMITONE_RATIO * (1 + octave) as f64).trunc()
}
