//! Playable key identifiers.
//!
//! A `NoteId` names a key on the keyboard, independent of the frequency
//! the layout assigns to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a playable key.
///
/// IDs are handed out by the key layout in creation order and are unique
/// across every key that can sound at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(u32);

impl NoteId {
    /// Wraps a raw key index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw ID value (for logging/debugging).
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NoteId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
