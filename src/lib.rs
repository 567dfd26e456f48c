//! synthpiano - A virtual piano with real-time tone synthesis.
//!
//! This library provides the synthesis engine behind the keyboard: one
//! voice per held key, each streaming to its own audio output line.

pub mod audio;
pub mod config;
pub mod keys;

// Re-export commonly used types
pub use audio::{AudioEngine, BeginOutcome, EndOutcome, SinkError, ToneError};
pub use config::{ConfigError, EngineConfig};
pub use keys::{Key, KeyKind, KeyLayout, NoteId};
