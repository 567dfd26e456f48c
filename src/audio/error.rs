//! Error types for the synthesis engine.

use crate::keys::NoteId;
use thiserror::Error;

/// Failures reported by an audio sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The device could not be opened or started.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device cannot play the requested format.
    #[error("unsupported sink format: {0}")]
    UnsupportedFormat(String),

    /// A write or drain failed mid-stream (e.g. the device disconnected).
    #[error("audio write failed: {0}")]
    Write(String),

    /// The sink was used after being drained or closed.
    #[error("audio sink is closed")]
    Closed,
}

/// Failures surfaced to the caller of `begin_tone`.
#[derive(Debug, Error)]
pub enum ToneError {
    /// No output line could be acquired for the voice.
    #[error("cannot start tone: {0}")]
    DeviceUnavailable(#[source] SinkError),

    /// Frequency was zero, negative, or not finite.
    #[error("invalid tone frequency: {0} Hz")]
    InvalidFrequency(f64),

    /// The key is not part of the layout.
    #[error("no key with id {0}")]
    UnknownKey(NoteId),

    /// The voice thread could not be spawned.
    #[error("failed to spawn voice thread: {0}")]
    Spawn(#[source] std::io::Error),
}
