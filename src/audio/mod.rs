//! Audio engine for real-time tone synthesis.
//!
//! Every held key gets its own voice: a thread generating a
//! fundamental-plus-harmonic tone into its own output line. It supports:
//! - Per-key output lines opened on press and drained on release
//! - Blocking, device-paced buffer writes
//! - Recovery from device failures without affecting other keys

pub mod engine;
pub mod error;
pub mod registry;
pub mod rodio_sink;
pub mod sink;
pub mod voice;
pub mod waveform;

#[cfg(test)]
pub(crate) mod mock;

pub use engine::AudioEngine;
pub use error::{SinkError, ToneError};
pub use registry::{BeginOutcome, EndOutcome, VoiceRegistry};
pub use rodio_sink::RodioSinkProvider;
pub use sink::{AudioSink, ByteOrder, SinkFormat, SinkProvider};
pub use voice::{Voice, VoiceId, VoiceState};
