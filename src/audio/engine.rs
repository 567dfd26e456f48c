//! Audio engine for real-time key playback.
//!
//! Provides the interface the keyboard front end talks to: press and
//! release keys by `NoteId`, or begin and end tones at an explicit
//! frequency. Output goes through rodio unless another sink provider is
//! supplied.

use super::error::ToneError;
use super::registry::{BeginOutcome, EndOutcome, VoiceRegistry};
use super::rodio_sink::RodioSinkProvider;
use super::sink::SinkProvider;
use crate::config::{ConfigError, EngineConfig};
use crate::keys::{KeyLayout, NoteId};
use std::sync::Arc;

/// The main audio engine.
///
/// Owns the key layout and the registry of sounding voices. All methods take
/// `&self` and may be called from any thread.
pub struct AudioEngine {
    /// Frequencies for every playable key.
    layout: KeyLayout,
    /// Voices for the keys currently held.
    voices: VoiceRegistry,
}

impl AudioEngine {
    /// Creates an engine that plays through the default output device.
    ///
    /// No device is opened until the first key is pressed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let provider = Arc::new(RodioSinkProvider::new(config.queue_depth));
        Self::with_provider(config, provider)
    }

    /// Creates an engine with a custom sink provider.
    pub fn with_provider(
        config: EngineConfig,
        provider: Arc<dyn SinkProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            layout: KeyLayout::standard(),
            voices: VoiceRegistry::new(config, provider)?,
        })
    }

    /// Starts a tone at an explicit frequency.
    ///
    /// # Arguments
    ///
    /// * `note` - Key identifier the tone is registered under
    /// * `frequency` - Tone frequency in Hz
    ///
    /// # Errors
    ///
    /// Returns error if the frequency is invalid or no output line could
    /// be acquired. The key is not registered in either case.
    pub fn begin_tone(&self, note: NoteId, frequency: f64) -> Result<BeginOutcome, ToneError> {
        let outcome = self.voices.begin_tone(note, frequency);
        if let Err(ref e) = outcome {
            tracing::error!(%note, frequency, "failed to start tone: {}", e);
        }
        outcome
    }

    /// Stops a tone. Ending a key that is not sounding does nothing.
    pub fn end_tone(&self, note: NoteId) -> EndOutcome {
        self.voices.end_tone(note)
    }

    /// Presses a key from the layout.
    ///
    /// # Errors
    ///
    /// Returns `ToneError::UnknownKey` if `note` is not on the keyboard,
    /// otherwise the same errors as `begin_tone`.
    pub fn press_key(&self, note: NoteId) -> Result<BeginOutcome, ToneError> {
        let frequency = self
            .layout
            .frequency(note)
            .ok_or(ToneError::UnknownKey(note))?;
        self.begin_tone(note, frequency)
    }

    /// Releases a key from the layout.
    pub fn release_key(&self, note: NoteId) -> EndOutcome {
        self.end_tone(note)
    }

    /// Stops every sounding key.
    pub fn release_all(&self) -> usize {
        self.voices.release_all()
    }

    /// Currently sounding keys, in ascending order.
    pub fn active_notes(&self) -> Vec<NoteId> {
        self.voices.active_notes()
    }

    /// Number of sounding keys.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Returns true if `note` is sounding.
    pub fn is_active(&self, note: NoteId) -> bool {
        self.voices.is_active(note)
    }

    /// The key layout.
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        self.voices.config()
    }
}
