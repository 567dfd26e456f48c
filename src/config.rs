//! Engine configuration.
//!
//! Defaults reproduce the fixed output format: 44.1 kHz, 16-bit signed mono,
//! big-endian, written 4096 bytes at a time. A JSON file may override them.

use crate::audio::sink::{ByteOrder, SinkFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default sample rate (44.1 kHz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default bytes per sink write (2048 mono 16-bit samples).
pub const DEFAULT_BUFFER_BYTES: usize = 4096;

/// Default number of buffers the output device may hold ahead of playback.
pub const DEFAULT_QUEUE_DEPTH: usize = 1;

/// Errors loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Size of each buffer written to the sink.
    pub buffer_bytes: usize,
    /// Byte order of samples written to the sink.
    pub byte_order: ByteOrder,
    /// Buffers the sink may queue before `write` blocks.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            byte_order: ByteOrder::BigEndian,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Loads and validates a JSON configuration file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or
    /// fails `validate`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Parses and validates a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the settings describe a usable stream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        let frame = self.format().frame_bytes();
        if self.buffer_bytes == 0 || self.buffer_bytes % frame != 0 {
            return Err(ConfigError::Invalid(format!(
                "buffer_bytes must be a positive multiple of {} (got {})",
                frame, self.buffer_bytes
            )));
        }
        Ok(())
    }

    /// The sink format voices open their output lines with.
    pub fn format(&self) -> SinkFormat {
        SinkFormat {
            sample_rate: self.sample_rate,
            byte_order: self.byte_order,
            ..SinkFormat::PIANO
        }
    }
}
