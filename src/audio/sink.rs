//! Audio output sink contract.
//!
//! A sink is one opened output line on the platform audio device. Each voice
//! opens its own sink, writes interleaved PCM bytes to it, and releases it
//! when the note ends. The device driver itself lives behind `SinkProvider`.

use super::error::SinkError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Byte order of 16-bit samples on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// PCM format a sink is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Bits per sample (only 16 is produced by the engine).
    pub bits_per_sample: u16,
    /// Interleaved channel count.
    pub channels: u16,
    /// Whether samples are signed integers.
    pub signed: bool,
    /// Byte order of each sample.
    pub byte_order: ByteOrder,
}

impl SinkFormat {
    /// 44.1 kHz, 16-bit signed, mono, big-endian.
    pub const PIANO: SinkFormat = SinkFormat {
        sample_rate: 44_100,
        bits_per_sample: 16,
        channels: 1,
        signed: true,
        byte_order: ByteOrder::BigEndian,
    };

    /// Bytes occupied by one sample of one channel.
    pub fn sample_bytes(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes occupied by one frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.sample_bytes() * self.channels as usize
    }

    /// Playback time of a buffer of `bytes` in this format.
    pub fn buffer_duration(&self, bytes: usize) -> Duration {
        let frames = bytes / self.frame_bytes().max(1);
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

impl Default for SinkFormat {
    fn default() -> Self {
        Self::PIANO
    }
}

/// One opened output line.
///
/// Calls arrive in the order `start`, `write`*, `drain`, `stop`, `close`
/// from a single thread. `write` blocks until the device has room for the
/// buffer; `drain` blocks until every queued sample has been played.
/// Implementations need not be `Send`: a sink is created and released on
/// the thread that feeds it.
pub trait AudioSink {
    /// Begins playback.
    fn start(&mut self) -> Result<(), SinkError>;

    /// Queues a buffer of interleaved PCM bytes, blocking while the device is full.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Blocks until all queued samples have been emitted.
    fn drain(&mut self) -> Result<(), SinkError>;

    /// Stops playback.
    fn stop(&mut self) -> Result<(), SinkError>;

    /// Releases the device handle. No call is valid afterwards.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Opens sinks on an audio device.
pub trait SinkProvider: Send + Sync {
    /// Opens a new output line in the given format.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::DeviceUnavailable` if the device is busy, missing,
    /// or refuses access, and `SinkError::UnsupportedFormat` if it cannot
    /// play `format`.
    fn open(&self, format: &SinkFormat) -> Result<Box<dyn AudioSink>, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piano_format() {
        let format = SinkFormat::PIANO;
        assert_eq!(format.sample_rate, 44_100);
        assert_eq!(format.sample_bytes(), 2);
        assert_eq!(format.frame_bytes(), 2);
        assert_eq!(format.byte_order, ByteOrder::BigEndian);
    }

    #[test]
    fn test_buffer_duration() {
        // 4096 bytes = 2048 mono frames = ~46 ms at 44.1 kHz
        let d = SinkFormat::PIANO.buffer_duration(4096);
        assert!((d.as_secs_f64() - 2048.0 / 44_100.0).abs() < 1e-9);
    }

    #[test]
    fn test_byte_order_serde() {
        let json = serde_json::to_string(&ByteOrder::LittleEndian).unwrap();
        assert_eq!(json, "\"little-endian\"");
        let order: ByteOrder = serde_json::from_str("\"big-endian\"").unwrap();
        assert_eq!(order, ByteOrder::BigEndian);
    }
}
