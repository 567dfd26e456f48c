//! Tone generation.
//!
//! Each voice owns one `Oscillator`. The tone is a fundamental plus its
//! second harmonic at half amplitude, which sounds fuller than a pure sine
//! while peaking well below full scale.

use super::sink::ByteOrder;
use std::f64::consts::TAU;

/// Amplitude of the fundamental.
pub const FUNDAMENTAL_GAIN: f64 = 0.2;

/// Amplitude of the second harmonic.
pub const HARMONIC_GAIN: f64 = 0.1;

/// Full-scale value for 16-bit output. Samples saturate to +/- this value.
pub const PCM16_FULL_SCALE: f64 = i16::MAX as f64;

/// Amplitude at phase angle `theta`, in [-1.0, 1.0].
#[inline]
pub fn harmonic_sample(theta: f64) -> f64 {
    FUNDAMENTAL_GAIN * theta.sin() + HARMONIC_GAIN * (2.0 * theta).sin()
}

/// Scales an amplitude to a 16-bit sample, clipping instead of wrapping.
#[inline]
pub fn to_pcm16(sample: f64) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * PCM16_FULL_SCALE).clamp(-PCM16_FULL_SCALE, PCM16_FULL_SCALE) as i16
}

/// Encodes an amplitude as two bytes in the given order.
#[inline]
pub fn encode_pcm16(sample: f64, order: ByteOrder) -> [u8; 2] {
    let value = to_pcm16(sample);
    match order {
        ByteOrder::BigEndian => value.to_be_bytes(),
        ByteOrder::LittleEndian => value.to_le_bytes(),
    }
}

/// Phase accumulator for a fixed frequency.
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Current angle, always in [0, 2π).
    phase: f64,
    /// Angle advanced per sample.
    delta: f64,
}

impl Oscillator {
    /// Creates an oscillator starting at phase zero.
    ///
    /// # Arguments
    ///
    /// * `frequency` - Tone frequency in Hz
    /// * `sample_rate` - Output sample rate in Hz
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            delta: TAU * frequency / sample_rate as f64,
        }
    }

    /// Current phase angle.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Produces the next amplitude and advances the phase.
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let sample = harmonic_sample(self.phase);
        self.phase = (self.phase + self.delta).rem_euclid(TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs
        if self.phase >= TAU {
            self.phase = 0.0;
        }
        sample
    }

    /// Fills a byte buffer with consecutive 16-bit mono samples.
    ///
    /// A trailing odd byte, if any, is left untouched.
    pub fn fill_pcm16(&mut self, buf: &mut [u8], order: ByteOrder) {
        for frame in buf.chunks_exact_mut(2) {
            frame.copy_from_slice(&encode_pcm16(self.next_sample(), order));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44_100;

    /// Distance between two angles on the circle.
    fn angle_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(TAU);
        d.min(TAU - d)
    }

    #[test]
    fn test_phase_wrap_invariant() {
        for &freq in &[1.0, 27.5, 262.0, 440.0, 4186.0, 30_000.0, 100_000.0] {
            let mut osc = Oscillator::new(freq, RATE);
            let delta = TAU * freq / RATE as f64;
            for n in 1..=20_000u32 {
                osc.next_sample();
                assert!(osc.phase() >= 0.0 && osc.phase() < TAU);
                if n % 997 == 0 {
                    let expected = (n as f64 * delta).rem_euclid(TAU);
                    assert!(
                        angle_distance(osc.phase(), expected) < 1e-6,
                        "freq {} n {}: {} vs {}",
                        freq,
                        n,
                        osc.phase(),
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn test_amplitude_bounds() {
        let mut osc = Oscillator::new(262.0, RATE);
        for _ in 0..RATE {
            let s = osc.next_sample();
            assert!((-1.0..=1.0).contains(&s));
            assert!(s.abs() <= FUNDAMENTAL_GAIN + HARMONIC_GAIN + 1e-12);
        }
    }

    #[test]
    fn test_pcm16_saturates() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(-1.0), -32767);
        assert_eq!(to_pcm16(5.0), 32767);
        assert_eq!(to_pcm16(-5.0), -32767);
        assert_eq!(to_pcm16(f64::NAN), 0);
    }

    #[test]
    fn test_byte_order() {
        let be = encode_pcm16(0.5, ByteOrder::BigEndian);
        let le = encode_pcm16(0.5, ByteOrder::LittleEndian);
        assert_eq!(i16::from_be_bytes(be), 16383);
        assert_eq!(i16::from_le_bytes(le), 16383);
        assert_eq!(be, [le[1], le[0]]);
    }

    #[test]
    fn test_fill_matches_next_sample() {
        let mut a = Oscillator::new(440.0, RATE);
        let mut b = Oscillator::new(440.0, RATE);
        let mut buf = [0u8; 64];
        a.fill_pcm16(&mut buf, ByteOrder::BigEndian);
        for frame in buf.chunks_exact(2) {
            let expected = to_pcm16(b.next_sample());
            assert_eq!(i16::from_be_bytes([frame[0], frame[1]]), expected);
        }
    }

    #[test]
    fn test_dominant_frequency() {
        // One second of middle C; the waveform crosses zero twice per period.
        let mut osc = Oscillator::new(262.0, RATE);
        let samples: Vec<f64> = (0..RATE).map(|_| osc.next_sample()).collect();

        let magnitude = |freq: f64| {
            let (mut re, mut im) = (0.0, 0.0);
            for (n, s) in samples.iter().enumerate() {
                let w = TAU * freq * n as f64 / RATE as f64;
                re += s * w.cos();
                im -= s * w.sin();
            }
            (re * re + im * im).sqrt()
        };

        let fundamental = magnitude(262.0);
        assert!(fundamental > magnitude(524.0));
        for other in [131.0, 200.0, 300.0, 393.0, 786.0] {
            assert!(fundamental > 10.0 * magnitude(other), "{} Hz", other);
        }
    }
}
