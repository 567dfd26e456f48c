//! A single sounding note.
//!
//! Each voice runs on its own thread: it opens an output line, then fills
//! and writes one buffer at a time until asked to stop. The blocking write
//! is the only place the thread waits, so the device paces generation.
//!
//! Lifecycle: `Created -> Running -> Stopping -> Closed`. A failed write or
//! drain releases the line best-effort and goes straight to `Closed`.

use super::error::{SinkError, ToneError};
use super::sink::{AudioSink, ByteOrder, SinkFormat, SinkProvider};
use super::waveform::Oscillator;
use crate::config::EngineConfig;
use crate::keys::NoteId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Global counter for generating unique voice IDs.
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for one voice instance.
///
/// Distinguishes successive voices for the same key, so a late fault report
/// from an old voice never tears down its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    fn next() -> Self {
        Self(VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Lifecycle state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceState {
    /// Output line opened and started; generation not yet begun.
    Created = 0,
    /// Generating and writing buffers.
    Running = 1,
    /// Stop requested; finishing the current buffer and draining.
    Stopping = 2,
    /// Output line released. No further writes happen.
    Closed = 3,
}

impl VoiceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => VoiceState::Created,
            1 => VoiceState::Running,
            2 => VoiceState::Stopping,
            _ => VoiceState::Closed,
        }
    }
}

/// Called on the voice thread when the output line fails mid-stream.
pub type FaultHandler = Box<dyn FnOnce(VoiceId) + Send + 'static>;

/// State shared between the voice handle and its thread.
/// Uses atomics so the control side never waits on the audio thread.
struct VoiceShared {
    stop: AtomicBool,
    state: AtomicU8,
}

impl VoiceShared {
    fn state(&self) -> VoiceState {
        VoiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: VoiceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Requests a stop, moving `Created`/`Running` to `Stopping`.
    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        for from in [VoiceState::Created, VoiceState::Running] {
            let _ = self.state.compare_exchange(
                from as u8,
                VoiceState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Handle to a running voice.
///
/// Dropping the handle stops the voice and waits for its thread.
pub struct Voice {
    id: VoiceId,
    note: NoteId,
    frequency: f64,
    shared: Arc<VoiceShared>,
    thread: Option<JoinHandle<()>>,
}

impl Voice {
    /// Opens an output line and starts generating a tone.
    ///
    /// Returns once the line is open and started, or with an error after
    /// everything acquired so far has been released.
    ///
    /// # Arguments
    ///
    /// * `note` - Key the voice sounds for
    /// * `frequency` - Tone frequency in Hz (must be positive and finite)
    /// * `config` - Output format and buffer size
    /// * `provider` - Opens the output line
    /// * `on_fault` - Invoked on the voice thread if the line fails mid-stream
    ///
    /// # Errors
    ///
    /// Returns `ToneError::InvalidFrequency` for a non-positive frequency,
    /// `ToneError::DeviceUnavailable` if the line cannot be opened or
    /// started, and `ToneError::Spawn` if the thread cannot be created.
    pub fn start(
        note: NoteId,
        frequency: f64,
        config: &EngineConfig,
        provider: Arc<dyn SinkProvider>,
        on_fault: FaultHandler,
    ) -> Result<Self, ToneError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(ToneError::InvalidFrequency(frequency));
        }

        let id = VoiceId::next();
        let shared = Arc::new(VoiceShared {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(VoiceState::Created as u8),
        });

        let worker = VoiceWorker {
            id,
            note,
            oscillator: Oscillator::new(frequency, config.sample_rate),
            buffer: vec![0; config.buffer_bytes],
            byte_order: config.byte_order,
            format: config.format(),
            shared: Arc::clone(&shared),
            provider,
            on_fault: Some(on_fault),
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name(format!("voice-{}", note.as_u32()))
            .spawn(move || worker.run(ready_tx))
            .map_err(ToneError::Spawn)?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(SinkError::DeviceUnavailable(
                "voice thread exited before opening the device".into(),
            ))
        });

        match ready {
            Ok(()) => {
                tracing::debug!(%note, %id, frequency, "voice started");
                Ok(Self {
                    id,
                    note,
                    frequency,
                    shared,
                    thread: Some(handle),
                })
            }
            Err(e) => {
                if handle.join().is_err() {
                    tracing::error!(%note, %id, "voice thread panicked during setup");
                }
                Err(ToneError::DeviceUnavailable(e))
            }
        }
    }

    /// Unique ID of this voice instance.
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VoiceState {
        self.shared.state()
    }

    /// Signals the voice to stop and waits until its output line is released.
    ///
    /// The buffer being written when the signal arrives still plays out.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.request_stop();
        let Some(handle) = self.thread.take() else {
            return;
        };
        // A voice dropped from its own fault handler cannot join itself;
        // its thread is already on the way out.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!(note = %self.note, id = %self.id, "voice thread panicked");
            self.shared.set_state(VoiceState::Closed);
        }
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("note", &self.note)
            .field("frequency", &self.frequency)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything the voice thread owns.
struct VoiceWorker {
    id: VoiceId,
    note: NoteId,
    oscillator: Oscillator,
    buffer: Vec<u8>,
    byte_order: ByteOrder,
    format: SinkFormat,
    shared: Arc<VoiceShared>,
    provider: Arc<dyn SinkProvider>,
    on_fault: Option<FaultHandler>,
}

impl VoiceWorker {
    fn run(mut self, ready: SyncSender<Result<(), SinkError>>) {
        let mut sink = match self.acquire() {
            Ok(sink) => sink,
            Err(e) => {
                self.shared.set_state(VoiceState::Closed);
                let _ = ready.send(Err(e));
                return;
            }
        };

        let _ = self.shared.state.compare_exchange(
            VoiceState::Created as u8,
            VoiceState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = ready.send(Ok(()));
        drop(ready);

        let result = self.stream(sink.as_mut()).and_then(|()| {
            self.shared.set_state(VoiceState::Stopping);
            sink.drain()
        });

        match result {
            Ok(()) => {
                if let Err(e) = sink.stop().and_then(|()| sink.close()) {
                    tracing::warn!(note = %self.note, id = %self.id, "error releasing output line: {}", e);
                }
                self.shared.set_state(VoiceState::Closed);
                tracing::debug!(note = %self.note, id = %self.id, "voice closed");
            }
            Err(e) => {
                tracing::error!(note = %self.note, id = %self.id, "output line failed: {}", e);
                // Best effort: the device may already be gone.
                let _ = sink.stop();
                let _ = sink.close();
                self.shared.set_state(VoiceState::Closed);
                if let Some(on_fault) = self.on_fault.take() {
                    on_fault(self.id);
                }
            }
        }
    }

    /// Opens and starts the output line, closing it again if start fails.
    fn acquire(&self) -> Result<Box<dyn AudioSink>, SinkError> {
        let mut sink = self.provider.open(&self.format)?;
        if let Err(e) = sink.start() {
            if let Err(close_err) = sink.close() {
                tracing::warn!(note = %self.note, "error closing half-opened line: {}", close_err);
            }
            return Err(e);
        }
        Ok(sink)
    }

    /// Generates and writes buffers until a stop is requested.
    fn stream(&mut self, sink: &mut dyn AudioSink) -> Result<(), SinkError> {
        while !self.shared.stop_requested() {
            self.oscillator.fill_pcm16(&mut self.buffer, self.byte_order);
            sink.write(&self.buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockProvider;
    use crate::audio::waveform::to_pcm16;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn no_fault() -> FaultHandler {
        Box::new(|_| {})
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_voice_lifecycle() {
        let provider = Arc::new(MockProvider::new());
        let state = Arc::clone(&provider.state);
        let config = EngineConfig::default();

        let voice = Voice::start(NoteId::new(0), 262.0, &config, provider, no_fault()).unwrap();
        assert_eq!(voice.state(), VoiceState::Running);
        assert_eq!(state.live(), 1);
        assert!(wait_until(|| state.writes.load(Ordering::SeqCst) >= 2));

        voice.stop();
        assert_eq!(state.live(), 0);
        assert_eq!(state.drains.load(Ordering::SeqCst), 1);
        assert!(!state.write_after_close.load(Ordering::SeqCst));
    }

    #[test]
    fn test_writes_full_buffers_in_phase_order() {
        let provider = Arc::new(MockProvider::new());
        let state = Arc::clone(&provider.state);
        let config = EngineConfig::default();

        let voice = Voice::start(NoteId::new(5), 440.0, &config, provider, no_fault()).unwrap();
        assert!(wait_until(|| state.writes.load(Ordering::SeqCst) >= 3));
        voice.stop();

        let captured = state.captured.lock().unwrap();
        assert!(captured.len() >= 3 * config.buffer_bytes);
        let mut reference = Oscillator::new(440.0, config.sample_rate);
        for frame in captured.chunks_exact(2) {
            let expected = to_pcm16(reference.next_sample());
            assert_eq!(i16::from_be_bytes([frame[0], frame[1]]), expected);
        }
    }

    #[test]
    fn test_invalid_frequency() {
        let provider = Arc::new(MockProvider::new());
        let config = EngineConfig::default();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Voice::start(NoteId::new(0), bad, &config, provider.clone(), no_fault())
                .unwrap_err();
            assert!(matches!(err, ToneError::InvalidFrequency(_)));
        }
        assert_eq!(provider.state.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_failure() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_open.store(true, Ordering::SeqCst);
        let config = EngineConfig::default();

        let err = Voice::start(NoteId::new(0), 262.0, &config, provider.clone(), no_fault())
            .unwrap_err();
        assert!(matches!(err, ToneError::DeviceUnavailable(_)));
        assert_eq!(provider.state.live(), 0);
    }

    #[test]
    fn test_start_failure_closes_line() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_start.store(true, Ordering::SeqCst);
        let config = EngineConfig::default();

        let err = Voice::start(NoteId::new(0), 262.0, &config, provider.clone(), no_fault())
            .unwrap_err();
        assert!(matches!(err, ToneError::DeviceUnavailable(_)));
        assert_eq!(provider.state.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.state.live(), 0);
    }

    #[test]
    fn test_write_failure_reports_fault() {
        let mut provider = MockProvider::new();
        provider.fail_write_after = Some(2);
        let provider = Arc::new(provider);
        let config = EngineConfig::default();

        let faults = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&faults);
        let voice = Voice::start(
            NoteId::new(1),
            440.0,
            &config,
            provider.clone(),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        assert!(wait_until(|| faults.load(Ordering::SeqCst) == 1));
        assert_eq!(voice.state(), VoiceState::Closed);
        assert_eq!(provider.state.live(), 0);
        voice.stop();
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_failure_still_releases_line() {
        let mut provider = MockProvider::new();
        provider.fail_drain = true;
        let provider = Arc::new(provider);
        let config = EngineConfig::default();

        let faults = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&faults);
        let voice = Voice::start(
            NoteId::new(3),
            311.0,
            &config,
            provider.clone(),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        assert!(wait_until(|| provider.state.writes.load(Ordering::SeqCst) >= 1));

        let shared = Arc::clone(&voice.shared);
        voice.stop();
        assert_eq!(shared.state(), VoiceState::Closed);
        assert_eq!(provider.state.drains.load(Ordering::SeqCst), 1);
        assert_eq!(provider.state.live(), 0);
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_voice() {
        let provider = Arc::new(MockProvider::new());
        let state = Arc::clone(&provider.state);
        let config = EngineConfig::default();

        let voice = Voice::start(NoteId::new(2), 330.0, &config, provider, no_fault()).unwrap();
        drop(voice);
        assert_eq!(state.live(), 0);
    }

    #[test]
    fn test_voice_ids_unique() {
        let provider: Arc<dyn SinkProvider> = Arc::new(MockProvider::new());
        let config = EngineConfig::default();
        let a = Voice::start(NoteId::new(0), 262.0, &config, provider.clone(), no_fault()).unwrap();
        let b = Voice::start(NoteId::new(0), 262.0, &config, provider, no_fault()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
