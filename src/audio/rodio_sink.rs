//! Audio output via rodio.
//!
//! Every sink owns its own `OutputStream` and `rodio::Sink`, playing a
//! `PcmSource` that pulls decoded chunks from a small bounded queue. Writers
//! block on the queue while it is full, so the device's consumption rate
//! paces the voice thread.

use super::error::SinkError;
use super::sink::{AudioSink, ByteOrder, SinkFormat, SinkProvider};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Minimum time a write or drain waits for the device before giving up.
const MIN_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Frames of silence emitted per underrun before the queue is checked again.
const UNDERRUN_FRAMES: usize = 64;

/// Queue contents shared between the writer and the audio callback.
struct QueueState {
    chunks: VecDeque<Vec<i16>>,
    /// No further chunks will arrive.
    closed: bool,
    /// The source has emitted everything and ended.
    finished: bool,
}

/// Bounded chunk queue between a voice thread and the audio callback.
struct PcmQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
    depth: usize,
}

impl PcmQueue {
    fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::with_capacity(depth),
                closed: false,
                finished: false,
            }),
            changed: Condvar::new(),
            depth: depth.max(1),
        }
    }

    /// Blocks until there is room, then enqueues `chunk`.
    fn push(&self, chunk: Vec<i16>, timeout: Duration) -> Result<(), SinkError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        loop {
            if state.closed {
                return Err(SinkError::Closed);
            }
            if state.chunks.len() < self.depth {
                state.chunks.push_back(chunk);
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SinkError::Write("audio device stopped consuming samples".into()));
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| poisoned())?
                .0;
        }
    }

    /// Marks the queue closed and blocks until the source has played it out.
    fn close_and_wait(&self, timeout: Duration) -> Result<(), SinkError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.closed = true;
        while !state.finished {
            let now = Instant::now();
            if now >= deadline {
                return Err(SinkError::Write("timed out draining audio device".into()));
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| poisoned())?
                .0;
        }
        Ok(())
    }

    /// Called from the audio callback. `None` means the stream has ended.
    fn pop(&self) -> Option<Option<Vec<i16>>> {
        // A poisoned lock means the writer panicked; end the stream.
        let mut state = self.state.lock().ok()?;
        let next = state.chunks.pop_front();
        if next.is_none() && state.closed {
            state.finished = true;
        }
        self.changed.notify_all();
        match next {
            Some(chunk) => Some(Some(chunk)),
            None if state.finished => None,
            None => Some(None),
        }
    }
}

fn poisoned() -> SinkError {
    SinkError::Write("audio queue lock poisoned".into())
}

/// Audio source that plays queued PCM chunks, emitting silence on underrun.
/// Implements rodio's Source trait for playback.
struct PcmSource {
    queue: Arc<PcmQueue>,
    current: Vec<i16>,
    pos: usize,
    /// Silent samples left in the current underrun.
    silence_left: usize,
    channels: u16,
    sample_rate: u32,
}

impl PcmSource {
    fn new(queue: Arc<PcmQueue>, channels: u16, sample_rate: u32) -> Self {
        Self {
            queue,
            current: Vec::new(),
            pos: 0,
            silence_left: 0,
            channels,
            sample_rate,
        }
    }
}

impl Iterator for PcmSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.silence_left > 0 {
            self.silence_left -= 1;
            return Some(0);
        }
        if self.pos >= self.current.len() {
            match self.queue.pop()? {
                Some(chunk) if !chunk.is_empty() => {
                    self.current = chunk;
                    self.pos = 0;
                }
                _ => {
                    // Whole frames only, so channels stay aligned.
                    let run = UNDERRUN_FRAMES * self.channels as usize;
                    self.silence_left = run.saturating_sub(1);
                    return Some(0);
                }
            }
        }
        let sample = self.current[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for PcmSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Plays until drained
    }
}

/// Decodes 16-bit PCM bytes in the given order.
fn decode_pcm16(bytes: &[u8], order: ByteOrder) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| match order {
            ByteOrder::BigEndian => i16::from_be_bytes([b[0], b[1]]),
            ByteOrder::LittleEndian => i16::from_le_bytes([b[0], b[1]]),
        })
        .collect()
}

/// Opens rodio output lines on the default device.
#[derive(Debug, Clone)]
pub struct RodioSinkProvider {
    queue_depth: usize,
}

impl RodioSinkProvider {
    /// Creates a provider whose sinks hold up to `queue_depth` buffers.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
        }
    }
}

impl Default for RodioSinkProvider {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_QUEUE_DEPTH)
    }
}

impl SinkProvider for RodioSinkProvider {
    fn open(&self, format: &SinkFormat) -> Result<Box<dyn AudioSink>, SinkError> {
        if format.bits_per_sample != 16 || !format.signed || format.channels == 0 {
            return Err(SinkError::UnsupportedFormat(format!(
                "{}-bit {} x{}",
                format.bits_per_sample,
                if format.signed { "signed" } else { "unsigned" },
                format.channels
            )));
        }

        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| SinkError::DeviceUnavailable(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| SinkError::DeviceUnavailable(e.to_string()))?;
        sink.pause();

        Ok(Box::new(RodioSink {
            format: *format,
            queue: Arc::new(PcmQueue::new(self.queue_depth)),
            sink: Some(sink),
            _handle: Some(handle),
            _stream: Some(stream),
            started: false,
            chunk_bytes: 0,
        }))
    }
}

/// One rodio output line.
struct RodioSink {
    format: SinkFormat,
    queue: Arc<PcmQueue>,
    sink: Option<Sink>,
    // Dropped last: the stream must outlive the sink playing on it.
    _handle: Option<OutputStreamHandle>,
    _stream: Option<OutputStream>,
    started: bool,
    /// Size of the most recent write, used to scale stall timeouts.
    chunk_bytes: usize,
}

impl RodioSink {
    /// How long to wait on the device before declaring it stalled.
    fn stall_timeout(&self) -> Duration {
        let queued =
            self.format.buffer_duration(self.chunk_bytes) * (self.queue.depth as u32 + 1);
        MIN_STALL_TIMEOUT.max(queued * 4)
    }

    fn sink(&self) -> Result<&Sink, SinkError> {
        self.sink.as_ref().ok_or(SinkError::Closed)
    }
}

impl AudioSink for RodioSink {
    fn start(&mut self) -> Result<(), SinkError> {
        if !self.started {
            let source = PcmSource::new(
                Arc::clone(&self.queue),
                self.format.channels,
                self.format.sample_rate,
            );
            self.sink()?.append(source);
            self.started = true;
        }
        self.sink()?.play();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.sink()?;
        self.chunk_bytes = bytes.len();
        let chunk = decode_pcm16(bytes, self.format.byte_order);
        self.queue.push(chunk, self.stall_timeout())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.sink()?;
        if !self.started {
            return Ok(());
        }
        self.queue.close_and_wait(self.stall_timeout())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.sink()?.stop();
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Ok(mut state) = self.queue.state.lock() {
            state.closed = true;
        }
        self.queue.changed.notify_all();
        self.sink = None;
        self._handle = None;
        self._stream = None;
        Ok(())
    }
}
