//! In-memory sink used by tests.
//!
//! Records the first bytes written, counts live handles, and paces each
//! write with a short sleep to stand in for device back-pressure. Opens and
//! drains can be slowed down or made to fail.

use super::error::SinkError;
use super::sink::{AudioSink, SinkFormat, SinkProvider};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bytes kept per provider; later writes are counted but discarded.
const CAPTURE_LIMIT: usize = 64 * 1024;

#[derive(Default)]
pub struct MockState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub writes: AtomicUsize,
    pub drains: AtomicUsize,
    /// Most sinks ever open at once.
    pub peak_live: AtomicUsize,
    pub write_after_close: AtomicBool,
    pub captured: Mutex<Vec<u8>>,
}

impl MockState {
    /// Sinks opened but not yet closed.
    pub fn live(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockProvider {
    pub state: Arc<MockState>,
    pub pace: Duration,
    pub fail_open: AtomicBool,
    pub fail_start: AtomicBool,
    /// Writes accepted per sink before every later write fails.
    pub fail_write_after: Option<usize>,
    pub fail_drain: bool,
    pub open_delay: Duration,
    pub drain_delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            pace: Duration::from_millis(1),
            fail_open: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_write_after: None,
            fail_drain: false,
            open_delay: Duration::ZERO,
            drain_delay: Duration::ZERO,
        }
    }
}

impl SinkProvider for MockProvider {
    fn open(&self, _format: &SinkFormat) -> Result<Box<dyn AudioSink>, SinkError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SinkError::DeviceUnavailable("mock device busy".into()));
        }
        std::thread::sleep(self.open_delay);
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state
            .peak_live
            .fetch_max(self.state.live(), Ordering::SeqCst);
        Ok(Box::new(MockSink {
            state: Arc::clone(&self.state),
            pace: self.pace,
            fail_start: self.fail_start.load(Ordering::SeqCst),
            writes_left: self.fail_write_after,
            fail_drain: self.fail_drain,
            drain_delay: self.drain_delay,
            closed: false,
        }))
    }
}

struct MockSink {
    state: Arc<MockState>,
    pace: Duration,
    fail_start: bool,
    writes_left: Option<usize>,
    fail_drain: bool,
    drain_delay: Duration,
    closed: bool,
}

impl AudioSink for MockSink {
    fn start(&mut self) -> Result<(), SinkError> {
        if self.fail_start {
            return Err(SinkError::DeviceUnavailable("mock start failed".into()));
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.closed {
            self.state.write_after_close.store(true, Ordering::SeqCst);
            return Err(SinkError::Closed);
        }
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(SinkError::Write("mock device unplugged".into()));
            }
            *left -= 1;
        }
        std::thread::sleep(self.pace);
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut captured) = self.state.captured.lock() {
            let room = CAPTURE_LIMIT.saturating_sub(captured.len());
            captured.extend_from_slice(&bytes[..room.min(bytes.len())]);
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        self.state.drains.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.drain_delay);
        if self.fail_drain {
            return Err(SinkError::Write("mock device lost during drain".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
