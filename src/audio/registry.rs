//! Registry of sounding notes.
//!
//! Maps each held key to its running voice, at most one voice per key. A
//! key's entry lives from the moment its output line is being acquired until
//! that line has been released, so the registry is empty exactly when no
//! key holds a device handle.

use super::error::{SinkError, ToneError};
use super::sink::SinkProvider;
use super::voice::{FaultHandler, Voice, VoiceId};
use crate::config::{ConfigError, EngineConfig};
use crate::keys::NoteId;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

/// Result of a successful `begin_tone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// A new voice was started.
    Started,
    /// The key was already sounding (or being started); nothing changed.
    AlreadyActive,
}

/// Result of `end_tone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// The voice was stopped and its output line released.
    Stopped,
    /// No voice was sounding for the key.
    NotActive,
}

/// Per-key registry entry.
enum Slot {
    /// A press is acquiring an output line for the key.
    Opening,
    /// The voice being opened failed before it could be registered.
    Failed(VoiceId),
    /// The key is sounding.
    Active(Voice),
    /// The voice is draining and releasing its output line.
    Releasing(VoiceId),
}

impl Slot {
    /// True while the slot owns an open output line.
    fn holds_line(&self) -> bool {
        matches!(self, Slot::Active(_) | Slot::Releasing(_))
    }

    /// True while another call is mid-transition on this key.
    fn in_transition(&self) -> bool {
        matches!(self, Slot::Opening | Slot::Failed(_) | Slot::Releasing(_))
    }
}

type SlotMap = HashMap<NoteId, Slot>;

/// Slot map plus a condition variable signalled on every transition.
struct Slots {
    map: Mutex<SlotMap>,
    changed: Condvar,
}

impl Slots {
    /// Locks the map, recovering it if a thread panicked while holding the lock.
    ///
    /// Every mutation is a single insert or remove, so the map is never left
    /// half-updated.
    fn lock(&self) -> MutexGuard<'_, SlotMap> {
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotMap>) -> MutexGuard<'a, SlotMap> {
        self.changed
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits until no call is mid-transition on `note`.
    fn settle<'a>(
        &self,
        mut guard: MutexGuard<'a, SlotMap>,
        note: NoteId,
    ) -> MutexGuard<'a, SlotMap> {
        while guard.get(&note).is_some_and(Slot::in_transition) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Removes `note` if it is still releasing the given voice.
    fn finish_release(&self, note: NoteId, released: VoiceId) {
        let mut map = self.lock();
        if matches!(map.get(&note), Some(Slot::Releasing(id)) if *id == released) {
            map.remove(&note);
        }
        self.changed.notify_all();
    }
}

/// Process-wide mapping from held keys to their voices.
///
/// Safe to call from any thread. The lock is never held while a device is
/// opened or a voice thread is joined; instead a key in transition is marked
/// `Opening` or `Releasing`, and other calls for that same key wait for the
/// transition to finish. Calls for different keys never wait on each other.
pub struct VoiceRegistry {
    slots: Arc<Slots>,
    config: EngineConfig,
    provider: Arc<dyn SinkProvider>,
}

impl VoiceRegistry {
    /// Creates an empty registry that opens output lines via `provider`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `config` fails validation.
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn SinkProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            slots: Arc::new(Slots {
                map: Mutex::new(HashMap::new()),
                changed: Condvar::new(),
            }),
            config,
            provider,
        })
    }

    /// The configuration voices are started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a tone for `note` unless one is already sounding.
    ///
    /// If the key is still releasing a previous voice, waits until that
    /// voice's output line is closed before opening a new one.
    ///
    /// # Errors
    ///
    /// Returns `ToneError::DeviceUnavailable` if no output line could be
    /// acquired, or `ToneError::InvalidFrequency`. No entry is registered
    /// on error.
    pub fn begin_tone(&self, note: NoteId, frequency: f64) -> Result<BeginOutcome, ToneError> {
        let mut map = self.slots.lock();
        loop {
            match map.get(&note) {
                None => break,
                Some(Slot::Active(_)) | Some(Slot::Opening) => {
                    tracing::debug!(%note, "key already sounding, ignoring press");
                    return Ok(BeginOutcome::AlreadyActive);
                }
                Some(Slot::Releasing(_)) | Some(Slot::Failed(_)) => {}
            }
            map = self.slots.wait(map);
        }
        map.insert(note, Slot::Opening);
        drop(map);

        let started = Voice::start(
            note,
            frequency,
            &self.config,
            Arc::clone(&self.provider),
            fault_handler(Arc::downgrade(&self.slots), note),
        );

        let mut map = self.slots.lock();
        let voice = match started {
            Ok(voice) => voice,
            Err(e) => {
                map.remove(&note);
                self.slots.changed.notify_all();
                return Err(e);
            }
        };

        if matches!(map.get(&note), Some(Slot::Failed(id)) if *id == voice.id()) {
            map.remove(&note);
            self.slots.changed.notify_all();
            drop(map);
            // The voice already closed its line; this only reaps the thread.
            drop(voice);
            return Err(ToneError::DeviceUnavailable(SinkError::Write(
                "output line failed while starting".into(),
            )));
        }

        map.insert(note, Slot::Active(voice));
        self.slots.changed.notify_all();
        Ok(BeginOutcome::Started)
    }

    /// Stops the tone for `note`, returning once its output line is released.
    ///
    /// Releasing a key that is not sounding is tolerated and does nothing.
    /// Releasing a key that is still being started waits for the start to
    /// finish, then stops it.
    pub fn end_tone(&self, note: NoteId) -> EndOutcome {
        let mut map = self.slots.settle(self.slots.lock(), note);
        let voice = match map.remove(&note) {
            Some(Slot::Active(voice)) => voice,
            other => {
                if let Some(slot) = other {
                    map.insert(note, slot);
                }
                tracing::debug!(%note, "release for a key that is not sounding");
                return EndOutcome::NotActive;
            }
        };
        let id = voice.id();
        map.insert(note, Slot::Releasing(id));
        drop(map);

        voice.stop();
        self.slots.finish_release(note, id);
        EndOutcome::Stopped
    }

    /// Stops every sounding voice.
    ///
    /// # Returns
    ///
    /// The number of voices stopped
    pub fn release_all(&self) -> usize {
        let releasing: Vec<(NoteId, Voice)> = {
            let mut map = self.slots.lock();
            let notes: Vec<NoteId> = map
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
                .map(|(note, _)| *note)
                .collect();
            notes
                .into_iter()
                .filter_map(|note| match map.remove(&note) {
                    Some(Slot::Active(voice)) => {
                        map.insert(note, Slot::Releasing(voice.id()));
                        Some((note, voice))
                    }
                    _ => None,
                })
                .collect()
        };

        let count = releasing.len();
        for (note, voice) in releasing {
            let id = voice.id();
            voice.stop();
            self.slots.finish_release(note, id);
        }
        if count > 0 {
            tracing::debug!(count, "released all voices");
        }
        count
    }

    /// Returns true if `note` holds an output line.
    pub fn is_active(&self, note: NoteId) -> bool {
        self.slots.lock().get(&note).is_some_and(Slot::holds_line)
    }

    /// Keys holding an output line, in ascending order.
    pub fn active_notes(&self) -> Vec<NoteId> {
        let mut notes: Vec<NoteId> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.holds_line())
            .map(|(note, _)| *note)
            .collect();
        notes.sort();
        notes
    }

    /// Number of keys holding an output line.
    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.holds_line()).count()
    }

    /// Returns true if no key holds an output line.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for VoiceRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Builds the callback a voice runs when its output line fails.
///
/// Removes the entry only if it still belongs to the failed voice; a stale
/// report from a voice that is already being released is ignored. A failure
/// before registration marks the key so the pending `begin_tone` can report it.
fn fault_handler(slots: Weak<Slots>, note: NoteId) -> FaultHandler {
    Box::new(move |failed: VoiceId| {
        let Some(slots) = slots.upgrade() else {
            return;
        };
        let mut map = slots.lock();
        match map.get(&note) {
            Some(Slot::Active(voice)) if voice.id() == failed => {
                // Dropped on its own thread, so the handle detaches instead of joining.
                map.remove(&note);
                tracing::warn!(%note, id = %failed, "removed voice after output failure");
            }
            Some(Slot::Opening) => {
                map.insert(note, Slot::Failed(failed));
            }
            _ => {}
        }
        slots.changed.notify_all();
    })
}
