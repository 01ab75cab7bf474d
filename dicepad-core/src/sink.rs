//! Trigger sinks: where resolved hits go.
//!
//! The sequencer never plays audio itself. Each fired step becomes a
//! `TriggerCommand` handed to a `TriggerSink`, which must return quickly;
//! the scheduler calls it while holding the engine lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use dicepad_types::{PlaybackMode, SourceHandle, TriggerMode};

/// Filter parameters carried with a hit when the track filter is enabled
/// or the step locks a cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub cutoff: f32,    // Hz
    pub resonance: f32, // 0.0-1.0
}

/// A fully resolved hit.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCommand {
    pub track: usize,
    pub step: usize,
    pub source: SourceHandle,
    pub volume: f32, // 0.0-1.0, master volume applied
    pub pitch: f32,  // semitones
    pub pan: f32,    // -1.0 to 1.0
    pub trim_start: f64,
    pub trim_end: f64,
    pub fade_in: f32,
    pub fade_out: f32,
    pub filter: Option<FilterParams>,
    pub playback_mode: PlaybackMode,
    pub trigger_mode: TriggerMode,
    /// Offset from the nominal tick time, in seconds. Negative is early.
    pub timing_offset: f64,
}

/// Receives hits from the scheduler thread.
pub trait TriggerSink: Send + Sync {
    fn trigger(&self, cmd: TriggerCommand);

    /// Cut every sounding voice. Called once when playback stops.
    fn silence_all(&self) {}
}

/// Discards every hit.
#[derive(Debug, Default)]
pub struct NullSink;

impl TriggerSink for NullSink {
    fn trigger(&self, _cmd: TriggerCommand) {}
}

/// Forwards hits over a bounded channel. A full channel drops the hit
/// instead of blocking the tick.
pub struct ChannelSink {
    tx: Sender<TriggerCommand>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<TriggerCommand>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Hits lost to a full or disconnected channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TriggerSink for ChannelSink {
    fn trigger(&self, cmd: TriggerCommand) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(target: "sink", "channel full, dropped hit on track {} ({} total)", cmd.track, n);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!(target: "sink", "receiver gone, hit dropped");
            }
        }
    }
}

/// Records every hit and silence request for inspection in tests.
#[derive(Debug, Default)]
pub struct TestSink {
    commands: Mutex<Vec<TriggerCommand>>,
    silenced: AtomicUsize,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<TriggerCommand> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn for_track(&self, track: usize) -> Vec<TriggerCommand> {
        self.lock()
            .iter()
            .filter(|c| c.track == track)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// How many times `silence_all` was called.
    pub fn silence_count(&self) -> usize {
        self.silenced.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TriggerCommand>> {
        self.commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TriggerSink for TestSink {
    fn trigger(&self, cmd: TriggerCommand) {
        self.lock().push(cmd);
    }

    fn silence_all(&self) {
        self.silenced.fetch_add(1, Ordering::SeqCst);
    }
}
