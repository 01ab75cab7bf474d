//! SchedulerHandle: caller-side interface to the sequencer engine.
//!
//! Owns the command/feedback channels and the shared engine state. Ticking
//! happens on the scheduler thread; everything here either takes the
//! engine lock briefly or sends a command.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use dicepad_types::reduce::reduce;
use dicepad_types::{ActionOutcome, BankAction, OutcomeRecord, RandomSource, SampleBank};

use crate::config::EngineConfig;
use crate::feedback::SequencerFeedback;
use crate::scheduler::{lock, EngineState, SchedulerCmd, SchedulerThread, SharedEngine};
use crate::sequencer::Sequencer;
use crate::sink::TriggerSink;

/// Upper bound on waiting for the thread to acknowledge a stop.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(1);

pub struct SchedulerHandle {
    engine: SharedEngine,
    cmd_tx: Sender<SchedulerCmd>,
    feedback_rx: Receiver<SequencerFeedback>,
    join_handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Spawn the scheduler thread. The random source is seeded from the
    /// bank's `random_seed` when set.
    pub fn new(bank: SampleBank, sink: Arc<dyn TriggerSink>, config: &EngineConfig) -> Self {
        let sequencer = Sequencer::for_bank(&bank);
        Self::with_sequencer(bank, sequencer, sink, config)
    }

    /// Spawn with an explicit random source.
    pub fn with_random(
        bank: SampleBank,
        rng: Box<dyn RandomSource>,
        sink: Arc<dyn TriggerSink>,
        config: &EngineConfig,
    ) -> Self {
        Self::with_sequencer(bank, Sequencer::new(rng), sink, config)
    }

    fn with_sequencer(
        bank: SampleBank,
        sequencer: Sequencer,
        sink: Arc<dyn TriggerSink>,
        config: &EngineConfig,
    ) -> Self {
        let engine: SharedEngine = Arc::new(Mutex::new(EngineState { bank, sequencer }));
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (feedback_tx, feedback_rx) = crossbeam_channel::bounded(config.feedback_capacity.max(1));

        let thread_engine = Arc::clone(&engine);
        let telemetry_interval = config.telemetry_interval;
        let join_handle = thread::Builder::new()
            .name("dicepad-scheduler".into())
            .spawn(move || {
                SchedulerThread::new(thread_engine, sink, cmd_rx, feedback_tx, telemetry_interval)
                    .run();
            });
        let join_handle = match join_handle {
            Ok(h) => Some(h),
            Err(e) => {
                log::error!(target: "scheduler", "failed to spawn scheduler thread: {}", e);
                None
            }
        };

        Self {
            engine,
            cmd_tx,
            feedback_rx,
            join_handle,
        }
    }

    /// Fire-and-forget: log if the scheduler thread is gone.
    fn send(&self, cmd: SchedulerCmd) {
        if self.cmd_tx.send(cmd).is_err() {
            log::warn!(target: "scheduler", "command dropped: scheduler thread disconnected");
        }
    }

    // ── Transport ────────────────────────────────────────────────

    /// Start playback from step 0. Returns false if already playing.
    pub fn start(&self) -> bool {
        let started = lock(&self.engine).sequencer.start();
        if started {
            self.send(SchedulerCmd::Start);
        }
        started
    }

    /// Stop playback and silence the sink. No trigger is emitted once this
    /// returns. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        let stopped = lock(&self.engine).sequencer.stop();
        if stopped {
            let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
            self.send(SchedulerCmd::Stop { reply: reply_tx });
            if reply_rx.recv_timeout(STOP_ACK_TIMEOUT).is_err() {
                log::warn!(target: "scheduler", "stop was not acknowledged");
            }
        }
        stopped
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.engine).sequencer.is_playing()
    }

    /// Change tempo; takes effect from the next tick. Returns the clamped bpm.
    pub fn set_bpm(&self, bpm: f32) -> f32 {
        let applied = {
            let mut engine = lock(&self.engine);
            engine.bank.set_bpm(bpm);
            engine.bank.bpm()
        };
        self.send(SchedulerCmd::Rearm);
        applied
    }

    // ── Bank edits ───────────────────────────────────────────────

    /// Apply an edit between ticks.
    pub fn dispatch(&self, action: BankAction) -> ActionOutcome {
        let outcome = {
            let mut guard = lock(&self.engine);
            let EngineState { bank, sequencer } = &mut *guard;
            reduce(&action, bank, sequencer.rng_mut())
        };
        match &outcome {
            ActionOutcome::Applied if action.affects_timing() => self.send(SchedulerCmd::Rearm),
            ActionOutcome::Rejected(e) => {
                log::debug!(target: "scheduler", "{:?} rejected: {}", action, e)
            }
            _ => {}
        }
        outcome
    }

    /// Read the bank under the engine lock.
    pub fn with_bank<R>(&self, f: impl FnOnce(&SampleBank) -> R) -> R {
        f(&lock(&self.engine).bank)
    }

    pub fn bank_snapshot(&self) -> SampleBank {
        self.with_bank(SampleBank::clone)
    }

    /// Replace the whole bank. Stops playback first.
    pub fn load_bank(&self, bank: SampleBank) {
        self.stop();
        let mut engine = lock(&self.engine);
        engine.sequencer = Sequencer::for_bank(&bank);
        engine.bank = bank;
    }

    // ── Position ─────────────────────────────────────────────────

    /// The step the next tick will evaluate.
    pub fn current_step(&self) -> usize {
        lock(&self.engine).sequencer.current_step()
    }

    pub fn loop_count(&self) -> u64 {
        lock(&self.engine).sequencer.loop_count()
    }

    // ── Tracker ──────────────────────────────────────────────────

    pub fn heat_map(&self) -> BTreeMap<usize, f32> {
        lock(&self.engine).sequencer.tracker().heat_map()
    }

    pub fn success_rate(&self) -> f32 {
        lock(&self.engine).sequencer.tracker().success_rate()
    }

    pub fn history(&self) -> Vec<OutcomeRecord> {
        lock(&self.engine).sequencer.tracker().history().to_vec()
    }

    pub fn reset_tracker(&self) {
        lock(&self.engine).sequencer.reset_tracker();
    }

    // ── Feedback ─────────────────────────────────────────────────

    pub fn drain_feedback(&self) -> Vec<SequencerFeedback> {
        self.feedback_rx.try_iter().collect()
    }

    /// For callers that want to block or `select!` on feedback.
    pub fn feedback(&self) -> &Receiver<SequencerFeedback> {
        &self.feedback_rx
    }

    /// Stop the thread and wait for it. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        let was_playing = lock(&self.engine).sequencer.stop();
        let _ = self.cmd_tx.send(SchedulerCmd::Shutdown {
            silence: was_playing,
        });
        if handle.join().is_err() {
            log::error!(target: "scheduler", "scheduler thread panicked");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
