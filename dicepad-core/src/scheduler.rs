//! The scheduler thread: a deadline-driven loop that ticks the sequencer.
//!
//! Commands arrive over a crossbeam channel; between commands the loop
//! sleeps in `select!` until the next tick deadline. Bank and sequencer
//! live behind one mutex shared with the handle, so each tick sees a
//! consistent grid and edits land between ticks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use dicepad_types::SampleBank;

use crate::feedback::SequencerFeedback;
use crate::sequencer::Sequencer;
use crate::sink::TriggerSink;
use crate::telemetry::TickTelemetry;

/// How long the loop waits for a command while stopped.
const IDLE_WAIT: Duration = Duration::from_millis(250);

pub(crate) struct EngineState {
    pub bank: SampleBank,
    pub sequencer: Sequencer,
}

pub(crate) type SharedEngine = Arc<Mutex<EngineState>>;

/// Lock the engine, recovering the state if a previous holder panicked.
pub(crate) fn lock(engine: &SharedEngine) -> MutexGuard<'_, EngineState> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) enum SchedulerCmd {
    /// The transport was started under the lock; begin ticking now.
    Start,
    /// The transport was stopped under the lock; silence, drop the
    /// deadline and ack.
    Stop { reply: Sender<()> },
    /// Tempo, swing or scale changed; recompute the pending deadline.
    Rearm,
    /// Exit the loop, cutting voices first if playback was still running.
    Shutdown { silence: bool },
}

pub(crate) struct SchedulerThread {
    engine: SharedEngine,
    sink: Arc<dyn TriggerSink>,
    cmd_rx: Receiver<SchedulerCmd>,
    feedback_tx: Sender<SequencerFeedback>,
    next_tick: Option<Instant>,
    /// Deadline and step of the last tick that ran.
    last_tick: Option<(Instant, usize)>,
    telemetry: TickTelemetry,
    telemetry_interval: Duration,
    last_telemetry: Instant,
}

impl SchedulerThread {
    pub(crate) fn new(
        engine: SharedEngine,
        sink: Arc<dyn TriggerSink>,
        cmd_rx: Receiver<SchedulerCmd>,
        feedback_tx: Sender<SequencerFeedback>,
        telemetry_interval: Duration,
    ) -> Self {
        Self {
            engine,
            sink,
            cmd_rx,
            feedback_tx,
            next_tick: None,
            last_tick: None,
            telemetry: TickTelemetry::new(),
            telemetry_interval,
            last_telemetry: Instant::now(),
        }
    }

    pub(crate) fn run(mut self) {
        log::debug!(target: "scheduler", "scheduler thread started");
        loop {
            let remaining = match self.next_tick {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => IDLE_WAIT,
            };

            crossbeam_channel::select! {
                recv(self.cmd_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break, // handle dropped
                    }
                }
                default(remaining) => {}
            }

            if let Some(deadline) = self.next_tick {
                if Instant::now() >= deadline {
                    self.run_tick(deadline);
                }
            }
            self.maybe_emit_telemetry();
        }
        log::debug!(target: "scheduler", "scheduler thread exiting");
    }

    /// Returns true when the loop should exit.
    fn handle_cmd(&mut self, cmd: SchedulerCmd) -> bool {
        match cmd {
            SchedulerCmd::Start => {
                self.next_tick = Some(Instant::now());
                self.last_tick = None;
                self.send(SequencerFeedback::PlayingChanged(true));
            }
            SchedulerCmd::Stop { reply } => {
                self.sink.silence_all();
                self.next_tick = None;
                self.last_tick = None;
                self.send(SequencerFeedback::PlayingChanged(false));
                let _ = reply.send(());
            }
            SchedulerCmd::Rearm => self.rearm(),
            SchedulerCmd::Shutdown { silence } => {
                if silence {
                    self.sink.silence_all();
                }
                return true;
            }
        }
        false
    }

    /// Re-derive the pending deadline from the current tempo, measured
    /// from the last tick rather than from now.
    fn rearm(&mut self) {
        let bpm = lock(&self.engine).bank.bpm();
        self.send(SequencerFeedback::BpmChanged(bpm));
        let (Some(_), Some((last_at, last_step))) = (self.next_tick, self.last_tick) else {
            return;
        };
        let period = lock(&self.engine).bank.tick_period(last_step);
        let deadline = last_at + period;
        self.next_tick = Some(deadline.max(Instant::now()));
        log::debug!(target: "scheduler", "rearmed at {:.1} bpm, period {:?}", bpm, period);
    }

    fn run_tick(&mut self, deadline: Instant) {
        let started = Instant::now();
        let report = {
            let mut guard = lock(&self.engine);
            let EngineState { bank, sequencer } = &mut *guard;
            sequencer.tick(bank, self.sink.as_ref())
        };
        let Some(report) = report else {
            // stopped between the deadline and the lock
            self.next_tick = None;
            self.last_tick = None;
            return;
        };
        let period = report.period;
        self.telemetry.record(started.elapsed(), period);

        let now = Instant::now();
        let mut next = deadline + period;
        if next <= now {
            if period.is_zero() {
                next = now;
            } else {
                let behind = now.duration_since(next);
                let skipped = behind.as_nanos() / period.as_nanos() + 1;
                next += period.saturating_mul(u32::try_from(skipped).unwrap_or(u32::MAX));
                self.telemetry.record_skipped(u64::try_from(skipped).unwrap_or(u64::MAX));
                log::debug!(target: "scheduler", "fell behind, skipped {} deadlines", skipped);
            }
        }
        self.next_tick = Some(next);
        self.last_tick = Some((deadline, report.step));

        let wrapped = report.wrapped;
        let loop_count = report.loop_count;
        self.send(SequencerFeedback::StepAdvanced {
            step: report.step,
            loop_count,
            fired_tracks: report.fired_tracks,
        });
        if wrapped {
            let pattern = lock(&self.engine).bank.current_pattern_index();
            self.send(SequencerFeedback::LoopCompleted {
                loop_count,
                pattern,
            });
        }
    }

    fn maybe_emit_telemetry(&mut self) {
        if self.telemetry_interval.is_zero() || self.telemetry.window_ticks() == 0 {
            return;
        }
        if self.last_telemetry.elapsed() < self.telemetry_interval {
            return;
        }
        self.last_telemetry = Instant::now();
        let summary = self.telemetry.take_summary();
        log::debug!(
            target: "scheduler",
            "{} ticks, avg {}us max {}us p95 {}us, {} overruns, {} skipped",
            summary.ticks,
            summary.avg_tick_us,
            summary.max_tick_us,
            summary.p95_tick_us,
            summary.overruns,
            summary.skipped_ticks
        );
        self.send(SequencerFeedback::Telemetry(summary));
    }

    /// Non-blocking; a full feedback channel drops the message.
    fn send(&self, msg: SequencerFeedback) {
        if self.feedback_tx.try_send(msg).is_err() {
            log::trace!(target: "scheduler", "feedback channel full");
        }
    }
}
