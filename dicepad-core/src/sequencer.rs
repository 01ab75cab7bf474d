//! Synchronous tick core.
//!
//! The `Sequencer` owns the cursor, loop counter, random source and
//! outcome tracker. It knows nothing about threads or clocks: the
//! scheduler decides when to call `tick`, this decides what sounds.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use dicepad_types::probability::{evaluate_step, should_trigger};
use dicepad_types::{
    ConditionContext, ProbabilityTracker, RandomSource, SampleBank, SeededRandom, Step,
    StepDecision, TrackParams, NUM_TRACKS,
};

use crate::sink::{FilterParams, TriggerCommand, TriggerSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

/// Why a fired step produced no trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitError {
    MissingSource(usize),
}

impl fmt::Display for HitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSource(track) => write!(f, "track {} has no source", track),
        }
    }
}

impl std::error::Error for HitError {}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The step that was evaluated.
    pub step: usize,
    /// Time until the next tick, from the pattern that played this step.
    pub period: Duration,
    /// Loop count after the tick (incremented on wrap).
    pub loop_count: u64,
    pub fired_tracks: Vec<usize>,
    /// The cursor wrapped back to step 0.
    pub wrapped: bool,
    /// The chain moved to a different pattern on wrap.
    pub pattern_changed: bool,
}

pub struct Sequencer {
    state: TransportState,
    current_step: usize,
    loop_count: u64,
    previous_step_fired: bool,
    rng: Box<dyn RandomSource>,
    tracker: ProbabilityTracker,
}

impl Sequencer {
    pub fn new(rng: Box<dyn RandomSource>) -> Self {
        Self {
            state: TransportState::Stopped,
            current_step: 0,
            loop_count: 0,
            previous_step_fired: false,
            rng,
            tracker: ProbabilityTracker::new(),
        }
    }

    /// Seeded from the bank's `random_seed` when set.
    pub fn for_bank(bank: &SampleBank) -> Self {
        Self::new(Box::new(SeededRandom::new(bank.random_seed)))
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Begin playback from step 0. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        self.state = TransportState::Running;
        self.current_step = 0;
        self.loop_count = 0;
        self.previous_step_fired = false;
        log::debug!(target: "sequencer", "transport started");
        true
    }

    /// Halt playback and rewind the cursor. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = TransportState::Stopped;
        self.current_step = 0;
        log::debug!(target: "sequencer", "transport stopped after {} loops", self.loop_count);
        true
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    pub fn tracker(&self) -> &ProbabilityTracker {
        &self.tracker
    }

    pub fn reset_tracker(&mut self) {
        self.tracker.reset();
    }

    /// The random source, for edits that randomize the bank.
    pub fn rng_mut(&mut self) -> &mut dyn RandomSource {
        self.rng.as_mut()
    }

    pub fn set_rng(&mut self, rng: Box<dyn RandomSource>) {
        self.rng = rng;
    }

    /// Evaluate the step under the cursor on every track, emit hits to the
    /// sink and advance. Returns `None` while stopped.
    pub fn tick(&mut self, bank: &mut SampleBank, sink: &dyn TriggerSink) -> Option<TickReport> {
        if !self.is_playing() {
            return None;
        }

        let length = bank.current_pattern().length();
        if self.current_step >= length {
            // pattern was shortened or swapped under the cursor
            self.current_step = 0;
        }
        let step_index = self.current_step;
        let ctx = ConditionContext {
            loop_count: self.loop_count,
            previous_step_fired: self.previous_step_fired,
        };

        let mut fired_tracks = Vec::new();
        let pattern = bank.current_pattern();
        let rng = self.rng.as_mut();
        for track in 0..NUM_TRACKS {
            let Some(step) = pattern.step(track, step_index) else {
                continue;
            };
            let decision = evaluate_step(step, &ctx, bank, rng);
            let probability = match decision {
                StepDecision::Inactive => continue,
                StepDecision::Gated => {
                    self.tracker.record(step_index, false, false, step.probability);
                    continue;
                }
                StepDecision::Missed { probability } => {
                    self.tracker.record(step_index, true, false, probability);
                    continue;
                }
                StepDecision::Fired { probability } => probability,
            };

            let Some(params) = bank.track(track) else {
                continue;
            };
            let fired = bank.is_audible(track)
                && should_trigger(params, rng)
                && emit_hit(track, step_index, step, params, bank, rng, sink);
            self.tracker.record(step_index, true, fired, probability);
            if fired {
                fired_tracks.push(track);
            }
        }
        self.previous_step_fired = !fired_tracks.is_empty();
        let period = bank.tick_period(step_index);

        let mut wrapped = false;
        let mut pattern_changed = false;
        if step_index + 1 >= length {
            self.current_step = 0;
            self.loop_count += 1;
            wrapped = true;
            pattern_changed = bank.advance_chain();
            if pattern_changed {
                log::debug!(
                    target: "sequencer",
                    "chain advanced to pattern {}",
                    bank.current_pattern_index()
                );
            }
        } else {
            self.current_step = step_index + 1;
        }

        Some(TickReport {
            step: step_index,
            period,
            loop_count: self.loop_count,
            fired_tracks,
            wrapped,
            pattern_changed,
        })
    }
}

/// Resolve and send one hit. A panic in the sink or in resolution drops
/// this track's hit only; the rest of the tick carries on.
fn emit_hit(
    track: usize,
    step_index: usize,
    step: &Step,
    params: &TrackParams,
    bank: &SampleBank,
    rng: &mut dyn RandomSource,
    sink: &dyn TriggerSink,
) -> bool {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        resolve_hit(track, step_index, step, params, bank, rng).map(|cmd| sink.trigger(cmd))
    }));
    match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!(target: "sequencer", "skipping hit: {}", e);
            false
        }
        Err(_) => {
            log::warn!(
                target: "sequencer",
                "track {} panicked at step {}, hit dropped",
                track,
                step_index
            );
            false
        }
    }
}

/// Build the trigger for a fired step. Draw order is fixed (source, track
/// volume, step volume, track pitch, step pitch, track timing, step
/// timing) so seeded runs replay exactly.
pub fn resolve_hit(
    track: usize,
    step_index: usize,
    step: &Step,
    params: &TrackParams,
    bank: &SampleBank,
    rng: &mut dyn RandomSource,
) -> Result<TriggerCommand, HitError> {
    let source = params
        .select_source(rng)
        .ok_or(HitError::MissingSource(track))?;

    let base_volume = match step.locks.volume {
        Some(v) => sanitize(v, 0.0, 1.0, params.volume),
        None => params.randomized_volume(rng),
    };
    let velocity = sanitize(step.velocity, 0.0, 1.0, 1.0);
    let volume = sanitize(
        base_volume * velocity + rng.jitter(step.variation.volume),
        0.0,
        1.0,
        0.0,
    ) * bank.master_volume();

    let base_pitch = match step.locks.pitch {
        Some(p) => sanitize(p, -24.0, 24.0, params.pitch),
        None => params.randomized_pitch(rng),
    };
    let pitch = sanitize(base_pitch + rng.jitter(step.variation.pitch), -24.0, 24.0, 0.0);

    let pan = sanitize(step.locks.pan.unwrap_or(params.pan), -1.0, 1.0, 0.0);

    let filter = match step.locks.filter_cutoff {
        Some(cutoff) => Some(FilterParams {
            cutoff: sanitize(cutoff, 20.0, 20_000.0, params.filter.cutoff),
            resonance: params.filter.resonance.clamp(0.0, 1.0),
        }),
        None if params.filter.enabled => Some(FilterParams {
            cutoff: sanitize(params.filter.cutoff, 20.0, 20_000.0, 20_000.0),
            resonance: params.filter.resonance.clamp(0.0, 1.0),
        }),
        None => None,
    };

    let offset = step.micro_timing
        + rng.jitter(params.variation.timing)
        + rng.jitter(step.variation.timing);
    let timing_offset =
        sanitize(offset, -1.0, 1.0, 0.0) as f64 * bank.step_duration().as_secs_f64();

    let mut trim = params.trim;
    trim.normalize();

    Ok(TriggerCommand {
        track,
        step: step_index,
        source,
        volume,
        pitch,
        pan,
        trim_start: trim.start,
        trim_end: trim.end,
        fade_in: params.fade_in.clamp(0.0, 1.0),
        fade_out: params.fade_out.clamp(0.0, 1.0),
        filter,
        playback_mode: params.playback_mode,
        trigger_mode: params.trigger_mode,
        timing_offset,
    })
}

/// Clamp into range; NaN and infinities become `fallback`.
fn sanitize(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback.clamp(lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TestSink;
    use dicepad_types::random::SequenceRandom;
    use dicepad_types::{SourceHandle, StepCondition};

    fn bank_with_sources() -> SampleBank {
        let mut bank = SampleBank::new();
        for t in 0..NUM_TRACKS {
            let params = TrackParams::with_source(format!("pad {}", t), SourceHandle::new(t as u64 + 1));
            bank.set_track(t, params).unwrap();
        }
        bank
    }

    fn activate(bank: &mut SampleBank, track: usize, pos: usize) -> &mut Step {
        let step = bank
            .current_pattern_mut()
            .and_then(|p| p.step_mut(track, pos))
            .unwrap();
        step.active = true;
        step
    }

    /// Panics on every hit for one track, records the rest.
    struct FaultySink {
        bad_track: usize,
        inner: TestSink,
    }

    impl TriggerSink for FaultySink {
        fn trigger(&self, cmd: TriggerCommand) {
            if cmd.track == self.bad_track {
                panic!("sink failure on track {}", cmd.track);
            }
            self.inner.trigger(cmd);
        }
    }

    fn seq(values: Vec<f64>) -> Sequencer {
        let mut s = Sequencer::new(Box::new(SequenceRandom::new(values)));
        s.start();
        s
    }

    #[test]
    fn stopped_tick_does_nothing() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        let sink = TestSink::new();
        let mut s = Sequencer::new(Box::new(SequenceRandom::new(vec![0.0])));
        assert!(s.tick(&mut bank, &sink).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut bank = bank_with_sources();
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        assert!(!s.start());
        s.tick(&mut bank, &sink);
        s.tick(&mut bank, &sink);
        assert_eq!(s.current_step(), 2);
        assert!(s.stop());
        assert!(!s.stop());
        assert_eq!(s.current_step(), 0);
        assert!(s.start());
        assert_eq!(s.loop_count(), 0);
    }

    #[test]
    fn two_hits_in_one_loop() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        activate(&mut bank, 0, 8);
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        let mut fired_at = Vec::new();
        for _ in 0..16 {
            let report = s.tick(&mut bank, &sink).unwrap();
            if report.fired_tracks.contains(&0) {
                fired_at.push(report.step);
            }
        }
        assert_eq!(fired_at, vec![0, 8]);
        assert_eq!(sink.for_track(0).len(), 2);
        assert_eq!(s.loop_count(), 1);
        assert_eq!(s.current_step(), 0);
    }

    #[test]
    fn zero_probability_never_fires() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 2, 0).probability = 0.0;
        let sink = TestSink::new();
        // no draw here is exactly zero, so p = 0 never passes
        let mut s = seq(vec![0.25, 0.75]);
        for _ in 0..64 {
            s.tick(&mut bank, &sink);
        }
        assert!(sink.is_empty());
        assert_eq!(s.tracker().total_attempts(), 4);
        assert_eq!(s.tracker().successful_triggers(), 0);
    }

    #[test]
    fn condition_sees_previous_tick() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        activate(&mut bank, 1, 1).condition = StepCondition::AfterPreviousFired;
        activate(&mut bank, 2, 3).condition = StepCondition::AfterPreviousFired;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        for _ in 0..4 {
            s.tick(&mut bank, &sink);
        }
        assert_eq!(sink.for_track(1).len(), 1);
        assert!(sink.for_track(2).is_empty());
    }

    #[test]
    fn first_loop_condition() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 4, 0).condition = StepCondition::FirstLoop;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        for _ in 0..48 {
            s.tick(&mut bank, &sink);
        }
        assert_eq!(sink.for_track(4).len(), 1);
        assert_eq!(s.loop_count(), 3);
    }

    #[test]
    fn muted_and_sourceless_tracks_are_skipped() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        activate(&mut bank, 1, 0);
        activate(&mut bank, 2, 0);
        bank.track_mut(1).unwrap().muted = true;
        bank.track_mut(2).unwrap().source = None;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        let report = s.tick(&mut bank, &sink).unwrap();
        assert_eq!(report.fired_tracks, vec![0]);
        assert_eq!(sink.len(), 1);
        // both still count as eligible attempts
        assert_eq!(s.tracker().total_attempts(), 3);
    }

    #[test]
    fn solo_silences_others() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        activate(&mut bank, 5, 0);
        bank.track_mut(5).unwrap().solo = true;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        assert_eq!(s.tick(&mut bank, &sink).unwrap().fired_tracks, vec![5]);
    }

    #[test]
    fn track_probability_gates_after_step() {
        let mut bank = bank_with_sources();
        activate(&mut bank, 0, 0);
        bank.track_mut(0).unwrap().trigger_probability = 0.4;
        let sink = TestSink::new();
        // step p = 1 takes no draw; track draw 0.5 > 0.4 fails
        let mut s = seq(vec![0.5]);
        let report = s.tick(&mut bank, &sink).unwrap();
        assert!(report.fired_tracks.is_empty());
        assert!(s.tracker().history()[0].should_have_fired);
        assert!(!s.tracker().history()[0].actually_fired);
    }

    #[test]
    fn locks_override_track_values() {
        let mut bank = bank_with_sources();
        bank.set_master_volume(0.5);
        {
            let track = bank.track_mut(0).unwrap();
            track.volume = 0.8;
            track.pitch = 3.0;
            track.pan = -0.5;
        }
        let step = activate(&mut bank, 0, 0);
        step.velocity = 0.5;
        step.locks.pitch = Some(-7.0);
        step.locks.pan = Some(0.25);
        step.locks.filter_cutoff = Some(1_000.0);
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        s.tick(&mut bank, &sink);
        let cmd = sink.commands().remove(0);
        assert!((cmd.volume - 0.8 * 0.5 * 0.5).abs() < 1e-6);
        assert_eq!(cmd.pitch, -7.0);
        assert_eq!(cmd.pan, 0.25);
        assert_eq!(cmd.filter.map(|f| f.cutoff), Some(1_000.0));
        assert_eq!(cmd.source, SourceHandle::new(1));
    }

    #[test]
    fn malformed_values_are_clamped() {
        let mut bank = bank_with_sources();
        let step = activate(&mut bank, 0, 0);
        step.velocity = 7.0;
        step.locks.volume = Some(f32::NAN);
        step.locks.pitch = Some(100.0);
        step.micro_timing = 3.0;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        s.tick(&mut bank, &sink);
        let cmd = sink.commands().remove(0);
        assert!((0.0..=1.0).contains(&cmd.volume));
        assert_eq!(cmd.pitch, 24.0);
        assert!((cmd.timing_offset - bank.step_duration().as_secs_f64()).abs() < 1e-9);
    }

    #[test]
    fn micro_timing_scales_with_step() {
        let mut bank = bank_with_sources();
        bank.set_bpm(120.0);
        activate(&mut bank, 0, 0).micro_timing = -0.5;
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        s.tick(&mut bank, &sink);
        let cmd = sink.commands().remove(0);
        assert!((cmd.timing_offset + 0.0625).abs() < 1e-9);
    }

    #[test]
    fn wrap_advances_chain() {
        let mut bank = bank_with_sources();
        bank.set_chain(vec![0, 1]);
        if let Some(p) = bank.pattern_mut(1) {
            p.set_length(4);
        }
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        let mut last = None;
        for _ in 0..16 {
            last = s.tick(&mut bank, &sink);
        }
        let report = last.as_ref().unwrap();
        assert!(report.wrapped && report.pattern_changed);
        assert_eq!(bank.current_pattern_index(), 1);
        for _ in 0..4 {
            last = s.tick(&mut bank, &sink);
        }
        assert!(last.unwrap().wrapped);
        assert_eq!(bank.current_pattern_index(), 0);
        assert_eq!(s.loop_count(), 2);
    }

    #[test]
    fn sink_panic_drops_only_that_hit() {
        let mut bank = bank_with_sources();
        for pos in 0..4 {
            activate(&mut bank, 0, pos);
            activate(&mut bank, 1, pos);
            activate(&mut bank, 2, pos);
        }
        let sink = FaultySink {
            bad_track: 1,
            inner: TestSink::new(),
        };
        let mut s = seq(vec![0.5]);
        for step in 0..4 {
            let report = s.tick(&mut bank, &sink).unwrap();
            assert_eq!(report.step, step);
            assert_eq!(report.fired_tracks, vec![0, 2]);
        }
        assert_eq!(sink.inner.for_track(0).len(), 4);
        assert_eq!(sink.inner.for_track(2).len(), 4);
        assert!(sink.inner.for_track(1).is_empty());
        assert_eq!(s.tracker().total_attempts(), 12);
        assert_eq!(s.tracker().successful_triggers(), 8);
        assert!(s.is_playing());
    }

    #[test]
    fn period_comes_from_the_pattern_that_played() {
        let mut bank = bank_with_sources();
        bank.set_chain(vec![0, 1]);
        if let Some(p) = bank.pattern_mut(0) {
            p.set_length(2);
        }
        if let Some(p) = bank.pattern_mut(1) {
            p.set_scale(2.0);
        }
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        let first = s.tick(&mut bank, &sink).unwrap();
        let last = s.tick(&mut bank, &sink).unwrap();
        assert!(last.pattern_changed);
        assert_eq!(bank.current_pattern_index(), 1);
        assert_eq!(last.period, first.period);
        assert!((last.period.as_secs_f64() - 0.125).abs() < 1e-9);
        let next = s.tick(&mut bank, &sink).unwrap();
        assert!((next.period.as_secs_f64() - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn shortened_pattern_resets_cursor() {
        let mut bank = bank_with_sources();
        let sink = TestSink::new();
        let mut s = seq(vec![0.5]);
        for _ in 0..10 {
            s.tick(&mut bank, &sink);
        }
        bank.current_pattern_mut().unwrap().set_length(8);
        let report = s.tick(&mut bank, &sink).unwrap();
        assert_eq!(report.step, 0);
        assert_eq!(s.current_step(), 1);
    }

    #[test]
    fn seeded_runs_replay() {
        let run = || {
            let mut bank = bank_with_sources();
            bank.set_chaos(0.4);
            for t in 0..4 {
                for pos in 0..16 {
                    let step = activate(&mut bank, t, pos);
                    step.probability = 0.5;
                    step.variation.volume = 0.2;
                    step.variation.timing = 0.1;
                }
            }
            let sink = TestSink::new();
            let mut s = Sequencer::new(Box::new(SeededRandom::from_seed(1234)));
            s.start();
            for _ in 0..64 {
                s.tick(&mut bank, &sink);
            }
            sink.commands()
        };
        let a = run();
        assert!(!a.is_empty());
        assert_eq!(a, run());
    }
}
