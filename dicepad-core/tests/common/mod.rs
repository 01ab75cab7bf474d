#![allow(dead_code)]
//! Test harness utilities for dicepad-core integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dicepad_core::{EngineConfig, SchedulerHandle, TestSink, TriggerCommand, TriggerSink};
use dicepad_types::random::SequenceRandom;
use dicepad_types::{SampleBank, SourceHandle, TrackParams, NUM_TRACKS};

/// A bank where every track has a distinct source and nothing is active.
pub fn bank_with_sources() -> SampleBank {
    let mut bank = SampleBank::new();
    for t in 0..NUM_TRACKS {
        let params = TrackParams::with_source(format!("pad {}", t), SourceHandle::new(t as u64 + 1));
        bank.set_track(t, params).unwrap();
    }
    bank
}

/// Switch on steps of the current pattern.
pub fn activate(bank: &mut SampleBank, track: usize, steps: &[usize]) {
    let pattern = bank.current_pattern_mut().unwrap();
    for &pos in steps {
        pattern.step_mut(track, pos).unwrap().active = true;
    }
}

/// Engine config with telemetry off so feedback only carries ticks.
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        telemetry_interval: Duration::ZERO,
        ..EngineConfig::default()
    }
}

/// Spawn a scheduler over `bank` recording into a fresh `TestSink`.
pub fn spawn(bank: SampleBank) -> (SchedulerHandle, Arc<TestSink>) {
    let sink = Arc::new(TestSink::new());
    let handle = SchedulerHandle::with_random(
        bank,
        Box::new(SequenceRandom::new(vec![0.5])),
        sink.clone(),
        &quiet_config(),
    );
    (handle, sink)
}

/// Panics on hits for one track at one step; everything else is recorded.
pub struct FaultySink {
    pub track: usize,
    pub step: usize,
    pub inner: TestSink,
}

impl FaultySink {
    pub fn new(track: usize, step: usize) -> Self {
        Self {
            track,
            step,
            inner: TestSink::new(),
        }
    }
}

impl TriggerSink for FaultySink {
    fn trigger(&self, cmd: TriggerCommand) {
        if cmd.track == self.track && cmd.step == self.step {
            panic!("sink failed on track {} step {}", cmd.track, cmd.step);
        }
        self.inner.trigger(cmd);
    }

    fn silence_all(&self) {
        self.inner.silence_all();
    }
}

/// Poll `cond` every couple of milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
