//! Messages from the scheduler thread to whoever holds the handle.

use crate::telemetry::TelemetrySummary;

#[derive(Debug, Clone, PartialEq)]
pub enum SequencerFeedback {
    /// A tick ran. `step` is the step that was evaluated.
    StepAdvanced {
        step: usize,
        loop_count: u64,
        fired_tracks: Vec<usize>,
    },
    /// The cursor wrapped; `pattern` is the pattern now playing.
    LoopCompleted { loop_count: u64, pattern: usize },
    PlayingChanged(bool),
    BpmChanged(f32),
    Telemetry(TelemetrySummary),
}
