//! Sequencer state: steps, patterns, track parameters and the bank that owns them.

pub mod bank;
pub mod pattern;
pub mod step;
pub mod track;

pub use bank::{BankError, SampleBank};
pub use pattern::{EuclideanSettings, Pattern};
pub use step::{ParamLocks, Step, StepVariation};
pub use track::{
    FilterSettings, PlaybackMode, SourceVariation, TrackParams, TrackVariation, TriggerMode,
    TrimWindow,
};
