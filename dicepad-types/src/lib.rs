//! # dicepad-types
//!
//! Data model and decision policy for the dicepad step sequencer.
//! Everything in this crate is plain data plus pure (or RNG-injected)
//! functions; the threaded engine lives in `dicepad-core`.

pub mod action;
pub mod euclidean;
pub mod probability;
pub mod random;
pub mod reduce;
pub mod state;
pub mod tracker;

pub use action::{ActionOutcome, BankAction, LockParam};
pub use probability::{ConditionContext, StepCondition, StepDecision};
pub use random::{RandomSource, SeededRandom};
pub use state::*;
pub use tracker::{OutcomeRecord, ProbabilityTracker};

/// Number of tracks (pads) in every pattern and bank.
pub const NUM_TRACKS: usize = 16;
/// Default number of steps per pattern.
pub const DEFAULT_STEPS: usize = 16;
/// Longest supported pattern.
pub const MAX_STEPS: usize = 64;
/// Number of patterns in a fresh bank.
pub const NUM_PATTERNS: usize = 16;
/// History retained by the probability tracker.
pub const TRACKER_CAPACITY: usize = 256;
pub const MIN_BPM: f32 = 30.0;
pub const MAX_BPM: f32 = 300.0;

/// Opaque reference to an audio source owned by the playback collaborator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SourceHandle(u64);

impl SourceHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "src#{}", self.0)
    }
}
