//! Explicit edit commands for a `SampleBank`.
//!
//! Presentation layers describe what they want changed with a `BankAction`
//! and hand it to the engine, which applies it with `reduce::reduce` between
//! ticks. Step edits address the currently selected pattern.

use serde::{Deserialize, Serialize};

use crate::probability::StepCondition;
use crate::state::{BankError, EuclideanSettings, StepVariation, TrackParams};

/// Which per-step lock an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockParam {
    Pitch,
    Volume,
    FilterCutoff,
    Pan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BankAction {
    // Steps
    ToggleStep(usize, usize),                      // (track, step)
    SetStepVelocity(usize, usize, f32),            // (track, step, velocity)
    SetStepProbability(usize, usize, f32),         // (track, step, probability)
    SetStepCondition(usize, usize, StepCondition), // (track, step, condition)
    SetStepLock(usize, usize, LockParam, Option<f32>),
    SetStepMicroTiming(usize, usize, f32),
    SetStepVariation(usize, usize, StepVariation),
    ResetStep(usize, usize),
    ClearTrack(usize),
    ClearPattern,

    // Generative
    ApplyEuclidean { track: usize, hits: i32, steps: i32, rotation: i32 },
    SetEuclideanSettings(EuclideanSettings),
    /// Apply the stored Euclidean settings to a track
    ApplyEuclideanSettings(usize),
    MutatePattern,
    RandomizePattern(f32), // density
    ApplyFill,

    // Current pattern settings
    SetPatternLength(usize),
    SetSwing(f32),
    SetScale(f32),
    SetMutationRate(f32),
    SetFillProbability(f32),
    SetRepeatCount(u32),

    // Pattern selection and chain
    SelectPattern(usize),
    SetChain(Vec<usize>),
    AppendToChain(usize),
    RemoveChainEntry(usize), // position in chain
    ClearChain,

    // Tracks
    SetTrack(usize, Box<TrackParams>),
    SetTrackProbability(usize, f32),
    SetTrackVolume(usize, f32),
    SetTrackPitch(usize, f32),
    SetTrackPan(usize, f32),
    ToggleMute(usize),
    ToggleSolo(usize),

    // Globals
    SetBpm(f32),
    SetMasterVolume(f32),
    SetChaos(f32),
    SetBias(f32),
}

impl BankAction {
    /// Whether applying this action can change the tick period.
    pub fn affects_timing(&self) -> bool {
        matches!(
            self,
            BankAction::SetBpm(_)
                | BankAction::SetSwing(_)
                | BankAction::SetScale(_)
                | BankAction::SelectPattern(_)
                | BankAction::SetChain(_)
        )
    }
}

/// Result of reducing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Addressed something that does not exist; nothing changed.
    Ignored,
    Rejected(BankError),
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

impl From<Result<(), BankError>> for ActionOutcome {
    fn from(r: Result<(), BankError>) -> Self {
        match r {
            Ok(()) => ActionOutcome::Applied,
            Err(e) => ActionOutcome::Rejected(e),
        }
    }
}
