//! A single step cell.

use serde::{Deserialize, Serialize};

use crate::probability::StepCondition;

/// Per-step parameter locks. `Some` overrides the track's value for this hit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamLocks {
    /// Semitones, -24..24
    pub pitch: Option<f32>,
    /// 0.0-1.0
    pub volume: Option<f32>,
    /// Hz
    pub filter_cutoff: Option<f32>,
    /// -1.0 (left) to 1.0 (right)
    pub pan: Option<f32>,
}

impl ParamLocks {
    pub fn any(&self) -> bool {
        self.pitch.is_some()
            || self.volume.is_some()
            || self.filter_cutoff.is_some()
            || self.pan.is_some()
    }
}

/// Per-step jitter ranges, added on top of the resolved track value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepVariation {
    /// +/- semitones
    pub pitch: f32,
    /// +/- volume
    pub volume: f32,
    /// +/- fraction of a step
    pub timing: f32,
}

/// One cell of the pattern grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    pub velocity: f32,    // 0.0-1.0, default 1.0
    pub probability: f32, // 0.0-1.0, default 1.0 (always play)
    pub condition: StepCondition,
    pub locks: ParamLocks,
    pub variation: StepVariation,
    /// Offset from the grid in fractions of a step, -1.0..1.0
    pub micro_timing: f32,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            active: false,
            velocity: 1.0,
            probability: 1.0,
            condition: StepCondition::Always,
            locks: ParamLocks::default(),
            variation: StepVariation::default(),
            micro_timing: 0.0,
        }
    }
}

impl Step {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity.clamp(0.0, 1.0);
    }

    pub fn set_probability(&mut self, probability: f32) {
        self.probability = probability.clamp(0.0, 1.0);
    }

    pub fn set_micro_timing(&mut self, offset: f32) {
        self.micro_timing = offset.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_step_is_silent_but_certain() {
        let step = Step::default();
        assert!(!step.active);
        assert_eq!(step.probability, 1.0);
        assert_eq!(step.condition, StepCondition::Always);
        assert!(!step.locks.any());
    }

    #[test]
    fn setters_clamp() {
        let mut step = Step::default();
        step.set_velocity(1.7);
        step.set_probability(-0.3);
        step.set_micro_timing(-4.0);
        assert_eq!(step.velocity, 1.0);
        assert_eq!(step.probability, 0.0);
        assert_eq!(step.micro_timing, -1.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut step = Step::default();
        step.active = true;
        step.locks.pan = Some(0.5);
        step.condition = StepCondition::EveryNthLoop(3);
        step.reset();
        assert_eq!(step, Step::default());
    }
}
