//! Step gating: conditions and probability draws.
//!
//! Evaluation is stateless. The scheduler builds a `ConditionContext` each
//! tick and asks whether a step should sound; nothing here is retained
//! between ticks.

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;
use crate::state::{SampleBank, Step, TrackParams};

/// Extra gate evaluated before the probability draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepCondition {
    #[default]
    Always,
    Never,
    FirstLoop,
    NotFirstLoop,
    EvenLoops,
    OddLoops,
    /// Fires only if any track fired on the previous step.
    AfterPreviousFired,
    /// Fires only if no track fired on the previous step.
    AfterPreviousSkipped,
    /// Fires on loops 0, n, 2n, ... A zero period never fires.
    EveryNthLoop(u32),
}

impl StepCondition {
    /// All condition kinds, for cycling in an editor. `EveryNthLoop` appears with n = 2.
    pub fn all() -> &'static [StepCondition] {
        &[
            StepCondition::Always,
            StepCondition::Never,
            StepCondition::FirstLoop,
            StepCondition::NotFirstLoop,
            StepCondition::EvenLoops,
            StepCondition::OddLoops,
            StepCondition::AfterPreviousFired,
            StepCondition::AfterPreviousSkipped,
            StepCondition::EveryNthLoop(2),
        ]
    }

    pub fn passes(self, ctx: &ConditionContext) -> bool {
        let n = ctx.loop_count;
        match self {
            StepCondition::Always => true,
            StepCondition::Never => false,
            StepCondition::FirstLoop => n == 0,
            StepCondition::NotFirstLoop => n > 0,
            StepCondition::EvenLoops => n % 2 == 0,
            StepCondition::OddLoops => n % 2 == 1,
            StepCondition::AfterPreviousFired => ctx.previous_step_fired,
            StepCondition::AfterPreviousSkipped => !ctx.previous_step_fired,
            StepCondition::EveryNthLoop(0) => false,
            StepCondition::EveryNthLoop(period) => n % period as u64 == 0,
        }
    }

    /// Short label for displays.
    pub fn name(self) -> String {
        match self {
            StepCondition::Always => "ALWAYS".into(),
            StepCondition::Never => "NEVER".into(),
            StepCondition::FirstLoop => "1ST".into(),
            StepCondition::NotFirstLoop => "!1ST".into(),
            StepCondition::EvenLoops => "EVEN".into(),
            StepCondition::OddLoops => "ODD".into(),
            StepCondition::AfterPreviousFired => "PRE".into(),
            StepCondition::AfterPreviousSkipped => "!PRE".into(),
            StepCondition::EveryNthLoop(n) => format!("1:{n}"),
        }
    }
}

/// Loop position and previous-tick outcome seen by condition gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionContext {
    /// Completed loops of the pattern since the transport started.
    pub loop_count: u64,
    /// Whether any track fired on the immediately preceding tick.
    pub previous_step_fired: bool,
}

/// Outcome of evaluating one step on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    /// Step is switched off; nothing is recorded.
    Inactive,
    /// Condition gate closed; the step was not eligible.
    Gated,
    /// Eligible, but the probability draw failed.
    Missed { probability: f32 },
    /// Eligible and the draw passed.
    Fired { probability: f32 },
}

impl StepDecision {
    pub fn eligible(&self) -> bool {
        matches!(self, StepDecision::Missed { .. } | StepDecision::Fired { .. })
    }

    pub fn fired(&self) -> bool {
        matches!(self, StepDecision::Fired { .. })
    }
}

/// Threshold rule shared by step and track gates: certain probabilities
/// pass without a draw, everything else passes when `r <= probability`.
pub fn passes_probability(probability: f32, rng: &mut dyn RandomSource) -> bool {
    if probability >= 1.0 {
        return true;
    }
    let r = rng.next_f64();
    r <= probability as f64
}

/// Track-level gate on `trigger_probability`.
pub fn should_trigger(track: &TrackParams, rng: &mut dyn RandomSource) -> bool {
    passes_probability(track.trigger_probability, rng)
}

/// Full step-level decision: active flag, condition, then the chaos-adjusted draw.
pub fn evaluate_step(
    step: &Step,
    ctx: &ConditionContext,
    bank: &SampleBank,
    rng: &mut dyn RandomSource,
) -> StepDecision {
    if !step.active {
        return StepDecision::Inactive;
    }
    if !step.condition.passes(ctx) {
        return StepDecision::Gated;
    }
    let probability = bank.apply_chaos(step.probability, rng);
    if passes_probability(probability, rng) {
        StepDecision::Fired { probability }
    } else {
        StepDecision::Missed { probability }
    }
}
