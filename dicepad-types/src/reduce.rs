//! Pure state-mutation reducer for bank actions.
//!
//! The only side channel is the random source, which randomizing actions
//! (mutate, randomize, fill) draw from so seeded sessions stay reproducible.

use crate::action::{ActionOutcome, BankAction, LockParam};
use crate::random::RandomSource;
use crate::state::{Pattern, SampleBank, Step, TrackParams};

/// Apply a `BankAction` to the bank.
pub fn reduce(
    action: &BankAction,
    bank: &mut SampleBank,
    rng: &mut dyn RandomSource,
) -> ActionOutcome {
    match action {
        // Steps
        BankAction::ToggleStep(t, s) => with_step(bank, *t, *s, |step| step.active = !step.active),
        BankAction::SetStepVelocity(t, s, v) => with_step(bank, *t, *s, |step| step.set_velocity(*v)),
        BankAction::SetStepProbability(t, s, p) => {
            with_step(bank, *t, *s, |step| step.set_probability(*p))
        }
        BankAction::SetStepCondition(t, s, c) => with_step(bank, *t, *s, |step| step.condition = *c),
        BankAction::SetStepLock(t, s, param, value) => with_step(bank, *t, *s, |step| {
            let slot = match param {
                LockParam::Pitch => &mut step.locks.pitch,
                LockParam::Volume => &mut step.locks.volume,
                LockParam::FilterCutoff => &mut step.locks.filter_cutoff,
                LockParam::Pan => &mut step.locks.pan,
            };
            *slot = *value;
        }),
        BankAction::SetStepMicroTiming(t, s, m) => {
            with_step(bank, *t, *s, |step| step.set_micro_timing(*m))
        }
        BankAction::SetStepVariation(t, s, v) => with_step(bank, *t, *s, |step| {
            step.variation.pitch = v.pitch.max(0.0);
            step.variation.volume = v.volume.max(0.0);
            step.variation.timing = v.timing.max(0.0);
        }),
        BankAction::ResetStep(t, s) => with_step(bank, *t, *s, Step::reset),
        BankAction::ClearTrack(t) => {
            if *t >= crate::NUM_TRACKS {
                return ActionOutcome::Ignored;
            }
            with_pattern(bank, |p| p.clear_track(*t))
        }
        BankAction::ClearPattern => with_pattern(bank, Pattern::clear_all_steps),

        // Generative
        BankAction::ApplyEuclidean {
            track,
            hits,
            steps,
            rotation,
        } => {
            if *track >= crate::NUM_TRACKS {
                return ActionOutcome::Ignored;
            }
            with_pattern(bank, |p| p.apply_euclidean(*track, *hits, *steps, *rotation))
        }
        BankAction::SetEuclideanSettings(settings) => with_pattern(bank, |p| p.euclidean = *settings),
        BankAction::ApplyEuclideanSettings(track) => {
            if *track >= crate::NUM_TRACKS {
                return ActionOutcome::Ignored;
            }
            with_pattern(bank, |p| p.apply_euclidean_settings(*track))
        }
        BankAction::MutatePattern => with_pattern(bank, |p| {
            let changed = p.mutate(rng);
            log::debug!(target: "bank", "mutated {} steps", changed);
        }),
        BankAction::RandomizePattern(density) => with_pattern(bank, |p| p.randomize(*density, rng)),
        BankAction::ApplyFill => with_pattern(bank, |p| {
            let added = p.apply_fill(rng);
            log::debug!(target: "bank", "fill added {} steps", added);
        }),

        // Current pattern settings
        BankAction::SetPatternLength(len) => with_pattern(bank, |p| p.set_length(*len)),
        BankAction::SetSwing(swing) => with_pattern(bank, |p| p.set_swing(*swing)),
        BankAction::SetScale(scale) => with_pattern(bank, |p| p.set_scale(*scale)),
        BankAction::SetMutationRate(rate) => with_pattern(bank, |p| p.set_mutation_rate(*rate)),
        BankAction::SetFillProbability(prob) => with_pattern(bank, |p| p.set_fill_probability(*prob)),
        BankAction::SetRepeatCount(n) => with_pattern(bank, |p| p.repeat_count = (*n).max(1)),

        // Pattern selection and chain
        BankAction::SelectPattern(idx) => bank.select_pattern(*idx).into(),
        BankAction::SetChain(chain) => {
            bank.set_chain(chain.clone());
            ActionOutcome::Applied
        }
        BankAction::AppendToChain(idx) => bank.append_to_chain(*idx).into(),
        BankAction::RemoveChainEntry(pos) => {
            if *pos >= bank.chain().len() {
                return ActionOutcome::Ignored;
            }
            bank.remove_chain_entry(*pos);
            ActionOutcome::Applied
        }
        BankAction::ClearChain => {
            bank.clear_chain();
            ActionOutcome::Applied
        }

        // Tracks
        BankAction::SetTrack(t, params) => bank.set_track(*t, (**params).clone()).into(),
        BankAction::SetTrackProbability(t, p) => {
            with_track(bank, *t, |track| track.trigger_probability = p.clamp(0.0, 1.0))
        }
        BankAction::SetTrackVolume(t, v) => with_track(bank, *t, |track| track.volume = v.clamp(0.0, 1.0)),
        BankAction::SetTrackPitch(t, p) => with_track(bank, *t, |track| track.pitch = p.clamp(-24.0, 24.0)),
        BankAction::SetTrackPan(t, p) => with_track(bank, *t, |track| track.pan = p.clamp(-1.0, 1.0)),
        BankAction::ToggleMute(t) => with_track(bank, *t, |track| track.muted = !track.muted),
        BankAction::ToggleSolo(t) => with_track(bank, *t, |track| track.solo = !track.solo),

        // Globals
        BankAction::SetBpm(bpm) => {
            bank.set_bpm(*bpm);
            ActionOutcome::Applied
        }
        BankAction::SetMasterVolume(v) => {
            bank.set_master_volume(*v);
            ActionOutcome::Applied
        }
        BankAction::SetChaos(c) => {
            bank.set_chaos(*c);
            ActionOutcome::Applied
        }
        BankAction::SetBias(b) => {
            bank.set_bias(*b);
            ActionOutcome::Applied
        }
    }
}

fn with_pattern(bank: &mut SampleBank, f: impl FnOnce(&mut Pattern)) -> ActionOutcome {
    match bank.current_pattern_mut() {
        Some(pattern) => {
            f(pattern);
            ActionOutcome::Applied
        }
        None => ActionOutcome::Ignored,
    }
}

fn with_step(
    bank: &mut SampleBank,
    track: usize,
    pos: usize,
    f: impl FnOnce(&mut Step),
) -> ActionOutcome {
    match bank
        .current_pattern_mut()
        .and_then(|p| p.step_mut(track, pos))
    {
        Some(step) => {
            f(step);
            ActionOutcome::Applied
        }
        None => ActionOutcome::Ignored,
    }
}

fn with_track(bank: &mut SampleBank, track: usize, f: impl FnOnce(&mut TrackParams)) -> ActionOutcome {
    match bank.track_mut(track) {
        Some(t) => {
            f(t);
            ActionOutcome::Applied
        }
        None => ActionOutcome::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::StepCondition;
    use crate::random::{SeededRandom, SequenceRandom};
    use crate::state::BankError;

    fn rng() -> SequenceRandom {
        SequenceRandom::new(vec![0.5])
    }

    #[test]
    fn toggle_and_out_of_range() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        assert_eq!(reduce(&BankAction::ToggleStep(0, 4), &mut bank, &mut r), ActionOutcome::Applied);
        assert!(bank.current_pattern().step(0, 4).is_some_and(|s| s.active));
        assert_eq!(reduce(&BankAction::ToggleStep(0, 40), &mut bank, &mut r), ActionOutcome::Ignored);
        assert_eq!(reduce(&BankAction::ClearTrack(99), &mut bank, &mut r), ActionOutcome::Ignored);
    }

    #[test]
    fn step_edits_clamp() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        reduce(&BankAction::SetStepProbability(1, 1, 1.4), &mut bank, &mut r);
        reduce(&BankAction::SetStepVelocity(1, 1, -1.0), &mut bank, &mut r);
        reduce(&BankAction::SetStepCondition(1, 1, StepCondition::OddLoops), &mut bank, &mut r);
        reduce(&BankAction::SetStepLock(1, 1, LockParam::Pan, Some(-0.5)), &mut bank, &mut r);
        let step = bank.current_pattern().step(1, 1).cloned().unwrap_or_default();
        assert_eq!(step.probability, 1.0);
        assert_eq!(step.velocity, 0.0);
        assert_eq!(step.condition, StepCondition::OddLoops);
        assert_eq!(step.locks.pan, Some(-0.5));
    }

    #[test]
    fn select_pattern_rejects_bad_index() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        let out = reduce(&BankAction::SelectPattern(77), &mut bank, &mut r);
        assert!(matches!(out, ActionOutcome::Rejected(BankError::PatternOutOfRange { .. })));
        assert!(reduce(&BankAction::SelectPattern(2), &mut bank, &mut r).is_applied());
        assert_eq!(bank.current_pattern_index(), 2);
    }

    #[test]
    fn edits_target_current_pattern() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        reduce(&BankAction::SelectPattern(1), &mut bank, &mut r);
        reduce(&BankAction::ToggleStep(0, 0), &mut bank, &mut r);
        assert!(bank.pattern(1).and_then(|p| p.step(0, 0)).is_some_and(|s| s.active));
        assert!(!bank.pattern(0).and_then(|p| p.step(0, 0)).is_some_and(|s| s.active));
    }

    #[test]
    fn seeded_mutation_is_reproducible() {
        let mut a = SampleBank::new();
        let mut b = SampleBank::new();
        for bank in [&mut a, &mut b] {
            let mut r = rng();
            reduce(&BankAction::SetMutationRate(0.5), bank, &mut r);
        }
        reduce(&BankAction::MutatePattern, &mut a, &mut SeededRandom::from_seed(77));
        reduce(&BankAction::MutatePattern, &mut b, &mut SeededRandom::from_seed(77));
        assert_eq!(a, b);
        assert_ne!(a.current_pattern(), &Pattern::default());
    }

    #[test]
    fn chain_actions() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        reduce(&BankAction::SetChain(vec![0, 1, 2]), &mut bank, &mut r);
        assert_eq!(reduce(&BankAction::RemoveChainEntry(9), &mut bank, &mut r), ActionOutcome::Ignored);
        reduce(&BankAction::RemoveChainEntry(1), &mut bank, &mut r);
        assert_eq!(bank.chain(), &[0, 2]);
        reduce(&BankAction::ClearChain, &mut bank, &mut r);
        assert_eq!(bank.chain(), &[0]);
    }

    #[test]
    fn track_edits() {
        let mut bank = SampleBank::new();
        let mut r = rng();
        reduce(&BankAction::SetTrackProbability(3, 0.25), &mut bank, &mut r);
        reduce(&BankAction::ToggleMute(3), &mut bank, &mut r);
        let t = bank.track(3).cloned().unwrap_or_default();
        assert_eq!(t.trigger_probability, 0.25);
        assert!(t.muted);
        assert_eq!(reduce(&BankAction::ToggleSolo(16), &mut bank, &mut r), ActionOutcome::Ignored);
    }

    #[test]
    fn timing_actions_flagged() {
        assert!(BankAction::SetBpm(90.0).affects_timing());
        assert!(!BankAction::ToggleStep(0, 0).affects_timing());
    }
}
