//! Pattern: the 16-track step grid plus generative settings.

use serde::{Deserialize, Serialize};

use super::step::Step;
use crate::euclidean;
use crate::random::RandomSource;
use crate::{DEFAULT_STEPS, MAX_STEPS, NUM_TRACKS};

/// Stored Euclidean settings, applied on request via `apply_euclidean_settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EuclideanSettings {
    pub enabled: bool,
    pub hits: i32,
    pub rotation: i32,
}

impl Default for EuclideanSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hits: 4,
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Toggle,
    Probability,
    Velocity,
    MicroTiming,
}

impl Mutation {
    const ALL: [Mutation; 4] = [
        Mutation::Toggle,
        Mutation::Probability,
        Mutation::Velocity,
        Mutation::MicroTiming,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    tracks: Vec<Vec<Step>>, // [NUM_TRACKS][length]
    length: usize,
    /// 0.0 = straight, 1.0 = max swing (delays odd-numbered steps)
    pub swing: f32,
    /// Playback speed multiplier (0.25-4.0)
    pub scale: f32,
    pub mutation_rate: f32,
    pub fill_probability: f32,
    pub euclidean: EuclideanSettings,
    /// Times this pattern plays before the chain moves on
    pub repeat_count: u32,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS)
    }
}

impl Pattern {
    /// An empty pattern of `length` steps (clamped to 1..=64).
    pub fn new(length: usize) -> Self {
        let length = length.clamp(1, MAX_STEPS);
        Self {
            name: String::new(),
            tracks: (0..NUM_TRACKS)
                .map(|_| (0..length).map(|_| Step::default()).collect())
                .collect(),
            length,
            swing: 0.0,
            scale: 1.0,
            mutation_rate: 0.0,
            fill_probability: 0.0,
            euclidean: EuclideanSettings::default(),
            repeat_count: 1,
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Resize every track, truncating or padding with empty steps.
    pub fn set_length(&mut self, length: usize) {
        let length = length.clamp(1, MAX_STEPS);
        for track in &mut self.tracks {
            track.resize_with(length, Step::default);
        }
        self.length = length;
    }

    pub fn step(&self, track: usize, pos: usize) -> Option<&Step> {
        self.tracks.get(track).and_then(|t| t.get(pos))
    }

    pub fn step_mut(&mut self, track: usize, pos: usize) -> Option<&mut Step> {
        self.tracks.get_mut(track).and_then(|t| t.get_mut(pos))
    }

    pub fn track(&self, track: usize) -> Option<&[Step]> {
        self.tracks.get(track).map(|t| t.as_slice())
    }

    pub fn set_swing(&mut self, swing: f32) {
        self.swing = swing.clamp(0.0, 1.0);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(0.25, 4.0);
    }

    pub fn set_mutation_rate(&mut self, rate: f32) {
        self.mutation_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_fill_probability(&mut self, probability: f32) {
        self.fill_probability = probability.clamp(0.0, 1.0);
    }

    pub fn active_step_count(&self) -> usize {
        self.tracks.iter().flatten().filter(|s| s.active).count()
    }

    /// Flip a step's active flag. Out-of-range cells are ignored.
    pub fn toggle_step(&mut self, track: usize, pos: usize) {
        if let Some(step) = self.step_mut(track, pos) {
            step.active = !step.active;
        }
    }

    pub fn clear_all_steps(&mut self) {
        for step in self.tracks.iter_mut().flatten() {
            step.active = false;
        }
    }

    pub fn clear_track(&mut self, track: usize) {
        if let Some(steps) = self.tracks.get_mut(track) {
            for step in steps {
                step.active = false;
            }
        }
    }

    /// Overwrite the active flags of positions `0..min(steps, length)` with a
    /// Euclidean rhythm. Positions past `steps` keep their state.
    pub fn apply_euclidean(&mut self, track: usize, hits: i32, steps: i32, rotation: i32) {
        let Some(cells) = self.tracks.get_mut(track) else {
            return;
        };
        let rhythm = euclidean::generate(hits, steps, rotation);
        for (step, hit) in cells.iter_mut().zip(rhythm) {
            step.active = hit;
        }
    }

    /// Apply the stored Euclidean settings across the whole track, if enabled.
    pub fn apply_euclidean_settings(&mut self, track: usize) {
        if !self.euclidean.enabled {
            return;
        }
        let EuclideanSettings { hits, rotation, .. } = self.euclidean;
        self.apply_euclidean(track, hits, self.length as i32, rotation);
    }

    /// Randomly perturb steps. Each step is picked with probability
    /// `mutation_rate` and receives exactly one mutation. Returns the number
    /// of steps changed.
    pub fn mutate(&mut self, rng: &mut dyn RandomSource) -> usize {
        if self.mutation_rate <= 0.0 {
            return 0;
        }
        let rate = self.mutation_rate as f64;
        let mut changed = 0;
        for step in self.tracks.iter_mut().flatten() {
            if rng.next_f64() < rate {
                mutate_step(step, rng);
                changed += 1;
            }
        }
        changed
    }

    /// Re-roll every step: active with probability `density`; fresh hits get
    /// a firm velocity and a near-certain probability.
    pub fn randomize(&mut self, density: f32, rng: &mut dyn RandomSource) {
        let density = density.clamp(0.0, 1.0) as f64;
        for step in self.tracks.iter_mut().flatten() {
            step.active = rng.next_f64() < density;
            if step.active {
                step.velocity = rng.uniform(0.5, 1.0) as f32;
                step.probability = rng.uniform(0.7, 1.0) as f32;
            }
        }
    }

    /// Switch on inactive steps with probability `fill_probability`.
    /// Returns the number of steps added.
    pub fn apply_fill(&mut self, rng: &mut dyn RandomSource) -> usize {
        if self.fill_probability <= 0.0 {
            return 0;
        }
        let p = self.fill_probability as f64;
        let mut added = 0;
        for step in self.tracks.iter_mut().flatten() {
            if !step.active && rng.next_f64() < p {
                step.active = true;
                added += 1;
            }
        }
        added
    }
}

fn mutate_step(step: &mut Step, rng: &mut dyn RandomSource) {
    let kind = Mutation::ALL[rng.index(Mutation::ALL.len())];
    let nudged = match kind {
        Mutation::Toggle => false,
        Mutation::Probability => nudge(&mut step.probability, rng.jitter(0.2), 0.0, 1.0),
        Mutation::Velocity => nudge(&mut step.velocity, rng.jitter(0.2), 0.0, 1.0),
        Mutation::MicroTiming => nudge(&mut step.micro_timing, rng.jitter(0.1), -1.0, 1.0),
    };
    // A nudge pinned against its bound in both directions still has to change the step.
    if !nudged {
        step.active = !step.active;
    }
}

/// Move `value` by `delta` within `lo..=hi`. If the bound swallows the move,
/// try the opposite direction. Returns false when neither direction changes anything.
fn nudge(value: &mut f32, delta: f32, lo: f32, hi: f32) -> bool {
    let old = *value;
    let forward = (old + delta).clamp(lo, hi);
    let next = if forward != old {
        forward
    } else {
        (old - delta).clamp(lo, hi)
    };
    *value = next;
    next != old
}
