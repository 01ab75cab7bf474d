//! SampleBank: tracks, patterns, chain, tempo and global randomness.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pattern::Pattern;
use super::track::TrackParams;
use crate::random::RandomSource;
use crate::{DEFAULT_STEPS, MAX_BPM, MIN_BPM, NUM_PATTERNS, NUM_TRACKS};

/// Played when the pattern index is somehow invalid.
static EMPTY_PATTERN: LazyLock<Pattern> = LazyLock::new(|| Pattern::new(DEFAULT_STEPS));

/// How far a full bias swings the effective probability.
const BIAS_WEIGHT: f32 = 0.2;

/// Errors from bank operations that callers may want to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    PatternOutOfRange { index: usize, len: usize },
    TrackOutOfRange(usize),
    /// A bank always keeps at least one pattern.
    LastPattern,
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PatternOutOfRange { index, len } => {
                write!(f, "pattern {} out of range (bank has {})", index, len)
            }
            Self::TrackOutOfRange(t) => write!(f, "track {} out of range", t),
            Self::LastPattern => write!(f, "cannot remove the last pattern"),
        }
    }
}

impl std::error::Error for BankError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBank {
    pub name: String,
    tracks: [TrackParams; NUM_TRACKS],
    patterns: Vec<Pattern>,
    current_pattern: usize,
    /// Ordered pattern indices; never empty
    chain: Vec<usize>,
    #[serde(skip)]
    chain_position: usize,
    #[serde(skip)]
    repeats_played: u32,
    bpm: f32,
    master_volume: f32,
    global_chaos: f32,
    probability_bias: f32,
    /// When set, the engine seeds its random source from this value.
    pub random_seed: Option<u64>,
}

impl Default for SampleBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBank {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            tracks: std::array::from_fn(|_| TrackParams::default()),
            patterns: (0..NUM_PATTERNS).map(|_| Pattern::new(DEFAULT_STEPS)).collect(),
            current_pattern: 0,
            chain: vec![0],
            chain_position: 0,
            repeats_played: 0,
            bpm: 120.0,
            master_volume: 1.0,
            global_chaos: 0.0,
            probability_bias: 0.0,
            random_seed: None,
        }
    }

    // ── Tracks ───────────────────────────────────────────────────

    pub fn tracks(&self) -> &[TrackParams] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&TrackParams> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut TrackParams> {
        self.tracks.get_mut(index)
    }

    /// Replace a track's parameters, normalizing them first.
    pub fn set_track(&mut self, index: usize, mut params: TrackParams) -> Result<(), BankError> {
        let slot = self
            .tracks
            .get_mut(index)
            .ok_or(BankError::TrackOutOfRange(index))?;
        params.normalize();
        *slot = params;
        Ok(())
    }

    /// Not muted, and soloed whenever any track is soloed.
    pub fn is_audible(&self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };
        if track.muted {
            return false;
        }
        let any_solo = self.tracks.iter().any(|t| t.solo);
        !any_solo || track.solo
    }

    // ── Patterns ─────────────────────────────────────────────────

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    pub fn pattern_mut(&mut self, index: usize) -> Option<&mut Pattern> {
        self.patterns.get_mut(index)
    }

    pub fn current_pattern_index(&self) -> usize {
        self.current_pattern
    }

    pub fn current_pattern(&self) -> &Pattern {
        self.patterns
            .get(self.current_pattern)
            .unwrap_or(&EMPTY_PATTERN)
    }

    pub fn current_pattern_mut(&mut self) -> Option<&mut Pattern> {
        self.patterns.get_mut(self.current_pattern)
    }

    /// Make `index` the playing pattern. A single-entry chain follows the
    /// selection; a longer chain jumps to the entry's first occurrence.
    pub fn select_pattern(&mut self, index: usize) -> Result<(), BankError> {
        self.check_pattern(index)?;
        self.current_pattern = index;
        self.repeats_played = 0;
        if self.chain.len() == 1 {
            self.chain[0] = index;
            self.chain_position = 0;
        } else if let Some(pos) = self.chain.iter().position(|&p| p == index) {
            self.chain_position = pos;
        }
        Ok(())
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> usize {
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    /// Remove a pattern, re-pointing the selection and chain at surviving indices.
    pub fn remove_pattern(&mut self, index: usize) -> Result<Pattern, BankError> {
        self.check_pattern(index)?;
        if self.patterns.len() == 1 {
            return Err(BankError::LastPattern);
        }
        let removed = self.patterns.remove(index);
        if self.current_pattern > index || self.current_pattern >= self.patterns.len() {
            self.current_pattern = self.current_pattern.saturating_sub(1);
        }
        self.chain.retain(|&p| p != index);
        for p in &mut self.chain {
            if *p > index {
                *p -= 1;
            }
        }
        if let Some(pos) = self.chain.iter().position(|&p| p == self.current_pattern) {
            self.chain_position = pos;
        }
        self.ensure_chain();
        Ok(removed)
    }

    fn check_pattern(&self, index: usize) -> Result<(), BankError> {
        if index < self.patterns.len() {
            Ok(())
        } else {
            Err(BankError::PatternOutOfRange {
                index,
                len: self.patterns.len(),
            })
        }
    }

    // ── Chain ────────────────────────────────────────────────────

    pub fn chain(&self) -> &[usize] {
        &self.chain
    }

    pub fn chain_position(&self) -> usize {
        self.chain_position
    }

    /// Replace the chain and restart it from its first entry. Invalid
    /// indices are dropped; an empty result falls back to the current pattern.
    pub fn set_chain(&mut self, chain: Vec<usize>) {
        let len = self.patterns.len();
        self.chain = chain.into_iter().filter(|&p| p < len).collect();
        self.chain_position = 0;
        self.repeats_played = 0;
        if let Some(&first) = self.chain.first() {
            self.current_pattern = first;
        }
        self.ensure_chain();
    }

    pub fn append_to_chain(&mut self, index: usize) -> Result<(), BankError> {
        self.check_pattern(index)?;
        self.chain.push(index);
        Ok(())
    }

    /// Remove the chain entry at `position`. Out of range is ignored.
    pub fn remove_chain_entry(&mut self, position: usize) {
        if position >= self.chain.len() {
            return;
        }
        self.chain.remove(position);
        if self.chain_position > position {
            self.chain_position -= 1;
        }
        self.ensure_chain();
    }

    pub fn clear_chain(&mut self) {
        self.chain.clear();
        self.ensure_chain();
    }

    fn ensure_chain(&mut self) {
        if self.chain.is_empty() {
            self.chain.push(self.current_pattern);
        }
        if self.chain_position >= self.chain.len() {
            self.chain_position = 0;
        }
    }

    /// Called when the playing pattern wraps. Honours the pattern's
    /// `repeat_count`, then moves to the next chain entry. Returns true when
    /// the current pattern changed.
    pub fn advance_chain(&mut self) -> bool {
        self.repeats_played += 1;
        if self.repeats_played < self.current_pattern().repeat_count.max(1) {
            return false;
        }
        self.repeats_played = 0;
        if self.chain.len() <= 1 {
            return false;
        }
        self.chain_position = (self.chain_position + 1) % self.chain.len();
        let next = self.chain[self.chain_position];
        if next < self.patterns.len() && next != self.current_pattern {
            self.current_pattern = next;
            true
        } else {
            false
        }
    }

    // ── Tempo and globals ────────────────────────────────────────

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn global_chaos(&self) -> f32 {
        self.global_chaos
    }

    pub fn set_chaos(&mut self, chaos: f32) {
        self.global_chaos = chaos.clamp(0.0, 1.0);
    }

    pub fn probability_bias(&self) -> f32 {
        self.probability_bias
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.probability_bias = bias.clamp(-1.0, 1.0);
    }

    /// One sixteenth note at the current tempo.
    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.bpm as f64 * 4.0))
    }

    /// Time from the tick at `step` to the next one, with the current
    /// pattern's speed scale and swing applied. Swing lengthens the gap
    /// leaving an even step and shortens the one leaving an odd step.
    pub fn tick_period(&self, step: usize) -> Duration {
        let pattern = self.current_pattern();
        let base = self.step_duration().as_secs_f64() / pattern.scale.clamp(0.25, 4.0) as f64;
        let swing = pattern.swing.clamp(0.0, 1.0) as f64 * 0.5;
        let factor = if swing == 0.0 {
            1.0
        } else if step % 2 == 0 {
            1.0 + swing
        } else {
            1.0 - swing
        };
        Duration::from_secs_f64(base * factor)
    }

    /// Perturb a step probability by the global chaos and bias. With zero
    /// chaos the input is returned untouched and no draw is taken.
    pub fn apply_chaos(&self, probability: f32, rng: &mut dyn RandomSource) -> f32 {
        if self.global_chaos <= 0.0 {
            return probability;
        }
        let noise = rng.jitter(self.global_chaos);
        (probability + noise + self.probability_bias * BIAS_WEIGHT).clamp(0.0, 1.0)
    }
}
