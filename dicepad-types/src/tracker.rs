//! Probability outcome tracking for diagnostics and heat maps.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::TRACKER_CAPACITY;

/// One evaluated step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeRecord {
    pub step_index: usize,
    /// The step was active and its condition passed.
    pub should_have_fired: bool,
    pub actually_fired: bool,
    /// Effective probability used for the draw.
    pub probability: f32,
    pub timestamp: Instant,
}

/// Bounded history of fire/no-fire outcomes plus running counters.
#[derive(Debug, Clone)]
pub struct ProbabilityTracker {
    history: Vec<OutcomeRecord>,
    capacity: usize,
    total_attempts: u64,
    successful_triggers: u64,
}

impl Default for ProbabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbabilityTracker {
    pub fn new() -> Self {
        Self::with_capacity(TRACKER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: Vec::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            total_attempts: 0,
            successful_triggers: 0,
        }
    }

    pub fn record(
        &mut self,
        step_index: usize,
        should_have_fired: bool,
        actually_fired: bool,
        probability: f32,
    ) {
        self.history.push(OutcomeRecord {
            step_index,
            should_have_fired,
            actually_fired,
            probability,
            timestamp: Instant::now(),
        });

        if should_have_fired {
            self.total_attempts += 1;
            if actually_fired {
                self.successful_triggers += 1;
            }
        }

        if self.history.len() > self.capacity {
            let excess = self.history.len() - self.capacity;
            self.history.drain(..excess);
        }
    }

    /// Oldest first, most recent last.
    pub fn history(&self) -> &[OutcomeRecord] {
        &self.history
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn successful_triggers(&self) -> u64 {
        self.successful_triggers
    }

    pub fn success_rate(&self) -> f32 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_triggers as f32 / self.total_attempts as f32
        }
    }

    /// Fired fraction per step index present in the history. Steps never
    /// recorded are absent.
    pub fn heat_map(&self) -> BTreeMap<usize, f32> {
        let mut counts: BTreeMap<usize, (u32, u32)> = BTreeMap::new();
        for rec in &self.history {
            let entry = counts.entry(rec.step_index).or_default();
            entry.1 += 1;
            if rec.actually_fired {
                entry.0 += 1;
            }
        }
        counts
            .into_iter()
            .map(|(step, (fired, total))| (step, fired as f32 / total as f32))
            .collect()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.total_attempts = 0;
        self.successful_triggers = 0;
    }
}
