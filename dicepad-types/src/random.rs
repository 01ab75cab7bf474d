//! Injected random source.
//!
//! Every probabilistic decision in the engine (step gates, chaos, jitter,
//! mutation, source selection) draws from one `RandomSource`, so a seeded
//! bank replays identically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A uniform generator over `[0, 1)`.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;

    /// Uniform value in `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Symmetric jitter in `[-range, range)`. Consumes no draw when `range <= 0`.
    fn jitter(&mut self, range: f32) -> f32 {
        if range <= 0.0 {
            return 0.0;
        }
        self.uniform(-range as f64, range as f64) as f32
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize {
        let i = (self.next_f64() * len as f64) as usize;
        i.min(len.saturating_sub(1))
    }
}

/// Default generator: `StdRng`, seeded or from the OS.
pub struct SeededRandom {
    rng: StdRng,
    seed: Option<u64>,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            seed: None,
        }
    }

    /// Seeded when `seed` is set, OS entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::from_seed(s),
            None => Self::from_os(),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Replays a fixed list of values, cycling when exhausted.
/// Handy for pinning individual draws in tests and demos.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    pos: usize,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, pos: 0 }
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> usize {
        self.pos
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v.clamp(0.0, 1.0 - f64::EPSILON)
    }
}
