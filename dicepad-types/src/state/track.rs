//! Per-pad playback parameters.

use serde::{Deserialize, Serialize};

use crate::random::RandomSource;
use crate::SourceHandle;

/// Smallest gap kept between trim start and end.
const MIN_TRIM_SPAN: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    OneShot,
    Loop,
    /// Plays while the step is held, cut at the next step boundary
    Gate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// New hit restarts the pad's voice
    #[default]
    Retrigger,
    /// New hit silences other choke-mode pads
    Choke,
    Polyphonic,
}

/// Portion of the source to play, as fractions of its length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl Default for TrimWindow {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 1.0,
        }
    }
}

impl TrimWindow {
    /// Build a window, repairing out-of-range or inverted bounds.
    pub fn new(start: f64, end: f64) -> Self {
        let mut w = Self { start, end };
        w.normalize();
        w
    }

    /// Clamp both ends into [0,1] and keep `start < end`.
    pub fn normalize(&mut self) {
        let start = if self.start.is_finite() { self.start } else { 0.0 };
        let end = if self.end.is_finite() { self.end } else { 1.0 };
        let start = start.clamp(0.0, 1.0 - MIN_TRIM_SPAN);
        let end = end.clamp(0.0, 1.0);
        self.start = start;
        self.end = if end <= start {
            (start + MIN_TRIM_SPAN).min(1.0)
        } else {
            end
        };
    }
}

/// Track-level random ranges applied on every hit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackVariation {
    /// +/- semitones
    pub pitch: f32,
    /// +/- volume
    pub volume: f32,
    /// +/- fraction of a step
    pub timing: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub enabled: bool,
    pub cutoff: f32,    // Hz
    pub resonance: f32, // 0.0-1.0
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff: 20_000.0,
            resonance: 0.0,
        }
    }
}

/// An alternate source picked in proportion to its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceVariation {
    pub source: SourceHandle,
    pub weight: f32,
}

/// Static playback configuration for one pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackParams {
    pub name: String,
    pub source: Option<SourceHandle>,
    pub trim: TrimWindow,
    pub fade_in: f32,  // fraction of the trimmed length
    pub fade_out: f32, // fraction of the trimmed length
    pub playback_mode: PlaybackMode,
    pub trigger_mode: TriggerMode,
    pub volume: f32, // 0.0-1.0, default 0.8
    pub pitch: f32,  // semitones, -24 to +24
    pub pan: f32,    // -1.0 to 1.0
    pub trigger_probability: f32,
    pub variation: TrackVariation,
    pub filter: FilterSettings,
    /// Selection weight of `source` against `variations`
    pub primary_weight: f32,
    pub variations: Vec<SourceVariation>,
    pub muted: bool,
    pub solo: bool,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            source: None,
            trim: TrimWindow::default(),
            fade_in: 0.0,
            fade_out: 0.0,
            playback_mode: PlaybackMode::OneShot,
            trigger_mode: TriggerMode::Retrigger,
            volume: 0.8,
            pitch: 0.0,
            pan: 0.0,
            trigger_probability: 1.0,
            variation: TrackVariation::default(),
            filter: FilterSettings::default(),
            primary_weight: 1.0,
            variations: Vec::new(),
            muted: false,
            solo: false,
        }
    }
}

impl TrackParams {
    pub fn with_source(name: impl Into<String>, source: SourceHandle) -> Self {
        Self {
            name: name.into(),
            source: Some(source),
            ..Self::default()
        }
    }

    /// Pull every field back into its valid range.
    pub fn normalize(&mut self) {
        self.trim.normalize();
        self.fade_in = self.fade_in.clamp(0.0, 1.0);
        self.fade_out = self.fade_out.clamp(0.0, 1.0);
        self.volume = self.volume.clamp(0.0, 1.0);
        self.pitch = self.pitch.clamp(-24.0, 24.0);
        self.pan = self.pan.clamp(-1.0, 1.0);
        self.trigger_probability = self.trigger_probability.clamp(0.0, 1.0);
        self.variation.pitch = self.variation.pitch.max(0.0);
        self.variation.volume = self.variation.volume.max(0.0);
        self.variation.timing = self.variation.timing.max(0.0);
        self.filter.resonance = self.filter.resonance.clamp(0.0, 1.0);
        self.filter.cutoff = self.filter.cutoff.clamp(20.0, 20_000.0);
        self.primary_weight = self.primary_weight.max(0.0);
        for v in &mut self.variations {
            v.weight = v.weight.max(0.0);
        }
    }

    pub fn add_variation(&mut self, source: SourceHandle, weight: f32) {
        self.variations.push(SourceVariation {
            source,
            weight: weight.max(0.0),
        });
    }

    /// Volume with the track's random range applied.
    pub fn randomized_volume(&self, rng: &mut dyn RandomSource) -> f32 {
        (self.volume + rng.jitter(self.variation.volume)).clamp(0.0, 1.0)
    }

    /// Pitch with the track's random range applied.
    pub fn randomized_pitch(&self, rng: &mut dyn RandomSource) -> f32 {
        (self.pitch + rng.jitter(self.variation.pitch)).clamp(-24.0, 24.0)
    }

    /// Pick the source for one hit: weight-proportional among the primary
    /// source and the variations. Negative weights count as zero; if every
    /// weight is zero the primary source is used. No draw is taken when
    /// there are no variations.
    pub fn select_source(&self, rng: &mut dyn RandomSource) -> Option<SourceHandle> {
        if self.variations.is_empty() {
            return self.source;
        }
        let primary_weight = if self.source.is_some() {
            self.primary_weight.max(0.0) as f64
        } else {
            0.0
        };
        let total: f64 = primary_weight
            + self
                .variations
                .iter()
                .map(|v| v.weight.max(0.0) as f64)
                .sum::<f64>();
        if total <= 0.0 {
            return self.source;
        }

        let mut target = rng.next_f64() * total;
        if target < primary_weight {
            return self.source;
        }
        target -= primary_weight;
        let mut last_weighted = None;
        for v in &self.variations {
            let w = v.weight.max(0.0) as f64;
            if w <= 0.0 {
                continue;
            }
            if target < w {
                return Some(v.source);
            }
            target -= w;
            last_weighted = Some(v.source);
        }
        // Rounding at the top of the range lands on the last weighted entry.
        last_weighted.or(self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SequenceRandom;

    #[test]
    fn trim_repairs_inverted_window() {
        let w = TrimWindow::new(0.8, 0.2);
        assert!(w.start < w.end);
        assert_eq!(w.start, 0.8);
        let w = TrimWindow::new(-1.0, 3.0);
        assert_eq!((w.start, w.end), (0.0, 1.0));
        let w = TrimWindow::new(1.0, 1.0);
        assert!(w.start < w.end && w.end <= 1.0);
    }

    #[test]
    fn normalize_clamps_fields() {
        let mut t = TrackParams {
            volume: 2.0,
            pitch: -40.0,
            pan: 3.0,
            primary_weight: -1.0,
            ..TrackParams::default()
        };
        t.add_variation(SourceHandle::new(2), 1.0);
        t.variations[0].weight = -5.0;
        t.normalize();
        assert_eq!(t.volume, 1.0);
        assert_eq!(t.pitch, -24.0);
        assert_eq!(t.pan, 1.0);
        assert_eq!(t.primary_weight, 0.0);
        assert_eq!(t.variations[0].weight, 0.0);
    }

    #[test]
    fn select_primary_without_variations() {
        let t = TrackParams::with_source("kick", SourceHandle::new(1));
        let mut rng = SequenceRandom::new(vec![0.5]);
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(1)));
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn select_is_weight_proportional() {
        let mut t = TrackParams::with_source("snare", SourceHandle::new(1));
        t.primary_weight = 1.0;
        t.add_variation(SourceHandle::new(2), 3.0);
        // total 4: [0,1) primary, [1,4) variation
        let mut rng = SequenceRandom::new(vec![0.1, 0.3, 0.9]);
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(1)));
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(2)));
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(2)));
    }

    #[test]
    fn zero_weights_fall_back_to_primary() {
        let mut t = TrackParams::with_source("hat", SourceHandle::new(1));
        t.primary_weight = 0.0;
        t.add_variation(SourceHandle::new(2), 0.0);
        t.add_variation(SourceHandle::new(3), -2.0);
        let mut rng = SequenceRandom::new(vec![0.7]);
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(1)));
    }

    #[test]
    fn missing_primary_uses_variations() {
        let mut t = TrackParams::default();
        t.add_variation(SourceHandle::new(5), 1.0);
        let mut rng = SequenceRandom::new(vec![0.0]);
        assert_eq!(t.select_source(&mut rng), Some(SourceHandle::new(5)));
    }

    #[test]
    fn randomized_values_stay_in_range() {
        let mut t = TrackParams::default();
        t.volume = 0.95;
        t.variation.volume = 0.5;
        t.pitch = 23.0;
        t.variation.pitch = 5.0;
        let mut rng = SequenceRandom::new(vec![0.99]);
        assert_eq!(t.randomized_volume(&mut rng), 1.0);
        assert_eq!(t.randomized_pitch(&mut rng), 24.0);
    }
}
