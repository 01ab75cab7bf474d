//! Scheduler tick telemetry.
//!
//! Each reporting window counts the ticks it ran, how many outlasted their
//! period and how many deadlines were skipped to catch up. Tick durations
//! also go into a fixed ring for the percentile, so recording never
//! allocates.

use std::time::Duration;

/// Most recent tick durations kept for the percentile.
const RECENT_TICKS: usize = 256;

/// One window's worth of tick timing, emitted through the feedback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySummary {
    /// Ticks run in this window.
    pub ticks: u64,
    pub avg_tick_us: u32,
    pub max_tick_us: u32,
    /// Over the window's last 256 ticks at most.
    pub p95_tick_us: u32,
    /// Ticks in this window whose work took longer than their period.
    pub overruns: u64,
    /// Deadlines skipped in this window after a stall.
    pub skipped_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Window {
    ticks: u64,
    sum_us: u64,
    max_us: u32,
    overruns: u64,
    skipped: u64,
}

pub struct TickTelemetry {
    recent_us: [u32; RECENT_TICKS],
    next_slot: usize,
    /// Ring entries written this window; saturates at RECENT_TICKS
    filled: usize,
    window: Window,
    total_overruns: u64,
    total_skipped: u64,
}

impl Default for TickTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTelemetry {
    pub fn new() -> Self {
        Self {
            recent_us: [0; RECENT_TICKS],
            next_slot: 0,
            filled: 0,
            window: Window::default(),
            total_overruns: 0,
            total_skipped: 0,
        }
    }

    /// Record how long one tick's work took against the period it had.
    #[inline]
    pub fn record(&mut self, duration: Duration, period: Duration) {
        let us = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.recent_us[self.next_slot] = us;
        self.next_slot = (self.next_slot + 1) % RECENT_TICKS;
        self.filled = (self.filled + 1).min(RECENT_TICKS);

        let window = &mut self.window;
        window.ticks += 1;
        window.sum_us += u64::from(us);
        window.max_us = window.max_us.max(us);
        if duration > period {
            window.overruns += 1;
            self.total_overruns += 1;
        }
    }

    /// Deadlines passed over in one catch-up jump.
    pub fn record_skipped(&mut self, count: u64) {
        self.window.skipped += count;
        self.total_skipped += count;
    }

    /// Ticks recorded since the last summary.
    pub fn window_ticks(&self) -> u64 {
        self.window.ticks
    }

    /// Close the current window and start a new one. Totals carry over.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        let window = std::mem::take(&mut self.window);
        let avg_tick_us = window
            .sum_us
            .checked_div(window.ticks)
            .map_or(0, |avg| u32::try_from(avg).unwrap_or(u32::MAX));
        let p95_tick_us = percentile(&self.recent_us[..self.filled], 95);
        self.next_slot = 0;
        self.filled = 0;

        TelemetrySummary {
            ticks: window.ticks,
            avg_tick_us,
            max_tick_us: window.max_us,
            p95_tick_us,
            overruns: window.overruns,
            skipped_ticks: window.skipped,
            total_overruns: self.total_overruns,
            total_skipped: self.total_skipped,
        }
    }
}

/// Nearest-rank percentile. Zero for no samples.
fn percentile(samples: &[u32], pct: usize) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let mut scratch = [0u32; RECENT_TICKS];
    let sorted = &mut scratch[..samples.len()];
    sorted.copy_from_slice(samples);
    sorted.sort_unstable();
    let rank = (samples.len() * pct).div_ceil(100).clamp(1, samples.len());
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_micros(500);

    fn us(n: u64) -> Duration {
        Duration::from_micros(n)
    }

    #[test]
    fn window_stats_reset_between_summaries() {
        let mut t = TickTelemetry::new();
        t.record(us(100), PERIOD);
        t.record(us(200), PERIOD);
        t.record(us(300), PERIOD);
        assert_eq!(t.window_ticks(), 3);

        let s = t.take_summary();
        assert_eq!(s.ticks, 3);
        assert_eq!(s.avg_tick_us, 200);
        assert_eq!(s.max_tick_us, 300);
        assert_eq!(s.p95_tick_us, 300);
        assert_eq!(t.window_ticks(), 0);
        assert_eq!(t.take_summary(), TelemetrySummary::default());
    }

    #[test]
    fn overruns_and_skips_split_window_from_total() {
        let mut t = TickTelemetry::new();
        t.record(us(400), PERIOD);
        t.record(us(600), PERIOD);
        t.record(us(800), PERIOD);
        t.record_skipped(3);
        let s = t.take_summary();
        assert_eq!((s.overruns, s.total_overruns), (2, 2));
        assert_eq!((s.skipped_ticks, s.total_skipped), (3, 3));

        t.record(us(900), PERIOD);
        t.record_skipped(1);
        let s = t.take_summary();
        assert_eq!((s.overruns, s.total_overruns), (1, 3));
        assert_eq!((s.skipped_ticks, s.total_skipped), (1, 4));
    }

    #[test]
    fn percentile_is_nearest_rank() {
        let samples: Vec<u32> = (1..=100).rev().collect();
        assert_eq!(percentile(&samples, 95), 95);
        assert_eq!(percentile(&samples, 50), 50);
        assert_eq!(percentile(&samples, 100), 100);
        assert_eq!(percentile(&[7], 95), 7);
        assert_eq!(percentile(&[], 95), 0);
    }

    #[test]
    fn percentile_sees_only_recent_ticks() {
        let mut t = TickTelemetry::new();
        for _ in 0..50 {
            t.record(us(10_000), PERIOD);
        }
        for _ in 0..RECENT_TICKS {
            t.record(us(10), PERIOD);
        }
        let s = t.take_summary();
        assert_eq!(s.ticks, 50 + RECENT_TICKS as u64);
        assert_eq!(s.max_tick_us, 10_000);
        assert_eq!(s.p95_tick_us, 10);
        assert!(s.avg_tick_us > 10);
    }
}
