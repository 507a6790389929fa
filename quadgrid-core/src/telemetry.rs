//! Control-loop iteration timing.
//!
//! Iteration durations go into a fixed ring buffer so recording never
//! allocates; the loop logs a summary every few seconds.

use std::fmt;
use std::time::Duration;

const SAMPLE_COUNT: usize = 512;

/// Timing summary of one reporting window, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Iterations over budget since startup.
    pub overruns: u64,
    pub iterations: u64,
}

impl fmt::Display for LoopSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, avg {}us, p95 {}us, max {}us, {} over budget",
            self.iterations, self.avg_us, self.p95_us, self.max_us, self.overruns
        )
    }
}

pub struct LoopTelemetry {
    samples_us: [u32; SAMPLE_COUNT],
    idx: usize,
    filled: usize,
    max_us: u32,
    overruns: u64,
    iterations: u64,
}

impl Default for LoopTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopTelemetry {
    pub fn new() -> Self {
        Self {
            samples_us: [0; SAMPLE_COUNT],
            idx: 0,
            filled: 0,
            max_us: 0,
            overruns: 0,
            iterations: 0,
        }
    }

    /// Record the work time of one iteration against `budget`.
    #[inline]
    pub fn record(&mut self, elapsed: Duration, budget: Duration) {
        let us = elapsed.as_micros().min(u32::MAX as u128) as u32;
        self.samples_us[self.idx] = us;
        self.idx = (self.idx + 1) % SAMPLE_COUNT;
        self.filled = (self.filled + 1).min(SAMPLE_COUNT);
        self.max_us = self.max_us.max(us);
        self.iterations += 1;
        if elapsed > budget {
            self.overruns += 1;
        }
    }

    /// Summarize the buffered samples and start a new max window.
    /// Overruns and iterations stay cumulative.
    pub fn take_summary(&mut self) -> LoopSummary {
        if self.filled == 0 {
            return LoopSummary {
                overruns: self.overruns,
                iterations: self.iterations,
                ..LoopSummary::default()
            };
        }
        let window = &self.samples_us[..self.filled];
        let sum: u64 = window.iter().map(|&us| us as u64).sum();
        let mut sorted = window.to_vec();
        sorted.sort_unstable();
        let p95_idx = (self.filled * 95 / 100).max(1) - 1;

        let summary = LoopSummary {
            avg_us: (sum / self.filled as u64) as u32,
            max_us: self.max_us,
            p95_us: sorted[p95_idx.min(self.filled - 1)],
            overruns: self.overruns,
            iterations: self.iterations,
        };
        self.max_us = 0;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_millis(2);

    #[test]
    fn summary_averages_and_tracks_max() {
        let mut t = LoopTelemetry::new();
        for us in [100, 200, 300] {
            t.record(Duration::from_micros(us), BUDGET);
        }
        let s = t.take_summary();
        assert_eq!(s.avg_us, 200);
        assert_eq!(s.max_us, 300);
        assert_eq!(s.overruns, 0);
        assert_eq!(s.iterations, 3);

        // Max resets per window.
        t.record(Duration::from_micros(50), BUDGET);
        assert_eq!(t.take_summary().max_us, 50);
    }

    #[test]
    fn overruns_are_cumulative() {
        let mut t = LoopTelemetry::new();
        t.record(Duration::from_millis(3), BUDGET);
        assert_eq!(t.take_summary().overruns, 1);
        t.record(Duration::from_millis(1), BUDGET);
        t.record(Duration::from_millis(5), BUDGET);
        assert_eq!(t.take_summary().overruns, 2);
    }

    #[test]
    fn empty_summary_is_zero() {
        let mut t = LoopTelemetry::new();
        assert_eq!(t.take_summary(), LoopSummary::default());
    }
}
