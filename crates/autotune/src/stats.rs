//! Running per-candidate trial statistics.

use crate::executor::TrialOutcome;
use serde::{Deserialize, Serialize};

/// Accumulated measurements for one candidate over one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialStat {
    /// Sum of elapsed time over all recorded rounds, in microseconds.
    pub time_us: u64,
    pub flops: u64,
    pub rounds: u32,
    /// Running mean of per-round elapsed time.
    pub average_us: f64,
    m2: f64,
    pub detail: Vec<u64>,
    /// Cleared permanently by the first failed trial.
    pub ok: bool,
    /// Cleared permanently when the candidate is pruned.
    pub alive: bool,
}

impl Default for TrialStat {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialStat {
    pub fn new() -> Self {
        Self {
            time_us: 0,
            flops: 0,
            rounds: 0,
            average_us: 0.0,
            m2: 0.0,
            detail: Vec::new(),
            ok: true,
            alive: true,
        }
    }

    /// Fold one trial into the running totals (Welford update for the variance).
    pub fn record(&mut self, outcome: &TrialOutcome) {
        self.time_us += outcome.elapsed_us;
        self.flops += outcome.flops;
        self.rounds += 1;

        let x = outcome.elapsed_us as f64;
        let delta = x - self.average_us;
        self.average_us += delta / self.rounds as f64;
        self.m2 += delta * (x - self.average_us);

        if self.detail.len() < outcome.detail.len() {
            self.detail.resize(outcome.detail.len(), 0);
        }
        for (total, value) in self.detail.iter_mut().zip(&outcome.detail) {
            *total += value;
        }

        if !outcome.ok {
            self.ok = false;
        }
    }

    pub fn record_failure(&mut self) {
        self.ok = false;
    }

    /// Population variance of the per-round time.
    pub fn variance(&self) -> f64 {
        if self.rounds < 2 {
            0.0
        } else {
            self.m2 / self.rounds as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn gflops(&self) -> f64 {
        if self.time_us > 0 {
            self.flops as f64 / (self.time_us as f64 * 1.0e3)
        } else {
            0.0
        }
    }

    /// Still benchmarked and never failed.
    pub fn is_good(&self) -> bool {
        self.ok && self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn outcome(elapsed_us: u64, ok: bool) -> TrialOutcome {
        TrialOutcome {
            elapsed_us,
            flops: 1_000,
            ok,
            detail: vec![elapsed_us, 1],
        }
    }

    #[test]
    fn accumulates_time_and_variance() {
        let mut stat = TrialStat::new();
        for t in [10, 20, 30] {
            stat.record(&outcome(t, true));
        }
        assert_eq!(stat.time_us, 60);
        assert_eq!(stat.flops, 3_000);
        assert_eq!(stat.rounds, 3);
        assert_eq!(stat.detail, vec![60, 3]);
        assert_abs_diff_eq!(stat.average_us, 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stat.variance(), 200.0 / 3.0, epsilon = 1e-9);
        assert!(stat.is_good());
    }

    #[test]
    fn failure_is_sticky() {
        let mut stat = TrialStat::new();
        stat.record(&outcome(5, false));
        stat.record(&outcome(5, true));
        assert!(!stat.ok);
        assert!(stat.alive);
        assert!(!stat.is_good());
    }

    #[test]
    fn gflops_from_totals() {
        let mut stat = TrialStat::new();
        assert_eq!(stat.gflops(), 0.0);
        stat.record(&TrialOutcome {
            elapsed_us: 1_000,
            flops: 2_000_000,
            ok: true,
            detail: Vec::new(),
        });
        assert_abs_diff_eq!(stat.gflops(), 2.0, epsilon = 1e-12);
    }
}
