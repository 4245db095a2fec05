//! Aggregate statistics collected across a property test run.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::FaultKind;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub sequences_run: u32,
    pub total_ops_generated: u64,
    pub injection_attempts: HashMap<FaultKind, u64>,
    pub injection_counts: HashMap<FaultKind, u64>,
    pub invariant_violations: u64,
    pub shrink_iterations: u64,
    pub wall_clock: Duration,
    pub corruption_count: u64,
}

impl Stats {
    /// Achieved injection ratio for `kind`: hits / attempts, or 0.0 if the
    /// channel was never rolled.
    pub fn achieved_ratio(&self, kind: FaultKind) -> f64 {
        let attempts = *self.injection_attempts.get(&kind).unwrap_or(&0);
        if attempts == 0 {
            return 0.0;
        }
        *self.injection_counts.get(&kind).unwrap_or(&0) as f64 / attempts as f64
    }

    /// Fold another run's stats into this aggregate.
    pub fn merge(&mut self, other: &Stats) {
        self.sequences_run += other.sequences_run;
        self.total_ops_generated += other.total_ops_generated;
        for (&kind, &n) in &other.injection_attempts {
            *self.injection_attempts.entry(kind).or_insert(0) += n;
        }
        for (&kind, &n) in &other.injection_counts {
            *self.injection_counts.entry(kind).or_insert(0) += n;
        }
        self.invariant_violations += other.invariant_violations;
        self.shrink_iterations += other.shrink_iterations;
        self.wall_clock += other.wall_clock;
        self.corruption_count = self.corruption_count.max(other.corruption_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn achieved_ratio_divides_hits_by_attempts() {
        let mut stats = Stats::default();
        stats.injection_attempts.insert(FaultKind::Allocator, 100);
        stats.injection_counts.insert(FaultKind::Allocator, 3);
        assert!((stats.achieved_ratio(FaultKind::Allocator) - 0.03).abs() < 1e-9);
    }

    #[test]
    fn merge_sums_counters_and_takes_max_corruption() {
        let mut a = Stats { sequences_run: 2, corruption_count: 1, ..Default::default() };
        let b = Stats { sequences_run: 3, corruption_count: 4, ..Default::default() };
        a.merge(&b);
        assert_eq!(a.sequences_run, 5);
        assert_eq!(a.corruption_count, 4);
    }
}
