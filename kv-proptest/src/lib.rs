//! Property-based simulation harness for `kv-core`.
//!
//! Drives randomized, seed-reproducible operation sequences against
//! `kv_core::Engine` through a fault-injecting `Filesystem`, checks a fixed
//! set of invariants as it goes, and automatically shrinks any violation
//! down to a minimal reproducer.

pub mod config;
pub mod error;
pub mod generator;
pub mod injector;
pub mod runner;
pub mod shrink;
pub mod sim_filesystem;
pub mod stats;

pub use config::{
    Condition, ConditionalMultiplier, FailureInjectorConfig, FaultKind, InvariantConfig, InvariantKind, KeyStrategy,
    OperationDistribution, SequenceLengthRange, Severity, ShrinkConfig, ShrinkStrategy, TestConfig, ValueStrategy,
};
pub use error::{Error, Result};
pub use generator::{generate_sequence, GeneratedOp};
pub use injector::{FaultDecision, FaultInjector};
pub use runner::{run_once, RunOutcome, Violation};
pub use shrink::{shrink, ShrinkResult};
pub use sim_filesystem::{CorruptionAction, OpKind, SimErrorKind, SimFilesystem};
pub use stats::Stats;

use std::path::Path;

use tracing::info;

/// The outcome of running a `TestConfig` to completion: aggregate
/// statistics across every iteration, plus a shrunk reproducer for each
/// iteration that hit a critical invariant violation.
pub struct TestReport {
    pub stats: Stats,
    pub violations: Vec<ShrinkResult>,
}

/// Run `config.iterations` independent sequences under `base_dir`,
/// shrinking and collecting a minimal reproducer for each one that
/// violates an invariant.
pub fn run_test(config: &TestConfig, base_dir: &Path) -> TestReport {
    let start = std::time::Instant::now();
    let mut aggregate = Stats::default();
    let mut violations = Vec::new();

    for i in 0..config.iterations {
        let sequence_seed = config.seed ^ (i as u64).wrapping_mul(0x9E3779B97F4A7C15);
        let sequence_config = TestConfig { seed: sequence_seed, ..config.clone() };
        let ops = generate_sequence(&sequence_config, sequence_seed);

        let dir = base_dir.join(format!("iter-{i}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("scratch directory must be creatable");

        let outcome = run_once(&sequence_config, &ops, &dir, None);
        aggregate.merge(&outcome.stats);

        if let Some(violation) = outcome.violation {
            let shrunk = shrink(&sequence_config, &dir, ops, outcome.faults_used, violation);
            aggregate.shrink_iterations += shrunk.attempts as u64;
            violations.push(shrunk);
        }
    }

    aggregate.wall_clock = start.elapsed();
    info!(
        name = %config.name,
        sequences_run = aggregate.sequences_run,
        violations = violations.len(),
        "property test run complete"
    );

    TestReport { stats: aggregate, violations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_test_aggregates_stats_across_iterations() {
        let config = TestConfig::new("smoke", 1, 5).with_sequence_length(SequenceLengthRange { min: 10, max: 10 });
        let dir = TempDir::new().unwrap();
        let report = run_test(&config, dir.path());
        assert_eq!(report.stats.sequences_run, 5);
        assert_eq!(report.stats.total_ops_generated, 50);
    }
}
