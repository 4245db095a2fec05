//! Executes a generated sequence against `kv_core::Engine` with fault
//! injection wired in, checking invariants as it goes.

use std::path::Path;
use std::sync::Arc;

use kv_core::{Engine, EngineConfig};
use tracing::trace;

use crate::config::{Condition, InvariantKind, TestConfig};
use crate::generator::{derive_rng, GeneratedOp, STREAM_FAULT};
use crate::injector::{FaultDecision, FaultInjector, WalTarget};
use crate::sim_filesystem::SimFilesystem;
use crate::stats::Stats;

#[derive(Debug, Clone)]
pub struct Violation {
    pub invariant: InvariantKind,
    pub step: usize,
    pub message: String,
}

pub struct RunOutcome {
    pub faults_used: Vec<FaultDecision>,
    pub violation: Option<Violation>,
    pub stats: Stats,
}

/// Run `ops` against a fresh engine rooted at `dir`. If `fixed_faults` is
/// `Some`, those exact per-step decisions are replayed instead of rolled
/// fresh -- what `preserve_failure_pattern` shrinking relies on.
pub fn run_once(config: &TestConfig, ops: &[GeneratedOp], dir: &Path, fixed_faults: Option<&[FaultDecision]>) -> RunOutcome {
    let _ = std::fs::remove_file(dir.join("intent.log"));
    let _ = std::fs::remove_file(dir.join("completion.log"));
    std::fs::create_dir_all(dir).expect("scratch directory must be creatable");

    let fs = Arc::new(SimFilesystem::new());
    let engine_config = EngineConfig::default();

    let mut stats = Stats::default();
    let mut injector = FaultInjector::new(config.injectors.clone());
    let mut faults_used = Vec::with_capacity(ops.len());
    let mut violation: Option<Violation> = None;

    let mut engine = match Engine::open_with_filesystem(fs.clone(), dir, &engine_config) {
        Ok(e) => e,
        Err(_) => {
            return RunOutcome { faults_used, violation: None, stats };
        }
    };
    let mut last_corruption = engine.corruption_count();
    stats.corruption_count = last_corruption;

    for (step, op) in ops.iter().enumerate() {
        let decision = match fixed_faults {
            Some(fixed) if step < fixed.len() => fixed[step].clone(),
            _ => {
                let mut rng = derive_rng(config.seed, STREAM_FAULT, step as u64);
                injector.decide(step, &mut rng, &mut stats)
            }
        };

        if decision.allocator_skip {
            trace!(step, "allocator failure injected, skipping operation");
            faults_used.push(decision);
            continue;
        }
        if let Some((op_kind, glob, kind)) = &decision.filesystem_error {
            fs.arm(*op_kind, glob.clone(), *kind);
        }
        if decision.ioring_fail {
            fs.arm(crate::sim_filesystem::OpKind::Write, "*.log", crate::sim_filesystem::SimErrorKind::IoError);
        }
        if let Some(corruption) = &decision.wal_corruption {
            let path = match corruption.target {
                WalTarget::Intent => dir.join("intent.log"),
                WalTarget::Completion => dir.join("completion.log"),
            };
            let _ = fs.corrupt_file(&path, corruption.offset, corruption.action.clone());
        }
        faults_used.push(decision);

        match op {
            GeneratedOp::Set { key, value } => {
                if let Ok(()) = engine.set(key, value) {
                    if engine.get(key).as_deref() != Some(value.as_slice()) {
                        violation = Some(Violation {
                            invariant: InvariantKind::RoundTrip,
                            step,
                            message: "get after a successful set did not return the written value".into(),
                        });
                        break;
                    }
                }
            }
            GeneratedOp::Get { key } => {
                let _ = engine.get(key);
            }
            GeneratedOp::Del { key } => {
                if engine.delete(key).is_ok() && engine.get(key).is_some() {
                    violation = Some(Violation {
                        invariant: InvariantKind::IdempotentDelete,
                        step,
                        message: "key still visible immediately after a successful delete".into(),
                    });
                    break;
                }
            }
            GeneratedOp::Flush => {
                injector.activate(Condition::DuringFlush, step);
                let _ = engine.flush();
            }
            GeneratedOp::Restart => {
                injector.activate(Condition::DuringRecovery, step);
                drop(engine);
                match Engine::open_with_filesystem(fs.clone(), dir, &engine_config) {
                    Ok(reopened) => {
                        engine = reopened;
                        injector.activate(Condition::AfterRestart, step);
                    }
                    Err(_) => break,
                }
            }
        }

        if !engine.verify_integrity() {
            violation = Some(Violation {
                invariant: InvariantKind::IndexAccounting,
                step,
                message: "verify_integrity failed at a quiescent point".into(),
            });
            break;
        }

        let current_corruption = engine.corruption_count();
        if current_corruption < last_corruption {
            violation = Some(Violation {
                invariant: InvariantKind::CorruptionMonotone,
                step,
                message: format!("corruption_count decreased from {last_corruption} to {current_corruption}"),
            });
            break;
        }
        if current_corruption > last_corruption {
            injector.activate(Condition::HashTableResize, step);
        }
        last_corruption = current_corruption;
    }

    stats.sequences_run = 1;
    stats.total_ops_generated = ops.len() as u64;
    stats.corruption_count = last_corruption;
    if violation.is_some() {
        stats.invariant_violations = 1;
    }

    RunOutcome { faults_used, violation, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyStrategy, SequenceLengthRange, TestConfig, ValueStrategy};
    use crate::generator::generate_sequence;
    use tempfile::TempDir;

    #[test]
    fn clean_sequence_never_violates_invariants() {
        let config = TestConfig::new("clean", 7, 1)
            .with_sequence_length(SequenceLengthRange { min: 40, max: 40 })
            .with_key_strategy(KeyStrategy::UniformRandom { min: 1, max: 8 })
            .with_value_strategy(ValueStrategy::Variable { min: 0, max: 16 });
        let ops = generate_sequence(&config, 7);
        let dir = TempDir::new().unwrap();
        let outcome = run_once(&config, &ops, dir.path(), None);
        assert!(outcome.violation.is_none());
        assert_eq!(outcome.stats.sequences_run, 1);
    }
}
