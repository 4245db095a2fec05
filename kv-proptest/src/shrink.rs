//! Automatic shrinking: given a failing `(sequence, fault decisions)` pair,
//! repeatedly try to reduce it while the failure keeps reproducing.

use std::path::Path;

use rand::Rng;

use crate::config::{ShrinkStrategy, TestConfig};
use crate::error::{Error, Result};
use crate::generator::{derive_rng, GeneratedOp, STREAM_SHRINK};
use crate::injector::FaultDecision;
use crate::runner::{run_once, Violation};

pub struct ShrinkResult {
    pub ops: Vec<GeneratedOp>,
    pub faults: Vec<FaultDecision>,
    pub violation: Violation,
    pub attempts: u32,
    /// True when `max_attempts` was hit before a full pass over every
    /// strategy made no further progress -- the reproducer is still valid,
    /// just not guaranteed minimal.
    pub exhausted: bool,
}

impl ShrinkResult {
    /// Turn a budget-exhausted shrink into an `Err`, for callers that want
    /// to treat an unminimized reproducer as a hard failure rather than
    /// silently accepting whatever was left when the budget ran out.
    pub fn into_result(self) -> Result<Self> {
        if self.exhausted {
            Err(Error::ShrinkBudgetExhausted { attempts: self.attempts })
        } else {
            Ok(self)
        }
    }
}

fn remove_operations(ops: &[GeneratedOp], faults: &[FaultDecision], rng: &mut impl Rng) -> Option<(Vec<GeneratedOp>, Vec<FaultDecision>)> {
    if ops.len() <= 1 {
        return None;
    }
    let idx = rng.gen_range(0..ops.len());
    let mut new_ops = ops.to_vec();
    let mut new_faults = faults.to_vec();
    new_ops.remove(idx);
    if idx < new_faults.len() {
        new_faults.remove(idx);
    }
    Some((new_ops, new_faults))
}

fn simplify_values(ops: &[GeneratedOp], faults: &[FaultDecision], rng: &mut impl Rng) -> Option<(Vec<GeneratedOp>, Vec<FaultDecision>)> {
    let candidates: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter_map(|(i, op)| match op {
            GeneratedOp::Set { value, .. } if !value.is_empty() => Some(i),
            _ => None,
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let idx = candidates[rng.gen_range(0..candidates.len())];
    let mut new_ops = ops.to_vec();
    if let GeneratedOp::Set { key, value } = &new_ops[idx] {
        let key = key.clone();
        let shorter_len = value.len() / 2;
        new_ops[idx] = GeneratedOp::Set { key, value: vec![b'x'; shorter_len] };
    }
    Some((new_ops, faults.to_vec()))
}

fn reduce_key_diversity(ops: &[GeneratedOp], faults: &[FaultDecision]) -> Option<(Vec<GeneratedOp>, Vec<FaultDecision>)> {
    let mut distinct_keys: Vec<&[u8]> = Vec::new();
    for op in ops {
        let key = match op {
            GeneratedOp::Set { key, .. } | GeneratedOp::Get { key } | GeneratedOp::Del { key } => Some(key.as_slice()),
            _ => None,
        };
        if let Some(k) = key {
            if !distinct_keys.contains(&k) {
                distinct_keys.push(k);
            }
        }
    }
    if distinct_keys.len() < 2 {
        return None;
    }
    let canonical = distinct_keys[0].to_vec();
    let victim = distinct_keys[1].to_vec();

    let new_ops = ops
        .iter()
        .map(|op| match op {
            GeneratedOp::Set { key, value } if key == &victim => GeneratedOp::Set { key: canonical.clone(), value: value.clone() },
            GeneratedOp::Get { key } if key == &victim => GeneratedOp::Get { key: canonical.clone() },
            GeneratedOp::Del { key } if key == &victim => GeneratedOp::Del { key: canonical.clone() },
            other => other.clone(),
        })
        .collect();
    Some((new_ops, faults.to_vec()))
}

fn focus_around_failure(
    ops: &[GeneratedOp],
    faults: &[FaultDecision],
    failure_step: usize,
) -> Option<(Vec<GeneratedOp>, Vec<FaultDecision>)> {
    const WINDOW: usize = 5;
    let start = failure_step.saturating_sub(WINDOW);
    let end = (failure_step + 1).min(ops.len());
    if start == 0 && end == ops.len() {
        return None;
    }
    let new_ops = ops[start..end].to_vec();
    let new_faults = if end <= faults.len() { faults[start..end].to_vec() } else { Vec::new() };
    Some((new_ops, new_faults))
}

/// Shrink a failing `(ops, faults)` pair, re-running against a fresh engine
/// at `dir` after each candidate reduction. Stops once `max_attempts` is
/// exhausted or a full pass over every strategy makes no further progress.
pub fn shrink(
    config: &TestConfig,
    dir: &Path,
    mut ops: Vec<GeneratedOp>,
    mut faults: Vec<FaultDecision>,
    mut violation: Violation,
) -> ShrinkResult {
    let mut attempts: u32 = 0;
    let mut made_progress = true;
    let mut exhausted = false;

    while made_progress {
        if attempts >= config.shrink.max_attempts {
            exhausted = true;
            break;
        }
        made_progress = false;

        for strategy in config.shrink.strategies.clone() {
            if attempts >= config.shrink.max_attempts {
                exhausted = true;
                break;
            }
            let mut rng = derive_rng(config.seed, STREAM_SHRINK, attempts as u64);
            let candidate = match strategy {
                ShrinkStrategy::RemoveOperations => remove_operations(&ops, &faults, &mut rng),
                ShrinkStrategy::SimplifyValues => simplify_values(&ops, &faults, &mut rng),
                ShrinkStrategy::ReduceKeyDiversity => reduce_key_diversity(&ops, &faults),
                ShrinkStrategy::FocusAroundFailure => focus_around_failure(&ops, &faults, violation.step),
            };

            let Some((candidate_ops, candidate_faults)) = candidate else { continue };
            attempts += 1;

            let fixed = config.shrink.preserve_failure_conditions.then_some(candidate_faults.as_slice());
            let outcome = run_once(config, &candidate_ops, dir, fixed);

            if let Some(new_violation) = outcome.violation {
                ops = candidate_ops;
                faults = if config.shrink.preserve_failure_conditions { candidate_faults } else { outcome.faults_used };
                violation = new_violation;
                made_progress = true;
            }
        }
    }

    ShrinkResult { ops, faults, violation, attempts, exhausted }
}
