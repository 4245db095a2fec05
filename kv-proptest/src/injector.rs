//! Rolls each fault channel's effective probability and decides, per
//! operation, what (if anything) fires -- independent of operation
//! generation, so fault decisions and operation generation never share an
//! RNG stream.

use std::collections::HashMap;

use rand::Rng;

use crate::config::{Condition, FailureInjectorConfig, FaultKind, ALL_FAULT_KINDS};
use crate::sim_filesystem::{CorruptionAction, OpKind, SimErrorKind};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalTarget {
    Intent,
    Completion,
}

#[derive(Debug, Clone)]
pub struct WalCorruptionDecision {
    pub target: WalTarget,
    pub offset: u64,
    pub action: CorruptionAction,
}

/// What the injector decided for a single operation. Recorded verbatim so
/// shrinking can replay the exact same faults (`preserve_failure_pattern`)
/// while only the surrounding operations change.
#[derive(Debug, Clone, Default)]
pub struct FaultDecision {
    pub allocator_skip: bool,
    pub filesystem_error: Option<(OpKind, String, SimErrorKind)>,
    pub wal_corruption: Option<WalCorruptionDecision>,
    pub ioring_fail: bool,
}

const SIM_ERROR_KINDS: [SimErrorKind; 7] = [
    SimErrorKind::DiskFull,
    SimErrorKind::PermissionDenied,
    SimErrorKind::IoError,
    SimErrorKind::FileNotFound,
    SimErrorKind::DeviceBusy,
    SimErrorKind::NetworkError,
    SimErrorKind::CorruptedData,
];

pub struct FaultInjector {
    config: FailureInjectorConfig,
    active_until: HashMap<Condition, usize>,
}

impl FaultInjector {
    pub fn new(config: FailureInjectorConfig) -> Self {
        Self { config, active_until: HashMap::new() }
    }

    /// Mark `condition` active for the window described by the largest
    /// matching `ConditionalMultiplier::duration` (default: one step), from
    /// `current_step` onward.
    pub fn activate(&mut self, condition: Condition, current_step: usize) {
        let duration = self
            .config
            .multipliers
            .iter()
            .filter(|m| m.condition == condition)
            .map(|m| m.duration.max(1))
            .max()
            .unwrap_or(1);
        self.active_until.insert(condition, current_step + duration as usize);
    }

    fn is_active(&self, condition: Condition, step: usize) -> bool {
        self.active_until.get(&condition).map(|&until| step < until).unwrap_or(false)
    }

    fn effective_probability(&self, kind: FaultKind, step: usize) -> f64 {
        let base = *self.config.base_probabilities.get(&kind).unwrap_or(&0.0);
        let mut multiplier = 1.0f64;
        for m in &self.config.multipliers {
            if self.is_active(m.condition, step) {
                multiplier = multiplier.max(m.multiplier);
            }
        }
        (base * multiplier).min(1.0)
    }

    /// Roll every fault channel for this step and record the decision.
    /// `stats` accumulates attempted-vs-hit counters for achieved-ratio
    /// reporting.
    pub fn decide(&mut self, step: usize, rng: &mut impl Rng, stats: &mut Stats) -> FaultDecision {
        let mut decision = FaultDecision::default();

        for &kind in &ALL_FAULT_KINDS {
            let p = self.effective_probability(kind, step);
            *stats.injection_attempts.entry(kind).or_insert(0) += 1;
            let hit = rng.gen::<f64>() < p;
            if !hit {
                continue;
            }
            *stats.injection_counts.entry(kind).or_insert(0) += 1;

            match kind {
                FaultKind::Allocator => decision.allocator_skip = true,
                FaultKind::Filesystem => {
                    let op = [OpKind::Write, OpKind::Sync, OpKind::Open][rng.gen_range(0..3)];
                    let error_kind = SIM_ERROR_KINDS[rng.gen_range(0..SIM_ERROR_KINDS.len())];
                    decision.filesystem_error = Some((op, "*.log".to_string(), error_kind));
                }
                FaultKind::WalCorruption => {
                    let target = if rng.gen_bool(0.5) { WalTarget::Intent } else { WalTarget::Completion };
                    let action = match rng.gen_range(0..3) {
                        0 => CorruptionAction::FlipBit,
                        1 => CorruptionAction::Truncate,
                        _ => {
                            let len = rng.gen_range(1..=8);
                            CorruptionAction::RandomFill((0..len).map(|_| rng.gen::<u8>()).collect())
                        }
                    };
                    decision.wal_corruption = Some(WalCorruptionDecision { target, offset: rng.gen_range(0..4096u64), action });
                }
                FaultKind::IoRing => decision.ioring_fail = true,
            }
        }

        decision
    }
}
