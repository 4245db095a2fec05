//! The data model for a property test: generators, failure injectors,
//! invariants, and shrinking policy, all in one `TestConfig`.

use std::collections::HashMap;

/// The five operation kinds a generated sequence can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Set,
    Get,
    Del,
    Flush,
    Restart,
}

/// Operation-type distribution. Normalized eagerly at construction time
/// (the source normalized lazily, on every sample; this implementation
/// normalizes once, when the config is built).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationDistribution {
    pub set: f64,
    pub get: f64,
    pub del: f64,
    pub flush: f64,
    pub restart: f64,
}

impl OperationDistribution {
    pub fn new(set: f64, get: f64, del: f64, flush: f64, restart: f64) -> Self {
        Self { set, get, del, flush, restart }.normalized()
    }

    fn normalized(self) -> Self {
        let total = self.set + self.get + self.del + self.flush + self.restart;
        if total <= 0.0 {
            return Self { set: 1.0, get: 0.0, del: 0.0, flush: 0.0, restart: 0.0 };
        }
        Self {
            set: self.set / total,
            get: self.get / total,
            del: self.del / total,
            flush: self.flush / total,
            restart: self.restart / total,
        }
    }

    /// Map a uniform `[0,1)` roll onto one of the five kinds.
    pub fn sample(&self, roll: f64) -> OperationKind {
        let mut acc = self.set;
        if roll < acc {
            return OperationKind::Set;
        }
        acc += self.get;
        if roll < acc {
            return OperationKind::Get;
        }
        acc += self.del;
        if roll < acc {
            return OperationKind::Del;
        }
        acc += self.flush;
        if roll < acc {
            return OperationKind::Flush;
        }
        OperationKind::Restart
    }
}

impl Default for OperationDistribution {
    fn default() -> Self {
        Self::new(0.4, 0.3, 0.2, 0.08, 0.02)
    }
}

/// How a generated key's bytes are synthesized.
#[derive(Debug, Clone)]
pub enum KeyStrategy {
    /// A random length in `[min,max]` of lowercase letters.
    UniformRandom { min: usize, max: usize },
    /// With probability `rate`, flip the low bit of an existing key's first
    /// byte (stresses probe chains); otherwise fall back to a short
    /// uniform random key.
    CollisionProne { rate: f64 },
    /// `prefix` followed by an 8-digit decimal counter suffix.
    Sequential { prefix: String },
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::UniformRandom { min: 1, max: 16 }
    }
}

/// How a generated value's bytes are synthesized.
#[derive(Debug, Clone)]
pub enum ValueStrategy {
    Fixed(usize),
    Variable { min: usize, max: usize },
    RandomBinary { min: usize, max: usize },
}

impl Default for ValueStrategy {
    fn default() -> Self {
        ValueStrategy::Variable { min: 0, max: 64 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceLengthRange {
    pub min: usize,
    pub max: usize,
}

impl Default for SequenceLengthRange {
    fn default() -> Self {
        Self { min: 10, max: 100 }
    }
}

/// The fault channels PROPTEST can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Allocator,
    Filesystem,
    WalCorruption,
    IoRing,
}

pub const ALL_FAULT_KINDS: [FaultKind; 4] =
    [FaultKind::Allocator, FaultKind::Filesystem, FaultKind::WalCorruption, FaultKind::IoRing];

/// Runtime conditions that can temporarily multiply a fault's base
/// probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    DuringRecovery,
    UnderMemoryPressure,
    HighOperationRate,
    AfterRestart,
    DuringFlush,
    HashTableResize,
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionalMultiplier {
    pub condition: Condition,
    pub multiplier: f64,
    /// How many subsequent steps the condition stays active for once
    /// triggered.
    pub duration: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FailureInjectorConfig {
    pub base_probabilities: HashMap<FaultKind, f64>,
    pub multipliers: Vec<ConditionalMultiplier>,
}

impl FailureInjectorConfig {
    pub fn with_base(mut self, kind: FaultKind, probability: f64) -> Self {
        self.base_probabilities.insert(kind, probability);
        self
    }

    pub fn with_multiplier(mut self, multiplier: ConditionalMultiplier) -> Self {
        self.multipliers.push(multiplier);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Advisory,
    Important,
    Critical,
}

/// How often a named invariant is re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFrequency {
    EveryOperation,
    Periodic(u32),
    OnCondition(Condition),
    AtEnd,
}

/// The built-in checkable properties (see `invariants.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// P1: a successful `set` is immediately visible to `get`.
    RoundTrip,
    /// P2: a successful `delete` immediately hides the key, idempotently.
    IdempotentDelete,
    /// P3: `verify_integrity` holds at every quiescent point.
    IndexAccounting,
    /// P8: `corruption_count` never decreases across restarts.
    CorruptionMonotone,
}

#[derive(Debug, Clone, Copy)]
pub struct InvariantConfig {
    pub kind: InvariantKind,
    pub frequency: CheckFrequency,
    pub severity: Severity,
}

impl InvariantConfig {
    pub fn new(kind: InvariantKind, frequency: CheckFrequency, severity: Severity) -> Self {
        Self { kind, frequency, severity }
    }
}

fn default_invariants() -> Vec<InvariantConfig> {
    vec![
        InvariantConfig::new(InvariantKind::RoundTrip, CheckFrequency::EveryOperation, Severity::Critical),
        InvariantConfig::new(InvariantKind::IdempotentDelete, CheckFrequency::EveryOperation, Severity::Critical),
        InvariantConfig::new(InvariantKind::IndexAccounting, CheckFrequency::EveryOperation, Severity::Critical),
        InvariantConfig::new(InvariantKind::CorruptionMonotone, CheckFrequency::EveryOperation, Severity::Critical),
    ]
}

/// The five reduction techniques `shrink` can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStrategy {
    RemoveOperations,
    SimplifyValues,
    ReduceKeyDiversity,
    FocusAroundFailure,
}

#[derive(Debug, Clone)]
pub struct ShrinkConfig {
    pub max_attempts: u32,
    pub strategies: Vec<ShrinkStrategy>,
    /// `preserve_failure_pattern`: when reducing, replay the exact recorded
    /// fault decisions instead of re-rolling them.
    pub preserve_failure_conditions: bool,
}

impl Default for ShrinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 200,
            strategies: vec![
                ShrinkStrategy::RemoveOperations,
                ShrinkStrategy::FocusAroundFailure,
                ShrinkStrategy::SimplifyValues,
                ShrinkStrategy::ReduceKeyDiversity,
            ],
            preserve_failure_conditions: true,
        }
    }
}

/// A fully specified property test, per the configuration model.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub name: String,
    pub seed: u64,
    pub iterations: u32,
    pub operation_distribution: OperationDistribution,
    pub key_strategy: KeyStrategy,
    pub value_strategy: ValueStrategy,
    pub sequence_length: SequenceLengthRange,
    pub injectors: FailureInjectorConfig,
    pub invariants: Vec<InvariantConfig>,
    pub shrink: ShrinkConfig,
}

impl TestConfig {
    pub fn new(name: impl Into<String>, seed: u64, iterations: u32) -> Self {
        Self {
            name: name.into(),
            seed,
            iterations,
            operation_distribution: OperationDistribution::default(),
            key_strategy: KeyStrategy::default(),
            value_strategy: ValueStrategy::default(),
            sequence_length: SequenceLengthRange::default(),
            injectors: FailureInjectorConfig::default(),
            invariants: default_invariants(),
            shrink: ShrinkConfig::default(),
        }
    }

    pub fn with_operation_distribution(mut self, d: OperationDistribution) -> Self {
        self.operation_distribution = d;
        self
    }

    pub fn with_key_strategy(mut self, s: KeyStrategy) -> Self {
        self.key_strategy = s;
        self
    }

    pub fn with_value_strategy(mut self, s: ValueStrategy) -> Self {
        self.value_strategy = s;
        self
    }

    pub fn with_sequence_length(mut self, range: SequenceLengthRange) -> Self {
        self.sequence_length = range;
        self
    }

    pub fn with_injectors(mut self, injectors: FailureInjectorConfig) -> Self {
        self.injectors = injectors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_distribution_normalizes_eagerly() {
        let d = OperationDistribution::new(2.0, 2.0, 0.0, 0.0, 0.0);
        assert!((d.set - 0.5).abs() < 1e-9);
        assert!((d.get - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sample_covers_whole_unit_interval() {
        let d = OperationDistribution::new(0.25, 0.25, 0.25, 0.15, 0.1);
        assert_eq!(d.sample(0.0), OperationKind::Set);
        assert_eq!(d.sample(0.99), OperationKind::Restart);
    }
}
